//! Agent performance rankings derived from the vault NAV time series. All
//! metrics are computed over the snapshots that fall inside the requested
//! period; agents with fewer than two points are unrankable and skipped.

use showdown_types::api::{LeaderboardEntry, LeaderboardMetric, LeaderboardPeriod};

use crate::store::MirrorStore;

const NAV_SCALE: f64 = 1e18;

/// Return on investment over the window, in percent.
pub fn roi(navs: &[f64]) -> Option<f64> {
    let first = *navs.first()?;
    let last = *navs.last()?;
    if navs.len() < 2 || first <= 0.0 {
        return None;
    }
    Some((last - first) / first * 100.0)
}

/// Peak-to-trough decline over the window, in percent. Lower is better.
pub fn max_drawdown(navs: &[f64]) -> Option<f64> {
    if navs.len() < 2 {
        return None;
    }
    let mut peak = f64::MIN;
    let mut worst = 0.0f64;
    for &nav in navs {
        if nav > peak {
            peak = nav;
        } else if peak > 0.0 {
            let drawdown = (peak - nav) / peak * 100.0;
            if drawdown > worst {
                worst = drawdown;
            }
        }
    }
    Some(worst)
}

/// Share of hands in the window whose NAV moved up, in percent.
pub fn winrate(navs: &[f64]) -> Option<f64> {
    if navs.len() < 2 {
        return None;
    }
    let wins = navs.windows(2).filter(|pair| pair[1] > pair[0]).count();
    Some(wins as f64 / (navs.len() - 1) as f64 * 100.0)
}

/// Rank every registered agent by the requested metric. Drawdown ranks
/// ascending; everything else descending.
pub fn rank(
    store: &MirrorStore,
    metric: LeaderboardMetric,
    period: LeaderboardPeriod,
    now: u64,
) -> Vec<LeaderboardEntry> {
    let cutoff = period.as_seconds().map(|secs| now.saturating_sub(secs));
    let mut entries = Vec::new();

    for agent in store.agents() {
        let snapshots: Vec<_> = store
            .snapshots_for_vault(agent.vault_address)
            .into_iter()
            .filter(|snapshot| cutoff.map_or(true, |cutoff| snapshot.recorded_at >= cutoff))
            .collect();
        let navs: Vec<f64> = snapshots
            .iter()
            .map(|snapshot| snapshot.nav_per_share as f64 / NAV_SCALE)
            .collect();

        let value = match metric {
            LeaderboardMetric::Roi => roi(&navs),
            LeaderboardMetric::Mdd => max_drawdown(&navs),
            LeaderboardMetric::Winrate => winrate(&navs),
            LeaderboardMetric::Pnl => match (snapshots.first(), snapshots.last()) {
                (Some(first), Some(last)) if snapshots.len() >= 2 => {
                    Some((last.cumulative_pnl - first.cumulative_pnl) as f64)
                }
                _ => None,
            },
        };
        if let Some(value) = value {
            entries.push(LeaderboardEntry {
                token_address: agent.token_address,
                vault_address: agent.vault_address,
                value,
                sample_count: snapshots.len(),
            });
        }
    }

    match metric {
        LeaderboardMetric::Mdd => {
            entries.sort_by(|a, b| a.value.total_cmp(&b.value));
        }
        _ => {
            entries.sort_by(|a, b| b.value.total_cmp(&a.value));
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;
    use showdown_types::{Agent, VaultSnapshot};

    #[test]
    fn drawdown_matches_the_reference_series() {
        let navs = [1.0, 1.1, 0.9, 0.95];
        let mdd = max_drawdown(&navs).unwrap();
        // Peak 1.1, trough 0.9.
        assert!((mdd - 18.1818).abs() < 0.001, "got {mdd}");
    }

    #[test]
    fn drawdown_is_zero_for_a_rising_series() {
        assert_eq!(max_drawdown(&[1.0, 1.1, 1.2]).unwrap(), 0.0);
    }

    #[test]
    fn roi_and_winrate_need_two_points() {
        assert!(roi(&[1.0]).is_none());
        assert!(winrate(&[1.0]).is_none());
        assert!(max_drawdown(&[1.0]).is_none());

        let navs = [1.0, 1.2, 1.1, 1.3];
        assert!((roi(&navs).unwrap() - 30.0).abs() < 1e-9);
        assert!((winrate(&navs).unwrap() - 66.6666).abs() < 0.001);
    }

    fn seed_agent(store: &MirrorStore, byte: u8, navs: &[u128], base_time: u64) {
        let vault = Address::repeat_byte(byte);
        store.upsert_agent(Agent {
            token_address: Address::repeat_byte(byte.wrapping_add(0x80)),
            vault_address: vault,
            table_address: Address::zero(),
            owner: Address::zero(),
            operator: Address::zero(),
            meta_uri: String::new(),
            is_registered: true,
        });
        for (i, nav) in navs.iter().enumerate() {
            store.push_snapshot(VaultSnapshot {
                vault_address: vault,
                hand_id: i as u64,
                external_assets: 0,
                treasury_shares: 0,
                outstanding_shares: 0,
                nav_per_share: *nav,
                cumulative_pnl: 0,
                block_number: i as u64,
                recorded_at: base_time + i as u64,
            });
        }
    }

    #[test]
    fn mdd_ranks_ascending_roi_descending() {
        let store = MirrorStore::new();
        let e18 = 10u128.pow(18);
        // Steady climber: zero drawdown, 10% roi.
        seed_agent(&store, 0x01, &[e18, e18 + e18 / 10], 100);
        // Volatile: large drawdown, 20% roi.
        seed_agent(&store, 0x02, &[e18, e18 / 2, e18 + e18 / 5], 100);

        let by_mdd = rank(&store, LeaderboardMetric::Mdd, LeaderboardPeriod::All, 200);
        assert_eq!(by_mdd[0].vault_address, Address::repeat_byte(0x01));

        let by_roi = rank(&store, LeaderboardMetric::Roi, LeaderboardPeriod::All, 200);
        assert_eq!(by_roi[0].vault_address, Address::repeat_byte(0x02));
    }

    #[test]
    fn period_filter_excludes_old_snapshots() {
        let store = MirrorStore::new();
        let e18 = 10u128.pow(18);
        // Two old points and one recent one; a day-scoped ranking sees only
        // the recent point and cannot rank the agent.
        seed_agent(&store, 0x03, &[e18, 2 * e18], 0);
        let now = 200_000;
        store.push_snapshot(VaultSnapshot {
            vault_address: Address::repeat_byte(0x03),
            hand_id: 9,
            external_assets: 0,
            treasury_shares: 0,
            outstanding_shares: 0,
            nav_per_share: 3 * e18,
            cumulative_pnl: 0,
            block_number: 9,
            recorded_at: now,
        });

        let day = rank(&store, LeaderboardMetric::Roi, LeaderboardPeriod::Day, now);
        assert!(day.is_empty());
        let all = rank(&store, LeaderboardMetric::Roi, LeaderboardPeriod::All, now);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].sample_count, 3);
    }
}
