//! HTTP client for the dealing service, authenticated with the shared
//! keeper bearer token.

use anyhow::{anyhow, Context, Result};
use reqwest::StatusCode;
use showdown_types::api::{DealRequest, DealResponse, RevealRequest, RevealResponse};

use crate::{DealOutcome, DealerOps, RevealData, SeatCommitmentData};

pub struct DealerClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl DealerClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn decode_hex32(value: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(value.trim_start_matches("0x"))
        .with_context(|| format!("invalid hex: {value}"))?;
    bytes
        .try_into()
        .map_err(|_| anyhow!("expected 32 bytes: {value}"))
}

impl DealerOps for DealerClient {
    async fn ensure_dealt(&self, table_id: u64, hand_id: u64) -> Result<DealOutcome> {
        let response = self
            .client
            .post(self.url("/deal"))
            .bearer_auth(&self.token)
            .json(&DealRequest { table_id, hand_id })
            .send()
            .await
            .context("dealer deal request")?;
        match response.status() {
            StatusCode::CREATED => Ok(DealOutcome::Dealt),
            StatusCode::CONFLICT => Ok(DealOutcome::AlreadyDealt),
            status => Err(anyhow!(
                "dealer deal failed: {status} {}",
                response.text().await.unwrap_or_default()
            )),
        }
    }

    async fn commitments(
        &self,
        table_id: u64,
        hand_id: u64,
    ) -> Result<Option<Vec<SeatCommitmentData>>> {
        let response = self
            .client
            .get(self.url(&format!("/commitments/{table_id}/{hand_id}")))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("dealer commitments request")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: DealResponse = response
            .error_for_status()
            .context("dealer commitments status")?
            .json()
            .await
            .context("dealer commitments body")?;
        let commitments = body
            .commitments
            .iter()
            .map(|seat| {
                Ok(SeatCommitmentData {
                    seat_index: seat.seat_index,
                    commitment: decode_hex32(&seat.commitment)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(commitments))
    }

    async fn reveal(
        &self,
        table_id: u64,
        hand_id: u64,
        seat_index: u8,
    ) -> Result<Option<RevealData>> {
        let response = self
            .client
            .post(self.url("/reveal"))
            .bearer_auth(&self.token)
            .json(&RevealRequest {
                table_id,
                hand_id,
                seat_index,
            })
            .send()
            .await
            .context("dealer reveal request")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: RevealResponse = response
            .error_for_status()
            .context("dealer reveal status")?
            .json()
            .await
            .context("dealer reveal body")?;
        Ok(Some(RevealData {
            cards: [body.cards[0].value(), body.cards[1].value()],
            salt: decode_hex32(&body.salt)?,
        }))
    }

    async fn cleanup(&self, table_id: u64, hand_id: u64) -> Result<usize> {
        let response = self
            .client
            .post(self.url(&format!("/cleanup/{table_id}/{hand_id}")))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("dealer cleanup request")?
            .error_for_status()
            .context("dealer cleanup status")?;
        let body: serde_json::Value = response.json().await.context("dealer cleanup body")?;
        Ok(body["removed"].as_u64().unwrap_or(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_decoding_accepts_both_prefixes() {
        let hex = "11".repeat(32);
        assert_eq!(decode_hex32(&hex).unwrap(), [0x11u8; 32]);
        assert_eq!(decode_hex32(&format!("0x{hex}")).unwrap(), [0x11u8; 32]);
        assert!(decode_hex32("0xdead").is_err());
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = DealerClient::new("http://localhost:9100/", "token");
        assert_eq!(client.url("/deal"), "http://localhost:9100/deal");
    }
}
