//! Nonce → sign → verify session handshake for seat owners. A session binds
//! a bearer token to the ledger account that signed the nonce message.

use std::collections::HashMap;
use std::sync::Mutex;

use ethers::types::{Address, Signature};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("no nonce issued for this address")]
    UnknownNonce,
    #[error("signature verification failed: {0}")]
    InvalidSignature(String),
    #[error("invalid or expired session token")]
    Unauthorized,
}

struct NonceEntry {
    nonce: String,
    issued_at: u64,
}

#[derive(Clone, Copy)]
struct Session {
    address: Address,
    expires_at: u64,
}

pub struct SessionManager {
    nonces: Mutex<HashMap<Address, NonceEntry>>,
    sessions: Mutex<HashMap<String, Session>>,
    session_ttl_secs: u64,
    nonce_ttl_secs: u64,
}

impl SessionManager {
    pub fn new(session_ttl_secs: u64) -> Self {
        Self {
            nonces: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            session_ttl_secs,
            nonce_ttl_secs: 300,
        }
    }

    /// The exact text the wallet signs; rendered once so the client and the
    /// verifier can never disagree on layout.
    pub fn login_message(address: Address, nonce: &str) -> String {
        format!("showdown dealer login\naddress: {address:#x}\nnonce: {nonce}")
    }

    pub fn issue_nonce(&self, address: Address, now: u64) -> String {
        let nonce = Uuid::new_v4().to_string();
        self.nonces.lock().expect("auth lock poisoned").insert(
            address,
            NonceEntry {
                nonce: nonce.clone(),
                issued_at: now,
            },
        );
        nonce
    }

    /// Verify an EIP-191 personal signature over the issued nonce message and
    /// mint a session token. The nonce is single-use: it is consumed here
    /// whether or not verification succeeds.
    pub fn verify(
        &self,
        address: Address,
        signature_hex: &str,
        now: u64,
    ) -> Result<(String, u64), AuthError> {
        let entry = self
            .nonces
            .lock()
            .expect("auth lock poisoned")
            .remove(&address)
            .ok_or(AuthError::UnknownNonce)?;
        if now.saturating_sub(entry.issued_at) > self.nonce_ttl_secs {
            return Err(AuthError::UnknownNonce);
        }

        let signature: Signature = signature_hex
            .trim_start_matches("0x")
            .parse()
            .map_err(|err: ethers::types::SignatureError| {
                AuthError::InvalidSignature(err.to_string())
            })?;
        let message = Self::login_message(address, &entry.nonce);
        signature
            .verify(message, address)
            .map_err(|err| AuthError::InvalidSignature(err.to_string()))?;

        let token = Uuid::new_v4().to_string();
        let expires_at = now.saturating_add(self.session_ttl_secs);
        self.sessions.lock().expect("auth lock poisoned").insert(
            token.clone(),
            Session {
                address,
                expires_at,
            },
        );
        Ok((token, expires_at))
    }

    /// Resolve a bearer token to its bound account.
    pub fn authenticate(&self, token: &str, now: u64) -> Result<Address, AuthError> {
        let sessions = self.sessions.lock().expect("auth lock poisoned");
        match sessions.get(token) {
            Some(session) if session.expires_at > now => Ok(session.address),
            _ => Err(AuthError::Unauthorized),
        }
    }

    /// Mint a session without the signature handshake. Test fixtures only.
    #[cfg(test)]
    pub(crate) fn test_session(&self, address: Address, expires_at: u64) -> String {
        let token = Uuid::new_v4().to_string();
        self.sessions.lock().expect("auth lock poisoned").insert(
            token.clone(),
            Session {
                address,
                expires_at,
            },
        );
        token
    }

    pub fn purge_expired(&self, now: u64) -> usize {
        let mut sessions = self.sessions.lock().expect("auth lock poisoned");
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::signers::{LocalWallet, Signer};

    async fn signed_login(
        manager: &SessionManager,
        wallet: &LocalWallet,
        now: u64,
    ) -> Result<(String, u64), AuthError> {
        let nonce = manager.issue_nonce(wallet.address(), now);
        let message = SessionManager::login_message(wallet.address(), &nonce);
        let signature = wallet.sign_message(message).await.unwrap();
        manager.verify(wallet.address(), &format!("0x{signature}"), now)
    }

    #[tokio::test]
    async fn handshake_issues_usable_session() {
        let manager = SessionManager::new(3_600);
        let wallet = LocalWallet::new(&mut rand::thread_rng());
        let (token, expires_at) = signed_login(&manager, &wallet, 1_000).await.unwrap();
        assert_eq!(expires_at, 4_600);
        assert_eq!(manager.authenticate(&token, 2_000).unwrap(), wallet.address());
    }

    #[tokio::test]
    async fn session_expires() {
        let manager = SessionManager::new(60);
        let wallet = LocalWallet::new(&mut rand::thread_rng());
        let (token, _) = signed_login(&manager, &wallet, 1_000).await.unwrap();
        assert!(matches!(
            manager.authenticate(&token, 1_061),
            Err(AuthError::Unauthorized)
        ));
        assert_eq!(manager.purge_expired(1_061), 1);
    }

    #[tokio::test]
    async fn wrong_signer_is_rejected() {
        let manager = SessionManager::new(3_600);
        let owner = LocalWallet::new(&mut rand::thread_rng());
        let impostor = LocalWallet::new(&mut rand::thread_rng());

        let nonce = manager.issue_nonce(owner.address(), 1_000);
        let message = SessionManager::login_message(owner.address(), &nonce);
        let signature = impostor.sign_message(message).await.unwrap();
        let err = manager
            .verify(owner.address(), &format!("0x{signature}"), 1_000)
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidSignature(_)));
    }

    #[test]
    fn nonce_is_single_use() {
        let manager = SessionManager::new(3_600);
        let address = Address::repeat_byte(0x11);
        manager.issue_nonce(address, 1_000);
        // First attempt consumes the nonce even though the signature is junk.
        assert!(manager.verify(address, "0xdeadbeef", 1_000).is_err());
        assert!(matches!(
            manager.verify(address, "0xdeadbeef", 1_000),
            Err(AuthError::UnknownNonce)
        ));
    }
}
