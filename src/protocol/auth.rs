//! Online-mode login: key exchange and session server join.

use rand::RngCore;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use serde::Serialize;
use sha1::{Digest, Sha1};
use tracing::debug;

use crate::common::error::{ProtocolError, ProtocolResult};

pub const SESSION_JOIN_URL: &str = "https://sessionserver.mojang.com/session/minecraft/join";

/// Fresh 16-byte AES shared secret.
pub fn generate_shared_secret() -> [u8; 16] {
    let mut secret = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut secret);
    secret
}

/// Server hash sent to the session server.
///
/// SHA-1 over server id, shared secret and public key, printed as a signed
/// (two's complement) hex number without leading zeros.
pub fn server_hash(server_id: &str, shared_secret: &[u8], public_key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(server_id.as_bytes());
    hasher.update(shared_secret);
    hasher.update(public_key);
    let digest: [u8; 20] = hasher.finalize().into();
    signed_hex_digest(digest)
}

fn signed_hex_digest(mut digest: [u8; 20]) -> String {
    let negative = digest[0] & 0x80 != 0;
    if negative {
        // Two's complement negation: invert and add one.
        let mut carry = true;
        for byte in digest.iter_mut().rev() {
            let (value, overflow) = (!*byte).overflowing_add(carry as u8);
            *byte = value;
            carry = overflow;
        }
    }

    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    let trimmed = hex.trim_start_matches('0');
    let trimmed = if trimmed.is_empty() { "0" } else { trimmed };
    if negative {
        format!("-{}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// RSA-encrypt `data` (PKCS#1 v1.5) with the server's DER public key.
pub fn encrypt_with_public_key(public_key_der: &[u8], data: &[u8]) -> ProtocolResult<Vec<u8>> {
    let key = RsaPublicKey::from_public_key_der(public_key_der).map_err(|e| {
        ProtocolError::EncryptionError {
            message: format!("invalid server public key: {}", e),
        }
    })?;
    key.encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, data)
        .map_err(|e| ProtocolError::EncryptionError {
            message: e.to_string(),
        })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinRequest<'a> {
    access_token: &'a str,
    selected_profile: &'a str,
    server_id: &'a str,
}

/// Joins servers on behalf of one account.
#[derive(Debug, Clone)]
pub struct SessionAuthenticator {
    http: reqwest::Client,
    access_token: String,
    /// Profile UUID without dashes.
    profile_id: String,
}

impl SessionAuthenticator {
    pub fn new(access_token: impl Into<String>, profile_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            access_token: access_token.into(),
            profile_id: profile_id.into().replace('-', ""),
        }
    }

    /// Announce the join to the session server.
    pub async fn join(&self, server_hash: &str) -> ProtocolResult<()> {
        debug!(profile = %self.profile_id, "Joining session server");
        let response = self
            .http
            .post(SESSION_JOIN_URL)
            .json(&JoinRequest {
                access_token: &self.access_token,
                selected_profile: &self.profile_id,
                server_id: server_hash,
            })
            .send()
            .await
            .map_err(|e| ProtocolError::AuthFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ProtocolError::AuthFailed {
            reason: format!("session server returned {}: {}", status, body),
        })
    }
}
