//! Authentication tokens.
//!
//! A token's plaintext is handed to the client exactly once. Only its SHA-256
//! digest is stored, and every lookup goes through the digest.

use chrono::{DateTime, Duration, Utc};
use data_encoding::BASE32_NOPAD;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Length of a token plaintext: 16 random bytes in unpadded base32.
pub const TOKEN_PLAINTEXT_LEN: usize = 26;

const TOKEN_ENTROPY_BYTES: usize = 16;

/// SHA-256 digest of a token plaintext.
pub type TokenHash = [u8; 32];

/// Purpose a token was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    Authentication,
    Activation,
}

impl TokenScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenScope::Authentication => "authentication",
            TokenScope::Activation => "activation",
        }
    }
}

impl std::fmt::Display for TokenScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A freshly issued token.
#[derive(Debug, Clone, Serialize)]
pub struct AuthToken {
    /// Only ever surfaced to the caller that requested the token.
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: TokenHash,
    #[serde(skip)]
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: TokenScope,
}

impl AuthToken {
    /// Generate a token for `user_id` that expires `ttl` from now.
    pub fn generate(user_id: i64, ttl: Duration, scope: TokenScope) -> Self {
        let mut entropy = [0u8; TOKEN_ENTROPY_BYTES];
        OsRng.fill_bytes(&mut entropy);

        let plaintext = BASE32_NOPAD.encode(&entropy);
        let hash = hash_token(&plaintext);

        Self {
            plaintext,
            hash,
            user_id,
            expiry: Utc::now() + ttl,
            scope,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

/// Digest a token plaintext into its lookup key.
pub fn hash_token(plaintext: &str) -> TokenHash {
    Sha256::digest(plaintext.as_bytes()).into()
}

/// Check that `token` could have been produced by [`AuthToken::generate`].
pub fn is_valid_plaintext(token: &str) -> bool {
    token.len() == TOKEN_PLAINTEXT_LEN
        && token
            .bytes()
            .all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b))
}
