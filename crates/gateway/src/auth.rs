//! Token verification and auth-session bootstrap.
//!
//! Verification itself is a port: production deployments plug their
//! identity provider behind [`TokenVerifier`]. The bundled
//! [`SharedSecretVerifier`] checks a SHA-256 signature over the uid in
//! constant time; with no secret configured it runs in dev mode and
//! accepts any well-formed token.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use fiscus_domain::error::{Error, Result};
use fiscus_stores::{paths, EphemeralStore};

/// Identity recovered from a verified token.
#[derive(Debug, Clone)]
pub struct AuthClaims {
    pub uid: String,
    pub email: Option<String>,
}

/// Port over the identity provider's token verification.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<AuthClaims>;
}

/// Constant-time string comparison via SHA-256 digests. Hashing
/// normalizes lengths so `ct_eq` always compares 32 bytes.
fn digest_eq(a: &str, b: &str) -> bool {
    let ha = Sha256::digest(a.as_bytes());
    let hb = Sha256::digest(b.as_bytes());
    ha.ct_eq(&hb).into()
}

/// Tokens have the shape `"{uid}.{hex(sha256(secret + \".\" + uid))}"`.
pub struct SharedSecretVerifier {
    secret: Option<String>,
}

impl SharedSecretVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    /// Mint a token for a uid; used by tooling and tests.
    pub fn sign(&self, uid: &str) -> String {
        match &self.secret {
            Some(secret) => {
                let sig = Sha256::digest(format!("{secret}.{uid}").as_bytes());
                format!("{uid}.{}", hex::encode(sig))
            }
            None => uid.to_owned(),
        }
    }
}

impl TokenVerifier for SharedSecretVerifier {
    fn verify(&self, token: &str) -> Result<AuthClaims> {
        let Some(secret) = &self.secret else {
            // Dev mode: the token is the uid.
            let uid = token.split('.').next().unwrap_or(token);
            if uid.is_empty() {
                return Err(Error::Auth("empty token".into()));
            }
            return Ok(AuthClaims {
                uid: uid.to_owned(),
                email: None,
            });
        };

        let (uid, signature) = token
            .split_once('.')
            .ok_or_else(|| Error::Auth("malformed token".into()))?;
        if uid.is_empty() {
            return Err(Error::Auth("malformed token".into()));
        }
        let expected = hex::encode(Sha256::digest(format!("{secret}.{uid}").as_bytes()));
        if !digest_eq(signature, &expected) {
            return Err(Error::Auth("invalid token signature".into()));
        }
        Ok(AuthClaims {
            uid: uid.to_owned(),
            email: None,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session bootstrap
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Verify a login token and, on success, create the ephemeral auth
/// session record. The claimed uid must match the token's.
pub async fn establish_session(
    verifier: &dyn TokenVerifier,
    ephemeral: &Arc<dyn EphemeralStore>,
    token: &str,
    claimed_uid: &str,
    session_id: &str,
    email: Option<&str>,
    ttl_secs: u64,
) -> Result<AuthClaims> {
    let claims = verifier.verify(token)?;
    if claims.uid != claimed_uid {
        return Err(Error::Auth(format!(
            "token uid does not match claimed uid {claimed_uid}"
        )));
    }

    ephemeral
        .set(
            &paths::auth_session_key(&claims.uid, session_id),
            json!({
                "uid": claims.uid,
                "email": email,
                "session_id": session_id,
                "created_at": chrono::Utc::now().to_rfc3339(),
            }),
            Some(Duration::from_secs(ttl_secs)),
        )
        .await?;

    tracing::info!(uid = %claims.uid, session_id, "auth session established");
    Ok(claims)
}
