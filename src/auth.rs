use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::errors::{PanelError, PanelResult};
use crate::PanelState;

/// Verifies tokens minted by the external identity service with the shared
/// panel secret. The panel never issues sessions of its own; it only checks
/// the signature and expiry.
///
/// Token layout: `b64url(user_id|expiry_unix) . b64url(sha256(secret|payload))`
pub struct AuthService {
    secret: String,
    admin_token: String,
}

impl AuthService {
    pub fn new(secret: String, admin_token: String) -> Self {
        Self {
            secret,
            admin_token,
        }
    }

    pub fn verify_user_token(&self, token: &str) -> PanelResult<String> {
        let (payload_b64, sig_b64) = token.split_once('.').ok_or(PanelError::Unauthorized)?;
        let payload_raw = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| PanelError::Unauthorized)?;
        let payload = String::from_utf8(payload_raw).map_err(|_| PanelError::Unauthorized)?;

        if self.sign(&payload) != sig_b64 {
            return Err(PanelError::Unauthorized);
        }

        let (user_id, expiry) = payload.rsplit_once('|').ok_or(PanelError::Unauthorized)?;
        let expiry: i64 = expiry.parse().map_err(|_| PanelError::Unauthorized)?;
        if expiry < chrono::Utc::now().timestamp() {
            return Err(PanelError::Unauthorized);
        }
        if user_id.is_empty() {
            return Err(PanelError::Unauthorized);
        }
        Ok(user_id.to_string())
    }

    pub fn verify_admin_token(&self, token: &str) -> PanelResult<()> {
        if !self.admin_token.is_empty() && token == self.admin_token {
            Ok(())
        } else {
            Err(PanelError::Unauthorized)
        }
    }

    /// Mint a token the way the identity service does. Exists for tests and
    /// operator tooling; the panel itself never calls this on behalf of a
    /// request.
    pub fn issue_user_token(&self, user_id: &str, ttl_secs: i64) -> String {
        let payload = format!(
            "{}|{}",
            user_id,
            chrono::Utc::now().timestamp() + ttl_secs
        );
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload.as_bytes()),
            self.sign(&payload)
        )
    }

    fn sign(&self, payload: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b"|");
        hasher.update(payload.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

fn bearer_token(parts: &Parts) -> PanelResult<String> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(PanelError::Unauthorized)?;
    let token = header.strip_prefix("Bearer ").ok_or(PanelError::Unauthorized)?;
    if token.is_empty() {
        return Err(PanelError::Unauthorized);
    }
    Ok(token.to_string())
}

/// A verified end user.
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub user_id: String,
}

impl FromRequestParts<PanelState> for UserIdentity {
    type Rejection = PanelError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &PanelState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let user_id = state.auth.verify_user_token(&token)?;
        Ok(UserIdentity { user_id })
    }
}

/// A node agent/watchdog, resolved from its static per-node secret. Never a
/// browser user.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub node_id: String,
}

impl FromRequestParts<PanelState> for NodeIdentity {
    type Rejection = PanelError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &PanelState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let node = state
            .store
            .node_by_secret(&token)
            .await
            .ok_or(PanelError::Unauthorized)?;
        Ok(NodeIdentity { node_id: node.id })
    }
}

/// The panel operator.
#[derive(Debug, Clone)]
pub struct AdminIdentity;

impl FromRequestParts<PanelState> for AdminIdentity {
    type Rejection = PanelError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &PanelState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        state.auth.verify_admin_token(&token)?;
        Ok(AdminIdentity)
    }
}
