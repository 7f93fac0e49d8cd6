use super::BitableClient;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

pub const DEFAULT_TOKEN_FILE: &str = "token.json";

/// Refresh this many seconds before the server-reported expiry.
const EXPIRY_MARGIN_SECS: u64 = 60;

const AUTH_PATH: &str = "/open-apis/auth/v3/tenant_access_token/internal";

/// Cached tenant access token with its absolute expiry (unix seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenState {
    pub token: String,
    pub expire_time: u64,
}

impl TokenState {
    pub fn is_valid(&self, now: u64) -> bool {
        self.expire_time > now
    }
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    tenant_access_token: Option<String>,
    expire: Option<u64>,
}

/// Single-slot token cache persisted alongside the other state files. One
/// mutable slot, no history; reset by deletion or expiry.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Return a valid bearer token, hitting the auth endpoint only when the
    /// cached slot is missing or expired.
    pub async fn get_token(
        &self,
        client: &BitableClient,
        app_id: &str,
        app_secret: &str,
    ) -> Result<String> {
        if let Some(state) = self.load() {
            if state.is_valid(unix_now()) {
                debug!("Using cached tenant access token");
                return Ok(state.token);
            }
        }

        self.refresh(client, app_id, app_secret).await
    }

    async fn refresh(
        &self,
        client: &BitableClient,
        app_id: &str,
        app_secret: &str,
    ) -> Result<String> {
        debug!("Requesting new tenant access token");

        let response = client
            .http()
            .post(client.endpoint(AUTH_PATH))
            .json(&serde_json::json!({ "app_id": app_id, "app_secret": app_secret }))
            .send()
            .await
            .map_err(|e| Error::Auth(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Auth(format!(
                "Token endpoint returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let body: AuthResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("Failed to decode token response: {}", e)))?;

        if body.code != 0 {
            return Err(Error::Auth(format!(
                "Credential exchange rejected (code {}): {}",
                body.code, body.msg
            )));
        }

        let token = body
            .tenant_access_token
            .ok_or_else(|| Error::Auth("Token response missing tenant_access_token".to_string()))?;
        let ttl = body.expire.unwrap_or(7200);

        let state = TokenState {
            token: token.clone(),
            expire_time: unix_now() + ttl.saturating_sub(EXPIRY_MARGIN_SECS),
        };
        // A broken cache file only costs an extra exchange next run.
        if let Err(e) = self.save(&state) {
            warn!("Failed to persist token cache: {}", e);
        }

        Ok(token)
    }

    fn load(&self) -> Option<TokenState> {
        let content = fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn save(&self, state: &TokenState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
