//! Bounded pool of short-lived bearer credentials with per-model cooldowns.
//!
//! Selection takes the pool-level read lock; all mutation goes through the
//! per-credential lock, so distinct credentials never contend. A credential
//! disabled here stays disabled for the life of the process.

use chrono::{Duration, Utc};
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::types::{Credential, CredentialSnapshot, Lease};
use crate::constants::REFRESH_THRESHOLD_SECS;
use crate::error::PoolError;

const MIN_COOLDOWN_SECS: i64 = 30;

const MIN_INITIAL_EXPIRY_SECS: i64 = 60;
const MAX_INITIAL_EXPIRY_SECS: i64 = 3600;

pub struct CredentialPool {
    credentials: RwLock<Vec<Arc<Credential>>>,
    refresh_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RefreshTokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    #[allow(dead_code)]
    token_type: Option<String>,
}

impl CredentialPool {
    pub fn new(count: usize, refresh_url: String) -> Self {
        let now = Utc::now();
        let mut rng = rand::thread_rng();
        let credentials = (1..=count)
            .map(|i| {
                let ttl = rng.gen_range(MIN_INITIAL_EXPIRY_SECS..=MAX_INITIAL_EXPIRY_SECS);
                Arc::new(Credential::new(
                    format!("cred_{:03}", i),
                    format!("mock_token_{:03}", i),
                    format!("mock_refresh_{:03}", i),
                    now + Duration::seconds(ttl),
                ))
            })
            .collect();

        Self {
            credentials: RwLock::new(credentials),
            refresh_url,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("Failed to create refresh HTTP client"),
        }
    }

    pub async fn len(&self) -> usize {
        self.credentials.read().await.len()
    }

    /// Picks an eligible credential for `model` uniformly at random,
    /// refreshing its token first when it is about to expire.
    pub async fn acquire(&self, model: &str) -> Result<Lease, PoolError> {
        self.acquire_inner(model, None).await
    }

    /// Like `acquire`, but never returns the credential with the given id.
    /// Used by the streaming path to rotate away from a failing credential.
    pub async fn acquire_excluding(&self, model: &str, exclude: &str) -> Result<Lease, PoolError> {
        self.acquire_inner(model, Some(exclude)).await
    }

    async fn acquire_inner(&self, model: &str, exclude: Option<&str>) -> Result<Lease, PoolError> {
        let available = self.eligible(model, exclude).await;
        if available.is_empty() {
            return Err(PoolError::NoCredential(model.to_string()));
        }

        let chosen = {
            let idx = rand::thread_rng().gen_range(0..available.len());
            Arc::clone(&available[idx])
        };

        let mut state = chosen.state.lock().await;
        if state.disabled {
            // Lost a race with record_error between selection and locking.
            return Err(PoolError::NoCredential(model.to_string()));
        }

        if state.expiry <= Utc::now() + Duration::seconds(REFRESH_THRESHOLD_SECS) {
            self.refresh_locked(&chosen.id, &mut state).await?;
        }

        state.call_count += 1;
        let access_token = state.access_token.clone();
        drop(state);

        Ok(Lease {
            credential: chosen,
            access_token,
        })
    }

    async fn eligible(&self, model: &str, exclude: Option<&str>) -> Vec<Arc<Credential>> {
        let now = Utc::now();
        let credentials = self.credentials.read().await;
        let mut available = Vec::new();

        for cred in credentials.iter() {
            if exclude == Some(cred.id.as_str()) {
                continue;
            }
            let state = cred.state.lock().await;
            if state.disabled {
                continue;
            }
            if let Some(until) = state.model_cooldowns.get(model) {
                if now < *until {
                    continue;
                }
            }
            drop(state);
            available.push(Arc::clone(cred));
        }

        available
    }

    /// Books an upstream failure against the credential. Rate/overload
    /// statuses put the credential on a per-model cooldown of at least
    /// 30 seconds; client rejections disable it permanently.
    pub async fn record_error(
        &self,
        cred: &Credential,
        status: u16,
        model: &str,
        cooldown_seconds: u64,
    ) {
        let mut state = cred.state.lock().await;
        state.error_count += 1;

        match status {
            429 | 503 => {
                let secs = (cooldown_seconds as i64).max(MIN_COOLDOWN_SECS);
                let until = Utc::now() + Duration::seconds(secs);
                debug!(
                    "Credential {} cooling down for {} on {} ({}s)",
                    cred.id, model, status, secs
                );
                state.model_cooldowns.insert(model.to_string(), until);
            }
            400 | 403 => {
                warn!(
                    "[W-CRED-DISABLED] credential {} permanently disabled (upstream status {})",
                    cred.id, status
                );
                state.disabled = true;
            }
            _ => {}
        }
    }

    /// Exchanges the refresh token at the token endpoint. A 400/401/403
    /// reply disables the credential for good; everything else that fails
    /// is temporary and leaves it usable.
    pub async fn refresh(&self, cred: &Credential) -> Result<(), PoolError> {
        let mut state = cred.state.lock().await;
        self.refresh_locked(&cred.id, &mut state).await
    }

    async fn refresh_locked(
        &self,
        id: &str,
        state: &mut super::types::CredentialState,
    ) -> Result<(), PoolError> {
        debug!("Refreshing token for {}", id);

        let response = self
            .http
            .post(&self.refresh_url)
            .send()
            .await
            .map_err(|e| PoolError::TemporaryRefresh(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if matches!(status.as_u16(), 400 | 401 | 403) {
                warn!(
                    "[W-CRED-DISABLED] credential {} permanently disabled (refresh status {})",
                    id, status
                );
                state.disabled = true;
                return Err(PoolError::PermanentRefresh(status.as_u16()));
            }
            return Err(PoolError::TemporaryRefresh(format!(
                "status {}: {}",
                status, body
            )));
        }

        let body: RefreshTokenResponse = response
            .json()
            .await
            .map_err(|e| PoolError::TemporaryRefresh(e.to_string()))?;

        if let Some(token) = body.access_token {
            state.access_token = token;
        }
        if let Some(expires_in) = body.expires_in {
            state.expiry = Utc::now() + Duration::seconds(expires_in);
        }

        Ok(())
    }

    pub async fn stats(&self) -> Vec<CredentialSnapshot> {
        let credentials = self.credentials.read().await;
        let mut stats = Vec::with_capacity(credentials.len());
        for cred in credentials.iter() {
            stats.push(cred.snapshot().await);
        }
        stats
    }

    #[cfg(test)]
    pub(crate) async fn get(&self, id: &str) -> Option<Arc<Credential>> {
        self.credentials
            .read()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }
}
