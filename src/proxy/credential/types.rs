use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A process-resident bearer-token holder. The identifier is immutable;
/// everything else lives behind the per-credential lock so operations on
/// distinct credentials never contend.
#[derive(Debug)]
pub struct Credential {
    pub id: String,
    pub(crate) state: Mutex<CredentialState>,
}

#[derive(Debug)]
pub(crate) struct CredentialState {
    pub access_token: String,
    pub refresh_token: String,
    pub expiry: DateTime<Utc>,
    pub disabled: bool,
    pub model_cooldowns: HashMap<String, DateTime<Utc>>,
    pub call_count: u64,
    pub error_count: u64,
}

impl Credential {
    pub(crate) fn new(
        id: String,
        access_token: String,
        refresh_token: String,
        expiry: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            state: Mutex::new(CredentialState {
                access_token,
                refresh_token,
                expiry,
                disabled: false,
                model_cooldowns: HashMap::new(),
                call_count: 0,
                error_count: 0,
            }),
        }
    }

    pub async fn is_disabled(&self) -> bool {
        self.state.lock().await.disabled
    }

    pub async fn snapshot(&self) -> CredentialSnapshot {
        let state = self.state.lock().await;
        CredentialSnapshot {
            id: self.id.clone(),
            disabled: state.disabled,
            call_count: state.call_count,
            error_count: state.error_count,
            expiry: state.expiry.to_rfc3339(),
            cooldowns: state.model_cooldowns.len(),
        }
    }
}

/// A credential handed out by `acquire`, with the bearer captured while the
/// credential lock was still held.
#[derive(Debug, Clone)]
pub struct Lease {
    pub credential: Arc<Credential>,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialSnapshot {
    pub id: String,
    pub disabled: bool,
    pub call_count: u64,
    pub error_count: u64,
    pub expiry: String,
    pub cooldowns: usize,
}
