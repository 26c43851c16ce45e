use tracing::{info, warn};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_UPSTREAM_URL: &str = "http://localhost:8081";
pub const DEFAULT_CREDENTIAL_COUNT: usize = 20;

/// Process configuration. Nothing here is persisted; every value comes from
/// the environment with a built-in default.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub upstream_url: String,
    pub credential_count: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            credential_count: DEFAULT_CREDENTIAL_COUNT,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("PORT") {
            let trimmed = port.trim();
            if !trimmed.is_empty() {
                match trimmed.parse::<u16>() {
                    Ok(p) if p > 0 => {
                        config.port = p;
                        info!("Using port from environment: {}", p);
                    }
                    _ => warn!("[W-PORT-INVALID] ignoring_invalid_port_value: {}", port),
                }
            }
        }

        if let Ok(url) = std::env::var("UPSTREAM_URL") {
            let trimmed = url.trim().trim_end_matches('/');
            if !trimmed.is_empty() {
                config.upstream_url = trimmed.to_string();
                info!("Using upstream URL from environment: {}", config.upstream_url);
            }
        }

        if let Ok(count) = std::env::var("CRED_COUNT") {
            let trimmed = count.trim();
            if !trimmed.is_empty() {
                match trimmed.parse::<usize>() {
                    Ok(n) if n > 0 => {
                        config.credential_count = n;
                        info!("Using credential count from environment: {}", n);
                    }
                    _ => warn!(
                        "[W-CRED-COUNT-INVALID] ignoring_invalid_credential_count: {}",
                        count
                    ),
                }
            }
        }

        config
    }

    /// Token refresh endpoint lives next to the generate endpoints upstream.
    pub fn refresh_url(&self) -> String {
        format!("{}/oauth2/token", self.upstream_url)
    }
}
