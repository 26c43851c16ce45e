use regex::Regex;
use std::sync::LazyLock;
use tokio::time::{sleep, Duration};
use tracing::debug;

static COOLDOWN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:try again in|retry after|wait)\s+(\d+)\s*(?:seconds?|s)")
        .expect("Invalid cooldown regex")
});

/// Rate/overload statuses worth retrying with a cooled-down credential.
pub fn is_retryable(status: u16) -> bool {
    matches!(status, 429 | 503)
}

/// Client rejections that disable the credential and end the request.
pub fn is_terminal(status: u16) -> bool {
    matches!(status, 400 | 403)
}

/// Pulls a requested wait out of an upstream error body, e.g.
/// "try again in 7 seconds". Zero when the body names no delay.
pub fn parse_cooldown_seconds(body: &str) -> u64 {
    COOLDOWN_REGEX
        .captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

pub fn backoff_delay(attempt: usize) -> Duration {
    Duration::from_millis(100 * (1 << attempt.min(16)))
}

pub async fn backoff(attempt: usize, trace_id: &str) {
    let delay = backoff_delay(attempt);
    debug!(
        "[{}] Backing off {}ms before attempt {}",
        trace_id,
        delay.as_millis(),
        attempt + 2
    );
    sleep(delay).await;
}
