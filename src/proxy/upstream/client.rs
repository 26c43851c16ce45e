use reqwest::{Client, Response, StatusCode};
use tokio::time::Duration;

use crate::proxy::mappers::gemini::GeminiRequest;

/// One generate call may legitimately take minutes on long completions.
const REQUEST_TIMEOUT_SECS: u64 = 120;

pub struct UpstreamClient {
    base_url: String,
    http: Client,
}

/// A fully drained unary reply; the pipeline decides what the status means.
pub struct UnaryReply {
    pub status: StatusCode,
    pub body: String,
}

impl UpstreamClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            http: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to create upstream HTTP client"),
        }
    }

    pub async fn generate(
        &self,
        model: &str,
        bearer: &str,
        body: &GeminiRequest,
    ) -> Result<UnaryReply, reqwest::Error> {
        let url = format!("{}/v1/models/{}:generateContent", self.base_url, model);
        let response = self
            .http
            .post(&url)
            .bearer_auth(bearer)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        Ok(UnaryReply { status, body })
    }

    /// Opens the line-oriented streaming variant; the caller inspects the
    /// status and drains the byte stream itself.
    pub async fn stream_generate(
        &self,
        model: &str,
        bearer: &str,
        body: &GeminiRequest,
    ) -> Result<Response, reqwest::Error> {
        let url = format!("{}/v1/models/{}:streamGenerateContent", self.base_url, model);
        self.http
            .post(&url)
            .bearer_auth(bearer)
            .json(body)
            .send()
            .await
    }
}
