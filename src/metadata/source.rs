use crate::config::MetadataConfig;
use crate::error::{GuardError, Result};
use crate::notice::TerminationNotice;
use reqwest::StatusCode;
use tracing::debug;

const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";
const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_TTL_SECS: &str = "21600";

/// Source of imminent-termination notices
#[async_trait::async_trait]
pub trait MetadataSource: Send + Sync {
    /// `Ok(None)` is the normal "nothing scheduled" answer
    async fn fetch_notice(&self) -> Result<Option<TerminationNotice>>;
}

/// Instance metadata service client
pub struct HttpMetadataSource {
    client: reqwest::Client,
    endpoint: String,
    token_endpoint: Option<String>,
}

impl HttpMetadataSource {
    pub fn new(config: &MetadataConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("spotguard/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GuardError::system(format!("failed to build metadata client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            token_endpoint: config.token_endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn session_token(&self, token_endpoint: &str) -> Result<String> {
        let response = self
            .client
            .put(token_endpoint)
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECS)
            .send()
            .await
            .map_err(|e| GuardError::metadata_unreachable(e.to_string()))?
            .error_for_status()
            .map_err(|e| GuardError::metadata_unreachable(e.to_string()))?;

        response
            .text()
            .await
            .map(|token| token.trim().to_string())
            .map_err(|e| GuardError::metadata_unreachable(e.to_string()))
    }
}

#[async_trait::async_trait]
impl MetadataSource for HttpMetadataSource {
    async fn fetch_notice(&self) -> Result<Option<TerminationNotice>> {
        let mut request = self.client.get(&self.endpoint);
        if let Some(token_endpoint) = &self.token_endpoint {
            let token = self.session_token(token_endpoint).await?;
            request = request.header(TOKEN_HEADER, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GuardError::metadata_unreachable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(|e| GuardError::metadata_unreachable(e.to_string()))?;
        debug!(%status, body = %body, "instance action response");

        TerminationNotice::from_json(&body).map(Some)
    }
}
