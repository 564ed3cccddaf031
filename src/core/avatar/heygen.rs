use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::base::{AvatarControl, AvatarError};

/// Configuration for the avatar provider API.
#[derive(Debug, Clone)]
pub struct HeygenConfig {
    /// Provider API key.
    pub api_key: String,
    /// API base URL.
    pub base_url: String,
}

impl Default for HeygenConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.heygen.com/v1".to_string(),
        }
    }
}

/// Token response envelope.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    data: TokenData,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    token: String,
}

/// Avatar provider API client.
///
/// The streaming session itself (video, WebRTC) is opened and rendered by
/// the browser SDK; this client covers the server-side operations: token
/// minting and per-session control via [`HeygenSession`].
#[derive(Clone)]
pub struct HeygenAvatar {
    config: HeygenConfig,
    http: reqwest::Client,
}

impl HeygenAvatar {
    pub fn new(config: HeygenConfig) -> Result<Self, AvatarError> {
        if config.api_key.is_empty() {
            return Err(AvatarError::Configuration(
                "API key is required".to_string(),
            ));
        }
        Ok(Self {
            config,
            http: reqwest::Client::new(),
        })
    }

    fn endpoint(&self, operation: &str) -> String {
        format!("{}/{operation}", self.config.base_url.trim_end_matches('/'))
    }

    /// Mint a short-lived access token for the browser SDK.
    pub async fn create_token(&self) -> Result<String, AvatarError> {
        let response = self
            .http
            .post(self.endpoint("streaming.create_token"))
            .header("x-api-key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| AvatarError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AvatarError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AvatarError::RequestFailed(format!("Malformed token response: {e}")))?;
        debug!("minted avatar access token");
        Ok(token.data.token)
    }

    /// Bind a control handle to an already-open streaming session.
    pub fn session(&self, session_id: String) -> HeygenSession {
        HeygenSession {
            config: self.config.clone(),
            http: self.http.clone(),
            session_id,
        }
    }

    async fn post_operation(
        http: &reqwest::Client,
        config: &HeygenConfig,
        operation: &str,
        body: serde_json::Value,
    ) -> Result<(), AvatarError> {
        let url = format!("{}/{operation}", config.base_url.trim_end_matches('/'));
        let response = http
            .post(url)
            .header("x-api-key", &config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AvatarError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            warn!(status = %status, operation, "avatar operation rejected");
            return Err(AvatarError::Provider {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

/// Control handle for one avatar streaming session.
pub struct HeygenSession {
    config: HeygenConfig,
    http: reqwest::Client,
    session_id: String,
}

impl HeygenSession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[async_trait::async_trait]
impl AvatarControl for HeygenSession {
    async fn speak(&self, text: &str) -> Result<(), AvatarError> {
        debug!(chars = text.len(), "avatar speak task");
        HeygenAvatar::post_operation(
            &self.http,
            &self.config,
            "streaming.task",
            json!({
                "session_id": self.session_id,
                "text": text,
                "task_mode": "async",
                "task_type": "repeat",
            }),
        )
        .await
    }

    async fn interrupt(&self) -> Result<(), AvatarError> {
        debug!("avatar interrupt");
        HeygenAvatar::post_operation(
            &self.http,
            &self.config,
            "streaming.interrupt",
            json!({ "session_id": self.session_id }),
        )
        .await
    }

    async fn stop(&self) -> Result<(), AvatarError> {
        debug!("avatar session stop");
        HeygenAvatar::post_operation(
            &self.http,
            &self.config,
            "streaming.stop",
            json!({ "session_id": self.session_id }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_api_key() {
        let result = HeygenAvatar::new(HeygenConfig::default());
        assert!(matches!(result, Err(AvatarError::Configuration(_))));
    }

    #[test]
    fn endpoints_join_cleanly() {
        let client = HeygenAvatar::new(HeygenConfig {
            api_key: "k".to_string(),
            base_url: "https://api.heygen.com/v1/".to_string(),
        })
        .unwrap();
        assert_eq!(
            client.endpoint("streaming.create_token"),
            "https://api.heygen.com/v1/streaming.create_token"
        );
    }

    #[test]
    fn session_binds_id() {
        let client = HeygenAvatar::new(HeygenConfig {
            api_key: "k".to_string(),
            ..Default::default()
        })
        .unwrap();
        let session = client.session("sess-123".to_string());
        assert_eq!(session.session_id(), "sess-123");
    }

    #[test]
    fn token_response_parses() {
        let payload = r#"{ "data": { "token": "abc123" } }"#;
        let parsed: TokenResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed.data.token, "abc123");
    }
}
