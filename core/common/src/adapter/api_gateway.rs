//! API Gateway WebSocket の @connections へ POST する ConnectionTransport 実装
//!
//! 認証は Bearer ヘッダのみで、SigV4 署名はしない。API Gateway の管理 API へ直接送ると
//! 403 になるので、Bearer キーを受け付ける中継（プロキシ等）の URL を endpoint に使うこと。
//! 403 は `DeliveryError::Failed` になり、そのターンは転送エラーで終わる。

use crate::error::Error;
use crate::llm::http::error_message;
use crate::sink::{ConnectionTransport, DeliveryError};
use reqwest::blocking::Client;
use reqwest::Url;
use std::env;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// `POST {callback_endpoint}/@connections/{connection_id}` で接続先へ push する
///
/// Bearer キーを受け付ける endpoint 専用（SigV4 署名は付けない）。
pub struct ApiGatewayConnections {
    client: Client,
    endpoint: String,
    api_key_env: Option<String>,
}

impl ApiGatewayConnections {
    /// * `endpoint` - コールバック URL（例: https://abc123.execute-api.us-east-1.amazonaws.com/prod）
    /// * `api_key_env` - Bearer キーを読む環境変数名（None のとき Authorization を付けない）
    pub fn new(endpoint: impl Into<String>, api_key_env: Option<String>) -> Result<Self, Error> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Url::parse(&endpoint)
            .map_err(|e| Error::config(format!("invalid callback endpoint {}: {}", endpoint, e)))?;
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            api_key_env,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, connection_id: &str) -> Result<Url, DeliveryError> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| DeliveryError::Failed(format!("invalid endpoint: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| DeliveryError::Failed("endpoint cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["@connections", connection_id]);
        Ok(url)
    }
}

/// HTTP ステータスを配信結果に分類する（410 Gone は相手不在）
pub fn classify_status(status: u16, body: &str) -> Result<(), DeliveryError> {
    match status {
        200..=299 => Ok(()),
        410 => Err(DeliveryError::RecipientGone),
        _ => Err(DeliveryError::Failed(error_message(status, body))),
    }
}

impl ConnectionTransport for ApiGatewayConnections {
    fn post_to_connection(&self, connection_id: &str, payload: &[u8]) -> Result<(), DeliveryError> {
        let url = self.url(connection_id)?;
        let mut builder = self.client.post(url).body(payload.to_vec());
        if let Some(key) = self
            .api_key_env
            .as_ref()
            .and_then(|name| env::var(name).ok())
            .filter(|k| !k.is_empty())
        {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }
        let response = builder
            .send()
            .map_err(|e| DeliveryError::Failed(format!("HTTP request failed: {}", e)))?;
        let status = response.status().as_u16();
        if (200..300).contains(&status) {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        classify_status(status, &body)
    }
}
