//! HTTP 推論トランスポート（Bedrock Runtime Converse / ConverseStream 互換）
//!
//! `POST {endpoint}/model/{modelId}/converse` と `/converse-stream` を呼ぶ。
//! api_key_env が指す環境変数があれば Bearer で付ける。

use crate::error::Error;
use crate::llm::request::{ConverseOutput, ConverseRequest};
use crate::llm::transport::{EventStream, InferenceTransport};
use crate::llm::wire::{EventStreamReader, JsonLinesReader};
use reqwest::blocking::{Client, Response};
use reqwest::Url;
use serde_json::Value;
use std::env;
use std::io::BufReader;
use std::time::Duration;

const EVENTSTREAM_CONTENT_TYPE: &str = "application/vnd.amazon.eventstream";

/// HTTP 推論トランスポート
pub struct HttpConverseTransport {
    client: Client,
    endpoint: String,
    api_key_env: Option<String>,
}

impl HttpConverseTransport {
    /// * `endpoint` - ベース URL（例: https://bedrock-runtime.us-east-1.amazonaws.com）
    /// * `api_key_env` - Bearer キーを読む環境変数名（None のとき Authorization を付けない）
    /// * `timeout` - リクエスト全体のタイムアウト（None のとき無制限）
    pub fn new(
        endpoint: impl Into<String>,
        api_key_env: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, Error> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Url::parse(&endpoint)
            .map_err(|e| Error::config(format!("invalid endpoint {}: {}", endpoint, e)))?;
        let client = Client::builder()
            .timeout(timeout)
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

    fn url(&self, model_id: &str, operation: &str) -> Result<Url, Error> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| Error::config(format!("invalid endpoint {}: {}", self.endpoint, e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::config(format!("endpoint cannot be a base: {}", self.endpoint)))?
            .pop_if_empty()
            .extend(["model", model_id, operation]);
        Ok(url)
    }

    fn auth_header(&self) -> Option<String> {
        self.api_key_env.as_ref().and_then(|name| {
            env::var(name)
                .ok()
                .filter(|k| !k.is_empty())
                .map(|key| format!("Bearer {}", key))
        })
    }

    fn post(&self, request: &ConverseRequest<'_>, operation: &str) -> Result<Response, Error> {
        let url = self.url(request.model_id, operation)?;
        let mut builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(request.to_json()?);
        if let Some(auth) = self.auth_header() {
            builder = builder.header("Authorization", auth);
        }
        let response = builder
            .send()
            .map_err(|e| Error::transport(format!("HTTP request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(Error::transport(format!(
                "{} error: {}",
                operation,
                error_message(status.as_u16(), &text)
            )));
        }
        Ok(response)
    }
}

/// エラー応答本文からメッセージを取り出す（`{"message": ...}` / `{"error": {"message": ...}}`）
pub(crate) fn error_message(status: u16, body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v["message"]
            .as_str()
            .or_else(|| v["Message"].as_str())
            .or_else(|| v["error"]["message"].as_str())
            .map(|s| s.to_string())
    });
    match from_json {
        Some(msg) => format!("HTTP {}: {}", status, msg),
        None => format!("HTTP {}: {}", status, body.trim()),
    }
}

impl InferenceTransport for HttpConverseTransport {
    fn name(&self) -> &str {
        "http"
    }

    fn converse(&self, request: &ConverseRequest<'_>) -> Result<ConverseOutput, Error> {
        let response = self.post(request, "converse")?;
        let text = response
            .text()
            .map_err(|e| Error::transport(format!("Failed to read response: {}", e)))?;
        ConverseOutput::parse(&text)
    }

    fn converse_stream(&self, request: &ConverseRequest<'_>) -> Result<EventStream, Error> {
        let response = self.post(request, "converse-stream")?;
        let is_eventstream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with(EVENTSTREAM_CONTENT_TYPE))
            .unwrap_or(false);
        if is_eventstream {
            Ok(Box::new(EventStreamReader::new(response)))
        } else {
            Ok(Box::new(JsonLinesReader::new(BufReader::new(response))))
        }
    }
}
