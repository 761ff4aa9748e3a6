//! WebSocket 受信イベントの振り分け（$connect / $disconnect / メッセージ）
//!
//! メッセージ 1 件につき新しい ConversationState で 1 ターン実行し、
//! 出力はイベントの接続 id 宛てに ConnectionPushSink で push する。

use common::conversation::ConversationState;
use common::error::Error;
use common::ports::outbound::{Log, LogLevel, LogRecord};
use common::sink::ConnectionPushSink;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ports::outbound::ConnectionTransportFactory;
use crate::usecase::turn_orchestrator::TurnOrchestrator;

pub const PROCESSED: &str = "Request processed.";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub connection_id: String,
    pub domain_name: String,
    pub stage: String,
    pub route_key: String,
}

/// API Gateway WebSocket のイベント
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketEvent {
    pub request_context: RequestContext,
    #[serde(default)]
    pub body: Option<String>,
}

/// イベントの行き先
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Connect,
    Disconnect,
    /// 本文が空のメッセージは何もしない
    Empty,
    Message {
        connection_id: String,
        /// コールバック URL（https://{domainName}/{stage}）
        endpoint: String,
        body: String,
    },
}

impl WebSocketEvent {
    pub fn parse(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json)
            .map_err(|e| Error::invalid_argument(format!("invalid WebSocket event: {}", e)))
    }

    pub fn callback_endpoint(&self) -> String {
        format!(
            "https://{}/{}",
            self.request_context.domain_name, self.request_context.stage
        )
    }

    pub fn route(&self) -> Route {
        match self.request_context.route_key.as_str() {
            "$connect" => Route::Connect,
            "$disconnect" => Route::Disconnect,
            _ => match self.body.as_deref().filter(|b| !b.is_empty()) {
                Some(body) => Route::Message {
                    connection_id: self.request_context.connection_id.clone(),
                    endpoint: self.callback_endpoint(),
                    body: body.to_string(),
                },
                None => Route::Empty,
            },
        }
    }
}

/// ハンドラの応答（`{"statusCode": 200, "body": "Request processed."}`）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    pub status_code: u16,
    pub body: String,
}

impl HandlerResponse {
    fn processed() -> Self {
        Self {
            status_code: 200,
            body: PROCESSED.to_string(),
        }
    }

    fn failed(status_code: u16, e: &Error) -> Self {
        Self {
            status_code,
            body: e.kind().to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

pub struct InboundHandler {
    orchestrator: Arc<TurnOrchestrator>,
    connections: Arc<dyn ConnectionTransportFactory>,
    log: Arc<dyn Log>,
}

impl InboundHandler {
    pub fn new(
        orchestrator: Arc<TurnOrchestrator>,
        connections: Arc<dyn ConnectionTransportFactory>,
        log: Arc<dyn Log>,
    ) -> Self {
        Self {
            orchestrator,
            connections,
            log,
        }
    }

    fn emit(&self, record: LogRecord) {
        let _ = self.log.log(&record.layer("usecase"));
    }

    /// 生の JSON を受けて処理する。壊れたイベントは 400。
    pub fn handle_json(&self, raw: &str) -> HandlerResponse {
        match WebSocketEvent::parse(raw) {
            Ok(event) => self.handle(&event),
            Err(e) => {
                self.emit(
                    LogRecord::new(LogLevel::Error, e.to_string())
                        .kind("error")
                        .field("error_kind", e.kind()),
                );
                HandlerResponse::failed(400, &e)
            }
        }
    }

    pub fn handle(&self, event: &WebSocketEvent) -> HandlerResponse {
        let ctx = &event.request_context;
        self.emit(
            LogRecord::new(LogLevel::Info, "event received")
                .kind("lifecycle")
                .field("route_key", ctx.route_key.as_str())
                .field("connection_id", ctx.connection_id.as_str()),
        );
        match event.route() {
            Route::Connect | Route::Disconnect | Route::Empty => HandlerResponse::processed(),
            Route::Message {
                connection_id,
                endpoint,
                body,
            } => match self.run_message(&connection_id, &endpoint, &body) {
                Ok(()) => HandlerResponse::processed(),
                Err(e) => {
                    self.emit(
                        LogRecord::new(LogLevel::Error, e.to_string())
                            .kind("error")
                            .field("error_kind", e.kind())
                            .field("connection_id", connection_id.as_str()),
                    );
                    HandlerResponse::failed(500, &e)
                }
            },
        }
    }

    fn run_message(&self, connection_id: &str, endpoint: &str, body: &str) -> Result<(), Error> {
        let transport = self.connections.for_endpoint(endpoint)?;
        let mut sink = ConnectionPushSink::new(transport, connection_id, Arc::clone(&self.log));
        let mut state = ConversationState::new();
        let outcome = self.orchestrator.run(&mut state, body, &mut sink)?;
        self.emit(
            LogRecord::new(LogLevel::Info, "message processed")
                .kind("turn")
                .field("connection_id", connection_id)
                .field("tool_rounds", outcome.tool_rounds)
                .field("delivered", sink.delivered())
                .field("dropped", sink.dropped()),
        );
        Ok(())
    }
}
