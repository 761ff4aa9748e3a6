//! 受信イベント処理のテスト（推論は ScriptedTransport、push 先はメモリ上の接続）

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use common::adapter::MemoryLog;
use common::error::Error;
use common::sink::{ConnectionTransport, DeliveryError};

use crate::adapter::builtin_registry;
use crate::adapter::stub_transport::{text_stream, tool_stream, Script, ScriptedTransport};
use crate::ports::outbound::ConnectionTransportFactory;
use crate::usecase::inbound::{InboundHandler, Route, WebSocketEvent, PROCESSED};
use crate::usecase::turn_orchestrator::TurnOrchestrator;

const MODEL: &str = "anthropic.claude-3-haiku-20240307-v1:0";

/// 受け取ったチャンクを記録する接続。`replies` が尽きたら成功を返す。
#[derive(Default)]
struct RecordingConnections {
    posts: Mutex<Vec<(String, String)>>,
    replies: Mutex<VecDeque<Result<(), DeliveryError>>>,
}

impl RecordingConnections {
    fn replying(replies: Vec<Result<(), DeliveryError>>) -> Self {
        Self {
            posts: Mutex::new(Vec::new()),
            replies: Mutex::new(replies.into()),
        }
    }

    fn posts(&self) -> Vec<(String, String)> {
        self.posts.lock().unwrap().clone()
    }
}

impl ConnectionTransport for RecordingConnections {
    fn post_to_connection(&self, connection_id: &str, data: &[u8]) -> Result<(), DeliveryError> {
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Ok(()));
        if reply.is_ok() {
            self.posts.lock().unwrap().push((
                connection_id.to_string(),
                String::from_utf8_lossy(data).into_owned(),
            ));
        }
        reply
    }
}

/// 要求されたコールバック URL を記録して、同じ接続を返すファクトリ
struct FixedFactory {
    connections: Arc<RecordingConnections>,
    endpoints: Mutex<Vec<String>>,
}

impl FixedFactory {
    fn new(connections: Arc<RecordingConnections>) -> Self {
        Self {
            connections,
            endpoints: Mutex::new(Vec::new()),
        }
    }
}

impl ConnectionTransportFactory for FixedFactory {
    fn for_endpoint(&self, endpoint: &str) -> Result<Arc<dyn ConnectionTransport>, Error> {
        self.endpoints.lock().unwrap().push(endpoint.to_string());
        Ok(Arc::clone(&self.connections) as Arc<dyn ConnectionTransport>)
    }
}

struct Fixture {
    handler: InboundHandler,
    transport: Arc<ScriptedTransport>,
    connections: Arc<RecordingConnections>,
    factory: Arc<FixedFactory>,
    log: Arc<MemoryLog>,
}

fn fixture(scripts: Vec<Script>, connections: RecordingConnections) -> Fixture {
    let transport = Arc::new(ScriptedTransport::new(scripts));
    let log = Arc::new(MemoryLog::new());
    let orchestrator = TurnOrchestrator::new(
        transport.clone(),
        Arc::new(builtin_registry()),
        MODEL,
    )
    .with_log(log.clone());
    let connections = Arc::new(connections);
    let factory = Arc::new(FixedFactory::new(Arc::clone(&connections)));
    let handler = InboundHandler::new(Arc::new(orchestrator), factory.clone(), log.clone());
    Fixture {
        handler,
        transport,
        connections,
        factory,
        log,
    }
}

fn event(route_key: &str, body: Option<&str>) -> String {
    let mut ev = serde_json::json!({
        "requestContext": {
            "connectionId": "Gx3vPcmXtjMCFdw=",
            "domainName": "abc123.execute-api.ap-northeast-1.amazonaws.com",
            "stage": "production",
            "routeKey": route_key,
            "eventType": "MESSAGE"
        },
        "isBase64Encoded": false
    });
    if let Some(b) = body {
        ev["body"] = serde_json::Value::String(b.to_string());
    }
    ev.to_string()
}

#[test]
fn test_route_parsing() {
    let ev = WebSocketEvent::parse(&event("$default", Some("Hello"))).unwrap();
    assert_eq!(
        ev.route(),
        Route::Message {
            connection_id: "Gx3vPcmXtjMCFdw=".to_string(),
            endpoint: "https://abc123.execute-api.ap-northeast-1.amazonaws.com/production"
                .to_string(),
            body: "Hello".to_string(),
        }
    );
    let connect = WebSocketEvent::parse(&event("$connect", None)).unwrap();
    assert_eq!(connect.route(), Route::Connect);
    let disconnect = WebSocketEvent::parse(&event("$disconnect", None)).unwrap();
    assert_eq!(disconnect.route(), Route::Disconnect);
    let empty = WebSocketEvent::parse(&event("$default", Some(""))).unwrap();
    assert_eq!(empty.route(), Route::Empty);
}

#[test]
fn test_connect_and_disconnect_do_not_call_model() {
    let f = fixture(vec![], RecordingConnections::default());
    for key in ["$connect", "$disconnect"] {
        let resp = f.handler.handle_json(&event(key, None));
        assert_eq!(resp.status_code, 200);
        assert_eq!(resp.body, PROCESSED);
    }
    assert!(f.transport.requests().is_empty());
    assert!(f.connections.posts().is_empty());
}

#[test]
fn test_response_serializes_like_lambda_result() {
    let f = fixture(vec![], RecordingConnections::default());
    let resp = f.handler.handle_json(&event("$connect", None));
    assert_eq!(
        serde_json::to_value(&resp).unwrap(),
        serde_json::json!({"statusCode": 200, "body": "Request processed."})
    );
}

#[test]
fn test_message_is_streamed_to_the_connection() {
    let f = fixture(
        vec![
            tool_stream(
                "Checking. ",
                "tooluse_1",
                "get_weather",
                &["{\"latitude\":34.6,\"longitude\":135.5,", "\"timezone\":\"Asia/Tokyo\"}"],
            ),
            text_stream(&["Rainy", " in Osaka."]),
        ],
        RecordingConnections::default(),
    );

    let resp = f
        .handler
        .handle_json(&event("$default", Some("What's the weather in Osaka?")));

    assert!(resp.is_success());
    assert_eq!(resp.body, PROCESSED);
    let posts = f.connections.posts();
    let chunks: Vec<&str> = posts.iter().map(|(_, c)| c.as_str()).collect();
    assert_eq!(chunks, vec!["Checking. ", "Rainy", " in Osaka."]);
    assert!(posts.iter().all(|(id, _)| id == "Gx3vPcmXtjMCFdw="));
    assert_eq!(
        f.factory.endpoints.lock().unwrap().as_slice(),
        &["https://abc123.execute-api.ap-northeast-1.amazonaws.com/production".to_string()]
    );
    assert_eq!(f.transport.requests().len(), 2);
}

#[test]
fn test_each_message_starts_a_new_conversation() {
    let f = fixture(
        vec![text_stream(&["one"]), text_stream(&["two"])],
        RecordingConnections::default(),
    );
    f.handler.handle_json(&event("$default", Some("first")));
    f.handler.handle_json(&event("$default", Some("second")));

    let requests = f.transport.requests();
    assert_eq!(requests[1].body["messages"].as_array().unwrap().len(), 1);
    assert_eq!(requests[1].body["messages"][0]["content"][0]["text"], "second");
}

#[test]
fn test_gone_connection_still_completes_the_turn() {
    let f = fixture(
        vec![text_stream(&["a", "b", "c"])],
        RecordingConnections::replying(vec![Ok(()), Err(DeliveryError::RecipientGone)]),
    );

    let resp = f.handler.handle_json(&event("$default", Some("Hi")));

    assert_eq!(resp.status_code, 200);
    // 切断後のチャンクは送らない
    assert_eq!(f.connections.posts().len(), 1);
    assert_eq!(f.log.count_kind("delivery"), 1);
}

#[test]
fn test_delivery_failure_is_500() {
    let f = fixture(
        vec![text_stream(&["a"])],
        RecordingConnections::replying(vec![Err(DeliveryError::Failed(
            "HTTP 403: Forbidden".to_string(),
        ))]),
    );
    let resp = f.handler.handle_json(&event("$default", Some("Hi")));
    assert_eq!(resp.status_code, 500);
    assert_eq!(resp.body, "transport");
    assert!(!resp.is_success());
}

#[test]
fn test_model_failure_is_500() {
    let f = fixture(
        vec![Script::Fail(Error::transport("HTTP 429: Too many requests"))],
        RecordingConnections::default(),
    );
    let resp = f.handler.handle_json(&event("$default", Some("Hi")));
    assert_eq!(resp.status_code, 500);
    assert_eq!(resp.body, "transport");
    assert_eq!(f.log.count_kind("error"), 1);
}

#[test]
fn test_malformed_event_is_400() {
    let f = fixture(vec![], RecordingConnections::default());
    let resp = f.handler.handle_json("{\"body\": \"hi\"}");
    assert_eq!(resp.status_code, 400);
    assert_eq!(resp.body, "invalid_argument");
    let resp = f.handler.handle_json("not json");
    assert_eq!(resp.status_code, 400);
}
