#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use futures_util::StreamExt;
use chat_relay::config::{AppConfig, Environment, FeaturesConfig, ServerConfig, UpstreamConfig};
use chat_relay::routing::dispatch::dispatch_request;
use chat_relay::state::AppState;
use chat_relay::transport::HttpTransport;
use serde_json::Value;

pub const UPSTREAM_PATH: &str = "/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "mock-model";

/// What the mock upstream answers with.
#[derive(Clone)]
pub enum MockReply {
    /// A 200 SSE body delivered as these chunks.
    Chunks(Vec<&'static str>),
    /// These chunks, then a body error that aborts the connection.
    ChunksThenAbort(Vec<&'static str>),
    /// A 200 SSE body; each chunk is sent after waiting its delay in ms.
    Paced(Vec<(u64, &'static str)>),
    /// A 200 JSON body.
    Json(Value),
    /// A 200 JSON body sent after waiting this many ms.
    DelayedJson(u64, Value),
    /// A non-success status with a text body.
    Status(StatusCode, &'static str),
}

/// Request bodies the mock upstream has received.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<Value>>>);

impl Captured {
    pub fn bodies(&self) -> Vec<Value> {
        self.0.lock().expect("capture lock").clone()
    }
}

pub struct MockUpstream {
    pub endpoint: String,
    pub captured: Captured,
    server: tokio::task::JoinHandle<()>,
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.server.abort();
    }
}

pub async fn spawn_upstream(reply: MockReply) -> MockUpstream {
    let captured = Captured::default();
    let sink = captured.clone();
    let app = Router::new().route(
        UPSTREAM_PATH,
        post(move |body: axum::body::Bytes| {
            let reply = reply.clone();
            let sink = sink.clone();
            async move {
                let parsed: Value = serde_json::from_slice(&body).expect("upstream body is json");
                sink.0.lock().expect("capture lock").push(parsed);
                if let MockReply::DelayedJson(delay_ms, _) = &reply {
                    tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                }
                respond(reply)
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockUpstream {
        endpoint: format!("http://{addr}{UPSTREAM_PATH}"),
        captured,
        server,
    }
}

fn respond(reply: MockReply) -> Response {
    match reply {
        MockReply::Chunks(chunks) => {
            let items = chunks.into_iter().map(Ok::<_, Infallible>);
            sse_response(Body::from_stream(futures_util::stream::iter(items)))
        }
        MockReply::ChunksThenAbort(chunks) => {
            // Delay the failure so the status line and earlier chunks are flushed first.
            let reset = futures_util::stream::once(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Err::<&'static str, _>(std::io::Error::other("upstream reset"))
            });
            let items = futures_util::stream::iter(chunks.into_iter().map(Ok)).chain(reset);
            sse_response(Body::from_stream(items))
        }
        MockReply::Paced(chunks) => {
            let items = futures_util::stream::iter(chunks).then(|(delay_ms, chunk)| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok::<_, Infallible>(chunk)
            });
            sse_response(Body::from_stream(items))
        }
        MockReply::Json(value) | MockReply::DelayedJson(_, value) => {
            let mut response = Response::new(Body::from(value.to_string()));
            response.headers_mut().insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
            response
        }
        MockReply::Status(status, body) => {
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = status;
            response
        }
    }
}

fn sse_response(body: Body) -> Response {
    let mut response = Response::new(body);
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    response
}

pub fn config_for(endpoint: Option<&str>, environment: Environment) -> AppConfig {
    AppConfig {
        server: ServerConfig::default(),
        upstream: UpstreamConfig {
            api_key: Some("upstream-secret".to_string()),
            endpoint: endpoint.map(str::to_string),
            model_id: Some(DEFAULT_MODEL.to_string()),
            vision_model_id: None,
        },
        features: FeaturesConfig {
            environment,
            ..FeaturesConfig::default()
        },
    }
}

pub fn build_state(config: AppConfig) -> Arc<AppState> {
    let transport = HttpTransport::new(&config.server);
    Arc::new(AppState::new(config, transport))
}

pub async fn post_json(state: Arc<AppState>, path: &str, body: &Value) -> Response {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("serialize request")))
        .expect("build request");
    dispatch_request(state, Arc::<str>::from(""), request)
        .await
        .expect("dispatch")
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).expect("json body")
}
