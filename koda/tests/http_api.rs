use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use koda::config::AppConfig;
use koda::server::{ChatReply, HealthReply, StatusReply};
use kprovider::{
    BoxedEventStream, GatewayError, InferenceRequest, InferenceResponse, ModelProvider,
    ProviderFuture, StreamEvent, VecEventStream,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tower::ServiceExt;

const ORIGIN: &str = "http://localhost:8501";

/// Answers the crisis scan, the router, and the specialists independently.
#[derive(Debug)]
struct ApiProvider {
    crisis_verdict: Result<String, GatewayError>,
    route: String,
    answer: String,
    calls: Mutex<usize>,
}

impl ApiProvider {
    fn new(crisis_verdict: &str, route: &str, answer: &str) -> Arc<Self> {
        Arc::new(Self {
            crisis_verdict: Ok(crisis_verdict.to_string()),
            route: route.to_string(),
            answer: answer.to_string(),
            calls: Mutex::new(0),
        })
    }

    fn failing_scan(error: GatewayError) -> Arc<Self> {
        Arc::new(Self {
            crisis_verdict: Err(error),
            route: "AGENT: COMPASS".to_string(),
            answer: "Let us look at this together.".to_string(),
            calls: Mutex::new(0),
        })
    }

    fn reply_for(&self, request: &InferenceRequest) -> Result<String, GatewayError> {
        *self.calls.lock().expect("calls lock") += 1;
        let prompt = request.persona_prompt.as_deref().unwrap_or_default();

        if prompt.contains("CRISIS: YES or NO") {
            self.crisis_verdict.clone()
        } else if prompt.contains("AGENT: <NAME>") {
            Ok(self.route.clone())
        } else {
            Ok(self.answer.clone())
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().expect("calls lock")
    }
}

impl ModelProvider for ApiProvider {
    fn name(&self) -> &'static str {
        "api-test"
    }

    fn complete<'a>(
        &'a self,
        request: InferenceRequest,
    ) -> ProviderFuture<'a, Result<InferenceResponse, GatewayError>> {
        Box::pin(async move {
            let text = self.reply_for(&request)?;
            Ok(InferenceResponse::from_text("api-test", text))
        })
    }

    fn stream<'a>(
        &'a self,
        request: InferenceRequest,
    ) -> ProviderFuture<'a, Result<BoxedEventStream<'a>, GatewayError>> {
        Box::pin(async move {
            let text = self.reply_for(&request)?;
            let mut events: Vec<Result<StreamEvent, GatewayError>> = text
                .split_inclusive(' ')
                .map(|piece| Ok(StreamEvent::TextDelta(piece.to_string())))
                .collect();
            events.push(Ok(StreamEvent::ResponseComplete(InferenceResponse::from_text(
                "api-test", text,
            ))));
            Ok(Box::pin(VecEventStream::new(events)) as BoxedEventStream<'a>)
        })
    }
}

fn app(provider: Arc<ApiProvider>) -> Router {
    let config = AppConfig::from_toml_str("[retry]\ninitial_backoff_ms = 1\nmax_backoff_ms = 2")
        .expect("config");
    let runtime = koda::build_runtime_with(provider, &config).expect("runtime");
    koda::router(runtime.chat, &config.server.cors_allowed_origins).expect("router")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

async fn body_json<T: DeserializeOwned>(response: axum::response::Response) -> T {
    serde_json::from_str(&body_text(response).await).expect("json body")
}

fn event_names(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("event:"))
        .map(|name| name.trim().to_string())
        .collect()
}

#[tokio::test]
async fn health_lists_agents_in_declaration_order() {
    let response = app(ApiProvider::new("CRISIS: NO", "AGENT: COMPASS", "hi"))
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let health: HealthReply = body_json(response).await;
    assert_eq!(health.status, "ok");
    assert_eq!(
        health.agents,
        vec!["FINANCING", "STUDY_CHOICE", "ACADEMIC_BASICS", "ROLE_MODELS", "COMPASS"]
    );
}

#[tokio::test]
async fn chat_returns_the_routed_answer_and_session_id() {
    let response = app(ApiProvider::new(
        "CRISIS: NO\nTYPE: NONE",
        "AGENT: FINANCING",
        "You can apply for BAföG at your Studierendenwerk.",
    ))
    .oneshot(post_json("/api/chat", json!({ "message": "How do I apply for BAföG?" })))
    .await
    .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let reply: ChatReply = body_json(response).await;
    assert!(!reply.session_id.is_empty());
    assert_eq!(reply.agent_used, "FINANCING");
    assert!(!reply.crisis_detected);
    assert_eq!(reply.crisis_resources, None);
    assert!(reply.response.contains("Studierendenwerk"));
}

#[tokio::test]
async fn crisis_reply_carries_banner_and_resources() {
    let response = app(ApiProvider::new(
        "CRISIS: YES\nTYPE: MENTAL",
        "AGENT: COMPASS",
        "I am here with you.",
    ))
    .oneshot(post_json(
        "/api/chat",
        json!({ "message": "I can't do this anymore, I just want to disappear" }),
    ))
    .await
    .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let reply: ChatReply = body_json(response).await;
    assert!(reply.crisis_detected);
    assert!(reply.response.starts_with("⚠️"));
    assert!(reply.response.ends_with("I am here with you."));

    let resources = reply.crisis_resources.expect("resources");
    assert_eq!(resources.len(), 5);
    assert_eq!(resources.keys().next(), Some("emergency"));
    assert!(resources.get("crisis_hotline").is_some());
}

#[tokio::test]
async fn follow_up_turns_keep_the_session_id() {
    let app = app(ApiProvider::new("CRISIS: NO", "AGENT: STUDY_CHOICE", "Consider both."));

    let first: ChatReply = body_json(
        app.clone()
            .oneshot(post_json("/api/chat", json!({ "message": "Medicine or law?" })))
            .await
            .expect("first response"),
    )
    .await;
    let second: ChatReply = body_json(
        app.oneshot(post_json(
            "/api/chat",
            json!({ "session_id": &first.session_id, "message": "And what about NC?" }),
        ))
        .await
        .expect("second response"),
    )
    .await;

    assert_eq!(second.session_id, first.session_id);
    assert_eq!(second.agent_used, "STUDY_CHOICE");
}

#[tokio::test]
async fn empty_message_is_a_bad_request() {
    let provider = ApiProvider::new("CRISIS: NO", "AGENT: COMPASS", "hi");
    let response = app(provider.clone())
        .oneshot(post_json("/api/chat", json!({ "message": "   " })))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = body_json(response).await;
    assert_eq!(body["error"], "message must not be empty");
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn failed_crisis_scan_is_unavailable_without_internal_detail() {
    let response = app(ApiProvider::failing_scan(GatewayError::permission_denied(
        "model access not granted for account 1234",
    )))
    .oneshot(post_json("/api/chat", json!({ "message": "Hello" })))
    .await
    .expect("response");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_text(response).await;
    assert!(!body.contains("1234"));
    assert!(!body.contains("permission_denied"));
}

#[tokio::test]
async fn delete_session_is_idempotent() {
    let app = app(ApiProvider::new("CRISIS: NO", "AGENT: COMPASS", "hi"));

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/api/session/never-created")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let status: StatusReply = body_json(response).await;
        assert_eq!(status.status, "deleted");
    }
}

#[tokio::test]
async fn stream_emits_start_deltas_and_done() {
    let response = app(ApiProvider::new(
        "CRISIS: NO",
        "AGENT: COMPASS",
        "Every path into university is valid.",
    ))
    .oneshot(post_json("/api/chat/stream", json!({ "message": "Do I belong here?" })))
    .await
    .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"))
    );

    let body = body_text(response).await;
    let names = event_names(&body);
    assert!(names.len() > 2, "{names:?}");
    assert_eq!(names.first().map(String::as_str), Some("start"));
    assert_eq!(names.last().map(String::as_str), Some("done"));
    assert!(names[1..names.len() - 1].iter().all(|name| name == "delta"));
    assert!(body.contains("\"agent_used\":\"COMPASS\""));
    assert!(body.contains("Every path into university is valid."));
}

#[tokio::test]
async fn cors_allows_configured_origin_only() {
    let app = app(ApiProvider::new("CRISIS: NO", "AGENT: COMPASS", "hi"));
    let preflight = |origin: &str| {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/chat")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .expect("request")
    };

    let allowed = app.clone().oneshot(preflight(ORIGIN)).await.expect("response");
    assert_eq!(
        allowed
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|value| value.to_str().ok()),
        Some(ORIGIN)
    );

    let denied = app
        .oneshot(preflight("https://attacker.example"))
        .await
        .expect("response");
    assert!(denied.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}
