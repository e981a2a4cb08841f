use std::convert::Infallible;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use kchat::{ChatEvent, ChatRequest, ChatResponse};
use kcommon::{MetadataMap, SessionId};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{ApiError, AppState};

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatBody {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
    /// Optional user context (semester, state, ...) adapted into the prompt.
    #[serde(default)]
    pub context: MetadataMap,
}

impl From<ChatBody> for ChatRequest {
    fn from(body: ChatBody) -> Self {
        let session_id = body
            .session_id
            .filter(|id| !id.trim().is_empty())
            .map(SessionId::from);

        ChatRequest {
            session_id,
            message: body.message,
            context: body.context,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub session_id: String,
    pub response: String,
    pub agent_used: String,
    pub crisis_detected: bool,
    pub crisis_resources: Option<ResourceMap>,
}

/// Crisis resources as a JSON object whose keys keep the banner's order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMap(pub Vec<(String, String)>);

impl ResourceMap {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(key, _)| key.as_str())
    }
}

impl Serialize for ResourceMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ResourceMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ResourceMapVisitor;

        impl<'de> Visitor<'de> for ResourceMapVisitor {
            type Value = ResourceMap;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of crisis resources")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or_default());
                while let Some(entry) = access.next_entry::<String, String>()? {
                    entries.push(entry);
                }
                Ok(ResourceMap(entries))
            }
        }

        deserializer.deserialize_map(ResourceMapVisitor)
    }
}

impl From<ChatResponse> for ChatReply {
    fn from(response: ChatResponse) -> Self {
        Self {
            session_id: response.session_id.as_str().to_string(),
            response: response.response,
            agent_used: response.specialist.as_str().to_string(),
            crisis_detected: response.crisis_detected,
            crisis_resources: response.crisis_resources.map(|resources| {
                ResourceMap(
                    resources
                        .iter()
                        .map(|resource| (resource.key.clone(), resource.value.clone()))
                        .collect(),
                )
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReply {
    pub status: String,
    pub agents: Vec<String>,
}

#[derive(Serialize)]
struct StartedData<'a> {
    session_id: &'a str,
    agent_used: &'a str,
}

#[derive(Serialize)]
struct TextData<'a> {
    text: &'a str,
}

pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatReply>, ApiError> {
    let response = state.chat.run_turn(body.into()).await?;
    Ok(Json(response.into()))
}

/// Events: `start`, `delta`, `replace` (full text so far), `done` (a [`ChatReply`]), `error`.
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Sse<EventStream>, ApiError> {
    let mut events = state.chat.stream_turn(body.into()).await?;

    let stream: EventStream = Box::pin(async_stream::stream! {
        while let Some(event) = events.next().await {
            let sse = match event {
                Ok(ChatEvent::Started { session_id, specialist }) => json_event(
                    "start",
                    &StartedData {
                        session_id: session_id.as_str(),
                        agent_used: specialist.as_str(),
                    },
                ),
                Ok(ChatEvent::TextDelta(text)) => json_event("delta", &TextData { text: &text }),
                Ok(ChatEvent::Replacement(text)) => json_event("replace", &TextData { text: &text }),
                Ok(ChatEvent::TurnComplete(response)) => {
                    json_event("done", &ChatReply::from(response))
                }
                Err(error) => {
                    let error = ApiError(error);
                    tracing::error!(
                        phase = "http",
                        event = "stream_failed",
                        error_kind = error.0.kind.as_str(),
                        error = %error.0
                    );
                    Event::default().event("error").data(error.public_message())
                }
            };
            yield Ok(sse);
        }
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}

pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<StatusReply>, ApiError> {
    state.chat.end_session(&SessionId::from(session_id)).await?;
    Ok(Json(StatusReply {
        status: "deleted".to_string(),
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReply> {
    Json(HealthReply {
        status: "ok".to_string(),
        agents: state
            .chat
            .specialists()
            .into_iter()
            .map(|id| id.as_str().to_string())
            .collect(),
    })
}

fn json_event<T: Serialize>(name: &str, data: &T) -> Event {
    Event::default()
        .event(name)
        .json_data(data)
        .unwrap_or_else(|_| Event::default().event(name).data("{}"))
}
