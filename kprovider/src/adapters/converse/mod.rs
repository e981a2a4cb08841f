mod event_stream;
mod provider;
mod transport;
mod types;

pub use event_stream::{EventStreamDecoder, EventStreamMessage, HeaderValue};
pub use provider::{ConverseProvider, DEFAULT_MODEL_ID};
pub use transport::{
    ConverseChunkStream, ConverseHttpTransport, ConverseTransport, DEFAULT_READ_TIMEOUT,
};
pub use types::{
    AdditionalModelRequestFields, ConverseContent, ConverseMessage, ConverseRequest,
    ConverseResponse, ConverseRole, ConverseStreamChunk, ConverseUsage, InferenceConfig,
    ReasoningConfig, SystemTool, ToolConfig, ToolSpec,
};
