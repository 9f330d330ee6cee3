//! PixelDesk Common Types
//!
//! Wire types shared by the chat proxy and its clients.

pub mod chat;
pub mod endpoint;

pub use chat::{ChatRequest, ChatResponse, ErrorEnvelope, ResponseMetrics};
pub use endpoint::{EndpointKind, ModelEndpoint};
