//! Canned upstream payloads for wiremock-backed tests.

use serde_json::{json, Value};

/// Local server reply carrying `text`.
pub fn local_reply(text: &str) -> Value {
    json!({ "generated_text": text })
}

/// Hosted inference reply carrying `text`.
pub fn cloud_reply(text: &str) -> Value {
    json!([{ "generated_text": text }])
}

pub fn error_json(message: &str) -> Value {
    json!({ "error": message })
}
