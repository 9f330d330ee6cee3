//! Input validation and normalization of raw chat bodies.
//!
//! Stripping `<` and `>` is a best-effort guard against markup reaching the
//! front end, not a security boundary.

use serde_json::Value;

use pixeldesk_common::ChatRequest;

use crate::error::{ProxyError, Result};
use crate::registry::ModelRegistry;

/// Parse a raw request body into JSON.
pub fn parse_body(body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body)
        .map_err(|e| ProxyError::Validation(format!("malformed JSON body: {}", e)))
}

/// Normalize a raw body into a [`ChatRequest`].
///
/// The message is trimmed, stripped of angle brackets and truncated to
/// `max_length` characters. A missing model falls back to the registry's
/// default; an unregistered one is rejected.
pub fn validate_chat_request(
    body: &Value,
    registry: &ModelRegistry,
    max_length: usize,
) -> Result<ChatRequest> {
    let fields = body
        .as_object()
        .ok_or_else(|| ProxyError::Validation("body must be a JSON object".to_string()))?;

    let message = match fields.get("message") {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => {
            return Err(ProxyError::Validation("message is required".to_string()))
        }
        Some(_) => return Err(ProxyError::Validation("message must be a string".to_string())),
    };

    let message = normalize_message(message, max_length);
    if message.is_empty() {
        return Err(ProxyError::Validation("message must not be empty".to_string()));
    }

    let model = match fields.get("model") {
        Some(Value::String(m)) => {
            if !registry.contains(m) {
                return Err(ProxyError::UnknownModel(m.clone()));
            }
            m.clone()
        }
        Some(Value::Null) | None => registry.default_model().to_string(),
        Some(_) => return Err(ProxyError::Validation("model must be a string".to_string())),
    };

    let turbo_mode = match fields.get("turboMode") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Null) | None => false,
        Some(_) => return Err(ProxyError::Validation("turboMode must be a boolean".to_string())),
    };

    Ok(ChatRequest::new(message, model, turbo_mode))
}

fn normalize_message(raw: &str, max_length: usize) -> String {
    let stripped: String = raw.trim().chars().filter(|c| *c != '<' && *c != '>').collect();
    stripped.trim().chars().take(max_length).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use pixeldesk_common::ModelEndpoint;
    use rstest::rstest;
    use serde_json::json;

    fn registry() -> ModelRegistry {
        ModelRegistry::new(
            HashMap::from([
                ("deepseek-local".to_string(), ModelEndpoint::local("http://local")),
                ("llama-cloud".to_string(), ModelEndpoint::cloud("https://cloud")),
            ]),
            "deepseek-local",
        )
    }

    #[rstest]
    #[case(json!({}), "message is required")]
    #[case(json!({"message": null}), "message is required")]
    #[case(json!({"message": 42}), "message must be a string")]
    #[case(json!({"message": ["hi"]}), "message must be a string")]
    #[case(json!({"message": "   "}), "message must not be empty")]
    #[case(json!({"message": "<>"}), "message must not be empty")]
    #[case(json!({"message": "hi", "model": 7}), "model must be a string")]
    #[case(json!({"message": "hi", "turboMode": "yes"}), "turboMode must be a boolean")]
    #[case(json!("hi"), "body must be a JSON object")]
    fn test_rejects_invalid_bodies(#[case] body: Value, #[case] reason: &str) {
        match validate_chat_request(&body, &registry(), 1000) {
            Err(ProxyError::Validation(msg)) => assert_eq!(msg, reason),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_model_rejected() {
        let body = json!({"message": "hi", "model": "gpt-17"});
        assert!(matches!(
            validate_chat_request(&body, &registry(), 1000),
            Err(ProxyError::UnknownModel(m)) if m == "gpt-17"
        ));
    }

    #[test]
    fn test_defaults_model_and_mode() {
        let req = validate_chat_request(&json!({"message": " hi "}), &registry(), 1000).unwrap();
        assert_eq!(req, ChatRequest::new("hi", "deepseek-local", false));
    }

    #[test]
    fn test_strips_angle_brackets() {
        let body = json!({"message": "<b>bold</b>", "model": "llama-cloud", "turboMode": true});
        let req = validate_chat_request(&body, &registry(), 1000).unwrap();
        assert_eq!(req.message, "bbold/b");
        assert_eq!(req.model, "llama-cloud");
        assert!(req.turbo_mode);
    }

    #[test]
    fn test_long_message_truncated_not_rejected() {
        let long = "a".repeat(1500);
        let req = validate_chat_request(&json!({"message": long}), &registry(), 1000).unwrap();
        assert_eq!(req.message.chars().count(), 1000);
    }

    #[test]
    fn test_truncation_counts_characters() {
        let req = validate_chat_request(&json!({"message": "ééééé"}), &registry(), 3).unwrap();
        assert_eq!(req.message, "ééé");
    }

    // Keys are computed after truncation, so bodies that differ only past
    // the bound share a cache entry.
    #[test]
    fn test_requests_differing_past_bound_share_cache_key() {
        let a = format!("{}{}", "x".repeat(10), "tail-one");
        let b = format!("{}{}", "x".repeat(10), "tail-two");
        let ra = validate_chat_request(&json!({"message": a}), &registry(), 10).unwrap();
        let rb = validate_chat_request(&json!({"message": b}), &registry(), 10).unwrap();
        assert_eq!(ra.cache_key(), rb.cache_key());
    }

    #[test]
    fn test_parse_body_rejects_malformed_json() {
        assert!(matches!(parse_body(b"{not json"), Err(ProxyError::Validation(_))));
        assert!(parse_body(br#"{"message":"hi"}"#).is_ok());
    }
}
