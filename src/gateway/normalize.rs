//! Normalization of provider payloads.
//!
//! Providers disagree on where fields live: some answer with a flat object,
//! others wrap the interesting part in one or more `data` envelopes, and the
//! outer envelope may reuse names like `code` for unrelated error numbers.
//! Lookups therefore walk the envelopes innermost-first.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::{CreatedSession, PollResponse, PollStatus};
use crate::error::LoginError;

const MAX_DEPTH: usize = 3;
const ID_KEYS: &[&str] = &["session_id", "uid", "id"];
const CODE_KEYS: &[&str] = &["code", "qrcode", "qr_code", "url"];
const STATUS_KEYS: &[&str] = &["status"];
const MESSAGE_KEYS: &[&str] = &["msg", "message"];

/// Parse a create-session payload.
///
/// Every other scalar field next to the session id is kept as a ticket
/// parameter so it can be echoed on status queries.
pub fn created_session(value: &Value) -> Result<CreatedSession, LoginError> {
    let layers = layers(value)?;

    let (id_layer, id_key, session_id) = layers
        .iter()
        .rev()
        .find_map(|layer| {
            ID_KEYS.iter().find_map(|key| {
                layer
                    .get(*key)
                    .and_then(scalar_string)
                    .filter(|id| !id.trim().is_empty())
                    .map(|id| (*layer, *key, id))
            })
        })
        .ok_or_else(|| missing("session id", value))?;

    let (code_key, code) = layers
        .iter()
        .rev()
        .find_map(|layer| {
            CODE_KEYS.iter().find_map(|key| {
                layer
                    .get(*key)
                    .and_then(Value::as_str)
                    .filter(|code| !code.trim().is_empty())
                    .map(|code| (*key, code.to_string()))
            })
        })
        .ok_or_else(|| missing("scannable code", value))?;

    let params: BTreeMap<String, String> = id_layer
        .iter()
        .filter(|(key, _)| key.as_str() != id_key && key.as_str() != code_key)
        .filter_map(|(key, value)| scalar_string(value).map(|v| (key.clone(), v)))
        .collect();

    Ok(CreatedSession {
        session_id: session_id.into(),
        code,
        params,
    })
}

/// Parse a status payload into a [`PollResponse`].
pub fn poll_response(value: &Value) -> Result<PollResponse, LoginError> {
    let layers = layers(value)?;

    let status = layers
        .iter()
        .rev()
        .find_map(|layer| STATUS_KEYS.iter().find_map(|key| layer.get(*key)))
        .ok_or_else(|| missing("status", value))?;
    let status = status_from_value(status)?;

    let message = layers.iter().rev().find_map(|layer| {
        MESSAGE_KEYS
            .iter()
            .find_map(|key| layer.get(*key).and_then(Value::as_str))
            .filter(|msg| !msg.is_empty())
            .map(str::to_string)
    });

    Ok(PollResponse { status, message })
}

/// Interpret a single status field (integer code, numeric string or name).
pub fn status_from_value(value: &Value) -> Result<PollStatus, LoginError> {
    let parsed = match value {
        Value::Number(number) => number.as_i64().and_then(PollStatus::from_code),
        Value::String(text) => {
            let text = text.trim();
            match text.parse::<i64>() {
                Ok(code) => PollStatus::from_code(code),
                Err(_) => text.to_ascii_lowercase().parse::<PollStatus>().ok(),
            }
        }
        _ => None,
    };
    parsed.ok_or_else(|| LoginError::Protocol(format!("unrecognized poll status: {value}")))
}

/// The object and its nested `data` envelopes, outermost first.
fn layers(value: &Value) -> Result<Vec<&Map<String, Value>>, LoginError> {
    let mut current = value
        .as_object()
        .ok_or_else(|| LoginError::Protocol(format!("expected a JSON object, got {value}")))?;
    let mut out = vec![current];
    while out.len() <= MAX_DEPTH {
        match current.get("data").and_then(Value::as_object) {
            Some(inner) => {
                out.push(inner);
                current = inner;
            }
            None => break,
        }
    }
    Ok(out)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn missing(what: &str, value: &Value) -> LoginError {
    let mut body = value.to_string();
    if body.len() > 200 {
        let mut end = 200;
        while end > 0 && !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("...");
    }
    LoginError::Protocol(format!("missing {what} in provider response: {body}"))
}
