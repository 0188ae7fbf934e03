//! Shared HTTP plumbing for every adapter.

use market_core::{SourceFailure, SourceResult, SourceUnavailable};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; marketly/0.1)";

/// Build the process-wide HTTP client. Every request it sends is bounded by `timeout`.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}

pub(crate) fn unavailable(source_id: &'static str, failure: SourceFailure) -> SourceUnavailable {
    SourceUnavailable::new(source_id, failure)
}

fn map_reqwest_error(source_id: &'static str, err: reqwest::Error) -> SourceUnavailable {
    if err.is_timeout() {
        unavailable(source_id, SourceFailure::Timeout)
    } else if err.is_decode() {
        unavailable(source_id, SourceFailure::Parse(err.to_string()))
    } else {
        unavailable(source_id, SourceFailure::Http(err.to_string()))
    }
}

/// Send a GET and decode the JSON body.
///
/// Non-2xx statuses and `{"status": "error"}` / `{"Error Message": ...}` bodies become
/// failures, so callers only ever see usable payloads.
pub(crate) async fn get_json(source_id: &'static str, request: RequestBuilder) -> SourceResult<Value> {
    let response = request
        .send()
        .await
        .map_err(|e| map_reqwest_error(source_id, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(unavailable(source_id, SourceFailure::Status(status.as_u16())));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| map_reqwest_error(source_id, e))?;

    check_api_error(&body).map_err(|message| unavailable(source_id, SourceFailure::Api(message)))?;
    Ok(body)
}

/// Detect provider error envelopes that arrive with a 200 status
pub(crate) fn check_api_error(body: &Value) -> Result<(), String> {
    if body.get("status").and_then(Value::as_str) == Some("error") {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("API returned error");
        return Err(message.to_string());
    }
    if let Some(message) = body.get("Error Message").and_then(Value::as_str) {
        return Err(message.to_string());
    }
    Ok(())
}

/// Finite number from a JSON number or numeric string
pub(crate) fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// Non-blank string
pub(crate) fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Yahoo-style `{"raw": 1.23, "fmt": "1.23"}` wrapper
pub(crate) fn raw_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Object(map) => number(map.get("raw")),
        other => number(Some(other)),
    }
}

/// Keep only scalar line items of a provider statement object
pub(crate) fn scalar_items(object: &Value) -> market_core::LineItems {
    object
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(_, v)| match v {
                    Value::Number(_) | Value::Bool(_) => true,
                    Value::String(s) => !s.trim().is_empty(),
                    _ => false,
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}
