//! reqwest-backed implementation of the remote gateway.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;

use crate::models::EntityKind;
use crate::session::Session;

use super::{DateRange, GatewayError, GatewayResult, RemoteGateway};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// The connectivity gate should answer quickly on a flaky link; it never
/// carries a payload, so it gets a tighter deadline than data requests.
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(3);

/// HTTP client for the farm API.
///
/// Cheap to clone; credentials come from the shared session.
#[derive(Clone)]
pub struct HttpGateway {
    base_url: String,
    session: Arc<Session>,
    client: reqwest::Client,
}

impl HttpGateway {
    /// Build a gateway for the given API base URL.
    pub fn new(base_url: impl Into<String>, session: Arc<Session>) -> GatewayResult<Self> {
        let base_url = normalize_base_url(&base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| GatewayError::Api(error.to_string()))?;
        Ok(Self {
            base_url,
            session,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(self.session.token())
            .header("Accept", "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> GatewayResult<Response> {
        let response = request.send().await.map_err(classify_transport)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(classify_status(response).await)
        }
    }

    async fn json_body(&self, response: Response) -> GatewayResult<Value> {
        response
            .json::<Value>()
            .await
            .map_err(|error| GatewayError::Api(format!("Invalid response body: {error}")))
    }
}

impl RemoteGateway for HttpGateway {
    async fn check_connectivity(&self) -> bool {
        // Any HTTP response means the server is reachable; only transport
        // failures count as offline.
        self.client
            .get(self.url("health"))
            .timeout(CONNECTIVITY_TIMEOUT)
            .send()
            .await
            .is_ok()
    }

    async fn list(&self, kind: EntityKind) -> GatewayResult<Vec<Value>> {
        let response = self
            .send(self.authorized(self.client.get(self.url(kind.path()))))
            .await?;
        let body = self.json_body(response).await?;
        Ok(extract_items(kind, body))
    }

    async fn create(&self, kind: EntityKind, payload: &Value) -> GatewayResult<Value> {
        let response = self
            .send(self.authorized(self.client.post(self.url(kind.path())).json(payload)))
            .await?;
        let body = self.json_body(response).await?;
        Ok(extract_record(kind, body))
    }

    async fn update(&self, kind: EntityKind, id: i64, payload: &Value) -> GatewayResult<Value> {
        let url = format!("{}/{id}", self.url(kind.path()));
        let response = self
            .send(self.authorized(self.client.put(url).json(payload)))
            .await?;
        let body = self.json_body(response).await?;
        Ok(extract_record(kind, body))
    }

    async fn delete(&self, kind: EntityKind, id: i64) -> GatewayResult<()> {
        let url = format!("{}/{id}", self.url(kind.path()));
        self.send(self.authorized(self.client.delete(url))).await?;
        Ok(())
    }

    async fn export(&self, kind: EntityKind, range: DateRange) -> GatewayResult<Vec<u8>> {
        let url = format!("{}/export", self.url(kind.path()));
        let mut request = self.authorized(self.client.get(url));
        if let Some(start) = range.start {
            request = request.query(&[("start_date", start.format("%Y-%m-%d").to_string())]);
        }
        if let Some(end) = range.end {
            request = request.query(&[("end_date", end.format("%Y-%m-%d").to_string())]);
        }

        let response = self.send(request).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|error| GatewayError::Api(format!("Invalid export body: {error}")))?;
        Ok(bytes.to_vec())
    }
}

/// Classify a transport-level failure (the request never produced a status).
fn classify_transport(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() || error.is_connect() {
        GatewayError::NetworkUnreachable
    } else if error.is_request() || error.is_body() || error.is_decode() {
        GatewayError::Api(error.to_string())
    } else {
        // reqwest surfaces DNS and socket failures as opaque middle-of-stack
        // errors; treat anything without a response as unreachable
        GatewayError::NetworkUnreachable
    }
}

/// Classify an error status, extracting the server's message for rejections.
async fn classify_status(response: Response) -> GatewayError {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::CONFLICT => {
            let body = response.text().await.unwrap_or_default();
            GatewayError::ValidationRejected(parse_api_error(status, &body))
        }
        _ => {
            let body = response.text().await.unwrap_or_default();
            GatewayError::Api(parse_api_error(status, &body))
        }
    }
}

/// Pull a human-readable message out of an error body.
///
/// Accepts `{"error": {"message": ...}}`, `{"error": "..."}` and
/// `{"message": "..."}`; falls back to the raw body or bare status.
fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<Value>(body) {
        let message = payload
            .get("error")
            .and_then(|error| {
                error
                    .get("message")
                    .and_then(Value::as_str)
                    .or_else(|| error.as_str())
            })
            .or_else(|| payload.get("message").and_then(Value::as_str));
        if let Some(message) = message {
            let message = message.trim();
            if !message.is_empty() {
                return message.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

/// Unwrap a list response: `{"items": [...]}`, `{"<table>": [...]}` or a
/// bare array. Anything else yields an empty list.
fn extract_items(kind: EntityKind, body: Value) -> Vec<Value> {
    let items = match &body {
        Value::Array(items) => Some(items.clone()),
        Value::Object(map) => map
            .get("items")
            .or_else(|| map.get(kind.table()))
            .and_then(Value::as_array)
            .cloned(),
        _ => None,
    };

    items.unwrap_or_else(|| {
        tracing::warn!("Unexpected {} list response shape", kind.label());
        Vec::new()
    })
}

/// Unwrap a create/update response: `{"<singular>": {...}}` or a bare
/// object. Falls back to the body as-is.
fn extract_record(kind: EntityKind, body: Value) -> Value {
    if let Value::Object(map) = &body {
        if let Some(record) = map.get(kind.singular()) {
            return record.clone();
        }
    }
    body
}

fn normalize_base_url(url: &str) -> GatewayResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(GatewayError::Api("API base URL must not be empty".into()));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(GatewayError::Api(
            "API base URL must include http:// or https://".into(),
        ));
    }
    Ok(trimmed.to_string())
}
