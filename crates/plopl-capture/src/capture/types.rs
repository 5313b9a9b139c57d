use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub type Headers = BTreeMap<String, String>;

/// Lifecycle of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeState {
    Pending,
    BodyReady,
    Completed,
    Synthesized,
    Abandoned,
}

impl ExchangeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeState::Pending => "pending",
            ExchangeState::BodyReady => "body_ready",
            ExchangeState::Completed => "completed",
            ExchangeState::Synthesized => "synthesized",
            ExchangeState::Abandoned => "abandoned",
        }
    }

    /// Whether the exchange carries a response worth handing to consumers.
    pub fn is_ready(&self) -> bool {
        matches!(self, ExchangeState::Completed | ExchangeState::Synthesized)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestData {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: Value,
    pub captured_at: DateTime<Utc>,
}

impl RequestData {
    pub fn new(url: &str, method: &str, headers: Headers) -> Self {
        Self {
            url: url.to_string(),
            method: method.to_string(),
            headers,
            body: Value::Null,
            captured_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: Value,
    pub captured_at: DateTime<Utc>,
}

impl ResponseData {
    pub fn new(status: u16, status_text: &str, headers: Headers, body: Value) -> Self {
        Self {
            status,
            status_text: status_text.to_string(),
            headers,
            body,
            captured_at: Utc::now(),
        }
    }

    /// Stand-in attached when the real response does not show up in time.
    pub fn placeholder() -> Self {
        Self::new(
            200,
            "Processing",
            Headers::new(),
            json!({"message": "Request captured, waiting for response"}),
        )
    }
}

/// One request/response pair under observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedExchange {
    pub correlation_key: String,
    pub schema_id: String,
    pub state: ExchangeState,
    /// Bumped on every emission; a re-emission carries a higher revision.
    pub revision: u32,
    /// True while `response` is the timeout placeholder.
    #[serde(default)]
    pub placeholder: bool,
    pub request: RequestData,
    pub response: Option<ResponseData>,
}

impl CapturedExchange {
    pub fn new(correlation_key: &str, schema_id: &str, request: RequestData) -> Self {
        Self {
            correlation_key: correlation_key.to_string(),
            schema_id: schema_id.to_string(),
            state: ExchangeState::Pending,
            revision: 0,
            placeholder: false,
            request,
            response: None,
        }
    }

    pub fn to_ready(&self) -> ExchangeReady {
        ExchangeReady {
            schema_id: self.schema_id.clone(),
            correlation_key: self.correlation_key.clone(),
            revision: self.revision,
            request: self.request.clone(),
            response: self.response.clone(),
            state: self.state,
        }
    }
}

/// Event handed to consumers. Delivery is at-least-once; consumers dedupe on
/// `(correlation_key, revision)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeReady {
    pub schema_id: String,
    pub correlation_key: String,
    pub revision: u32,
    pub request: RequestData,
    pub response: Option<ResponseData>,
    pub state: ExchangeState,
}

/// A response as observed by the capture source, with whatever request
/// context came along with it.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedResponse {
    pub correlation_key: Option<String>,
    pub url: String,
    pub method: String,
    pub response: ResponseData,
    pub request_headers: Option<Headers>,
    pub request_body: Option<Value>,
}

impl ObservedResponse {
    pub fn new(
        correlation_key: Option<&str>,
        url: &str,
        method: &str,
        status: u16,
        headers: Headers,
        body: Value,
    ) -> Self {
        Self {
            correlation_key: correlation_key.map(str::to_string),
            url: url.to_string(),
            method: method.to_string(),
            response: ResponseData::new(status, canonical_reason(status), headers, body),
            request_headers: None,
            request_body: None,
        }
    }

    pub fn with_request(mut self, headers: Option<Headers>, body: Option<Value>) -> Self {
        self.request_headers = headers;
        self.request_body = body;
        self
    }
}

pub(crate) fn canonical_reason(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}

/// Raw signals from a capture source, as they appear in capture logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CaptureSignal {
    #[serde(rename_all = "camelCase")]
    RequestStarted {
        correlation_key: String,
        url: String,
        method: String,
        #[serde(default)]
        headers: Headers,
    },
    #[serde(rename_all = "camelCase")]
    RequestBody {
        correlation_key: String,
        #[serde(default)]
        body: Value,
    },
    #[serde(rename_all = "camelCase")]
    Response {
        #[serde(default)]
        correlation_key: Option<String>,
        url: String,
        method: String,
        status: u16,
        #[serde(default)]
        status_text: String,
        #[serde(default)]
        headers: Headers,
        #[serde(default)]
        body: Value,
        /// Request context some capture sources observe alongside the
        /// response (fetch/XHR interception).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_headers: Option<Headers>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_body: Option<Value>,
    },
}

impl CaptureSignal {
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureSignal::RequestStarted { .. } => "request_started",
            CaptureSignal::RequestBody { .. } => "request_body",
            CaptureSignal::Response { .. } => "response",
        }
    }
}
