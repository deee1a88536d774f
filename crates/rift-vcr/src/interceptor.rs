//! The interception layer the session drives.
//!
//! A browser driver (or any other network-level interceptor) feeds
//! [`InterceptedRequest`]s into a session and resolves each one through the
//! [`Interceptor`] trait: forward it, abort it, or fulfill it from a recording.

use crate::error::InterceptError;
use async_trait::async_trait;
use bytes::Bytes;
use hyper::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of one intercepted request, unique within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId(value.to_string())
    }
}

/// Browser resource classification of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    TextTrack,
    Xhr,
    Fetch,
    EventSource,
    WebSocket,
    Manifest,
    #[default]
    Other,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Document => "document",
            ResourceType::Stylesheet => "stylesheet",
            ResourceType::Image => "image",
            ResourceType::Media => "media",
            ResourceType::Font => "font",
            ResourceType::Script => "script",
            ResourceType::TextTrack => "texttrack",
            ResourceType::Xhr => "xhr",
            ResourceType::Fetch => "fetch",
            ResourceType::EventSource => "eventsource",
            ResourceType::WebSocket => "websocket",
            ResourceType::Manifest => "manifest",
            ResourceType::Other => "other",
        }
    }

    /// Whether response bodies of this type are expected to be text.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            ResourceType::Document
                | ResourceType::Stylesheet
                | ResourceType::Script
                | ResourceType::Xhr
                | ResourceType::Fetch
                | ResourceType::Manifest
                | ResourceType::TextTrack
                | ResourceType::EventSource
        )
    }
}

/// Descriptor of a request paused by the interception layer.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub id: RequestId,
    pub method: String,
    pub url: String,
    pub headers: HeaderMap,
    pub post_data: Option<String>,
    pub resource_type: ResourceType,
    pub is_navigation_request: bool,
    /// Frame that issued the request.
    pub frame_id: String,
}

impl InterceptedRequest {
    /// Plain GET request from the given frame, useful as a starting point.
    pub fn get(id: impl Into<String>, url: impl Into<String>, frame_id: impl Into<String>) -> Self {
        Self {
            id: RequestId(id.into()),
            method: "GET".to_string(),
            url: url.into(),
            headers: HeaderMap::new(),
            post_data: None,
            resource_type: ResourceType::Other,
            is_navigation_request: false,
            frame_id: frame_id.into(),
        }
    }

    /// Short description used when logging errors for this request.
    pub fn describe(&self) -> String {
        format!(
            "{} {} ({})",
            self.method,
            self.url,
            self.resource_type.as_str()
        )
    }
}

/// Network error codes accepted by [`Interceptor::abort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbortReason {
    Aborted,
    AccessDenied,
    AddressUnreachable,
    BlockedByClient,
    BlockedByResponse,
    ConnectionAborted,
    ConnectionClosed,
    ConnectionFailed,
    ConnectionRefused,
    ConnectionReset,
    InternetDisconnected,
    NameNotResolved,
    TimedOut,
    Failed,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::Aborted => "aborted",
            AbortReason::AccessDenied => "accessdenied",
            AbortReason::AddressUnreachable => "addressunreachable",
            AbortReason::BlockedByClient => "blockedbyclient",
            AbortReason::BlockedByResponse => "blockedbyresponse",
            AbortReason::ConnectionAborted => "connectionaborted",
            AbortReason::ConnectionClosed => "connectionclosed",
            AbortReason::ConnectionFailed => "connectionfailed",
            AbortReason::ConnectionRefused => "connectionrefused",
            AbortReason::ConnectionReset => "connectionreset",
            AbortReason::InternetDisconnected => "internetdisconnected",
            AbortReason::NameNotResolved => "namenotresolved",
            AbortReason::TimedOut => "timedout",
            AbortReason::Failed => "failed",
        }
    }

    /// Map a recorded network failure text (e.g. `net::ERR_CONNECTION_REFUSED`)
    /// back to the abort code that reproduces it.
    pub fn from_error_text(error_text: &str) -> Self {
        let code = error_text
            .trim()
            .trim_start_matches("net::")
            .trim_start_matches("ERR_");
        match code {
            "ABORTED" => AbortReason::Aborted,
            "ACCESS_DENIED" => AbortReason::AccessDenied,
            "ADDRESS_UNREACHABLE" => AbortReason::AddressUnreachable,
            "BLOCKED_BY_CLIENT" => AbortReason::BlockedByClient,
            "BLOCKED_BY_RESPONSE" => AbortReason::BlockedByResponse,
            "CONNECTION_ABORTED" => AbortReason::ConnectionAborted,
            "CONNECTION_CLOSED" => AbortReason::ConnectionClosed,
            "CONNECTION_FAILED" => AbortReason::ConnectionFailed,
            "CONNECTION_REFUSED" => AbortReason::ConnectionRefused,
            "CONNECTION_RESET" => AbortReason::ConnectionReset,
            "INTERNET_DISCONNECTED" => AbortReason::InternetDisconnected,
            "NAME_NOT_RESOLVED" => AbortReason::NameNotResolved,
            "TIMED_OUT" => AbortReason::TimedOut,
            _ => AbortReason::Failed,
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response synthesized from a recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Fulfillment {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Response observed on a live request once it finished loading.
#[derive(Debug, Clone)]
pub struct LiveResponse {
    pub status: u16,
    pub headers: HeaderMap,
}

impl LiveResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }

    /// Redirects and empty responses have no retrievable body.
    pub fn has_body(&self) -> bool {
        !(300..400).contains(&self.status) && self.status != 204 && self.status != 304
    }

    /// Flatten headers into a lowercase map. Repeated headers are joined with
    /// newlines, which keeps multiple `set-cookie` values separable.
    pub fn header_map(&self) -> BTreeMap<String, String> {
        let mut flattened: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in self.headers.iter() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            flattened
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push('\n');
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        flattened
    }
}

/// Operations a session needs from the interception layer.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Frame id of the top-level document.
    fn main_frame_id(&self) -> String;

    /// Let the request proceed to the network unmodified.
    async fn continue_request(&self, id: &RequestId) -> Result<(), InterceptError>;

    /// Fail the request with a network error.
    async fn abort(&self, id: &RequestId, reason: AbortReason) -> Result<(), InterceptError>;

    /// Answer the request without touching the network.
    async fn fulfill(&self, id: &RequestId, response: Fulfillment) -> Result<(), InterceptError>;

    /// Read the body of a finished live response.
    async fn response_body(&self, id: &RequestId) -> Result<Bytes, InterceptError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::{HeaderValue, SET_COOKIE};

    #[test]
    fn test_abort_reason_from_chrome_error_text() {
        assert_eq!(
            AbortReason::from_error_text("net::ERR_CONNECTION_REFUSED"),
            AbortReason::ConnectionRefused
        );
        assert_eq!(
            AbortReason::from_error_text("net::ERR_NAME_NOT_RESOLVED"),
            AbortReason::NameNotResolved
        );
        assert_eq!(
            AbortReason::from_error_text("something odd"),
            AbortReason::Failed
        );
    }

    #[test]
    fn test_resource_type_serializes_lowercase() {
        let json = serde_json::to_string(&ResourceType::TextTrack).unwrap();
        assert_eq!(json, "\"texttrack\"");
        let parsed: ResourceType = serde_json::from_str("\"xhr\"").unwrap();
        assert_eq!(parsed, ResourceType::Xhr);
    }

    #[test]
    fn test_redirects_have_no_body() {
        assert!(!LiveResponse::new(302).has_body());
        assert!(!LiveResponse::new(204).has_body());
        assert!(LiveResponse::new(200).has_body());
        assert!(LiveResponse::new(404).has_body());
    }

    #[test]
    fn test_header_map_joins_repeated_headers() {
        let mut response = LiveResponse::new(200);
        response
            .headers
            .append(SET_COOKIE, HeaderValue::from_static("a=1"));
        response
            .headers
            .append(SET_COOKIE, HeaderValue::from_static("b=2"));
        let flattened = response.header_map();
        assert_eq!(flattened.get("set-cookie").unwrap(), "a=1\nb=2");
    }
}
