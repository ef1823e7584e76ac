//! Wire-level JSON-RPC types exchanged with a Chrome DevTools Protocol pipe.
//!
//! Deliberately browser-agnostic: this crate knows nothing about targets,
//! sessions or any specific CDP domain. It only knows the envelope.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier for an outbound call. Unique and strictly increasing within a
/// single [`Connection`](https://docs.rs/chromedrive-core)'s lifetime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CallId(usize);

impl CallId {
    pub fn new(id: usize) -> Self {
        CallId(id)
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallId({})", self.0)
    }
}

/// The DevTools session id attached to a target, distinct from our own
/// `Session` worker type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A method identifier such as `Page.navigate`.
pub trait Method {
    fn identifier(&self) -> Cow<'static, str>;

    fn domain_name(&self) -> Cow<'static, str> {
        self.split().0
    }

    fn method_name(&self) -> Cow<'static, str> {
        self.split().1
    }

    fn split(&self) -> (Cow<'static, str>, Cow<'static, str>) {
        match self.identifier() {
            Cow::Borrowed(id) => {
                let mut iter = id.split('.');
                (
                    iter.next().unwrap_or_default().into(),
                    iter.next().unwrap_or_default().into(),
                )
            }
            Cow::Owned(id) => {
                let mut iter = id.split('.');
                (
                    Cow::Owned(iter.next().unwrap_or_default().to_string()),
                    Cow::Owned(iter.next().unwrap_or_default().to_string()),
                )
            }
        }
    }
}

/// A CDP command: a serializable params struct paired with its response type.
pub trait Command: Serialize + Method {
    type Response: serde::de::DeserializeOwned + fmt::Debug;
}

/// An outbound JSON-RPC call as written to the browser's stdin, one call id
/// at a time, serialized then terminated with a single `0x00` byte by the
/// transport.
#[derive(Debug, Clone, Serialize)]
pub struct MethodCall {
    pub id: CallId,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub method: Cow<'static, str>,
    pub params: serde_json::Value,
}

/// A JSON-RPC error object as embedded in a [`Response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CDP error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// A reply to a previously-submitted [`MethodCall`], correlated by `id`.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub id: CallId,
    pub result: Option<serde_json::Value>,
    pub error: Option<RpcError>,
}

/// A browser-initiated notification. May or may not carry a `sessionId`;
/// messages without one are browser-scoped (see the Connection's routing
/// rules).
#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    pub method: Cow<'static, str>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Method for EventMessage {
    fn identifier(&self) -> Cow<'static, str> {
        self.method.clone()
    }
}

/// Every frame read off the browser's stdout is either a `Response` (has
/// `id`) or an `EventMessage` (has `method`, no `id`). `serde(untagged)`
/// disambiguates by trying `Response` first.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Response(Response),
    Event(EventMessage),
}

/// A typed response to a [`Command`], decoded from a [`Response`]'s `result`.
#[derive(Debug)]
pub struct CommandResponse<T> {
    pub id: CallId,
    pub method: Cow<'static, str>,
    pub result: T,
}

impl<T> std::ops::Deref for CommandResponse<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.result
    }
}

/// Decode a raw [`Response`] into a typed [`CommandResponse`].
pub fn to_command_response<T: Command>(
    resp: Response,
    method: Cow<'static, str>,
) -> Result<CommandResponse<T::Response>, WireError> {
    if let Some(err) = resp.error {
        Err(WireError::Rpc(err))
    } else if let Some(result) = resp.result {
        let result = serde_json::from_value(result)?;
        Ok(CommandResponse {
            id: resp.id,
            method,
            result,
        })
    } else {
        Err(WireError::EmptyResponse)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error("received no result and no error for a call")]
    EmptyResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parses_before_event() {
        let msg: Message = serde_json::from_str(r#"{"id":1,"result":{"ok":true}}"#).unwrap();
        assert!(matches!(msg, Message::Response(_)));
    }

    #[test]
    fn event_without_session_id() {
        let msg: Message =
            serde_json::from_str(r#"{"method":"Inspector.targetCrashed","params":{}}"#).unwrap();
        match msg {
            Message::Event(ev) => assert_eq!(ev.session_id, None),
            _ => panic!("expected event"),
        }
    }

    #[test]
    fn event_with_session_id() {
        let msg: Message = serde_json::from_str(
            r#"{"method":"Page.frameStoppedLoading","params":{"frameId":"F1"},"sessionId":"S1"}"#,
        )
        .unwrap();
        match msg {
            Message::Event(ev) => assert_eq!(ev.session_id.unwrap().as_str(), "S1"),
            _ => panic!("expected event"),
        }
    }
}
