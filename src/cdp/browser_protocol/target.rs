//! `Target` domain: browser contexts, targets, and attaching sessions to
//! them. Mirrors the subset of the real `Target` domain the bootstrap
//! protocol issues.

use cdp_wire::{Command, Method, SessionId};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrowserContextId(pub String);

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateBrowserContextParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispose_on_detach: Option<bool>,
}

impl Method for CreateBrowserContextParams {
    fn identifier(&self) -> Cow<'static, str> {
        "Target.createBrowserContext".into()
    }
}

impl Command for CreateBrowserContextParams {
    type Response = CreateBrowserContextResponse;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBrowserContextResponse {
    pub browser_context_id: BrowserContextId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisposeBrowserContextParams {
    pub browser_context_id: BrowserContextId,
}

impl Method for DisposeBrowserContextParams {
    fn identifier(&self) -> Cow<'static, str> {
        "Target.disposeBrowserContext".into()
    }
}

impl Command for DisposeBrowserContextParams {
    type Response = serde_json::Value;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTargetParams {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_context_id: Option<BrowserContextId>,
}

impl CreateTargetParams {
    pub fn new(url: impl Into<String>, browser_context_id: BrowserContextId) -> Self {
        Self {
            url: url.into(),
            browser_context_id: Some(browser_context_id),
        }
    }
}

impl Method for CreateTargetParams {
    fn identifier(&self) -> Cow<'static, str> {
        "Target.createTarget".into()
    }
}

impl Command for CreateTargetParams {
    type Response = CreateTargetResponse;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTargetResponse {
    pub target_id: TargetId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTargetParams {
    pub target_id: TargetId,
    pub flatten: bool,
}

impl AttachToTargetParams {
    pub fn new(target_id: TargetId) -> Self {
        Self {
            target_id,
            flatten: true,
        }
    }
}

impl Method for AttachToTargetParams {
    fn identifier(&self) -> Cow<'static, str> {
        "Target.attachToTarget".into()
    }
}

impl Command for AttachToTargetParams {
    type Response = AttachToTargetResponse;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTargetResponse {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachFromTargetParams {
    pub session_id: SessionId,
}

impl Method for DetachFromTargetParams {
    fn identifier(&self) -> Cow<'static, str> {
        "Target.detachFromTarget".into()
    }
}

impl Command for DetachFromTargetParams {
    type Response = serde_json::Value;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseTargetParams {
    pub target_id: TargetId,
}

impl Method for CloseTargetParams {
    fn identifier(&self) -> Cow<'static, str> {
        "Target.closeTarget".into()
    }
}

impl Command for CloseTargetParams {
    type Response = serde_json::Value;
}
