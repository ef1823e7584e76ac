//! `Page` domain: enabling page events, navigation, and the `printToPDF`
//! call that produces the rendered bytes.

use cdp_wire::{Command, Method};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

#[derive(Debug, Clone, Serialize, Default)]
pub struct EnableParams {}

impl Method for EnableParams {
    fn identifier(&self) -> Cow<'static, str> {
        "Page.enable".into()
    }
}

impl Command for EnableParams {
    type Response = serde_json::Value;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateParams {
    pub url: String,
}

impl NavigateParams {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Method for NavigateParams {
    fn identifier(&self) -> Cow<'static, str> {
        "Page.navigate".into()
    }
}

impl Command for NavigateParams {
    type Response = NavigateResponse;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateResponse {
    pub frame_id: FrameId,
    #[serde(default)]
    pub error_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(pub String);

/// `Page.frameStoppedLoading` event params.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFrameStoppedLoading {
    pub frame_id: FrameId,
}

/// Paper size and margins in inches, matching the CDP `printToPDF` schema.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintToPdfParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub landscape: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_background: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefer_css_page_size: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_top: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_bottom: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_left: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub margin_right: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_ranges: Option<String>,
}

impl Default for PrintToPdfParams {
    fn default() -> Self {
        Self {
            landscape: Some(false),
            print_background: Some(true),
            prefer_css_page_size: Some(false),
            paper_width: None,
            paper_height: None,
            margin_top: None,
            margin_bottom: None,
            margin_left: None,
            margin_right: None,
            scale: None,
            page_ranges: None,
        }
    }
}

impl Method for PrintToPdfParams {
    fn identifier(&self) -> Cow<'static, str> {
        "Page.printToPDF".into()
    }
}

impl Command for PrintToPdfParams {
    type Response = PrintToPdfResponse;
}

/// `data` is base64-encoded PDF bytes, decoded by the printing protocol's
/// `output` step.
#[derive(Debug, Clone, Deserialize)]
pub struct PrintToPdfResponse {
    pub data: String,
}
