//! `Network` domain: only the one call the bootstrap protocol needs when
//! `offline` is configured.

use cdp_wire::{Command, Method};
use serde::Serialize;
use std::borrow::Cow;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmulateNetworkConditionsParams {
    pub offline: bool,
    pub latency: f64,
    pub download_throughput: f64,
    pub upload_throughput: f64,
}

impl EmulateNetworkConditionsParams {
    pub fn offline() -> Self {
        Self {
            offline: true,
            latency: 0.0,
            download_throughput: -1.0,
            upload_throughput: -1.0,
        }
    }
}

impl Method for EmulateNetworkConditionsParams {
    fn identifier(&self) -> Cow<'static, str> {
        "Network.emulateNetworkConditions".into()
    }
}

impl Command for EmulateNetworkConditionsParams {
    type Response = serde_json::Value;
}
