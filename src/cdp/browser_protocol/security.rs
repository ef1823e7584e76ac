//! `Security` domain: only the one call the bootstrap protocol needs when
//! `ignore_certificate_errors` is configured.

use cdp_wire::{Command, Method};
use serde::Serialize;
use std::borrow::Cow;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetIgnoreCertificateErrorsParams {
    pub ignore: bool,
}

impl Method for SetIgnoreCertificateErrorsParams {
    fn identifier(&self) -> Cow<'static, str> {
        "Security.setIgnoreCertificateErrors".into()
    }
}

impl Command for SetIgnoreCertificateErrorsParams {
    type Response = serde_json::Value;
}
