//! The canonical printing protocol: enable page events, navigate, wait for
//! the frame to settle, ask the browser to print, decode the result.
//!
//! Unlike `bootstrap`, this protocol runs against an already-bound Session
//! (`Dispatch::session_id` is `Some`), so every call here is target-scoped
//! the ordinary way — no `set_session_id` mid-flight.

use base64::Engine;
use cdp_wire::{Command, Message, Method};

use crate::cdp::inspector::TARGET_CRASHED;
use crate::cdp::page::{EnableParams, EventFrameStoppedLoading, FrameId, NavigateParams, PrintToPdfParams};
use crate::error::CdpError;
use crate::protocol::{AwaitOutcome, Dispatch, DispatchExt, ProtocolBuilder};

/// What a caller can vary about one print request: the page and the
/// `Page.printToPDF` knobs. Navigation target is always a URL — turning an
/// HTML body into a `data:` URL or a temp file is the caller's job; this
/// crate does not parse or validate HTML.
#[derive(Debug, Clone)]
pub struct PrintRequest {
    pub url: String,
    pub options: PrintToPdfParams,
}

impl PrintRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: PrintToPdfParams::default(),
        }
    }
}

#[derive(Default)]
struct State {
    enable_id: Option<cdp_wire::CallId>,
    nav_id: Option<cdp_wire::CallId>,
    frame_id: Option<FrameId>,
    frame_stopped: bool,
    print_id: Option<cdp_wire::CallId>,
    pdf_b64: Option<String>,
}

fn decode<C: Command>(resp: &cdp_wire::Response, method: std::borrow::Cow<'static, str>) -> Result<C::Response, CdpError> {
    cdp_wire::to_command_response::<C>(resp.clone(), method)
        .map(|cr| cr.result)
        .map_err(CdpError::from)
}

/// Builds the printing protocol for one request. A print counts toward the
/// Session's `max_session_uses` budget like any other protocol run.
pub fn print_to_pdf(request: PrintRequest) -> ProtocolBuilder<State, Vec<u8>> {
    let PrintRequest { url, options } = request;

    ProtocolBuilder::new(State::default())
        .call(|s: &mut State, d: &mut dyn Dispatch| {
            s.enable_id = Some(d.call(EnableParams::default())?);
            Ok(())
        })
        .r#await(|s: &mut State, msg: &Message| match msg {
            Message::Response(r) if Some(r.id) == s.enable_id => match r.error.clone() {
                None => AwaitOutcome::Match,
                Some(e) => AwaitOutcome::Error(CdpError::Rpc(e)),
            },
            _ => AwaitOutcome::NoMatch,
        })
        .call(move |s: &mut State, d: &mut dyn Dispatch| {
            s.nav_id = Some(d.call(NavigateParams::new(url.clone()))?);
            Ok(())
        })
        .r#await(|s: &mut State, msg: &Message| match msg {
            Message::Response(r) if Some(r.id) == s.nav_id => {
                match decode::<NavigateParams>(r, "Page.navigate".into()) {
                    Ok(resp) => {
                        if let Some(err) = resp.error_text {
                            return AwaitOutcome::Error(CdpError::Protocol(format!("navigation failed: {err}")));
                        }
                        s.frame_id = Some(resp.frame_id);
                        AwaitOutcome::Match
                    }
                    Err(e) => AwaitOutcome::Error(e),
                }
            }
            _ => AwaitOutcome::NoMatch,
        })
        .r#await(|s: &mut State, msg: &Message| match msg {
            Message::Event(e) if e.identifier() == "Page.frameStoppedLoading" => {
                match serde_json::from_value::<EventFrameStoppedLoading>(e.params.clone()) {
                    Ok(params) if Some(&params.frame_id) == s.frame_id.as_ref() => {
                        s.frame_stopped = true;
                        AwaitOutcome::Match
                    }
                    Ok(_) => AwaitOutcome::NoMatch, // a different frame in the same target
                    Err(_) => AwaitOutcome::NoMatch,
                }
            }
            Message::Event(e) if e.identifier() == TARGET_CRASHED => {
                tracing::error!(
                    "Inspector.targetCrashed during print; check for oversized shared memory \
                     or external stylesheet links pulling in unreachable resources"
                );
                AwaitOutcome::NoMatch
            }
            _ => AwaitOutcome::NoMatch,
        })
        .call(move |s: &mut State, d: &mut dyn Dispatch| {
            s.print_id = Some(d.call(options.clone())?);
            Ok(())
        })
        .r#await(|s: &mut State, msg: &Message| match msg {
            Message::Response(r) if Some(r.id) == s.print_id => {
                match decode::<PrintToPdfParams>(r, "Page.printToPDF".into()) {
                    Ok(resp) => {
                        s.pdf_b64 = Some(resp.data);
                        AwaitOutcome::Match
                    }
                    Err(e) => AwaitOutcome::Error(e),
                }
            }
            _ => AwaitOutcome::NoMatch,
        })
        .output(|s: &State| {
            let b64 = s.pdf_b64.as_deref().unwrap_or_default();
            base64::engine::general_purpose::STANDARD
                .decode(b64)
                .unwrap_or_default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_wire::{CallId, Response, SessionId};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    struct NullDispatch {
        next_id: usize,
        calls: Arc<Mutex<Vec<String>>>,
        session_id: Option<SessionId>,
    }

    impl Dispatch for NullDispatch {
        fn call_raw(
            &mut self,
            method: std::borrow::Cow<'static, str>,
            _params: serde_json::Value,
        ) -> crate::error::Result<CallId> {
            let id = CallId::new(self.next_id);
            self.next_id += 1;
            self.calls.lock().unwrap().push(method.to_string());
            Ok(id)
        }

        fn session_id(&self) -> Option<&SessionId> {
            self.session_id.as_ref()
        }

        fn set_session_id(&mut self, id: SessionId) {
            self.session_id = Some(id);
        }
    }

    fn response(id: usize, result: serde_json::Value) -> Message {
        Message::Response(Response {
            id: CallId::new(id),
            result: Some(result),
            error: None,
        })
    }

    fn event(method: &'static str, params: serde_json::Value) -> Message {
        serde_json::from_value(serde_json::json!({ "method": method, "params": params, "sessionId": "S1" })).unwrap()
    }

    #[test]
    fn scrambled_arrival_order_still_produces_exactly_one_output() {
        // the printToPDF reply can race ahead of the frame-stopped event;
        // the protocol must still wait for both before producing output.
        let (mut p, rx) = print_to_pdf(PrintRequest::new("about:blank")).build(Instant::now() + Duration::from_secs(30));
        let mut d = NullDispatch {
            next_id: 1,
            calls: Default::default(),
            session_id: Some(SessionId::new("S1")),
        };

        p.advance(&mut d); // issues Page.enable (id 1)
        assert!(!p.is_done());

        p.on_message(&response(1, serde_json::json!({})), &mut d); // issues Page.navigate (id 2)
        p.on_message(&response(3, serde_json::json!({ "frameId": "F1", "data": "ZHVtbXk=" })), &mut d); // printToPDF reply arrives early, not yet awaited -> no match
        p.on_message(&event("Page.frameStoppedLoading", serde_json::json!({ "frameId": "F1" })), &mut d); // arrives before nav reply
        assert!(!p.is_done());

        p.on_message(&response(2, serde_json::json!({ "frameId": "F1" })), &mut d); // issues Page.printToPDF (id 3)
        assert!(!p.is_done());

        p.on_message(&response(3, serde_json::json!({ "data": "aGVsbG8=" })), &mut d);

        assert!(p.is_done());
        match rx.try_recv() {
            Ok(Ok(bytes)) => assert_eq!(bytes, b"hello"),
            other => panic!("expected decoded pdf bytes, got {other:?}"),
        }
    }

    #[test]
    fn navigation_error_text_fails_the_protocol() {
        let (mut p, rx) = print_to_pdf(PrintRequest::new("https://example.invalid")).build(Instant::now() + Duration::from_secs(30));
        let mut d = NullDispatch {
            next_id: 1,
            calls: Default::default(),
            session_id: Some(SessionId::new("S1")),
        };
        p.advance(&mut d);
        p.on_message(&response(1, serde_json::json!({})), &mut d);
        p.on_message(&response(2, serde_json::json!({ "frameId": "F1", "errorText": "net::ERR_NAME_NOT_RESOLVED" })), &mut d);

        assert!(p.is_done());
        assert!(matches!(rx.try_recv(), Ok(Err(CdpError::Protocol(_)))));
    }
}
