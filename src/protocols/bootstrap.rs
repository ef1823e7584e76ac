//! The bootstrap protocol: `createBrowserContext` → `createTarget` →
//! `attachToTarget`, followed by whichever of
//! `Network.emulateNetworkConditions` / `Security.setIgnoreCertificateErrors`
//! the launch config asked for. Runs once per Session's lifetime — on first
//! construction, and again every time the pool recycles a retired worker.
//!
//! Opts out of use-count accounting (`counts_toward_recycling(false)`): a
//! bootstrap isn't a client request, so it must not itself count toward the
//! budget it exists to reset.

use std::time::Instant;

use cdp_wire::{Command, Message};

use crate::cdp::network::EmulateNetworkConditionsParams;
use crate::cdp::security::SetIgnoreCertificateErrorsParams;
use crate::cdp::target::{
    AttachToTargetParams, BrowserContextId, CloseTargetParams, CreateBrowserContextParams, CreateTargetParams,
    DisposeBrowserContextParams, TargetId,
};
use cdp_wire::SessionId;

use crate::config::LaunchConfig;
use crate::error::CdpError;
use crate::protocol::{AwaitOutcome, Dispatch, DispatchExt, ProtocolBuilder};

/// Everything a freshly-registered Session needs remembered about the
/// target it's now attached to, so it can be torn down cleanly on recycle.
#[derive(Debug, Clone)]
pub struct Bootstrapped {
    pub browser_context_id: BrowserContextId,
    pub target_id: TargetId,
    pub session_id: SessionId,
}

#[derive(Default)]
struct State {
    create_context_id: Option<cdp_wire::CallId>,
    browser_context_id: Option<BrowserContextId>,
    create_target_id: Option<cdp_wire::CallId>,
    target_id: Option<TargetId>,
    attach_id: Option<cdp_wire::CallId>,
    session_id: Option<SessionId>,
    offline_id: Option<cdp_wire::CallId>,
    cert_id: Option<cdp_wire::CallId>,
}

fn decode<C: Command>(resp: &cdp_wire::Response, method: std::borrow::Cow<'static, str>) -> Result<C::Response, CdpError> {
    let resp = resp.clone();
    cdp_wire::to_command_response::<C>(resp, method)
        .map(|cr| cr.result)
        .map_err(CdpError::from)
}

/// Builds the bootstrap protocol per `config`. `deadline` is supplied by the
/// caller (`config.init_timeout`), matching how every other Protocol gets
/// its deadline from the pool/session wiring rather than hardcoding one.
pub fn register_session(config: &LaunchConfig) -> ProtocolBuilder<State, Bootstrapped> {
    let offline = config.offline;
    let ignore_certificate_errors = config.ignore_certificate_errors;

    let mut builder = ProtocolBuilder::new(State::default())
        .counts_toward_recycling(false)
        .call(|s: &mut State, d: &mut dyn Dispatch| {
            s.create_context_id = Some(d.call(CreateBrowserContextParams::default())?);
            Ok(())
        })
        .r#await(|s: &mut State, msg: &Message| match msg {
            Message::Response(r) if Some(r.id) == s.create_context_id => {
                match decode::<CreateBrowserContextParams>(r, "Target.createBrowserContext".into()) {
                    Ok(resp) => {
                        s.browser_context_id = Some(resp.browser_context_id);
                        AwaitOutcome::Match
                    }
                    Err(e) => AwaitOutcome::Error(e),
                }
            }
            _ => AwaitOutcome::NoMatch,
        })
        .call(|s: &mut State, d: &mut dyn Dispatch| {
            let browser_context_id = s
                .browser_context_id
                .clone()
                .ok_or_else(|| CdpError::Protocol("missing browserContextId before createTarget".into()))?;
            s.create_target_id = Some(d.call(CreateTargetParams::new("about:blank", browser_context_id))?);
            Ok(())
        })
        .r#await(|s: &mut State, msg: &Message| match msg {
            Message::Response(r) if Some(r.id) == s.create_target_id => {
                match decode::<CreateTargetParams>(r, "Target.createTarget".into()) {
                    Ok(resp) => {
                        s.target_id = Some(resp.target_id);
                        AwaitOutcome::Match
                    }
                    Err(e) => AwaitOutcome::Error(e),
                }
            }
            _ => AwaitOutcome::NoMatch,
        })
        .call(|s: &mut State, d: &mut dyn Dispatch| {
            let target_id = s
                .target_id
                .clone()
                .ok_or_else(|| CdpError::Protocol("missing targetId before attachToTarget".into()))?;
            s.attach_id = Some(d.call(AttachToTargetParams::new(target_id))?);
            Ok(())
        })
        .r#await(|s: &mut State, msg: &Message| match msg {
            Message::Response(r) if Some(r.id) == s.attach_id => {
                match decode::<AttachToTargetParams>(r, "Target.attachToTarget".into()) {
                    Ok(resp) => {
                        s.session_id = Some(resp.session_id);
                        AwaitOutcome::Match
                    }
                    Err(e) => AwaitOutcome::Error(e),
                }
            }
            _ => AwaitOutcome::NoMatch,
        });

    if offline {
        builder = builder
            .call(|s: &mut State, d: &mut dyn Dispatch| {
                let session_id = s
                    .session_id
                    .clone()
                    .ok_or_else(|| CdpError::Protocol("missing sessionId before emulateNetworkConditions".into()))?;
                d.set_session_id(session_id);
                s.offline_id = Some(d.call(EmulateNetworkConditionsParams::offline())?);
                Ok(())
            })
            .r#await(|s: &mut State, msg: &Message| match msg {
                Message::Response(r) if Some(r.id) == s.offline_id => AwaitOutcome::Match,
                _ => AwaitOutcome::NoMatch,
            });
    }

    if ignore_certificate_errors {
        builder = builder
            .call(|s: &mut State, d: &mut dyn Dispatch| {
                let session_id = s.session_id.clone().ok_or_else(|| {
                    CdpError::Protocol("missing sessionId before setIgnoreCertificateErrors".into())
                })?;
                d.set_session_id(session_id);
                s.cert_id = Some(d.call(SetIgnoreCertificateErrorsParams { ignore: true })?);
                Ok(())
            })
            .r#await(|s: &mut State, msg: &Message| match msg {
                Message::Response(r) if Some(r.id) == s.cert_id => AwaitOutcome::Match,
                _ => AwaitOutcome::NoMatch,
            });
    }

    builder.output(|s: &State| Bootstrapped {
        browser_context_id: s.browser_context_id.clone().expect("set by createBrowserContext await"),
        target_id: s.target_id.clone().expect("set by createTarget await"),
        session_id: s.session_id.clone().expect("set by attachToTarget await"),
    })
}

pub fn default_deadline(config: &LaunchConfig) -> Instant {
    Instant::now() + config.init_timeout
}

#[derive(Default)]
struct TeardownState {
    close_id: Option<cdp_wire::CallId>,
    dispose_id: Option<cdp_wire::CallId>,
}

/// The reverse of `register_session`: closes the target, then disposes the
/// browser context it lived in. Run against a
/// Session that is being retired, before the pool starts its replacement —
/// a target and context left open would leak for the lifetime of the
/// browser process.
///
/// Opts out of use-count accounting for the same reason `register_session`
/// does: this isn't a client request.
pub fn teardown_session(
    target_id: TargetId,
    browser_context_id: BrowserContextId,
) -> ProtocolBuilder<TeardownState, ()> {
    ProtocolBuilder::new(TeardownState::default())
        .counts_toward_recycling(false)
        .call(move |s: &mut TeardownState, d: &mut dyn Dispatch| {
            s.close_id = Some(d.call(CloseTargetParams {
                target_id: target_id.clone(),
            })?);
            Ok(())
        })
        .r#await(|s: &mut TeardownState, msg: &Message| match msg {
            Message::Response(r) if Some(r.id) == s.close_id => AwaitOutcome::Match,
            _ => AwaitOutcome::NoMatch,
        })
        .call(move |s: &mut TeardownState, d: &mut dyn Dispatch| {
            s.dispose_id = Some(d.call(DisposeBrowserContextParams {
                browser_context_id: browser_context_id.clone(),
            })?);
            Ok(())
        })
        .r#await(|s: &mut TeardownState, msg: &Message| match msg {
            Message::Response(r) if Some(r.id) == s.dispose_id => AwaitOutcome::Match,
            _ => AwaitOutcome::NoMatch,
        })
        .output(|_| ())
}
