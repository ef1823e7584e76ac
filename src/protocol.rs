//! The protocol engine: a pure function of `(protocol, event) -> protocol'`,
//! deliberately encoded as a flat step list rather than nested
//! continuations, so it is trivially testable without a browser, a
//! Connection, or even an async runtime.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use cdp_wire::{CallId, Command, Message, Method, SessionId};
use tokio::sync::oneshot;

use crate::error::{CdpError, Result};

/// What a `call` step does with the dispatcher handed to it: serialize and
/// submit zero or more outbound calls, mutating `state` with whatever it
/// needs to remember (call ids, cursor data) to recognize the replies later.
///
/// `call_raw` rather than a generic `call<C: Command>` so the trait stays
/// object-safe — steps are stored as `&mut dyn Dispatch`. [`DispatchExt`]
/// restores the typed, ergonomic call site.
pub trait Dispatch: Send {
    fn call_raw(&mut self, method: Cow<'static, str>, params: serde_json::Value) -> Result<CallId>;
    fn session_id(&self) -> Option<&SessionId>;

    /// Targets subsequent calls at `id`. Only the bootstrap protocol needs
    /// this: it attaches a session mid-flight and has to address later
    /// steps (`Network.emulateNetworkConditions`, …) at the session it just
    /// created, before the owning `Session` worker has bound to it.
    fn set_session_id(&mut self, id: SessionId);
}

pub trait DispatchExt: Dispatch {
    fn call<C: Command>(&mut self, cmd: C) -> Result<CallId> {
        let method = cmd.identifier();
        let params = serde_json::to_value(cmd)?;
        self.call_raw(method, params)
    }
}

impl<D: Dispatch + ?Sized> DispatchExt for D {}

type CallFn<S> = Box<dyn FnMut(&mut S, &mut dyn Dispatch) -> Result<()> + Send>;
type OutputFn<S, T> = Box<dyn FnOnce(&S) -> T + Send>;

/// Result of testing one inbound message against one `await` matcher.
pub enum AwaitOutcome {
    NoMatch,
    Match,
    Error(CdpError),
}

type AwaitFn<S> = Box<dyn FnMut(&mut S, &Message) -> AwaitOutcome + Send>;

enum Step<S, T> {
    Call(CallFn<S>),
    Await(AwaitFn<S>),
    Output(OutputFn<S, T>),
}

/// Whatever a Session needs to know after driving a Protocol one tick:
/// still paused on an await, finished normally, or finished in error. In
/// both terminal cases the result has already been delivered exactly once.
#[derive(Debug, PartialEq, Eq)]
pub enum Advance {
    Pending,
    Done,
    Failed,
}

/// A client request's per-request state machine: an ordered list of
/// `call`/`await`/`output` steps, mutable state private to this protocol,
/// and a result channel invoked exactly once.
pub struct Protocol<S, T> {
    steps: VecDeque<Step<S, T>>,
    state: S,
    result: Option<oneshot::Sender<Result<T>>>,
    deadline: Instant,
    /// Whether a successful completion of this protocol counts against the
    /// owning Session's `max_session_uses` budget. Bootstrap and no-op
    /// protocols opt out.
    pub counts_toward_recycling: bool,
}

/// Builds up the step list before the protocol starts running.
pub struct ProtocolBuilder<S, T> {
    steps: VecDeque<Step<S, T>>,
    state: S,
    counts_toward_recycling: bool,
}

impl<S: Send + 'static, T: Send + 'static> ProtocolBuilder<S, T> {
    pub fn new(state: S) -> Self {
        Self {
            steps: VecDeque::new(),
            state,
            counts_toward_recycling: true,
        }
    }

    pub fn counts_toward_recycling(mut self, yes: bool) -> Self {
        self.counts_toward_recycling = yes;
        self
    }

    pub fn call<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut S, &mut dyn Dispatch) -> Result<()> + Send + 'static,
    {
        self.steps.push_back(Step::Call(Box::new(f)));
        self
    }

    /// Convenience for the common case: issue exactly one command, no
    /// custom bookkeeping beyond what the closure itself records in state.
    pub fn call_command<C, F>(self, mut build: F) -> Self
    where
        C: Command,
        F: FnMut(&mut S) -> C + Send + 'static,
    {
        self.call(move |state, dispatch| {
            let cmd = build(state);
            dispatch.call(cmd)?;
            Ok(())
        })
    }

    pub fn r#await<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut S, &Message) -> AwaitOutcome + Send + 'static,
    {
        self.steps.push_back(Step::Await(Box::new(f)));
        self
    }

    pub fn output<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&S) -> T + Send + 'static,
    {
        self.steps.push_back(Step::Output(Box::new(f)));
        self
    }

    pub fn build(self, deadline: Instant) -> (Protocol<S, T>, oneshot::Receiver<Result<T>>) {
        let (tx, rx) = oneshot::channel();
        (
            Protocol {
                steps: self.steps,
                state: self.state,
                result: Some(tx),
                deadline,
                counts_toward_recycling: self.counts_toward_recycling,
            },
            rx,
        )
    }
}

impl<S: Send + 'static, T: Send + 'static> Protocol<S, T> {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    fn finish_ok(&mut self, value: T) {
        if let Some(tx) = self.result.take() {
            let _ = tx.send(Ok(value));
        }
    }

    fn finish_err(&mut self, err: CdpError) {
        self.steps.clear();
        if let Some(tx) = self.result.take() {
            let _ = tx.send(Err(err));
        }
    }

    /// Delivers a terminal error without consulting the step list, e.g. for
    /// timeouts and `browser_died`. A no-op if the result was already sent.
    pub fn fail(&mut self, err: CdpError) {
        self.finish_err(err);
    }

    pub fn is_done(&self) -> bool {
        self.result.is_none()
    }

    /// Repeatedly inspects the head of the step list until it must pause on
    /// an `await` or the list empties.
    pub fn advance(&mut self, dispatch: &mut dyn Dispatch) -> Advance {
        loop {
            match self.steps.pop_front() {
                None => {
                    // Only reachable if every step ran without an explicit
                    // `output`; treat as done with nothing further to send.
                    return Advance::Done;
                }
                Some(Step::Call(mut f)) => match f(&mut self.state, dispatch) {
                    Ok(()) => continue,
                    Err(e) => {
                        self.finish_err(e);
                        return Advance::Failed;
                    }
                },
                Some(Step::Output(f)) => {
                    let value = f(&self.state);
                    self.finish_ok(value);
                    if self.steps.is_empty() {
                        return Advance::Done;
                    }
                    continue;
                }
                Some(Step::Await(f)) => {
                    self.steps.push_front(Step::Await(f));
                    return Advance::Pending;
                }
            }
        }
    }

    /// The out-of-order matching rule: take the maximal prefix of `await`
    /// steps from the head, try each in order against `msg`, and on the
    /// first match remove exactly that await (preserving the relative order
    /// of the rest) before resuming `advance`. Returns `None` if nothing in
    /// the prefix matched — the message is discarded, step list unchanged.
    pub fn on_message(&mut self, msg: &Message, dispatch: &mut dyn Dispatch) -> Option<Advance> {
        let prefix_len = self
            .steps
            .iter()
            .take_while(|s| matches!(s, Step::Await(_)))
            .count();

        for i in 0..prefix_len {
            let outcome = match &mut self.steps[i] {
                Step::Await(f) => f(&mut self.state, msg),
                _ => unreachable!("prefix only contains Await steps"),
            };
            match outcome {
                AwaitOutcome::NoMatch => continue,
                AwaitOutcome::Match => {
                    self.steps.remove(i);
                    return Some(self.advance(dispatch));
                }
                AwaitOutcome::Error(e) => {
                    self.finish_err(e);
                    return Some(Advance::Failed);
                }
            }
        }
        None
    }
}

/// Convenience matcher: matches a `Response` by call id.
pub fn await_response(call_id: CallId) -> impl FnMut(&mut (), &Message) -> AwaitOutcome + Send {
    move |_, msg| match msg {
        Message::Response(r) if r.id == call_id => AwaitOutcome::Match,
        _ => AwaitOutcome::NoMatch,
    }
}

pub fn is_event(msg: &Message, method: &str) -> bool {
    matches!(msg, Message::Event(e) if e.identifier() == method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_wire::Response;
    use std::sync::{Arc, Mutex};

    struct NullDispatch {
        next_id: usize,
        calls: Arc<Mutex<Vec<String>>>,
        session_id: Option<SessionId>,
    }

    impl Dispatch for NullDispatch {
        fn call_raw(&mut self, method: Cow<'static, str>, _params: serde_json::Value) -> Result<CallId> {
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

    fn response(id: usize) -> Message {
        Message::Response(Response {
            id: CallId::new(id),
            result: Some(serde_json::json!({})),
            error: None,
        })
    }

    fn event(method: &'static str) -> Message {
        serde_json::from_value(serde_json::json!({ "method": method, "params": {} })).unwrap()
    }

    #[derive(Default)]
    struct TwoAwaitState {
        matched_a: bool,
        matched_b: bool,
    }

    fn two_awaits_protocol() -> (Protocol<TwoAwaitState, ()>, oneshot::Receiver<Result<()>>) {
        ProtocolBuilder::new(TwoAwaitState::default())
            .r#await(|s: &mut TwoAwaitState, msg: &Message| match msg {
                Message::Event(e) if e.identifier() == "A" => {
                    s.matched_a = true;
                    AwaitOutcome::Match
                }
                _ => AwaitOutcome::NoMatch,
            })
            .r#await(|s: &mut TwoAwaitState, msg: &Message| match msg {
                Message::Event(e) if e.identifier() == "B" => {
                    s.matched_b = true;
                    AwaitOutcome::Match
                }
                _ => AwaitOutcome::NoMatch,
            })
            .output(|_| ())
            .build(Instant::now() + Duration::from_secs(5))
    }

    #[test]
    fn out_of_order_match() {
        let (mut p, rx) = two_awaits_protocol();
        let mut d = NullDispatch {
            next_id: 1,
            calls: Default::default(),
            session_id: None,
        };
        assert_eq!(p.advance(&mut d), Advance::Pending);

        // deliver B before A
        let adv = p.on_message(&event("B"), &mut d);
        assert!(adv.is_some());
        assert_eq!(adv.unwrap(), Advance::Pending);

        let adv = p.on_message(&event("A"), &mut d);
        assert_eq!(adv.unwrap(), Advance::Done);
        assert!(p.is_done());
        assert!(matches!(rx.try_recv(), Ok(Ok(()))));
    }

    #[test]
    fn non_match_leaves_protocol_unchanged() {
        let (mut p, _rx) = two_awaits_protocol();
        let mut d = NullDispatch {
            next_id: 1,
            calls: Default::default(),
            session_id: None,
        };
        p.advance(&mut d);
        let adv = p.on_message(&event("unrelated"), &mut d);
        assert!(adv.is_none());
        assert!(!p.is_done());
    }

    #[test]
    fn error_await_terminates_exactly_once() {
        let (mut p, rx) = ProtocolBuilder::new(())
            .r#await(|_: &mut (), _msg: &Message| AwaitOutcome::Error(CdpError::Protocol("bad_shape".into())))
            .output(|_| ())
            .build(Instant::now() + Duration::from_secs(5));
        let mut d = NullDispatch {
            next_id: 1,
            calls: Default::default(),
            session_id: None,
        };
        p.advance(&mut d);
        let adv = p.on_message(&event("anything"), &mut d);
        assert_eq!(adv.unwrap(), Advance::Failed);
        assert!(p.is_done());
        assert!(matches!(rx.try_recv(), Ok(Err(CdpError::Protocol(_)))));

        // a second message must not panic or re-fire the callback
        let adv2 = p.on_message(&event("anything"), &mut d);
        assert!(adv2.is_none());
    }

    #[test]
    fn happy_print_like_flow_with_scrambled_replies() {
        // enable -> navigate -> frame-stopped -> printToPDF -> output, fed
        // in scrambled arrival order.
        #[derive(Default)]
        struct St {
            enable_id: Option<CallId>,
            nav_id: Option<CallId>,
            print_id: Option<CallId>,
            frame_seen: bool,
            pdf: Option<String>,
        }

        let (mut p, rx) = ProtocolBuilder::new(St::default())
            .call(|s: &mut St, d: &mut dyn Dispatch| {
                s.enable_id = Some(d.call(crate::cdp::page::EnableParams::default())?);
                Ok(())
            })
            .r#await(|s: &mut St, msg: &Message| match msg {
                Message::Response(r) if Some(r.id) == s.enable_id => AwaitOutcome::Match,
                _ => AwaitOutcome::NoMatch,
            })
            .call(|s: &mut St, d: &mut dyn Dispatch| {
                s.nav_id = Some(d.call(crate::cdp::page::NavigateParams::new("about:blank"))?);
                Ok(())
            })
            .r#await(|s: &mut St, msg: &Message| match msg {
                Message::Response(r) if Some(r.id) == s.nav_id => AwaitOutcome::Match,
                _ => AwaitOutcome::NoMatch,
            })
            .r#await(|s: &mut St, msg: &Message| match msg {
                Message::Event(e) if e.identifier() == "Page.frameStoppedLoading" => {
                    s.frame_seen = true;
                    AwaitOutcome::Match
                }
                _ => AwaitOutcome::NoMatch,
            })
            .call(|s: &mut St, d: &mut dyn Dispatch| {
                s.print_id = Some(d.call(crate::cdp::page::PrintToPdfParams::default())?);
                Ok(())
            })
            .r#await(|s: &mut St, msg: &Message| match msg {
                Message::Response(r) if Some(r.id) == s.print_id => {
                    if let Some(result) = &r.result {
                        s.pdf = result.get("data").and_then(|v| v.as_str()).map(String::from);
                    }
                    AwaitOutcome::Match
                }
                _ => AwaitOutcome::NoMatch,
            })
            .output(|s: &St| s.pdf.clone().unwrap_or_default())
            .build(Instant::now() + Duration::from_secs(30));

        let mut d = NullDispatch {
            next_id: 1,
            calls: Default::default(),
            session_id: None,
        };

        assert_eq!(p.advance(&mut d), Advance::Pending); // enable issued, awaiting its reply
        let enable_id = 1;
        let nav_will_be = 2;
        let print_will_be = 3;

        // scrambled: enable-reply, printToPDF-reply (not yet issued so no-op
        // against current await), frameStoppedLoading-event, navigate-reply
        p.on_message(&response(enable_id), &mut d); // advances: issues navigate, now awaiting nav reply + frame event
        assert!(!p.is_done());

        // printToPDF hasn't been issued yet — a reply for a future id never matches
        p.on_message(&response(print_will_be), &mut d);
        assert!(!p.is_done());

        // frame event arrives before the navigate reply (scrambled order)
        p.on_message(&event("Page.frameStoppedLoading"), &mut d);
        assert!(!p.is_done());

        p.on_message(&response(nav_will_be), &mut d); // issues printToPDF, awaits its reply
        assert!(!p.is_done());

        let print_response = Message::Response(Response {
            id: CallId::new(print_will_be),
            result: Some(serde_json::json!({ "data": "YmFzZTY0" })),
            error: None,
        });
        p.on_message(&print_response, &mut d);

        assert!(p.is_done());
        match rx.try_recv() {
            Ok(Ok(data)) => assert_eq!(data, "YmFzZTY0"),
            other => panic!("expected ok output, got {other:?}"),
        }
    }
}
