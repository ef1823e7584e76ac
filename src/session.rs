//! Session: a single DevTools session worker that runs at most one
//! [`Protocol`] at a time.
//!
//! A Session does not spawn its own task. The pool's checkout discipline
//! already guarantees exclusive `&mut Session` access for the duration of a
//! request, so "at most one Protocol at a time" falls out of the borrow
//! checker rather than needing a mailbox and a command enum. What *is*
//! actor-shaped here is the inbound half: each Session owns an unbounded
//! channel that the Connection routes messages into, and `run` is the loop
//! that drains it against the active Protocol.

use std::time::{Duration, Instant};

use cdp_wire::{CallId, Method, SessionId};
use tokio::sync::mpsc;

use crate::cdp::target::{BrowserContextId, TargetId};
use crate::conn::{ConnectionHandle, Inbound, SessionInbox};
use crate::error::{CdpError, Result};
use crate::protocol::{Advance, Dispatch, Protocol, ProtocolBuilder};
use crate::protocols::bootstrap::{self, Bootstrapped};

/// Bridges the engine's synchronous [`Dispatch`] to the async Connection.
struct SessionDispatch {
    conn: ConnectionHandle,
    session_id: Option<SessionId>,
    owner: SessionInbox,
}

impl Dispatch for SessionDispatch {
    fn call_raw(
        &mut self,
        method: std::borrow::Cow<'static, str>,
        params: serde_json::Value,
    ) -> Result<CallId> {
        self.conn
            .dispatch(method, self.session_id.clone(), params, self.owner.clone())
    }

    fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    fn set_session_id(&mut self, id: SessionId) {
        self.session_id = Some(id);
    }
}

/// Lifecycle state a [`crate::pool::SessionPool`] consults when deciding
/// whether a checked-in Session goes back in the idle set or gets torn down
/// and replaced (use-count recycling).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Busy,
    Retired,
}

/// One DevTools session worker: a slot bound (or not yet bound) to a
/// `sessionId`, with its own inbound message queue and a use counter that
/// drives recycling.
pub struct Session {
    conn: ConnectionHandle,
    session_id: Option<SessionId>,
    target_id: Option<TargetId>,
    browser_context_id: Option<BrowserContextId>,
    inbox_tx: SessionInbox,
    inbox_rx: mpsc::UnboundedReceiver<Inbound>,
    uses: usize,
    max_uses: usize,
    state: SessionState,
}

impl Session {
    /// A fresh worker with no `sessionId` bound yet — the state a bootstrap
    /// protocol (attach-to-target) runs against.
    pub fn new(conn: ConnectionHandle, max_session_uses: usize) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            conn,
            session_id: None,
            target_id: None,
            browser_context_id: None,
            inbox_tx,
            inbox_rx,
            uses: 0,
            max_uses: max_session_uses.max(1),
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn uses(&self) -> usize {
        self.uses
    }

    /// Registers this worker's inbox with the Connection under `session_id`,
    /// so target-scoped events and command replies reach it. Call once the
    /// bootstrap protocol's `attachToTarget` has produced a `sessionId`.
    pub fn bind(&mut self, session_id: SessionId) -> Result<()> {
        self.conn.bind_session(session_id.clone(), self.inbox_tx.clone())?;
        self.session_id = Some(session_id);
        Ok(())
    }

    /// Convenience over `bind` for the common case: a just-completed
    /// bootstrap protocol handed back its `Bootstrapped` record, which also
    /// carries the target/context ids `teardown` needs on recycle.
    pub fn bind_bootstrapped(&mut self, info: &Bootstrapped) -> Result<()> {
        self.bind(info.session_id.clone())?;
        self.target_id = Some(info.target_id.clone());
        self.browser_context_id = Some(info.browser_context_id.clone());
        Ok(())
    }

    /// Drops the Connection's routing entry for this worker's `sessionId`,
    /// e.g. right before recycling (the old target is about to be closed).
    pub fn unbind(&mut self) -> Result<()> {
        if let Some(session_id) = self.session_id.take() {
            self.conn.unbind_session(session_id)?;
        }
        Ok(())
    }

    /// Closes this worker's target and disposes its browser context, then
    /// drops the routing entry. Called by the
    /// pool on checkin when a Session is retired, before it spawns a
    /// replacement — otherwise the old target/context leaks for the
    /// lifetime of the browser process.
    pub async fn teardown(&mut self) {
        if let (Some(target_id), Some(browser_context_id)) =
            (self.target_id.take(), self.browser_context_id.take())
        {
            let builder = bootstrap::teardown_session(target_id, browser_context_id);
            if let Err(e) = self.run(builder, Duration::from_secs(5)).await {
                tracing::warn!(error = %e, "failed to tear down target/context on recycle");
            }
        }
        let _ = self.unbind();
    }

    pub fn mark_retired(&mut self) {
        self.state = SessionState::Retired;
    }

    /// A clone of this worker's inbox sender, for tests that feed messages
    /// or `BrowserDied` directly into a running `Session::run` without a
    /// real Connection routing them.
    #[cfg(test)]
    pub(crate) fn test_inbox(&self) -> SessionInbox {
        self.inbox_tx.clone()
    }

    /// Runs one request's Protocol to completion: advances it, then drains
    /// this Session's inbox against it until it terminates or `timeout`
    /// elapses. Increments the use counter and retires the worker if the
    /// Protocol opted into recycling accounting.
    pub async fn run<S, T>(&mut self, builder: ProtocolBuilder<S, T>, timeout: Duration) -> Result<T>
    where
        S: Send + 'static,
        T: Send + 'static,
    {
        self.state = SessionState::Busy;
        let deadline = Instant::now() + timeout;
        let (mut protocol, rx) = builder.build(deadline);
        let counts = protocol.counts_toward_recycling;

        let mut dispatch = SessionDispatch {
            conn: self.conn.clone(),
            session_id: self.session_id.clone(),
            owner: self.inbox_tx.clone(),
        };

        let mut advance = protocol.advance(&mut dispatch);
        loop {
            match advance {
                Advance::Done | Advance::Failed => break,
                Advance::Pending => {}
            }

            tokio::select! {
                biased;

                inbound = self.inbox_rx.recv() => {
                    match inbound {
                        Some(Inbound::Message(msg)) => {
                            tracing::trace!(method = %msg_method(&msg), "session inbound");
                            if let Some(next) = protocol.on_message(&msg, &mut dispatch) {
                                advance = next;
                            }
                        }
                        Some(Inbound::BrowserDied) | None => {
                            protocol.fail(CdpError::BrowserDied);
                            advance = Advance::Failed;
                        }
                    }
                }

                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {
                    protocol.fail(CdpError::Timeout);
                    advance = Advance::Failed;
                }
            }
        }

        if counts {
            self.uses += 1;
            if self.uses >= self.max_uses {
                self.state = SessionState::Retired;
            } else {
                self.state = SessionState::Idle;
            }
        } else {
            self.state = SessionState::Idle;
        }

        rx.await.map_err(|_| CdpError::ChannelClosed)?
    }
}

fn msg_method(msg: &cdp_wire::Message) -> std::borrow::Cow<'static, str> {
    match msg {
        cdp_wire::Message::Response(r) => format!("response#{}", r.id.get()).into(),
        cdp_wire::Message::Event(e) => e.identifier(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AwaitOutcome;
    use cdp_wire::Message;

    fn immediate_protocol() -> ProtocolBuilder<(), ()> {
        ProtocolBuilder::new(()).output(|_| ())
    }

    #[tokio::test]
    async fn browser_died_surfaces_to_an_in_flight_run() {
        let conn = crate::conn::test_handle();
        let mut session = Session::new(conn, 10);
        let inbox = session.test_inbox();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = inbox.send(Inbound::BrowserDied);
        });

        let builder = ProtocolBuilder::new(())
            .r#await(|_: &mut (), _msg: &Message| AwaitOutcome::NoMatch)
            .output(|_| ());
        let result = session.run(builder, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(CdpError::BrowserDied)));
    }

    #[tokio::test]
    async fn max_session_uses_retires_the_worker_after_the_nth_run() {
        let conn = crate::conn::test_handle();
        let mut session = Session::new(conn, 2);

        assert!(session.run(immediate_protocol(), Duration::from_secs(5)).await.is_ok());
        assert_eq!(session.uses(), 1);
        assert_eq!(session.state(), SessionState::Idle);

        assert!(session.run(immediate_protocol(), Duration::from_secs(5)).await.is_ok());
        assert_eq!(session.uses(), 2);
        assert_eq!(session.state(), SessionState::Retired);
    }

    #[tokio::test]
    async fn an_elapsed_deadline_surfaces_as_timeout() {
        let conn = crate::conn::test_handle();
        let mut session = Session::new(conn, 10);

        let builder = ProtocolBuilder::new(())
            .r#await(|_: &mut (), _msg: &Message| AwaitOutcome::NoMatch)
            .output(|_| ());
        let result = session.run(builder, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(CdpError::Timeout)));
    }

    #[tokio::test]
    async fn protocols_opting_out_of_recycling_dont_count() {
        let conn = crate::conn::test_handle();
        let mut session = Session::new(conn, 1);

        let builder = ProtocolBuilder::new(()).output(|_| ()).counts_toward_recycling(false);
        assert!(session.run(builder, Duration::from_secs(5)).await.is_ok());
        assert_eq!(session.uses(), 0);
        assert_eq!(session.state(), SessionState::Idle);
    }
}
