//! Connection: owns the one Transport and fans inbound messages out to
//! whichever Session is waiting for them.
//!
//! Implemented as a single actor task rather than a `Mutex`-protected
//! struct — the pending-call table and the per-session subscriber table are
//! the only shared mutable resources in a Connection, and a single owner
//! task serializes access to both without a lock.
//!
//! Call ids are *not* assigned here. `Dispatch::call_raw` (the engine's
//! entry point) is synchronous, so a Session allocates its own id up front
//! from a [`CallIdAllocator`] shared by every Session on this Connection,
//! then hands the already-identified frame to this actor purely to be
//! serialized onto the wire and tracked for its reply.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cdp_wire::{CallId, Message, SessionId};
use fnv::FnvHashMap;
use tokio::sync::mpsc;

use crate::error::{CdpError, Result};
use crate::transport::Transport;

/// What a Session receives from its Connection: either a routed message or
/// notice that the browser died, delivered once and then the channel closes.
#[derive(Debug)]
pub enum Inbound {
    Message(Message),
    BrowserDied,
}

pub type SessionInbox = mpsc::UnboundedSender<Inbound>;

/// Hands out globally-unique call ids without round-tripping through the
/// Connection actor. Cheap to clone; every Session on a Connection holds one.
#[derive(Clone)]
pub struct CallIdAllocator(Arc<AtomicUsize>);

impl CallIdAllocator {
    fn new() -> Self {
        Self(Arc::new(AtomicUsize::new(1)))
    }

    pub fn next(&self) -> CallId {
        CallId::new(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

enum ConnCommand {
    Dispatch {
        call_id: CallId,
        session_id: Option<SessionId>,
        method: Cow<'static, str>,
        params: serde_json::Value,
        owner: SessionInbox,
    },
    BindSession {
        session_id: SessionId,
        owner: SessionInbox,
    },
    UnbindSession {
        session_id: SessionId,
    },
}

/// A cheap, cloneable capability to talk to the Connection actor.
#[derive(Clone)]
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<ConnCommand>,
    call_ids: CallIdAllocator,
}

impl ConnectionHandle {
    /// Allocates a call id and submits the frame for writing. Synchronous:
    /// the only way this can fail is if the Connection actor has already
    /// exited, which means the browser is gone.
    pub fn dispatch(
        &self,
        method: Cow<'static, str>,
        session_id: Option<SessionId>,
        params: serde_json::Value,
        owner: SessionInbox,
    ) -> Result<CallId> {
        let call_id = self.call_ids.next();
        self.tx
            .send(ConnCommand::Dispatch {
                call_id,
                session_id,
                method,
                params,
                owner,
            })
            .map_err(|_| CdpError::BrowserDied)?;
        Ok(call_id)
    }

    pub fn call_ids(&self) -> CallIdAllocator {
        self.call_ids.clone()
    }

    pub fn bind_session(&self, session_id: SessionId, owner: SessionInbox) -> Result<()> {
        self.tx
            .send(ConnCommand::BindSession { session_id, owner })
            .map_err(|_| CdpError::ChannelClosed)
    }

    pub fn unbind_session(&self, session_id: SessionId) -> Result<()> {
        self.tx
            .send(ConnCommand::UnbindSession { session_id })
            .map_err(|_| CdpError::ChannelClosed)
    }

    /// Resolves once the Connection's actor task has exited — the browser
    /// died or its Transport closed. A supervisor awaits this to know when
    /// the whole tree below it needs restarting rather than polling.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Runs the Connection's inbound reader + outbound writer as one task.
/// `open` spawns it and returns a handle; the task exits (dropping all
/// subscriber entries) when the Transport closes or every handle is dropped.
pub struct Connection;

impl Connection {
    pub fn open(transport: Transport) -> ConnectionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let call_ids = CallIdAllocator::new();
        tokio::spawn(run(transport, rx));
        ConnectionHandle { tx, call_ids }
    }
}

async fn run(mut transport: Transport, mut commands: mpsc::UnboundedReceiver<ConnCommand>) {
    let mut pending_calls: FnvHashMap<CallId, SessionInbox> = Default::default();
    let mut sessions: HashMap<SessionId, SessionInbox> = Default::default();

    loop {
        tokio::select! {
            biased;

            cmd = commands.recv() => {
                match cmd {
                    None => break, // all handles dropped
                    Some(ConnCommand::Dispatch { call_id, session_id, method, params, owner }) => {
                        let call = cdp_wire::MethodCall { id: call_id, session_id, method, params };
                        let frame = match serde_json::to_vec(&call) {
                            Ok(f) => f,
                            Err(e) => {
                                tracing::error!(error = %e, "failed to serialize outbound call");
                                let _ = owner.send(Inbound::Message(error_response(call_id, e.to_string())));
                                continue;
                            }
                        };
                        tracing::debug!(call_id = call_id.get(), method = %call.method, "submit command");
                        match transport.send(&frame).await {
                            Ok(()) => {
                                pending_calls.insert(call_id, owner);
                            }
                            Err(_) => {
                                let _ = owner.send(Inbound::BrowserDied);
                                break;
                            }
                        }
                    }
                    Some(ConnCommand::BindSession { session_id, owner }) => {
                        sessions.insert(session_id, owner);
                    }
                    Some(ConnCommand::UnbindSession { session_id }) => {
                        sessions.remove(&session_id);
                    }
                }
            }

            frame = transport.recv() => {
                match frame {
                    Ok(bytes) => route(&bytes, &mut pending_calls, &mut sessions),
                    Err(_) => break, // transport_closed / browser_died
                }
            }
        }
    }

    tracing::warn!("connection closed, notifying in-flight sessions of browser_died");
    for (_, owner) in pending_calls.drain() {
        let _ = owner.send(Inbound::BrowserDied);
    }
    for (_, owner) in sessions.drain() {
        let _ = owner.send(Inbound::BrowserDied);
    }
}

fn error_response(call_id: CallId, message: String) -> Message {
    serde_json::from_value(serde_json::json!({
        "id": call_id,
        "error": { "code": -32000, "message": message },
    }))
    .expect("hand-built response frame is always well-formed")
}

fn route(
    bytes: &[u8],
    pending_calls: &mut FnvHashMap<CallId, SessionInbox>,
    sessions: &mut HashMap<SessionId, SessionInbox>,
) {
    let msg: Message = match serde_json::from_slice(bytes) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(error = %e, "failed to parse devtools frame");
            return;
        }
    };

    match &msg {
        Message::Response(resp) => {
            if let Some(owner) = pending_calls.remove(&resp.id) {
                let _ = owner.send(Inbound::Message(msg));
            }
        }
        Message::Event(ev) => {
            if let Some(session_id) = &ev.session_id {
                if let Some(owner) = sessions.get(session_id) {
                    let _ = owner.send(Inbound::Message(msg));
                }
            } else {
                // Browser-scoped event: broadcast to every Session that
                // might have an in-flight Protocol. Safe because unmatched
                // events are dropped by the Protocol engine.
                for owner in sessions.values() {
                    let _ = owner.send(Inbound::Message(msg.clone()));
                }
            }
        }
    }
}

/// A `ConnectionHandle` wired to a command channel that's drained and
/// discarded, for tests that exercise `SessionPool`/`Session` plumbing
/// without a real browser. Any call dispatched through it never receives a
/// reply — fine for tests that only check pool bookkeeping (checkout,
/// recycling counts), not protocol completion.
#[cfg(test)]
pub(crate) fn test_handle() -> ConnectionHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<ConnCommand>();
    tokio::spawn(async move { while rx.recv().await.is_some() {} });
    ConnectionHandle {
        tx,
        call_ids: CallIdAllocator::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_id_allocator_is_monotonic_and_shared_across_clones() {
        let a = CallIdAllocator::new();
        let b = a.clone();
        assert_eq!(a.next().get(), 1);
        assert_eq!(b.next().get(), 2);
        assert_eq!(a.next().get(), 3);
    }
}
