//! SessionPool: a fixed-size, non-queueing pool of [`Session`] workers, plus
//! an on-demand variant that pays a browser boot per request instead of
//! keeping one warm.
//!
//! "Non-queueing" describes `checkout`: callers don't join a FIFO line
//! behind other waiters. `checkout(timeout)` will wait up to `timeout` for
//! an idle Session to appear (woken by the next `checkin`), but never for
//! longer, and never behind anyone else — if several callers are waiting
//! when one Session frees up, whichever wakes first takes it. A zero
//! timeout degenerates to "fail immediately if nothing is idle right now".
//! What happens after a worker is returned — recycling a retired one in the
//! background — is a different question, handled by spawning a task off
//! `Checkout`'s drop rather than blocking the caller on the respawn.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify};

use crate::conn::ConnectionHandle;
use crate::error::{CdpError, Result};
use crate::protocol::ProtocolBuilder;
use crate::session::{Session, SessionState};

/// Builds a freshly-bootstrapped [`Session`] against a live Connection.
/// Supplied by the caller wiring the pool together (`print.rs`'s `Printer`)
/// so this module stays ignorant of the bootstrap protocol's CDP specifics.
pub type SessionFactory =
    Arc<dyn Fn(ConnectionHandle) -> Pin<Box<dyn Future<Output = Result<Session>> + Send>> + Send + Sync>;

/// A fixed-size pool of warm Session workers.
pub struct SessionPool {
    conn: ConnectionHandle,
    idle: Mutex<VecDeque<Session>>,
    idle_notify: Notify,
    factory: SessionFactory,
}

impl SessionPool {
    /// Bootstraps `size` Sessions up front. Fails the whole pool if any one
    /// bootstrap fails — a half-initialized pool isn't a useful thing to
    /// hand back.
    pub async fn new(conn: ConnectionHandle, size: usize, factory: SessionFactory) -> Result<Arc<Self>> {
        let mut idle = VecDeque::with_capacity(size);
        for _ in 0..size {
            idle.push_back(factory(conn.clone()).await?);
        }
        Ok(Arc::new(Self {
            conn,
            idle: Mutex::new(idle),
            idle_notify: Notify::new(),
            factory,
        }))
    }

    /// Returns an idle Session if one exists, otherwise waits up to
    /// `timeout` for one to be checked in before giving up. A zero timeout
    /// never waits: it fails immediately with [`CdpError::PoolExhausted`]
    /// if every Session is busy right now.
    pub async fn checkout(self: &Arc<Self>, timeout: Duration) -> Result<Checkout> {
        let deadline = Instant::now() + timeout;
        loop {
            // Subscribe before checking, so a checkin landing between the
            // failed pop and the await below is still observed.
            let notified = self.idle_notify.notified();
            if let Some(session) = self.idle.lock().await.pop_front() {
                return Ok(Checkout {
                    pool: Arc::clone(self),
                    session: Some(session),
                });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(CdpError::PoolExhausted);
            }
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Err(CdpError::PoolExhausted);
            }
        }
    }

    async fn checkin(&self, mut session: Session) {
        if session.state() == SessionState::Retired {
            session.teardown().await;
            match (self.factory)(self.conn.clone()).await {
                Ok(fresh) => self.idle.lock().await.push_back(fresh),
                Err(e) => tracing::error!(error = %e, "failed to respawn recycled session"),
            }
        } else {
            self.idle.lock().await.push_back(session);
        }
        self.idle_notify.notify_one();
    }
}

/// An exclusive lease on one [`Session`], checked back in to its pool either
/// explicitly via [`Checkout::finish`] or, if dropped without one, via a
/// detached recycling task.
pub struct Checkout {
    pool: Arc<SessionPool>,
    session: Option<Session>,
}

impl Checkout {
    pub async fn run<S, T>(&mut self, builder: ProtocolBuilder<S, T>, timeout: Duration) -> Result<T>
    where
        S: Send + 'static,
        T: Send + 'static,
    {
        self.session
            .as_mut()
            .expect("checkout's session is only taken on finish/drop")
            .run(builder, timeout)
            .await
    }

    /// Returns the worker to its pool, recycling it first if it's used up
    /// its `max_session_uses` budget.
    pub async fn finish(mut self) {
        if let Some(session) = self.session.take() {
            self.pool.checkin(session).await;
        }
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            let pool = Arc::clone(&self.pool);
            tokio::spawn(async move { pool.checkin(session).await });
        }
    }
}

/// Boots a whole browser per request and tears it down on checkin, for
/// callers trading latency for zero standing resource usage.
pub struct OnDemandPool {
    launch: Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<(ConnectionHandle, Session)>> + Send>> + Send + Sync>,
}

impl OnDemandPool {
    pub fn new<F, Fut>(launch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(ConnectionHandle, Session)>> + Send + 'static,
    {
        Self {
            launch: Arc::new(move || Box::pin(launch())),
        }
    }

    pub async fn checkout(&self) -> Result<(ConnectionHandle, Session)> {
        (self.launch)().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_factory(spawned: Arc<AtomicUsize>) -> SessionFactory {
        Arc::new(move |conn: ConnectionHandle| {
            let spawned = spawned.clone();
            Box::pin(async move {
                spawned.fetch_add(1, Ordering::SeqCst);
                Ok(Session::new(conn, 2))
            })
        })
    }

    #[tokio::test]
    async fn pool_exhausted_immediately_on_zero_timeout() {
        // size=1, check out the one session, a second checkout with a zero
        // timeout fails immediately rather than waiting.
        let conn = crate::conn::test_handle();
        let spawned = Arc::new(AtomicUsize::new(0));
        let pool = SessionPool::new(conn, 1, counting_factory(spawned)).await.unwrap();

        let _first = pool.checkout(Duration::ZERO).await.unwrap();
        let second = pool.checkout(Duration::ZERO).await;
        assert!(matches!(second, Err(CdpError::PoolExhausted)));
    }

    #[tokio::test]
    async fn checkout_waits_for_an_in_flight_checkin() {
        let conn = crate::conn::test_handle();
        let spawned = Arc::new(AtomicUsize::new(0));
        let pool = SessionPool::new(conn, 1, counting_factory(spawned)).await.unwrap();

        let first = pool.checkout(Duration::ZERO).await.unwrap();
        let pool2 = Arc::clone(&pool);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            first.finish().await;
        });

        // the session isn't idle yet, but frees up well within the budget
        let second = pool2.checkout(Duration::from_secs(1)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn checkout_times_out_if_nothing_frees_up() {
        let conn = crate::conn::test_handle();
        let spawned = Arc::new(AtomicUsize::new(0));
        let pool = SessionPool::new(conn, 1, counting_factory(spawned)).await.unwrap();

        let _first = pool.checkout(Duration::ZERO).await.unwrap();
        let second = pool.checkout(Duration::from_millis(20)).await;
        assert!(matches!(second, Err(CdpError::PoolExhausted)));
    }

    #[tokio::test]
    async fn checkin_returns_a_non_retired_session_to_the_idle_set() {
        let conn = crate::conn::test_handle();
        let spawned = Arc::new(AtomicUsize::new(0));
        let pool = SessionPool::new(conn, 1, counting_factory(spawned.clone())).await.unwrap();
        assert_eq!(spawned.load(Ordering::SeqCst), 1);

        let checkout = pool.checkout(Duration::ZERO).await.unwrap();
        checkout.finish().await;

        // the same (non-retired) worker comes back, no respawn happened
        assert!(pool.checkout(Duration::ZERO).await.is_ok());
        assert_eq!(spawned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn checkin_respawns_a_retired_session() {
        let conn = crate::conn::test_handle();
        let spawned = Arc::new(AtomicUsize::new(0));
        let pool = SessionPool::new(conn, 1, counting_factory(spawned.clone())).await.unwrap();

        let mut checkout = pool.checkout(Duration::ZERO).await.unwrap();
        checkout.session.as_mut().unwrap().mark_retired();
        checkout.finish().await;

        // checkin saw Retired and asked the factory for a fresh worker
        assert_eq!(spawned.load(Ordering::SeqCst), 2);
        assert!(pool.checkout(Duration::ZERO).await.is_ok());
    }
}
