//! Supervision tree: BrowserProcess → Connection → SessionPool.
//!
//! A crashed browser invalidates the whole tree below it — there is no
//! partial recovery from a dead Transport, since every Session's `sessionId`
//! was only ever valid against that one process. `Supervisor` watches for
//! that event via [`ConnectionHandle::closed`] and rebuilds the tree from
//! scratch. Recycling a single misbehaving Session (use-count exhaustion, or
//! any other per-Session retirement) stays local to [`crate::pool::SessionPool`]
//! and never reaches up here: a single bad Session doesn't take down the
//! browser, and a dead browser doesn't get patched up Session by Session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::RwLock;

use crate::conn::{Connection, ConnectionHandle};
use crate::config::{LaunchConfig, PoolConfig};
use crate::error::{CdpError, Result};
use crate::pool::{SessionFactory, SessionPool};
use crate::transport::Transport;

struct Tree {
    conn: ConnectionHandle,
    pool: Arc<SessionPool>,
    // Held only to keep the user-data-dir alive for the Transport's lifetime.
    _user_data_dir: TempDir,
}

/// Owns the live (Connection, SessionPool) pair and replaces it in place
/// when the browser dies. Cloning a `Supervisor` shares the same tree and
/// the same restart machinery.
#[derive(Clone)]
pub struct Supervisor {
    executable: PathBuf,
    launch: LaunchConfig,
    pool: PoolConfig,
    factory: SessionFactory,
    tree: Arc<RwLock<Option<Tree>>>,
}

impl Supervisor {
    pub fn new(executable: PathBuf, launch: LaunchConfig, pool: PoolConfig, factory: SessionFactory) -> Self {
        Self {
            executable,
            launch,
            pool,
            factory,
            tree: Arc::new(RwLock::new(None)),
        }
    }

    /// Boots the tree if it isn't already up, and starts the background
    /// watcher that rebuilds it when the Connection dies.
    pub async fn ensure_started(&self) -> Result<()> {
        if self.tree.read().await.is_some() {
            return Ok(());
        }
        let mut guard = self.tree.write().await;
        if guard.is_some() {
            return Ok(());
        }
        *guard = Some(self.spawn_tree().await?);
        drop(guard);
        self.spawn_watcher();
        Ok(())
    }

    pub async fn pool(&self) -> Result<Arc<SessionPool>> {
        self.ensure_started().await?;
        Ok(self.tree.read().await.as_ref().expect("just ensured").pool.clone())
    }

    async fn spawn_tree(&self) -> Result<Tree> {
        let user_data_dir = TempDir::new().map_err(CdpError::Io)?;
        let transport = Transport::spawn(&self.executable, user_data_dir.path(), &self.launch).await?;
        let conn = Connection::open(transport);
        let pool = SessionPool::new(conn.clone(), self.pool.size, self.factory.clone()).await?;
        tracing::info!(size = self.pool.size, "browser tree started");
        Ok(Tree {
            conn,
            pool,
            _user_data_dir: user_data_dir,
        })
    }

    fn spawn_watcher(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                let conn = match this.tree.read().await.as_ref() {
                    Some(tree) => tree.conn.clone(),
                    None => return,
                };
                conn.closed().await;
                tracing::warn!("browser died, restarting supervision tree");
                *this.tree.write().await = None;

                match this.restart_with_backoff().await {
                    Ok(()) => continue,
                    Err(e) => {
                        tracing::error!(error = %e, "giving up restarting browser tree");
                        return;
                    }
                }
            }
        });
    }

    async fn restart_with_backoff(&self) -> Result<()> {
        let mut backoff = Duration::from_millis(200);
        for attempt in 1..=5 {
            match self.spawn_tree().await {
                Ok(tree) => {
                    *self.tree.write().await = Some(tree);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "browser restart attempt failed");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
        Err(CdpError::BrowserDied)
    }
}
