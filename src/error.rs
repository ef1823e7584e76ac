use std::io;

use thiserror::Error;

/// All failure modes named in the error handling design: transport failures
/// propagate as `TransportClosed`/`SpawnFailed`, a dead browser as
/// `BrowserDied`, a bad await match or RPC error as `Protocol`, an elapsed
/// deadline as `Timeout`, and a pool with no idle worker as `PoolExhausted`.
#[derive(Debug, Error)]
pub enum CdpError {
    #[error("failed to spawn browser process: {0}")]
    SpawnFailed(#[source] io::Error),

    #[error("the devtools pipe closed while a message was still expected")]
    TransportClosed,

    #[error("the browser process exited unexpectedly")]
    BrowserDied,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("a devtools call returned an error: {0}")]
    Rpc(#[from] cdp_wire::RpcError),

    #[error("protocol exceeded its deadline")]
    Timeout,

    #[error("no session available in the pool within the checkout timeout")]
    PoolExhausted,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Wire(#[from] cdp_wire::WireError),

    #[error("internal channel closed unexpectedly")]
    ChannelClosed,
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for CdpError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        CdpError::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for CdpError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        CdpError::ChannelClosed
    }
}

pub type Result<T> = std::result::Result<T, CdpError>;
