//! The facade: the one entry point a caller outside this crate is expected
//! to use. Wires a [`Supervisor`] together with the bootstrap and printing
//! protocols, and exposes the two trait seams — [`PdfAConverter`],
//! [`OutputSink`] — through which the external collaborators that actually
//! write files or shell out to a converter binary plug in. Neither trait is
//! implemented here; both are out of scope for this crate.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{LaunchConfig, PoolConfig};
use crate::conn::ConnectionHandle;
use crate::error::Result;
use crate::protocols::bootstrap;
pub use crate::protocols::print::PrintRequest;
use crate::session::Session;
use crate::supervisor::Supervisor;

/// The external PDF/A converter worker pool: a second pool that shells out
/// to a converter binary. Out of scope for this crate; callers who need
/// PDF/A output supply an implementation.
pub trait PdfAConverter: Send + Sync {
    fn convert<'a>(&'a self, pdf: Vec<u8>) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>>;
}

/// Where rendered bytes end up once a print completes — a file, an HTTP
/// response body, object storage, whatever the caller wires in. Out of
/// scope for this crate.
pub trait OutputSink: Send + Sync {
    fn write<'a>(&'a self, bytes: &'a [u8]) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Owns one browser supervision tree and exposes print requests over it.
/// Cloning shares the same tree (and the same restart machinery) — cheap,
/// meant to be held behind an `Arc` or handed out directly since its fields
/// are themselves `Arc`/`Clone`-cheap handles.
#[derive(Clone)]
pub struct Printer {
    supervisor: Supervisor,
    timeout: Duration,
    checkout_timeout: Duration,
}

impl Printer {
    /// `executable` should come from [`crate::config::default_executable`]
    /// unless the caller overrides it via `launch.chrome_executable`.
    pub fn new(executable: PathBuf, launch: LaunchConfig, pool: PoolConfig) -> Self {
        let timeout = pool.timeout;
        let checkout_timeout = pool.checkout_timeout;
        let max_uses = pool.max_session_uses;
        let init_timeout = launch.init_timeout;
        let factory_launch = launch.clone();

        let factory: crate::pool::SessionFactory = Arc::new(move |conn: ConnectionHandle| {
            let launch = factory_launch.clone();
            Box::pin(async move {
                let mut session = Session::new(conn, max_uses);
                let builder = bootstrap::register_session(&launch);
                let bootstrapped = session.run(builder, init_timeout).await?;
                session.bind_bootstrapped(&bootstrapped)?;
                Ok(session)
            })
        });

        let supervisor = Supervisor::new(executable, launch, pool, factory);
        Self {
            supervisor,
            timeout,
            checkout_timeout,
        }
    }

    /// Renders `request` and returns the raw PDF bytes produced by
    /// `Page.printToPDF`. Waits up to `checkout_timeout` for an idle
    /// Session, then fails with [`CdpError::PoolExhausted`] — this facade
    /// does not queue callers beyond that bounded wait.
    pub async fn print(&self, request: PrintRequest) -> Result<Vec<u8>> {
        let pool = self.supervisor.pool().await?;
        let mut checkout = pool.checkout(self.checkout_timeout).await?;
        let builder = crate::protocols::print::print_to_pdf(request);
        let result = checkout.run(builder, self.timeout).await;
        checkout.finish().await;
        result
    }

    /// Renders `request`, then pipes the resulting bytes through an external
    /// `converter` to produce a PDF/A file, and finally hands the bytes to
    /// `sink`. The conversion and writing steps never touch the browser —
    /// they run after the Session has already been returned to the pool, so
    /// a slow converter doesn't hold a Session idle.
    pub async fn print_pdfa(
        &self,
        request: PrintRequest,
        converter: &dyn PdfAConverter,
        sink: &dyn OutputSink,
    ) -> Result<()> {
        let pdf = self.print(request).await?;
        let pdfa = converter.convert(pdf).await?;
        sink.write(&pdfa).await
    }
}
