//! Synchronous entry points for callers without an async runtime.
//!
//! Each call builds a private single-threaded tokio runtime, so nothing is
//! shared between queries. Hosts that hold a global lock while calling into
//! this crate (an embedding interpreter, a UI thread) can hand in a
//! [`HostRuntime`] that gives the lock up for the duration of the network
//! wait.

use tracing::error;

use crate::export::ExportList;
use crate::query::{self, QueryOptions};

/// Hook into whatever must be released while a blocking query waits.
pub trait HostRuntime {
    /// Called once before the query starts.
    fn release(&self);
    /// Called once after the query ends, on every path.
    fn reacquire(&self);
}

/// A host with nothing to release.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoHostRuntime;

impl HostRuntime for NoHostRuntime {
    fn release(&self) {}
    fn reacquire(&self) {}
}

/// Keeps the host released while alive.
struct Released<'a, H: HostRuntime + ?Sized> {
    host: &'a H,
}

impl<'a, H: HostRuntime + ?Sized> Released<'a, H> {
    fn new(host: &'a H) -> Self {
        host.release();
        Self { host }
    }
}

impl<H: HostRuntime + ?Sized> Drop for Released<'_, H> {
    fn drop(&mut self) {
        self.host.reacquire();
    }
}

/// Blocking [`crate::query_exports`].
pub fn query_exports(host: &str, options: &QueryOptions) -> ExportList {
    query_exports_with(host, options, &NoHostRuntime)
}

/// Blocking [`crate::query_exports`] that releases `runtime` while it waits.
///
/// Must not be called from within an async context.
pub fn query_exports_with<H: HostRuntime + ?Sized>(
    host: &str,
    options: &QueryOptions,
    runtime: &H,
) -> ExportList {
    let _released = Released::new(runtime);

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Cannot start runtime for export query: {}", e);
            return ExportList::new();
        }
    };
    rt.block_on(query::query_exports(host, options))
}
