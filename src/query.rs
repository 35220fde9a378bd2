//! Export discovery for one host.
//!
//! The query runs in two phases, each bounded by the phase budget of
//! [`QueryOptions`]:
//!
//! 1. Ask the MOUNT daemon for its export list (`MOUNTPROC_EXPORT`), locating
//!    it through the portmapper unless a port is configured.
//! 2. Only if that failed, try an NFSv4 root mount. Success means the server
//!    lets clients mount `/`, which is reported as a single unrestricted
//!    export.
//!
//! Every connection is owned by the phase that opened it and is closed when
//! the phase ends, whichever way it ends. Failures never reach the caller of
//! [`query_exports`]; they are logged and recorded in [`QueryOutcome`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::error::{ErrorKind, QueryError};
use crate::export::{ExportEntry, ExportList};
use crate::protocol::nfs::{mount, v4};
use crate::protocol::rpc::{run_until, RetryPolicy, DEFAULT_RETRIES, DEFAULT_TIMEOUT};
use crate::protocol::xdr::{mount as mount_xdr, nfs4, portmap};

/// Tunables of a query. The defaults match the classic `showmount` behavior
/// of a 1 s response timeout and two retries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryOptions {
    retry: RetryPolicy,
    poll_interval: Option<Duration>,
    mount_version: u32,
    mount_port: Option<u16>,
    portmap_port: u16,
    nfs_port: u16,
    root_probe: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy { timeout: DEFAULT_TIMEOUT, retries: DEFAULT_RETRIES },
            poll_interval: None,
            mount_version: mount_xdr::VERSION,
            mount_port: None,
            portmap_port: portmap::PORT,
            nfs_port: nfs4::PORT,
            root_probe: true,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response timeout for connects and calls.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.retry.timeout = timeout;
        self
    }

    /// Connect retries after a timeout, and retransmissions per call.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retry.retries = retries;
        self
    }

    /// Longest single wait for socket readiness. Defaults to the timeout.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// MOUNT protocol version to ask; clamped to 1..=3.
    pub fn with_mount_version(mut self, version: u32) -> Self {
        self.mount_version = version.clamp(mount_xdr::MIN_VERSION, mount_xdr::VERSION);
        self
    }

    /// Skips the portmapper and connects to the MOUNT daemon on `port`.
    pub fn with_mount_port(mut self, port: u16) -> Self {
        self.mount_port = Some(port);
        self
    }

    pub fn with_portmap_port(mut self, port: u16) -> Self {
        self.portmap_port = port;
        self
    }

    /// Port of the NFSv4 server used by the root probe.
    pub fn with_nfs_port(mut self, port: u16) -> Self {
        self.nfs_port = port;
        self
    }

    /// Enables or disables the NFSv4 fallback.
    pub fn with_root_probe(mut self, enabled: bool) -> Self {
        self.root_probe = enabled;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn mount_version(&self) -> u32 {
        self.mount_version
    }

    pub fn root_probe(&self) -> bool {
        self.root_probe
    }

    /// Upper bound for one phase: the timeout times one plus the retries.
    /// A whole query takes at most two of these.
    pub fn phase_budget(&self) -> Duration {
        self.retry.budget()
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval.unwrap_or(self.retry.timeout)
    }
}

/// State of one MOUNT export request, filled in by the reply callback.
#[derive(Debug, Default)]
pub struct QueryContext {
    completed: bool,
    result: Option<ExportList>,
    error: Option<QueryError>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome. Only the first completion counts.
    pub fn complete(&mut self, outcome: Result<ExportList, QueryError>) {
        if self.completed {
            warn!("Ignoring second completion of an export query");
            return;
        }
        self.completed = true;
        match outcome {
            Ok(list) => self.result = Some(list),
            Err(e) => self.error = Some(e),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(QueryError::kind)
    }

    /// Consumes the context; a context that never completed counts as a timeout.
    pub fn into_result(self, waited: Duration) -> Result<ExportList, QueryError> {
        match (self.result, self.error) {
            (Some(list), _) => Ok(list),
            (None, Some(e)) => Err(e),
            (None, None) => Err(QueryError::Timeout(waited)),
        }
    }
}

/// Where the exports of a [`QueryOutcome`] came from.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ExportSource {
    /// The MOUNT daemon answered; the list may legitimately be empty.
    MountProtocol,
    /// MOUNT failed but an NFSv4 root mount succeeded.
    RootProbe,
    /// Both failed (or the probe was disabled).
    #[default]
    Nothing,
}

/// Everything a query learned, including what the plain list hides.
#[derive(Debug, Default)]
pub struct QueryOutcome {
    pub exports: ExportList,
    pub source: ExportSource,
    pub probe_attempted: bool,
    /// Failures in the order they happened
    pub errors: Vec<QueryError>,
}

impl QueryOutcome {
    pub fn succeeded(&self) -> bool {
        self.source != ExportSource::Nothing
    }

    pub fn last_error(&self) -> Option<&QueryError> {
        self.errors.last()
    }
}

/// Lists the exports of `host`.
///
/// Never fails: an unreachable or unhelpful server yields an empty list.
/// Use [`query_exports_detailed`] to tell "no exports" from "query failed".
pub async fn query_exports(host: &str, options: &QueryOptions) -> ExportList {
    query_exports_detailed(host, options).await.exports
}

/// Lists the exports of `host` and reports how the list was obtained.
#[instrument(level = "debug", skip(options))]
pub async fn query_exports_detailed(host: &str, options: &QueryOptions) -> QueryOutcome {
    let mut outcome = QueryOutcome::default();

    match bounded(options.phase_budget(), mount_phase(host, options)).await {
        Ok(exports) => {
            info!("{} exports {} director{}", host, exports.len(), plural(exports.len()));
            outcome.exports = exports;
            outcome.source = ExportSource::MountProtocol;
            return outcome;
        }
        Err(e) => {
            warn!("Export query to {} failed: {}", host, e);
            outcome.errors.push(e);
        }
    }

    if !options.root_probe {
        return outcome;
    }

    outcome.probe_attempted = true;
    match bounded(options.phase_budget(), root_phase(host, options)).await {
        Ok(()) => {
            info!("{} allows an NFSv4 mount of /", host);
            outcome.exports = vec![ExportEntry::root()];
            outcome.source = ExportSource::RootProbe;
        }
        Err(e) => {
            warn!("NFSv4 root probe of {} failed: {}", host, e);
            outcome.errors.push(e);
        }
    }
    outcome
}

/// Reports whether `host` grants an NFSv4 mount of `/`.
///
/// The file handle obtained is discarded; nothing stays mounted.
#[instrument(level = "debug", skip(options))]
pub async fn probe_root_mount(host: &str, options: &QueryOptions) -> bool {
    match bounded(options.phase_budget(), root_phase(host, options)).await {
        Ok(()) => true,
        Err(e) => {
            debug!("Root probe of {} failed: {}", host, e);
            false
        }
    }
}

/// TCP port of the MOUNT daemon on `host`, from the options or the portmapper.
pub async fn resolve_mount_port(host: &str, options: &QueryOptions) -> Result<u16, QueryError> {
    mount::resolve_port(
        host,
        options.mount_version,
        options.mount_port,
        options.portmap_port,
        options.retry,
    )
    .await
}

async fn bounded<T>(
    budget: Duration,
    phase: impl std::future::Future<Output = Result<T, QueryError>>,
) -> Result<T, QueryError> {
    match timeout(budget, phase).await {
        Ok(result) => result,
        Err(_) => Err(QueryError::Timeout(budget)),
    }
}

async fn mount_phase(host: &str, options: &QueryOptions) -> Result<ExportList, QueryError> {
    let port = resolve_mount_port(host, options).await?;
    let mut conn = mount::connect(host, port, options.mount_version, options.retry).await?;

    let context = Arc::new(Mutex::new(QueryContext::new()));
    let sink = Arc::clone(&context);
    mount::request_exports(&mut conn, move |outcome| {
        sink.lock().expect("unable to lock query context").complete(outcome);
    })?;

    let driven = run_until(&mut conn, options.poll_interval(), || {
        context.lock().expect("unable to lock query context").is_completed()
    })
    .await;
    conn.close();
    driven?;

    let context = std::mem::take(&mut *context.lock().expect("unable to lock query context"));
    context.into_result(options.phase_budget())
}

async fn root_phase(host: &str, options: &QueryOptions) -> Result<(), QueryError> {
    v4::root_mount(host, options.nfs_port, options.retry).await.map(|_handle| ())
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        "y"
    } else {
        "ies"
    }
}
