//! # Multi-tenant Throttle
//!
//! HARDENING: Admission control in front of request handlers.
//!
//! - At most `in_flight_per_tenant` requests of a tenant execute at once
//! - At most `backlog_per_tenant` requests of a tenant wait in its queue
//! - At most `backlog_limit` requests are held across all tenants
//! - Waiters that time out or are cancelled give their slots back without
//!   corrupting the accounting
//!
//! ## Components
//!
//! - `backlog`: global pool of reusable tickets
//! - `registry`: lazily created per-tenant records
//! - `dispatcher`: one task per tenant granting in-flight slots in FIFO order
//! - `stats`: accounting snapshots
//!
//! ## Admission
//!
//! 1. Caller already gone: reject (`CapacityExceeded`), no ticket consumed
//! 2. Take a backlog ticket without waiting, or reject
//! 3. Queue the ticket on the tenant without waiting, or reject and return it
//! 4. Wait for the first of: grant, backlog timeout, cancellation
//! 5. On grant, hand out an [`Admission`] that returns both slots on drop
//!
//! A waiter that gives up still has a grant coming. A repair task waits for
//! it, returns the in-flight slot, and only then returns the ticket.

mod backlog;
mod config;
mod dispatcher;
mod errors;
pub mod metric_definitions;
mod registry;
mod stats;


pub use config::{RetryAfterFn, ThrottleConfig};
pub use errors::{Rejection, ThrottleError, ThrottleResult};
pub use stats::{LoadStatus, TenantStats, ThrottleStats};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::tenant::TenantId;
use backlog::{BacklogPool, Ticket};
use metric_definitions::{QUEUE_WAIT, REASON_LABEL, REJECTED};
use registry::{TenantRecord, TenantRegistry};

/// Panic message prefix for slot accounting corruption
pub const ACCOUNTING_VIOLATION: &str = "ACCOUNTING_VIOLATION";

/// Slot accounting is corrupt and cannot be trusted for the rest of the process
pub(crate) fn accounting_violation(what: &str) -> ! {
    panic!("{}: {}", ACCOUNTING_VIOLATION, what)
}

/// Aborts the process if the owning task unwinds.
///
/// Held by background tasks (dispatchers and repairs) that have no caller to
/// surface a panic to. A panic there means slot accounting is corrupt, and a
/// dead dispatcher would leave its tenant queue stalled forever.
pub(crate) struct AbortOnUnwind {
    task: &'static str,
}

impl AbortOnUnwind {
    pub(crate) fn new(task: &'static str) -> Self {
        Self { task }
    }
}

impl Drop for AbortOnUnwind {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!(task = self.task, "throttle background task panicked, aborting");
            std::process::abort();
        }
    }
}

/// Permission to run one request. Carries nothing.
#[derive(Debug)]
pub struct Slot(());

impl Slot {
    pub(crate) fn new() -> Self {
        Slot(())
    }
}

struct Inner {
    config: ThrottleConfig,
    backlog: Arc<BacklogPool>,
    registry: TenantRegistry,
    retry_after: Option<RetryAfterFn>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.registry.close();
    }
}

/// Shared admission controller. Cheap to clone.
#[derive(Clone)]
pub struct Throttle {
    inner: Arc<Inner>,
}

impl Throttle {
    /// Validate `config` and bootstrap the global backlog pool.
    ///
    /// An error here is a startup failure, not a per-request condition.
    pub fn new(config: ThrottleConfig) -> ThrottleResult<Self> {
        let retry_after = config.retry_after_fn();
        Self::build(config, retry_after)
    }

    /// Like [`Throttle::new`], with a custom retry-after function taking
    /// precedence over `retry_after_secs`.
    pub fn with_retry_after(
        config: ThrottleConfig,
        retry_after: impl Fn(bool) -> Duration + Send + Sync + 'static,
    ) -> ThrottleResult<Self> {
        Self::build(config, Some(Arc::new(retry_after)))
    }

    fn build(config: ThrottleConfig, retry_after: Option<RetryAfterFn>) -> ThrottleResult<Self> {
        config.validate("").map_err(ThrottleError::InvalidConfig)?;

        let backlog = Arc::new(BacklogPool::new(config.backlog_limit));
        let registry = TenantRegistry::new(config.in_flight_per_tenant, config.backlog_per_tenant);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                backlog,
                registry,
                retry_after,
            }),
        })
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.inner.config
    }

    /// `Retry-After` hint for a rejection, if a retry-after function is configured
    pub fn retry_after(&self, rejection: Rejection) -> Option<Duration> {
        self.inner
            .retry_after
            .as_ref()
            .map(|f| f(rejection.context_done()))
    }

    /// Run the admission protocol for one request of `tenant`.
    ///
    /// `cancel` is the caller's context; dropping the returned future while it
    /// waits is treated the same as cancellation.
    pub async fn admit(
        &self,
        tenant: TenantId,
        cancel: Option<&CancellationToken>,
    ) -> Result<Admission, Rejection> {
        let started = Instant::now();

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(self.reject(tenant, Rejection::CapacityExceeded { context_done: true }));
        }

        let Some(ticket) = self.inner.backlog.try_acquire() else {
            return Err(self.reject(tenant, Rejection::CapacityExceeded { context_done: false }));
        };

        let deadline = started + self.inner.config.backlog_timeout();
        let record = self.inner.registry.get_or_create(tenant);

        if record.try_enqueue(ticket.grant_sender()).is_err() {
            self.inner.backlog.release(ticket);
            return Err(self.reject(tenant, Rejection::CapacityExceeded { context_done: false }));
        }

        let mut waiter = PendingWaiter {
            ticket: Some(ticket),
            record: Arc::clone(&record),
            backlog: Arc::clone(&self.inner.backlog),
        };

        let granted = tokio::select! {
            slot = waiter.wait_for_grant() => Ok(slot),
            _ = tokio::time::sleep_until(deadline) => Err(Rejection::Timeout),
            _ = cancelled(cancel) => Err(Rejection::ContextCanceled),
        };

        match granted {
            Ok(slot) => {
                let queue_wait = started.elapsed();
                histogram!(QUEUE_WAIT).record(queue_wait.as_secs_f64());
                debug!(
                    tenant_id = %tenant,
                    wait_ms = queue_wait.as_millis() as u64,
                    "throttle admitted request"
                );
                Ok(Admission {
                    slot: Some(slot),
                    ticket: waiter.disarm(),
                    record,
                    backlog: Arc::clone(&self.inner.backlog),
                    queue_wait,
                })
            }
            // Dropping the armed waiter starts the repair
            Err(rejection) => {
                drop(waiter);
                Err(self.reject(tenant, rejection))
            }
        }
    }

    fn reject(&self, tenant: TenantId, rejection: Rejection) -> Rejection {
        debug!(
            tenant_id = %tenant,
            reason = rejection.code(),
            "throttle rejected request"
        );
        counter!(REJECTED, REASON_LABEL => rejection.code()).increment(1);
        rejection
    }

    /// Snapshot of every pool
    pub fn stats(&self) -> ThrottleStats {
        ThrottleStats::new(
            self.inner.backlog.limit(),
            self.inner.backlog.available(),
            self.inner.registry.stats(),
        )
    }

    /// Snapshot of one tenant, `None` if it has never sent a request
    pub fn tenant_stats(&self, tenant: TenantId) -> Option<TenantStats> {
        self.inner.registry.get(tenant).map(|record| record.stats())
    }
}

impl fmt::Debug for Throttle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttle")
            .field("config", &self.inner.config)
            .field("tenants", &self.inner.registry.len())
            .field("backlog_available", &self.inner.backlog.available())
            .finish()
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// A queued request that has not been granted yet.
///
/// Dropping it while armed (timeout, cancellation, or the request future
/// itself being dropped) hands the ticket to a repair task.
struct PendingWaiter {
    ticket: Option<Ticket>,
    record: Arc<TenantRecord>,
    backlog: Arc<BacklogPool>,
}

impl PendingWaiter {
    async fn wait_for_grant(&mut self) -> Slot {
        match self.ticket.as_mut() {
            Some(ticket) => ticket.wait_for_grant().await,
            None => unreachable!("waiter polled after disarm"),
        }
    }

    fn disarm(mut self) -> Option<Ticket> {
        self.ticket.take()
    }
}

impl Drop for PendingWaiter {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };
        spawn_repair(ticket, Arc::clone(&self.record), Arc::clone(&self.backlog));
    }
}

/// Wait for the abandoned grant, return the in-flight slot, then the ticket.
///
/// Until this completes the ticket stays out of the backlog pool.
fn spawn_repair(mut ticket: Ticket, record: Arc<TenantRecord>, backlog: Arc<BacklogPool>) {
    let tenant = record.tenant();
    let repair = async move {
        let _guard = AbortOnUnwind::new("repair");
        let slot = ticket.wait_for_grant().await;
        record.release_slot(slot);
        backlog.release(ticket);
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(repair);
        }
        Err(_) => warn!(
            tenant_id = %tenant,
            "abandoned waiter outside a runtime, backlog ticket is lost"
        ),
    }
}

/// Admitted request. Returns its in-flight slot and backlog ticket on drop,
/// including during unwinding.
pub struct Admission {
    slot: Option<Slot>,
    ticket: Option<Ticket>,
    record: Arc<TenantRecord>,
    backlog: Arc<BacklogPool>,
    queue_wait: Duration,
}

impl Admission {
    pub fn tenant(&self) -> TenantId {
        self.record.tenant()
    }

    /// Time between arriving at the throttle and being granted
    pub fn queue_wait(&self) -> Duration {
        self.queue_wait
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.record.release_slot(slot);
        }
        if let Some(ticket) = self.ticket.take() {
            self.backlog.release(ticket);
        }
    }
}

impl fmt::Debug for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admission")
            .field("tenant", &self.record.tenant())
            .field("queue_wait", &self.queue_wait)
            .finish()
    }
}
