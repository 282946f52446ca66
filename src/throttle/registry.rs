//! # Tenant Registry
//!
//! Lazily created per-tenant admission state. The read path is a shared
//! lock and a map lookup; the write lock is only taken the first time a
//! tenant is seen, and the lookup is repeated under it so exactly one record
//! and one dispatcher exist per tenant.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{gauge, Gauge};
use parking_lot::RwLock;
use tracing::debug;

use super::backlog::GrantSender;
use super::metric_definitions::{IN_FLIGHT_QUEUE_SIZE, TENANT_LABEL};
use super::stats::TenantStats;
use super::{accounting_violation, dispatcher, Slot};
use crate::slot_queue::BoundedQueue;
use crate::tenant::TenantId;

/// Per-tenant in-flight pool and FIFO wait queue
pub(crate) struct TenantRecord {
    tenant: TenantId,
    in_flight: BoundedQueue<Slot>,
    wait_queue: BoundedQueue<GrantSender>,
    in_flight_gauge: Gauge,
}

impl TenantRecord {
    fn new(tenant: TenantId, in_flight_limit: usize, backlog_limit: usize) -> Self {
        let in_flight_gauge = gauge!(IN_FLIGHT_QUEUE_SIZE, TENANT_LABEL => tenant.to_string());
        in_flight_gauge.increment(in_flight_limit as f64);
        Self {
            tenant,
            in_flight: BoundedQueue::filled(in_flight_limit, Slot::new),
            wait_queue: BoundedQueue::new(backlog_limit),
            in_flight_gauge,
        }
    }

    pub(crate) fn tenant(&self) -> TenantId {
        self.tenant
    }

    /// Queue a waiter without blocking. Gives the sender back if the queue is full.
    pub(crate) fn try_enqueue(&self, waiter: GrantSender) -> Result<(), GrantSender> {
        self.wait_queue.try_push(waiter).map_err(|e| e.into_inner())
    }

    /// Next waiter in arrival order, `None` once the queue is closed and drained
    pub(crate) async fn next_waiter(&self) -> Option<GrantSender> {
        self.wait_queue.pop().await
    }

    /// Take a free in-flight slot, waiting for one to be returned
    pub(crate) async fn take_slot(&self) -> Slot {
        match self.in_flight.pop().await {
            Some(slot) => {
                self.in_flight_gauge.decrement(1.0);
                slot
            }
            // The in-flight pool is never closed
            None => unreachable!("in-flight pool closed"),
        }
    }

    /// Return an in-flight slot to the pool
    pub(crate) fn release_slot(&self, slot: Slot) {
        if self.in_flight.try_push(slot).is_err() {
            accounting_violation("in-flight pool overflowed");
        }
        self.in_flight_gauge.increment(1.0);
    }

    fn close(&self) {
        self.wait_queue.close();
    }

    pub(crate) fn stats(&self) -> TenantStats {
        TenantStats {
            tenant_id: self.tenant,
            in_flight_limit: self.in_flight.capacity(),
            in_flight_available: self.in_flight.len(),
            queued: self.wait_queue.len(),
        }
    }
}

/// Tenant ID to admission record map
pub(crate) struct TenantRegistry {
    records: RwLock<HashMap<TenantId, Arc<TenantRecord>>>,
    in_flight_limit: usize,
    backlog_limit: usize,
}

impl TenantRegistry {
    pub(crate) fn new(in_flight_limit: usize, backlog_limit: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            in_flight_limit,
            backlog_limit,
        }
    }

    /// Get the tenant's record, creating it and starting its dispatcher on first use.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn get_or_create(&self, tenant: TenantId) -> Arc<TenantRecord> {
        if let Some(record) = self.records.read().get(&tenant) {
            return Arc::clone(record);
        }

        let mut records = self.records.write();
        if let Some(record) = records.get(&tenant) {
            return Arc::clone(record);
        }

        let record = Arc::new(TenantRecord::new(
            tenant,
            self.in_flight_limit,
            self.backlog_limit,
        ));
        records.insert(tenant, Arc::clone(&record));
        tokio::spawn(dispatcher::run(Arc::clone(&record)));

        debug!(
            tenant_id = %tenant,
            in_flight_limit = self.in_flight_limit,
            backlog_limit = self.backlog_limit,
            "created tenant admission record"
        );

        record
    }

    pub(crate) fn get(&self, tenant: TenantId) -> Option<Arc<TenantRecord>> {
        self.records.read().get(&tenant).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.read().len()
    }

    pub(crate) fn stats(&self) -> Vec<TenantStats> {
        let mut stats: Vec<_> = self.records.read().values().map(|r| r.stats()).collect();
        stats.sort_by_key(|s| s.tenant_id);
        stats
    }

    /// Close every wait queue so dispatchers drain and exit
    pub(crate) fn close(&self) {
        for record in self.records.read().values() {
            record.close();
        }
    }
}
