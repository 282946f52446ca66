//! Per-tenant dispatcher
//!
//! Moves queued requests into the tenant's in-flight pool strictly in
//! enqueue order. Taking the in-flight slot is the rate-limiting step: while
//! every slot is held the dispatcher parks with the next waiter in hand.

use std::sync::Arc;

use tracing::debug;

use super::registry::TenantRecord;
use super::AbortOnUnwind;

pub(crate) async fn run(record: Arc<TenantRecord>) {
    let _guard = AbortOnUnwind::new("dispatcher");
    while let Some(waiter) = record.next_waiter().await {
        let slot = record.take_slot().await;
        if let Err(slot) = waiter.grant(slot) {
            // Ticket is gone (throttle torn down); nobody can return this slot
            record.release_slot(slot);
        }
    }

    debug!(tenant_id = %record.tenant(), "tenant request queue closed, dispatcher exiting");
}
