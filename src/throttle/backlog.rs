//! Global backlog pool
//!
//! A fixed set of reusable tickets shared by every tenant. Holding a ticket
//! means the request counts against the process-wide backlog, from the moment
//! it is accepted until its in-flight slot (or its abandoned grant) is returned.

use metrics::{gauge, Gauge};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::metric_definitions::BACKLOG_QUEUE_SIZE;
use super::{accounting_violation, Slot};
use crate::slot_queue::BoundedQueue;

/// Reusable queued-request descriptor.
///
/// The ticket owns both ends of a single-slot grant channel. The sending end
/// is cloned into a tenant wait queue; the dispatcher uses it to hand over
/// exactly one in-flight slot per enqueue.
pub(crate) struct Ticket {
    grant_tx: mpsc::Sender<Slot>,
    grant_rx: mpsc::Receiver<Slot>,
}

impl Ticket {
    fn new() -> Self {
        let (grant_tx, grant_rx) = mpsc::channel(1);
        Self { grant_tx, grant_rx }
    }

    pub(crate) fn grant_sender(&self) -> GrantSender {
        GrantSender(self.grant_tx.clone())
    }

    /// Wait for the dispatcher's grant. Cancel safe.
    pub(crate) async fn wait_for_grant(&mut self) -> Slot {
        match self.grant_rx.recv().await {
            Some(slot) => slot,
            // The ticket keeps its own sender alive, so the channel never closes
            None => unreachable!("ticket grant channel closed"),
        }
    }
}

/// Handle the dispatcher uses to grant a slot to one waiting ticket
pub(crate) struct GrantSender(mpsc::Sender<Slot>);

impl GrantSender {
    /// Hand over a slot. Gives it back if the ticket no longer exists.
    pub(crate) fn grant(self, slot: Slot) -> Result<(), Slot> {
        match self.0.try_send(slot) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(slot)) => Err(slot),
            Err(TrySendError::Full(_)) => {
                accounting_violation("ticket granted twice without being consumed")
            }
        }
    }
}

pub(crate) struct BacklogPool {
    tickets: BoundedQueue<Ticket>,
    gauge: Gauge,
}

impl BacklogPool {
    /// Bootstrap the pool with exactly `limit` tickets
    pub(crate) fn new(limit: usize) -> Self {
        let gauge = gauge!(BACKLOG_QUEUE_SIZE);
        gauge.increment(limit as f64);
        Self {
            tickets: BoundedQueue::filled(limit, Ticket::new),
            gauge,
        }
    }

    /// Take a ticket without waiting
    pub(crate) fn try_acquire(&self) -> Option<Ticket> {
        let ticket = self.tickets.try_pop()?;
        self.gauge.decrement(1.0);
        Some(ticket)
    }

    /// Return a ticket. The pool is exactly sized, so this never waits.
    pub(crate) fn release(&self, ticket: Ticket) {
        if self.tickets.try_push(ticket).is_err() {
            accounting_violation("backlog pool overflowed");
        }
        self.gauge.increment(1.0);
    }

    pub(crate) fn limit(&self) -> usize {
        self.tickets.capacity()
    }

    pub(crate) fn available(&self) -> usize {
        self.tickets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_fills_pool() {
        let pool = BacklogPool::new(3);
        assert_eq!(pool.limit(), 3);
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn test_acquire_until_empty() {
        let pool = BacklogPool::new(2);
        let a = pool.try_acquire().unwrap();
        let _b = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_none());

        pool.release(a);
        assert_eq!(pool.available(), 1);
        assert!(pool.try_acquire().is_some());
    }

    #[test]
    #[should_panic(expected = "ACCOUNTING_VIOLATION")]
    fn test_release_into_full_pool_panics() {
        let pool = BacklogPool::new(1);
        pool.release(Ticket::new());
    }

    #[tokio::test]
    async fn test_ticket_is_reusable() {
        let mut ticket = Ticket::new();
        for _ in 0..3 {
            ticket.grant_sender().grant(Slot::new()).ok().unwrap();
            let _slot = ticket.wait_for_grant().await;
        }
    }

    #[test]
    #[should_panic(expected = "ACCOUNTING_VIOLATION")]
    fn test_double_grant_panics() {
        let ticket = Ticket::new();
        ticket.grant_sender().grant(Slot::new()).ok().unwrap();
        let _ = ticket.grant_sender().grant(Slot::new());
    }

    #[test]
    fn test_grant_to_dropped_ticket_returns_slot() {
        let ticket = Ticket::new();
        let sender = ticket.grant_sender();
        drop(ticket);
        assert!(sender.grant(Slot::new()).is_err());
    }
}
