use smsroute_common::TrafficClass;
use tokio::task::AbortHandle;

use super::{ConnectionId, DomainSelectionConnection, PendingQueue, PendingRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolderState {
    /// No connection, nothing requested, nothing queued.
    Idle,
    /// A decision is outstanding and requests may be queued behind it.
    Selecting,
}

#[derive(Debug)]
struct ActiveConnection {
    id: ConnectionId,
    connection: Box<dyn DomainSelectionConnection>,
    /// Task awaiting the connection's decision.
    waiter: Option<AbortHandle>,
}

/// Owns the single outstanding selection for one traffic class and the
/// requests queued behind it.
///
/// Only ever touched from the controller, so it needs no locking.
#[derive(Debug)]
pub struct ConnectionHolder {
    class: TrafficClass,
    active: Option<ActiveConnection>,
    requested: bool,
    pending: PendingQueue,
}

impl ConnectionHolder {
    #[must_use]
    pub fn new(class: TrafficClass) -> Self {
        Self {
            class,
            active: None,
            requested: false,
            pending: PendingQueue::new(),
        }
    }

    #[must_use]
    pub const fn class(&self) -> TrafficClass {
        self.class
    }

    #[must_use]
    pub const fn is_emergency(&self) -> bool {
        self.class.is_emergency()
    }

    #[must_use]
    pub fn get_connection(&self) -> Option<&dyn DomainSelectionConnection> {
        self.active.as_ref().map(|active| &*active.connection)
    }

    pub fn connection_mut(&mut self) -> Option<&mut (dyn DomainSelectionConnection + 'static)> {
        self.active.as_mut().map(|active| &mut *active.connection)
    }

    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.active.as_ref().map(|active| active.id)
    }

    /// Whether `id` names the connection currently held.
    #[must_use]
    pub fn is_current(&self, id: ConnectionId) -> bool {
        self.connection_id() == Some(id)
    }

    #[must_use]
    pub const fn is_domain_selection_requested(&self) -> bool {
        self.requested
    }

    #[must_use]
    pub const fn pending_requests(&self) -> &PendingQueue {
        &self.pending
    }

    #[must_use]
    pub const fn state(&self) -> HolderState {
        if self.requested {
            HolderState::Selecting
        } else {
            HolderState::Idle
        }
    }

    /// Take ownership of a fresh connection and enter `Selecting`.
    ///
    /// Any previous connection must have been cleared first.
    pub fn set_connection(&mut self, id: ConnectionId, connection: Box<dyn DomainSelectionConnection>) {
        debug_assert!(self.active.is_none(), "{} holder already has a connection", self.class);
        self.active = Some(ActiveConnection {
            id,
            connection,
            waiter: None,
        });
        self.requested = true;
    }

    /// Attach the task waiting on the current connection's decision. It is
    /// aborted when the holder is cleared.
    pub fn set_waiter(&mut self, waiter: AbortHandle) {
        match &mut self.active {
            Some(active) => active.waiter = Some(waiter),
            None => waiter.abort(),
        }
    }

    pub fn enqueue(&mut self, request: PendingRequest) {
        self.pending.push(request);
    }

    /// Remove the queued batch, oldest first.
    pub fn take_pending(&mut self) -> Vec<PendingRequest> {
        self.pending.take_all()
    }

    /// Tell the connection its decision has been consumed.
    pub fn finish(&mut self) {
        if let Some(active) = &mut self.active {
            active.connection.finish_selection();
        }
    }

    /// Drop the connection and return to `Idle`. The queue must already have
    /// been drained.
    pub fn clear(&mut self) {
        debug_assert!(
            self.pending.is_empty(),
            "{} holder cleared with {} queued requests",
            self.class,
            self.pending.len()
        );
        if let Some(waiter) = self.active.take().and_then(|active| active.waiter) {
            waiter.abort();
        }
        self.requested = false;
    }
}
