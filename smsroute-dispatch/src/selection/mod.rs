//! Domain selection: the external resolver contract and the per traffic
//! class bookkeeping that keeps at most one decision outstanding.

mod holder;
mod pending;

use std::fmt::{self, Debug, Display};

use futures_util::future::BoxFuture;
use serde::Serialize;
use smsroute_common::{Domain, TrafficClass, incoming};
use tokio::sync::mpsc;

pub use holder::{ConnectionHolder, HolderState};
pub use pending::{PendingQueue, PendingRequest};

use crate::{command::Command, error::SelectionError};

/// Identifies one connection handed out by a resolver.
///
/// Completions and terminations carry the id of the connection they were
/// issued for so late callbacks for a replaced connection can be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(u64);

impl ConnectionId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorType {
    Call,
    Sms,
}

/// What the resolver is told about the request that opened a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionAttributes {
    pub selector_type: SelectorType,
    pub is_emergency: bool,
    pub destination: String,
    pub message_id: u64,
}

/// Resolves to the domain the queued messages should use.
pub type SelectionFuture = BoxFuture<'static, Result<Domain, SelectionError>>;

/// Hands out selection connections. Treated as a black box.
pub trait DomainSelectionResolver: Send + Sync + Debug {
    /// `None` when no connection can be constructed right now.
    fn get_connection(
        &self,
        selector_type: SelectorType,
        is_emergency: bool,
    ) -> Option<Box<dyn DomainSelectionConnection>>;
}

/// One selection conversation with the resolver.
pub trait DomainSelectionConnection: Send + Debug {
    /// Start the decision. `None` means the request could not be issued.
    fn request_domain_selection(
        &mut self,
        attributes: SelectionAttributes,
        callback: SelectionCallback,
    ) -> Option<SelectionFuture>;

    /// Called once the decision has been consumed. Not called after a
    /// termination.
    fn finish_selection(&mut self);
}

/// Termination handle given to a connection alongside the request.
///
/// Termination is posted onto the controller's command queue, so it is
/// serialized with the completion of the same connection.
#[derive(Debug, Clone)]
pub struct SelectionCallback {
    commands: mpsc::UnboundedSender<Command>,
    class: TrafficClass,
    connection: ConnectionId,
}

impl SelectionCallback {
    pub(crate) const fn new(
        commands: mpsc::UnboundedSender<Command>,
        class: TrafficClass,
        connection: ConnectionId,
    ) -> Self {
        Self {
            commands,
            class,
            connection,
        }
    }

    #[must_use]
    pub const fn connection(&self) -> ConnectionId {
        self.connection
    }

    #[must_use]
    pub const fn class(&self) -> TrafficClass {
        self.class
    }

    /// The resolver aborted the decision before completing it.
    pub fn on_selection_terminated(&self, cause: u32) {
        incoming!(
            level = DEBUG,
            class = %self.class,
            connection = %self.connection,
            cause,
            "Domain selection terminated"
        );

        let command = Command::SelectionTerminated {
            class: self.class,
            connection: self.connection,
            cause,
        };
        if self.commands.send(command).is_err() {
            tracing::warn!(
                connection = %self.connection,
                "Dispatch controller is gone, termination dropped"
            );
        }
    }
}
