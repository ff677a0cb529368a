use std::collections::VecDeque;

use tokio::time::Instant;

use crate::{tracker::MessageTracker, types::RequestKind};

/// A request waiting on a domain decision.
#[derive(Debug)]
pub struct PendingRequest {
    pub kind: RequestKind,
    pub tracker: MessageTracker,
    pub queued_at: Instant,
}

impl PendingRequest {
    #[must_use]
    pub fn new(kind: RequestKind, tracker: MessageTracker) -> Self {
        Self {
            kind,
            tracker,
            queued_at: Instant::now(),
        }
    }
}

/// FIFO of requests for one traffic class.
#[derive(Debug, Default)]
pub struct PendingQueue {
    requests: VecDeque<PendingRequest>,
}

impl PendingQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: PendingRequest) {
        self.requests.push_back(request);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Queued requests in enqueue order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingRequest> {
        self.requests.iter()
    }

    /// Remove every request, oldest first. Each request leaves the queue
    /// exactly once.
    pub fn take_all(&mut self) -> Vec<PendingRequest> {
        std::mem::take(&mut self.requests).into()
    }
}
