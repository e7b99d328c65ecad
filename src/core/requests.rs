// src/core/requests.rs
use std::collections::HashMap;

/// Everything the engine fetches; one outstanding ticket per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Tokens,
    Credits,
    WalletBalance,
    OpenOrders,
    PriceHistory,
    Transactions,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub kind: RequestKind,
    pub seq: u64,
}

/// Hands out tickets and remembers the newest per kind, so an older response
/// that resolves late can be told apart and dropped.
#[derive(Debug, Default)]
pub struct RequestTracker {
    next_seq: u64,
    latest: HashMap<RequestKind, u64>,
}

impl RequestTracker {
    pub fn issue(&mut self, kind: RequestKind) -> Ticket {
        self.next_seq += 1;
        self.latest.insert(kind, self.next_seq);
        Ticket {
            kind,
            seq: self.next_seq,
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.latest.get(&ticket.kind) == Some(&ticket.seq)
    }

    /// Marks the ticket as answered. Returns false for stale tickets.
    pub fn settle(&mut self, ticket: &Ticket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.latest.remove(&ticket.kind);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_ticket_makes_older_stale() {
        let mut tracker = RequestTracker::default();
        let first = tracker.issue(RequestKind::Credits);
        let second = tracker.issue(RequestKind::Credits);
        assert!(!tracker.settle(&first));
        assert!(tracker.settle(&second));
        assert!(!tracker.is_current(&second));
    }

    #[test]
    fn kinds_are_independent() {
        let mut tracker = RequestTracker::default();
        let credits = tracker.issue(RequestKind::Credits);
        let orders = tracker.issue(RequestKind::OpenOrders);
        assert!(tracker.is_current(&credits));
        assert!(tracker.settle(&orders));
        assert!(tracker.settle(&credits));
    }

    #[test]
    fn ticket_settles_once() {
        let mut tracker = RequestTracker::default();
        let t = tracker.issue(RequestKind::Settings);
        assert!(tracker.settle(&t));
        assert!(!tracker.settle(&t));
    }
}
