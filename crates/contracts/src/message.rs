//! Inter-instance messages and the orphan report.

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;
use thiserror::Error;

use crate::InstanceId;

/// One message routed between two instances
///
/// Immutable once framed; ownership moves from the sender's decoder to the
/// destination's mailbox and then to the destination itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sender ID
    pub from: InstanceId,
    /// Destination ID
    pub to: InstanceId,
    /// Opaque payload
    pub payload: Bytes,
}

impl Message {
    pub fn new(from: InstanceId, to: InstanceId, payload: impl Into<Bytes>) -> Self {
        Self {
            from,
            to,
            payload: payload.into(),
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Messages left in mailboxes after every instance terminated
///
/// Non-fatal: the caller decides whether to print it as a warning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{} message(s) remained unreceived after their destinations terminated", .messages.len())]
pub struct RemainingMessages {
    messages: Vec<Message>,
}

impl RemainingMessages {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// The orphaned messages themselves
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Unique `(from, to)` pairs, ascending
    pub fn pairs(&self) -> Vec<(InstanceId, InstanceId)> {
        self.messages
            .iter()
            .map(|m| (m.from, m.to))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Destination -> unique senders whose messages it never consumed
    pub fn by_destination(&self) -> BTreeMap<InstanceId, Vec<InstanceId>> {
        let mut grouped: BTreeMap<InstanceId, Vec<InstanceId>> = BTreeMap::new();
        for (from, to) in self.pairs() {
            grouped.entry(to).or_default().push(from);
        }
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs_are_unique() {
        let remaining = RemainingMessages::new(vec![
            Message::new(0, 2, "a"),
            Message::new(0, 2, "b"),
            Message::new(1, 2, "c"),
        ]);
        assert_eq!(remaining.len(), 3);
        assert_eq!(remaining.pairs(), vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn test_group_by_destination() {
        let remaining = RemainingMessages::new(vec![
            Message::new(3, 0, "x"),
            Message::new(1, 2, "y"),
            Message::new(0, 2, "z"),
        ]);
        let grouped = remaining.by_destination();
        assert_eq!(grouped[&0], vec![3]);
        assert_eq!(grouped[&2], vec![0, 1]);
    }

    #[test]
    fn test_empty_report() {
        let remaining = RemainingMessages::default();
        assert!(remaining.is_empty());
        assert!(remaining.by_destination().is_empty());
    }
}
