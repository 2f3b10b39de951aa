//! Per-instance inbound message queue.
//!
//! One FIFO per source keeps pairwise order; an arrival sequence number
//! shared by all sources of the mailbox decides "receive from any".

use std::collections::VecDeque;
use std::fmt;

use contracts::{InstanceId, Message};

/// Source filter of a receive request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Any,
    From(InstanceId),
}

impl Source {
    pub fn matches(&self, from: InstanceId) -> bool {
        match self {
            Source::Any => true,
            Source::From(source) => *source == from,
        }
    }
}

impl From<Option<InstanceId>> for Source {
    fn from(source: Option<InstanceId>) -> Self {
        source.map_or(Source::Any, Source::From)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Any => f.write_str("any"),
            Source::From(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug)]
struct Queued {
    seq: u64,
    message: Message,
}

/// Messages waiting for one destination
#[derive(Debug)]
pub struct Mailbox {
    queues: Vec<VecDeque<Queued>>,
    next_seq: u64,
    len: usize,
}

impl Mailbox {
    pub fn new(instances: usize) -> Self {
        Self {
            queues: (0..instances).map(|_| VecDeque::new()).collect(),
            next_seq: 0,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Queue `message` behind everything its sender queued before
    pub fn push(&mut self, message: Message) {
        let source = message.from as usize;
        if source >= self.queues.len() {
            self.queues.resize_with(source + 1, VecDeque::new);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.len += 1;
        self.queues[source].push_back(Queued { seq, message });
    }

    /// Whether a receive for `source` would be answered right away
    pub fn has_match(&self, source: Source) -> bool {
        self.pick(source).is_some()
    }

    /// Take the message a receive for `source` is answered with
    ///
    /// For [`Source::Any`] that is the earliest arrival across all sources.
    pub fn take(&mut self, source: Source) -> Option<Message> {
        let index = self.pick(source)?;
        let queued = self.queues[index].pop_front()?;
        self.len -= 1;
        Some(queued.message)
    }

    fn pick(&self, source: Source) -> Option<usize> {
        match source {
            Source::From(from) => {
                let index = from as usize;
                self.queues
                    .get(index)
                    .filter(|queue| !queue.is_empty())
                    .map(|_| index)
            }
            Source::Any => self
                .queues
                .iter()
                .enumerate()
                .filter_map(|(index, queue)| queue.front().map(|q| (q.seq, index)))
                .min()
                .map(|(_, index)| index),
        }
    }

    /// Remove everything left, in arrival order
    pub fn drain(&mut self) -> Vec<Message> {
        let mut left: Vec<Queued> = self.queues.iter_mut().flat_map(|q| q.drain(..)).collect();
        left.sort_by_key(|queued| queued.seq);
        self.len = 0;
        left.into_iter().map(|queued| queued.message).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(from: InstanceId, payload: &'static str) -> Message {
        Message::new(from, 9, payload)
    }

    #[test]
    fn test_pairwise_fifo() {
        let mut mailbox = Mailbox::new(3);
        mailbox.push(msg(1, "m1"));
        mailbox.push(msg(1, "m2"));

        assert_eq!(mailbox.take(Source::From(1)).unwrap().payload, "m1");
        assert_eq!(mailbox.take(Source::From(1)).unwrap().payload, "m2");
        assert!(mailbox.take(Source::From(1)).is_none());
    }

    #[test]
    fn test_any_takes_earliest_arrival() {
        let mut mailbox = Mailbox::new(3);
        mailbox.push(msg(2, "first"));
        mailbox.push(msg(0, "second"));
        mailbox.push(msg(2, "third"));

        assert_eq!(mailbox.take(Source::Any).unwrap().payload, "first");
        assert_eq!(mailbox.take(Source::Any).unwrap().payload, "second");
        assert_eq!(mailbox.take(Source::Any).unwrap().payload, "third");
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_specific_source_skips_others() {
        let mut mailbox = Mailbox::new(3);
        mailbox.push(msg(0, "a"));
        mailbox.push(msg(1, "b"));

        assert!(!mailbox.has_match(Source::From(2)));
        assert_eq!(mailbox.take(Source::From(1)).unwrap().payload, "b");
        assert_eq!(mailbox.len(), 1);
    }

    #[test]
    fn test_drain_in_arrival_order() {
        let mut mailbox = Mailbox::new(2);
        mailbox.push(msg(1, "x"));
        mailbox.push(msg(0, "y"));
        mailbox.push(msg(1, "z"));

        let left: Vec<_> = mailbox.drain().into_iter().map(|m| m.payload).collect();
        assert_eq!(left, ["x", "y", "z"]);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_source_conversion() {
        assert_eq!(Source::from(None), Source::Any);
        assert_eq!(Source::from(Some(4)), Source::From(4));
        assert!(Source::Any.matches(7));
        assert!(!Source::From(1).matches(2));
    }
}
