//! Typed event channels and the type-erased events that travel on them.

use core::any::Any;
use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Process-wide source of topic identities.
static NEXT_TOPIC: AtomicU64 = AtomicU64::new(1);

/// Untyped identity of a [`Topic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(u64);

impl TopicId {
    /// Return the inner `u64` value.
    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "topic#{}", self.0)
    }
}

/// A channel for events of type `E`.
///
/// Every call to [`Topic::new`] produces a distinct identity, so two topics
/// carrying the same event type are still separate channels. Copies of a
/// topic share its identity.
pub struct Topic<E> {
    id: TopicId,
    _events: PhantomData<fn() -> E>,
}

impl<E> Topic<E> {
    /// Create a fresh topic.
    pub fn new() -> Self {
        Self {
            id: TopicId(NEXT_TOPIC.fetch_add(1, Ordering::Relaxed)),
            _events: PhantomData,
        }
    }

    /// Identity of this topic.
    pub const fn id(&self) -> TopicId {
        self.id
    }
}

impl<E> Default for Topic<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Topic<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Topic<E> {}

impl<E> PartialEq for Topic<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<E> Eq for Topic<E> {}

impl<E> fmt::Debug for Topic<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Topic").field(&self.id.0).finish()
    }
}

/// An event tagged with the topic it was emitted on.
///
/// The payload is type-erased; only a holder of the matching [`Topic`] can
/// read it back.
#[derive(Clone)]
pub struct Event {
    topic: TopicId,
    payload: Arc<dyn Any + Send + Sync>,
}

impl Event {
    /// Wrap `value` as an event on `topic`.
    pub fn new<E: Send + Sync + 'static>(topic: &Topic<E>, value: E) -> Self {
        Self {
            topic: topic.id,
            payload: Arc::new(value),
        }
    }

    /// The topic this event was emitted on.
    pub const fn topic(&self) -> TopicId {
        self.topic
    }

    /// The payload, if this event was emitted on `topic`.
    pub fn extract<E: 'static>(&self, topic: &Topic<E>) -> Option<&E> {
        if self.topic == topic.id {
            self.payload.downcast_ref::<E>()
        } else {
            None
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event").field("topic", &self.topic.0).finish_non_exhaustive()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.topic)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_distinct_even_for_same_type() {
        let a: Topic<i64> = Topic::new();
        let b: Topic<i64> = Topic::new();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn extract_requires_matching_topic() {
        let a: Topic<i64> = Topic::new();
        let b: Topic<i64> = Topic::new();
        let event = Event::new(&a, 5);
        assert_eq!(event.extract(&a), Some(&5));
        assert_eq!(event.extract(&b), None);
    }
}
