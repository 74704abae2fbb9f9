//! Type-safe identifier wrappers around `u64`.
//!
//! Identifiers are handed out sequentially by the engine rather than drawn
//! at random, so two runs over the same plan produce the same ids and the
//! same ordering of simultaneous work.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around `u64` with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Return the inner `u64` value.
            pub const fn into_inner(self) -> u64 {
                self.0
            }

            /// Return the identifier that follows this one, saturating at
            /// `u64::MAX`.
            #[must_use]
            pub const fn next(self) -> Self {
                Self(self.0.saturating_add(1))
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a task owned by the simulation engine.
    TaskId
}

define_id! {
    /// Identifier of an activity as it appears in the submitted plan.
    ActivityDirectiveId
}

define_id! {
    /// Identifier of an activity instance created during simulation,
    /// including children spawned by other activities.
    ActivityInstanceId
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn next_is_sequential() {
        let id = TaskId(41);
        assert_eq!(id.next(), TaskId(42));
        assert_eq!(TaskId(u64::MAX).next(), TaskId(u64::MAX));
    }

    #[test]
    fn ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&ActivityDirectiveId(7)).unwrap();
        assert_eq!(json, "7");
        let back: ActivityDirectiveId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ActivityDirectiveId(7));
    }
}
