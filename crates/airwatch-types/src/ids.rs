//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Sessions and consumers get strongly-typed IDs so log lines and status
//! payloads can never confuse a merger session with a connected client.
//! All IDs use UUID v7 (time-ordered) so they sort by creation time.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Identifier for one merger session (backfill + live feed pair).
    SubscriptionId
}

define_id! {
    /// Identifier for a connected consumer (a `WebSocket` client or a
    /// density viewer).
    ConsumerId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let session = SubscriptionId::new();
        let consumer = ConsumerId::new();
        assert_ne!(session.into_inner(), Uuid::nil());
        assert_ne!(consumer.into_inner(), Uuid::nil());
    }

    #[test]
    fn ids_are_time_ordered() {
        let first = SubscriptionId::new();
        let second = SubscriptionId::new();
        assert!(first <= second);
    }

    #[test]
    fn id_display_matches_uuid() {
        let id = ConsumerId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }
}
