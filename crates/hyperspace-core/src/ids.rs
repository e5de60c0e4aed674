//! 64-bit identifiers for sessions, handles, and events.
//!
//! The source system allocates each of these from a persisted counter so
//! that the namespace survives a server restart without reusing an id.
//! The newtypes here carry no allocation logic of their own -- that lives
//! in `hyperspace-storage`, which is the only place with access to the
//! durable counter.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl $name {
            /// Build an id from a raw value. Used when decoding from the wire
            /// or from storage; application code should otherwise treat ids
            /// as opaque.
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw numeric value.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

id_newtype!(SessionId, "A session identifier allocated at `create_session`.");
id_newtype!(HandleId, "A handle identifier allocated at `open`.");
id_newtype!(EventId, "A monotonically assigned event identifier.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_roundtrip_through_display_and_raw() {
        let id = SessionId::new(42);
        assert_eq!(id.get(), 42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(SessionId::from(42u64), id);
    }

    #[test]
    fn ids_serialize_as_numbers() {
        let id = HandleId::new(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "7");
    }
}
