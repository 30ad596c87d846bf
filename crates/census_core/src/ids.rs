use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Server-assigned identifier of one import batch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ImportId(pub i32);

/// Caller-assigned citizen identifier, unique only within one import.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CitizenId(pub i64);

/// Storage-assigned surrogate key of a citizen row. Edges reference rows, never
/// caller ids, so reused citizen ids in different imports cannot collide.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RowId(pub i32);

macro_rules! id_wrapper {
    ($name:ident, $inner:ty) => {
        impl $name {
            pub fn get(self) -> $inner {
                self.0
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                self.0.serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                Ok(Self(<$inner>::deserialize(deserializer)?))
            }
        }
    };
}

id_wrapper!(ImportId, i32);
id_wrapper!(CitizenId, i64);
id_wrapper!(RowId, i32);
