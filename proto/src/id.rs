use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::DecodeError;

/// Ids arrive as JSON strings from some services and as integers from others (the order API hands
/// out database row ids). Both are normalized to their decimal/string form.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(PartialEq, Eq, Hash, Clone, Ord, PartialOrd)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Result<Self, DecodeError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(DecodeError::InvalidId(format!("empty {}", stringify!($name))));
                }
                Ok(Self(id))
            }

            pub fn as_str(&self) -> &str { &self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}({})", stringify!($name), self.0) }
        }

        impl TryFrom<&str> for $name {
            type Error = DecodeError;
            fn try_from(id: &str) -> Result<Self, Self::Error> { Self::new(id) }
        }

        impl TryFrom<String> for $name {
            type Error = DecodeError;
            fn try_from(id: String) -> Result<Self, Self::Error> { Self::new(id) }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self { Self(id.to_string()) }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> { serializer.serialize_str(&self.0) }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                match RawId::deserialize(deserializer)? {
                    RawId::Text(text) => Self::new(text).map_err(serde::de::Error::custom),
                    RawId::Number(n) => Ok(Self::from(n)),
                }
            }
        }
    };
}

string_id!(
    /// Stable identifier of an order, assigned by the order service
    OrderId
);

string_id!(
    /// Identifier of a cart line. Lines are keyed by the product they hold.
    ItemId
);
