//! Typed proxy data-plane records.
//!
//! # Data Flow
//! ```text
//! store bytes at /lds/<name> → decode.rs → ListenerSet (listener.rs)
//! store bytes at /cds/<name> → decode.rs → BackendSet  (backend.rs)
//! anything else              → decode.rs → Opaque(String)
//! ```
//!
//! # Design Decisions
//! - Records are JSON objects with PascalCase keys, every field optional
//! - `null` where a list or object is expected reads as the empty value
//! - Malformed bytes decode to the zero-valued record, never an error
//! - Small integer enums map unknown codes to their first variant

pub mod backend;
pub mod decode;
pub mod listener;

use serde::{Deserialize, Deserializer};

pub use backend::{BackendSet, Endpoint, Port};
pub use decode::{DecodedValue, Decoder};
pub use listener::{ListenerSet, RoutingRule};

/// Read `null` as `T::default()`.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Integer-coded enums on the wire.
macro_rules! int_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $first:ident = $first_code:literal $(, $variant:ident = $code:literal)* $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
        #[serde(from = "i32", into = "i32")]
        pub enum $name {
            #[default]
            $first,
            $($variant,)*
        }

        impl From<i32> for $name {
            fn from(code: i32) -> Self {
                match code {
                    $($code => $name::$variant,)*
                    _ => $name::$first,
                }
            }
        }

        impl From<$name> for i32 {
            fn from(value: $name) -> i32 {
                match value {
                    $name::$first => $first_code,
                    $($name::$variant => $code,)*
                }
            }
        }
    };
}

pub(crate) use int_enum;

int_enum! {
    /// Enabled/disabled flag where enabled is the zero value.
    pub enum YesOrNo { Yes = 0, No = -1 }
}

int_enum! {
    /// Boolean switch encoded as 0/1.
    pub enum TrueOrFalse { False = 0, True = 1 }
}

impl YesOrNo {
    pub fn is_yes(self) -> bool {
        self == YesOrNo::Yes
    }
}

impl TrueOrFalse {
    pub fn is_true(self) -> bool {
        self == TrueOrFalse::True
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_enum_codes() {
        assert_eq!(YesOrNo::from(-1), YesOrNo::No);
        assert_eq!(YesOrNo::from(0), YesOrNo::Yes);
        assert_eq!(YesOrNo::from(42), YesOrNo::Yes);
        assert_eq!(i32::from(YesOrNo::No), -1);
        assert_eq!(serde_json::to_string(&TrueOrFalse::True).unwrap(), "1");
        assert_eq!(
            serde_json::from_str::<TrueOrFalse>("1").unwrap(),
            TrueOrFalse::True
        );
    }
}
