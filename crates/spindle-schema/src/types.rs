//! Newtype wrappers for string identifiers used across pipeline runs.
//!
//! All newtypes serialize/deserialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Device identifier as understood by the disc tools (`/dev/sr0`, `1,0,0`, ...).
    DeviceId
);

string_newtype!(
    /// 12-character hex identifier of one pipeline run.
    RunId
);

impl DeviceId {
    /// Filesystem-safe form of the identifier, used to name per-device lock files.
    pub fn lock_name(&self) -> String {
        self.0
            .trim_start_matches('/')
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_display_and_as_ref() {
        let id = DeviceId::new("/dev/sr0");
        assert_eq!(id.to_string(), "/dev/sr0");
        assert_eq!(id.as_str(), "/dev/sr0");
        assert_eq!(AsRef::<str>::as_ref(&id), "/dev/sr0");
    }

    #[test]
    fn run_id_serde_roundtrip() {
        let id = RunId::new("deadbeef0123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"deadbeef0123\"");
        let back: RunId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn lock_name_is_filesystem_safe() {
        assert_eq!(DeviceId::new("/dev/sr0").lock_name(), "dev_sr0");
        assert_eq!(DeviceId::new("1,0,0").lock_name(), "1_0_0");
    }
}
