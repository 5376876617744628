//! Newtype wrappers for part and plugin names.
//!
//! Both serialize/deserialize as plain strings so they can appear directly in
//! persisted state and project files.

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
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

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

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
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
    /// Unique name of a declared part.
    PartName
);

string_newtype!(
    /// Registry key selecting the plugin that pulls and builds a part.
    PluginName
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_name_display_and_compare() {
        let name = PartName::new("bundle");
        assert_eq!(name.to_string(), "bundle");
        assert_eq!(name, "bundle");
        assert_eq!(name.as_str(), "bundle");
    }

    #[test]
    fn plugin_name_serializes_as_plain_string() {
        let name = PluginName::from("dump");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"dump\"");
        let back: PluginName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }

    #[test]
    fn names_order_lexicographically() {
        let mut names = vec![PartName::from("b"), PartName::from("a")];
        names.sort();
        assert_eq!(names[0], "a");
    }
}
