//! Namespaced resource identifiers
//!
//! Every sound event and every audio file is addressed by a `namespace:path`
//! pair. A bare `path` falls back to [`DEFAULT_NAMESPACE`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Namespace used when an identifier omits one
pub const DEFAULT_NAMESPACE: &str = "chirp";

/// Namespaced identifier of a sound event or audio resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceLocation {
    namespace: String,
    path: String,
}

impl ResourceLocation {
    /// Build a location from its parts, validating both.
    pub fn new(namespace: impl Into<String>, path: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let path = path.into();

        if namespace.is_empty() || !namespace.chars().all(is_valid_namespace_char) {
            return Err(Error::InvalidLocation(
                format!("{}:{}", namespace, path),
                "namespace must be non-empty [a-z0-9_.-]".to_string(),
            ));
        }
        if path.is_empty() || !path.chars().all(is_valid_path_char) {
            return Err(Error::InvalidLocation(
                format!("{}:{}", namespace, path),
                "path must be non-empty [a-z0-9_.-/]".to_string(),
            ));
        }

        Ok(Self { namespace, path })
    }

    /// Location built from compile-time constants known to be valid.
    pub(crate) fn builtin(namespace: &'static str, path: &'static str) -> Self {
        Self {
            namespace: namespace.to_string(),
            path: path.to_string(),
        }
    }

    /// Parse `text`, resolving a missing namespace to `default_namespace`.
    pub fn parse_with_default(text: &str, default_namespace: &str) -> Result<Self> {
        match text.split_once(':') {
            Some((namespace, path)) => Self::new(namespace, path),
            None => Self::new(default_namespace, text),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Same namespace, path rewritten by `f`.
    pub fn with_path(&self, f: impl FnOnce(&str) -> String) -> Self {
        Self {
            namespace: self.namespace.clone(),
            path: f(&self.path),
        }
    }
}

fn is_valid_namespace_char(c: char) -> bool {
    matches!(c, 'a'..='z' | '0'..='9' | '_' | '.' | '-')
}

fn is_valid_path_char(c: char) -> bool {
    is_valid_namespace_char(c) || c == '/'
}

impl FromStr for ResourceLocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_with_default(s, DEFAULT_NAMESPACE)
    }
}

impl TryFrom<String> for ResourceLocation {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ResourceLocation> for String {
    fn from(value: ResourceLocation) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}
