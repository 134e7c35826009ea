use std::fmt;
use std::str::FromStr;

use crate::error::NameError;

/// Namespace assumed when a name carries no `namespace:` prefix.
pub const DEFAULT_NAMESPACE: &str = "minecraft";

/// A `namespace:path` identifier, used for event phases and bus names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespacedName {
    namespace: String,
    path: String,
}

impl NamespacedName {
    pub fn new(namespace: &str, path: &str) -> Result<Self, NameError> {
        let input = format!("{namespace}:{path}");
        if !namespace.chars().all(is_namespace_char) {
            return Err(NameError {
                input,
                reason: "namespace may only contain [a-z0-9_.-]",
            });
        }
        if path.is_empty() {
            return Err(NameError {
                input,
                reason: "path is empty",
            });
        }
        if !path.chars().all(is_path_char) {
            return Err(NameError {
                input,
                reason: "path may only contain [a-z0-9_.-/]",
            });
        }

        Ok(Self {
            namespace: namespace.to_string(),
            path: path.to_string(),
        })
    }

    /// Parses `namespace:path`; a missing or empty namespace means [`DEFAULT_NAMESPACE`].
    pub fn parse(input: &str) -> Result<Self, NameError> {
        match input.split_once(':') {
            Some(("", path)) => Self::new(DEFAULT_NAMESPACE, path),
            Some((namespace, path)) => Self::new(namespace, path),
            None => Self::new(DEFAULT_NAMESPACE, input),
        }
        .map_err(|e| NameError {
            input: input.to_string(),
            reason: e.reason,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

impl FromStr for NamespacedName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_namespace_char(c: char) -> bool {
    matches!(c, 'a'..='z' | '0'..='9' | '_' | '.' | '-')
}

fn is_path_char(c: char) -> bool {
    is_namespace_char(c) || c == '/'
}
