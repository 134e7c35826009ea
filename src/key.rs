use std::fmt;

use crate::descriptor::JavaType;
use crate::markers::DEFAULT_QUALIFIER;

/// Identifies one logical event stream: the callback interface plus a qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub callback_type: JavaType,
    pub qualifier: String,
}

impl EventKey {
    pub fn new(callback_type: JavaType, qualifier: impl Into<String>) -> Self {
        Self {
            callback_type,
            qualifier: qualifier.into(),
        }
    }

    pub fn with_default_qualifier(callback_type: JavaType) -> Self {
        Self::new(callback_type, DEFAULT_QUALIFIER)
    }

    /// Key for a callback interface given by internal name.
    pub fn of(internal_name: &str, qualifier: impl Into<String>) -> Self {
        Self::new(JavaType::object(internal_name), qualifier)
    }

    pub fn has_default_qualifier(&self) -> bool {
        self.qualifier == DEFAULT_QUALIFIER
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match &self.callback_type {
            JavaType::Object(internal) => internal.clone(),
            other => other.to_string(),
        };
        if self.has_default_qualifier() {
            f.write_str(&name)
        } else {
            write!(f, "({name}|{})", self.qualifier)
        }
    }
}
