//! Error types shared across the crate.
//!
//! Scan-time problems are logged and skipped; only the lazy resolution paths
//! ([`ResolveError`]) and event construction ([`EventError`]) hand errors back
//! to the caller.

use thiserror::Error;

use crate::ident::NamespacedName;

/// A class file that could not be decoded.
#[derive(Debug, Error)]
pub enum ClassFormatError {
    #[error("unexpected end of class data at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),

    #[error("constant pool index {0} is out of range or unusable")]
    BadConstantIndex(u16),

    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag { tag: u8, index: u16 },

    #[error("wide constant at index {0} has no room for its second slot")]
    TruncatedWideConstant(u16),

    #[error("constant pool entry {index} is not a {expected}")]
    WrongConstantKind { index: u16, expected: &'static str },

    #[error("unknown annotation element tag '{0}'")]
    BadElementTag(char),

    #[error("malformed descriptor '{0}'")]
    BadDescriptor(String),

    #[error("annotation values nested deeper than {0} levels")]
    TooDeep(usize),
}

/// A namespaced name that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid namespaced name '{input}': {reason}")]
pub struct NameError {
    pub input: String,
    pub reason: &'static str,
}

/// Failure to materialize a callback or read a bus event from the host runtime.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("class {0} is not known to the class loader")]
    ClassNotFound(String),

    #[error("{class} has no {kind} method {name}{descriptor}")]
    MethodNotFound {
        class: String,
        name: String,
        descriptor: String,
        kind: &'static str,
    },

    #[error("{class} has no singleton instance but has the non-static listener method {method}")]
    MissingSingleton { class: String, method: String },

    #[error("{class} has no field named {field}")]
    FieldNotFound { class: String, field: String },

    #[error("bus event field {class}.{field} has not been initialized")]
    UninitializedField { class: String, field: String },

    #[error("bus event property {class}.{field} is not located in an object or companion object")]
    MissingHolderInstance { class: String, field: String },
}

/// Misuse of the event phase API.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("event phases must contain the default phase {0}")]
    MissingDefaultPhase(NamespacedName),

    #[error("duplicate event phase {0}")]
    DuplicatePhase(NamespacedName),

    #[error("phase {0} cannot be ordered relative to itself")]
    SelfOrdering(NamespacedName),
}
