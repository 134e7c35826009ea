//! # event-scanner
//!
//! Finds annotated event listeners and bus events in compiled JVM classes
//! without loading them, and binds what it finds into phase-ordered events.
//!
//! ## Architecture
//!
//! - **classfile**: class-file reader that replays annotations into a visitor
//! - **descriptor**: field and method descriptors, internal and binary names
//! - **ident**: `namespace:path` names for phases and buses
//! - **markers**: the recognized annotations and their defaults
//! - **scanner**: per-class visitor producing handles and companion hints
//! - **source**: directory and jar roots, class lookup by name
//! - **modscan**: per-mod two-pass scans, multi-mod scans, `ScanResult`
//! - **key** / **handle**: event keys and the lazily resolved handles
//! - **runtime**: host class model that handles bind against
//! - **event**: phased events and event buses
//! - **config**: `common-events.json` descriptors and scan settings

pub mod classfile;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod handle;
pub mod ident;
pub mod key;
pub mod markers;
pub mod modscan;
pub mod runtime;
pub mod scanner;
pub mod source;

#[cfg(test)]
#[path = "../tests/support/classgen.rs"]
mod classgen;
