use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::Path;
use tracing::{debug, warn};

use crate::modscan::{DEFAULT_MULTI_THREAD_THRESHOLD, ModSource, ScanScope};
use crate::source::ModRoot;

/// The file a mod ships at one of its roots to opt into scanning.
pub const MOD_DESCRIPTOR_FILE: &str = "common-events.json";

pub const MULTI_THREAD_THRESHOLD_ENV: &str = "EVENT_SCANNER_SCAN_MULTI_THREAD_THRESHOLD";

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    #[serde(default)]
    scan: Option<serde_json::Value>,
    #[serde(default)]
    mod_ids: Vec<String>,
}

/// A parsed `common-events.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModDescriptor {
    /// `None` when the mod does not ask to be scanned.
    pub scope: Option<ScanScope>,
    pub mod_ids: Vec<String>,
}

impl ModDescriptor {
    /// `"scan": true` scans everything, `"scan": ["a.b.C", ...]` only those
    /// classes. Anything else leaves the mod unscanned.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let raw: RawDescriptor = serde_json::from_slice(bytes).context("Failed to parse mod descriptor")?;
        let scope = match raw.scan {
            Some(serde_json::Value::Bool(true)) => Some(ScanScope::All),
            Some(serde_json::Value::Array(entries)) => {
                let mut classes = Vec::with_capacity(entries.len());
                for entry in entries {
                    match entry {
                        serde_json::Value::String(class) => classes.push(class),
                        other => warn!(entry = %other, "Ignoring non-string scan entry"),
                    }
                }
                Some(ScanScope::Only(classes))
            }
            _ => None,
        };
        Ok(Self {
            scope,
            mod_ids: raw.mod_ids,
        })
    }
}

/// Builds the scan source for the mod rooted at `path`.
///
/// Returns `None` when the mod has no descriptor, does not opt in, or ships a
/// malformed descriptor (which is warned about). Mods that do not list their
/// ids are named after the root's file stem. A root that cannot be opened is
/// an error.
pub fn load_mod(path: &Path) -> Result<Option<ModSource>> {
    let root = ModRoot::from_path(path)?;
    let fallback_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown")
        .to_string();

    let Some((location, bytes)) = root.read_resource(MOD_DESCRIPTOR_FILE)? else {
        debug!(root = %path.display(), "No mod descriptor, skipping");
        return Ok(None);
    };

    let descriptor = match ModDescriptor::from_json(&bytes) {
        Ok(descriptor) => descriptor,
        Err(e) => {
            warn!(descriptor = %location, error = %format!("{e:#}"), "Malformed mod descriptor. Skipping mod...");
            return Ok(None);
        }
    };

    let Some(scope) = descriptor.scope else {
        debug!(root = %path.display(), "Mod does not request scanning");
        return Ok(None);
    };
    let mod_ids = if descriptor.mod_ids.is_empty() {
        vec![fallback_id]
    } else {
        descriptor.mod_ids
    };
    Ok(Some(ModSource::new(mod_ids, vec![root], scope)))
}

/// Resolves the mod count at which scans go parallel: the CLI value, then the
/// environment, then the default. Unparseable environment values are warned
/// about and ignored.
pub fn resolve_multi_thread_threshold(cli: Option<usize>) -> usize {
    resolve_multi_thread_threshold_with(cli, |key| env::var(key).ok())
}

pub fn resolve_multi_thread_threshold_with(
    cli: Option<usize>,
    lookup: impl Fn(&str) -> Option<String>,
) -> usize {
    if let Some(threshold) = cli {
        return threshold;
    }
    if let Some(raw) = lookup(MULTI_THREAD_THRESHOLD_ENV) {
        match raw.trim().parse::<usize>() {
            Ok(threshold) => return threshold,
            Err(_) => {
                warn!(
                    variable = MULTI_THREAD_THRESHOLD_ENV,
                    value = %raw,
                    "Invalid multi-thread threshold, using default"
                );
            }
        }
    }
    DEFAULT_MULTI_THREAD_THRESHOLD
}
