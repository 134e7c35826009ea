//! Per-mod scan orchestration and the aggregated [`ScanResult`].
//!
//! A mod is scanned in two passes. The primary pass either walks every class
//! under the mod's roots or scans an explicit list of classes. Scanning can
//! queue companion holder classes; the second pass scans each queued class
//! that was not already scanned, once, without queueing further.

use std::collections::HashSet;
use std::time::Instant;

use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::handle::{BusEventHandle, ListenerHandle};
use crate::ident::NamespacedName;
use crate::key::EventKey;
use crate::markers::{Markers, Side};
use crate::scanner::{ScanOptions, ScanSink, scan_class_logged};
use crate::source::{ClassLocation, ModRoot, class_name_to_class_path, find_resource};

pub const DEFAULT_MULTI_THREAD_THRESHOLD: usize = 5;

/// Which classes of a mod get scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanScope {
    /// Every compiled class under the mod's roots; the class-level marker
    /// decides.
    All,
    /// Only these binary class names (`a.b.C`), scanned whether or not they
    /// carry the class-level marker.
    Only(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct ModSource {
    pub mod_ids: Vec<String>,
    pub roots: Vec<ModRoot>,
    pub scope: ScanScope,
}

impl ModSource {
    pub fn new(mod_ids: Vec<String>, roots: Vec<ModRoot>, scope: ScanScope) -> Self {
        Self {
            mod_ids,
            roots,
            scope,
        }
    }

    /// `[a, b]`, for log fields.
    pub fn mod_ids_display(&self) -> String {
        format!("[{}]", self.mod_ids.join(", "))
    }
}

/// Handles discovered by one or more scans, grouped in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    listeners: IndexMap<EventKey, Vec<ListenerHandle>>,
    bus_events: IndexMap<NamespacedName, Vec<BusEventHandle>>,
}

impl ScanResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, handle: ListenerHandle) {
        self.listeners
            .entry(handle.key().clone())
            .or_default()
            .push(handle);
    }

    /// Files `handle` under every bus it names.
    pub fn add_bus_event(&mut self, handle: BusEventHandle) {
        for name in handle.bus_names() {
            self.bus_events
                .entry(name.clone())
                .or_default()
                .push(handle.clone());
        }
    }

    pub fn listeners(&self) -> impl Iterator<Item = (&EventKey, &[ListenerHandle])> {
        self.listeners.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn listeners_for(&self, key: &EventKey) -> Option<&[ListenerHandle]> {
        self.listeners.get(key).map(Vec::as_slice)
    }

    pub fn bus_events(&self) -> impl Iterator<Item = (&NamespacedName, &[BusEventHandle])> {
        self.bus_events.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn bus_events_for(&self, bus: &NamespacedName) -> Option<&[BusEventHandle]> {
        self.bus_events.get(bus).map(Vec::as_slice)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    pub fn bus_event_count(&self) -> usize {
        self.bus_events.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty() && self.bus_events.is_empty()
    }

    /// Appends `other`'s handles after this result's.
    pub fn merge(&mut self, other: ScanResult) {
        for (key, handles) in other.listeners {
            self.listeners.entry(key).or_default().extend(handles);
        }
        for (bus, handles) in other.bus_events {
            self.bus_events.entry(bus).or_default().extend(handles);
        }
    }
}

#[derive(Default)]
struct ModScanState {
    result: ScanResult,
    scanned: HashSet<String>,
    queued: IndexSet<String>,
}

impl ScanSink for ModScanState {
    fn listener_found(&mut self, handle: ListenerHandle) {
        self.result.add_listener(handle);
    }

    fn bus_event_found(&mut self, handle: BusEventHandle) {
        self.result.add_bus_event(handle);
    }

    fn mark_scanned(&mut self, internal_name: &str) {
        self.scanned.insert(internal_name.to_string());
    }

    fn queue_companion(&mut self, internal_name: &str) {
        self.queued.insert(internal_name.to_string());
    }
}

/// Scans mods for one side.
#[derive(Debug, Clone)]
pub struct ModScanner {
    side: Side,
    markers: Markers,
    classpath: Vec<ModRoot>,
    multi_thread_threshold: usize,
}

impl ModScanner {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            markers: Markers::default(),
            classpath: Vec::new(),
            multi_thread_threshold: DEFAULT_MULTI_THREAD_THRESHOLD,
        }
    }

    pub fn with_markers(mut self, markers: Markers) -> Self {
        self.markers = markers;
        self
    }

    /// Library roots searched after a mod's own roots when resolving a class
    /// by name.
    pub fn with_classpath(mut self, classpath: Vec<ModRoot>) -> Self {
        self.classpath = classpath;
        self
    }

    pub fn with_multi_thread_threshold(mut self, threshold: usize) -> Self {
        self.multi_thread_threshold = threshold;
        self
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn scan_mod(&self, source: &ModSource) -> ScanResult {
        let mod_ids = source.mod_ids_display();
        debug!(mod_ids = %mod_ids, "Scanning mod");
        let mut state = ModScanState::default();

        match &source.scope {
            ScanScope::All => {
                let options = ScanOptions::walk(self.side);
                for root in &source.roots {
                    let walked = root.for_each_class(&mod_ids, |location, bytes| {
                        scan_class_logged(bytes, location, &mod_ids, &self.markers, options, &mut state);
                    });
                    if let Err(e) = walked {
                        warn!(
                            mod_ids = %mod_ids,
                            root = %root.path().display(),
                            error = %format!("{e:#}"),
                            "Error scanning classes in mod"
                        );
                    }
                }
            }
            ScanScope::Only(classes) => {
                let options = ScanOptions::explicit(self.side);
                for class_name in classes {
                    let resource = class_name_to_class_path(class_name);
                    if let Some((location, bytes)) = self.find_class(source, &resource, &mod_ids) {
                        scan_class_logged(&bytes, &location, &mod_ids, &self.markers, options, &mut state);
                    } else {
                        warn!(mod_ids = %mod_ids, class = %class_name, "Scan class not found in mod. Skipping...");
                    }
                }
            }
        }

        let queued = std::mem::take(&mut state.queued);
        let options = ScanOptions::companion(self.side);
        for internal_name in queued {
            if state.scanned.contains(&internal_name) {
                continue;
            }
            let resource = format!("{internal_name}.class");
            if let Some((location, bytes)) = self.find_class(source, &resource, &mod_ids) {
                scan_class_logged(&bytes, &location, &mod_ids, &self.markers, options, &mut state);
            } else {
                warn!(mod_ids = %mod_ids, class = %internal_name, "Companion class not found in mod. Skipping...");
            }
        }

        debug!(
            mod_ids = %mod_ids,
            listeners = state.result.listener_count(),
            bus_events = state.result.bus_event_count(),
            "Scanning mod complete"
        );
        state.result
    }

    /// Scans every mod and merges the results in `sources` order.
    pub fn scan_mods(&self, sources: &[ModSource]) -> ScanResult {
        let start = Instant::now();
        let parallel = sources.len() >= self.multi_thread_threshold;

        let results: Vec<ScanResult> = if parallel {
            sources.par_iter().map(|source| self.scan_mod(source)).collect()
        } else {
            sources.iter().map(|source| self.scan_mod(source)).collect()
        };

        let mut merged = ScanResult::new();
        for result in results {
            merged.merge(result);
        }

        info!(
            mods = sources.len(),
            parallel,
            listeners = merged.listener_count(),
            bus_events = merged.bus_event_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Scanned mods"
        );
        merged
    }

    fn find_class(&self, source: &ModSource, resource: &str, mod_ids: &str) -> Option<(ClassLocation, Vec<u8>)> {
        find_resource(source.roots.iter().chain(&self.classpath), resource, mod_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classgen::{ClassSpec, Inner, Member, listen, scan_marker};
    use crate::descriptor::MethodDescriptor;
    use crate::markers::{DEFAULT_QUALIFIER, default_phase};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing_test::traced_test;

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir(name: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("event-scanner-modscan-{}-{n}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_class(root: &Path, spec: &ClassSpec) {
        let path = root.join(format!("{}.class", spec.name));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, spec.to_bytes()).unwrap();
    }

    fn listener_class(name: &str) -> ClassSpec {
        ClassSpec::new(name)
            .annotation(scan_marker(None))
            .method(Member::public_static("onFoo", "()V").annotate(listen("a/Cb", None, None)))
    }

    fn scan(root: &Path, scope: ScanScope) -> ScanResult {
        let source = ModSource::new(
            vec!["lost_mod".to_string()],
            vec![ModRoot::from_path(root).unwrap()],
            scope,
        );
        ModScanner::new(Side::Client).scan_mod(&source)
    }

    fn owners(result: &ScanResult) -> Vec<&str> {
        result
            .listeners_for(&EventKey::of("a/Cb", DEFAULT_QUALIFIER))
            .unwrap_or_default()
            .iter()
            .map(ListenerHandle::owner)
            .collect()
    }

    fn listener(callback: &str, owner: &str, method: &str) -> ListenerHandle {
        ListenerHandle::new(
            EventKey::of(callback, "q"),
            default_phase(),
            owner,
            method,
            MethodDescriptor::parse("()V").unwrap(),
            true,
        )
    }

    fn bus(name: &str) -> NamespacedName {
        NamespacedName::parse(name).unwrap()
    }

    #[test]
    fn groups_by_key_in_first_seen_order() {
        let mut result = ScanResult::new();
        result.add_listener(listener("a/B", "x/One", "first"));
        result.add_listener(listener("a/A", "x/One", "second"));
        result.add_listener(listener("a/B", "x/Two", "third"));

        let keys: Vec<String> = result.listeners().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["(a/B|q)", "(a/A|q)"]);

        let b: Vec<&str> = result
            .listeners_for(&EventKey::of("a/B", "q"))
            .unwrap()
            .iter()
            .map(ListenerHandle::method_name)
            .collect();
        assert_eq!(b, vec!["first", "third"]);
        assert_eq!(result.listener_count(), 3);
        assert!(result.listeners_for(&EventKey::of("a/C", "q")).is_none());
    }

    #[test]
    fn bus_event_is_filed_under_each_name() {
        let mut result = ScanResult::new();
        result.add_bus_event(BusEventHandle::new(vec![bus("m:one"), bus("m:two")], "x/E", "FOO"));
        assert_eq!(result.bus_events_for(&bus("m:one")).unwrap().len(), 1);
        assert_eq!(result.bus_events_for(&bus("m:two")).unwrap().len(), 1);
        assert_eq!(result.bus_event_count(), 2);
    }

    #[test]
    fn merge_appends_after_existing() {
        let mut first = ScanResult::new();
        first.add_listener(listener("a/A", "x/One", "one"));
        let mut second = ScanResult::new();
        second.add_listener(listener("a/B", "x/Two", "two"));
        second.add_listener(listener("a/A", "x/Two", "three"));

        first.merge(second);
        let a: Vec<&str> = first
            .listeners_for(&EventKey::of("a/A", "q"))
            .unwrap()
            .iter()
            .map(ListenerHandle::method_name)
            .collect();
        assert_eq!(a, vec!["one", "three"]);
        assert!(!first.is_empty());
        assert!(ScanResult::new().is_empty());
    }

    #[test]
    #[traced_test]
    fn missing_explicit_class_is_warned_and_skipped() {
        let root = temp_dir("missing_explicit");
        write_class(&root, &listener_class("x/Present"));

        let result = scan(
            &root,
            ScanScope::Only(vec!["x.Missing".to_string(), "x.Present".to_string()]),
        );
        assert_eq!(owners(&result), vec!["x/Present"]);
        assert!(logs_contain("Scan class not found in mod"));
        assert!(logs_contain("x.Missing"));
        assert!(logs_contain("[lost_mod]"));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    #[traced_test]
    fn missing_companion_is_warned_and_skipped() {
        let root = temp_dir("missing_companion");
        let gone = "x/Gone$Companion";
        let here = "x/Here$Companion";
        write_class(
            &root,
            &ClassSpec::new("x/Holder")
                .annotation(scan_marker(None))
                .inner(Inner::public(gone, "x/Gone", "Companion"))
                .inner(Inner::public(here, "x/Here", "Companion"))
                .field(Member::public_static("Companion", &format!("L{gone};")))
                .field(Member::public_static("Companion", &format!("L{here};"))),
        );
        write_class(
            &root,
            &ClassSpec::new(here).method(Member::public("onFoo", "()V").annotate(listen("a/Cb", None, None))),
        );

        let result = scan(&root, ScanScope::All);
        assert_eq!(owners(&result), vec![here]);
        assert!(logs_contain("Companion class not found in mod"));
        assert!(logs_contain(gone));

        let _ = std::fs::remove_dir_all(&root);
    }
}
