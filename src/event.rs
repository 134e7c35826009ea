//! Phase-ordered events and the buses that group them.
//!
//! An [`Event`] keeps its listeners in named phases. Phases run in an order
//! derived from explicit `first -> second` orderings; phases with no ordering
//! between them run in the order they were first mentioned. Listeners inside
//! one phase run in registration order. The flattened listener list is
//! rebuilt only when listeners or orderings change, so [`Event::invoke`] only
//! clones an `Arc`.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use tracing::{debug, error, warn};

use crate::error::EventError;
use crate::ident::NamespacedName;
use crate::key::EventKey;
use crate::markers::default_phase;
use crate::modscan::ScanResult;
use crate::runtime::{Callback, ClassLoader, InterfaceMethod, Value};

pub struct Event {
    key: EventKey,
    method: InterfaceMethod,
    table: RwLock<PhaseTable>,
}

struct PhaseTable {
    phases: IndexMap<NamespacedName, Vec<Callback>>,
    orderings: Vec<(NamespacedName, NamespacedName)>,
    sorted: Arc<[Callback]>,
}

impl Event {
    /// An event with only the default phase.
    pub fn new(key: EventKey, method: InterfaceMethod) -> Self {
        let mut phases = IndexMap::new();
        phases.insert(default_phase(), Vec::new());
        Self {
            key,
            method,
            table: RwLock::new(PhaseTable {
                phases,
                orderings: Vec::new(),
                sorted: Arc::from(Vec::new()),
            }),
        }
    }

    /// An event whose `phases` run in the given order. The default phase must
    /// be one of them.
    pub fn with_phases(
        key: EventKey,
        method: InterfaceMethod,
        phases: &[NamespacedName],
    ) -> Result<Self, EventError> {
        let default = default_phase();
        if !phases.contains(&default) {
            return Err(EventError::MissingDefaultPhase(default));
        }
        for (i, phase) in phases.iter().enumerate() {
            if phases[i + 1..].contains(phase) {
                return Err(EventError::DuplicatePhase(phase.clone()));
            }
        }

        let event = Self::new(key, method);
        {
            let mut table = event.write_table();
            table.phases.clear();
            for phase in phases {
                table.phases.insert(phase.clone(), Vec::new());
            }
            for pair in phases.windows(2) {
                table.orderings.push((pair[0].clone(), pair[1].clone()));
            }
        }
        Ok(event)
    }

    pub fn key(&self) -> &EventKey {
        &self.key
    }

    pub fn method(&self) -> &InterfaceMethod {
        &self.method
    }

    pub fn register(&self, phase: &NamespacedName, callback: Callback) {
        let mut table = self.write_table();
        table.phases.entry(phase.clone()).or_default().push(callback);
        table.rebuild(&self.key);
    }

    pub fn register_default(&self, callback: Callback) {
        self.register(&default_phase(), callback);
    }

    /// Requests that listeners of `first` run before listeners of `second`.
    pub fn add_phase_ordering(
        &self,
        first: &NamespacedName,
        second: &NamespacedName,
    ) -> Result<(), EventError> {
        if first == second {
            return Err(EventError::SelfOrdering(first.clone()));
        }
        let mut table = self.write_table();
        table.phases.entry(first.clone()).or_default();
        table.phases.entry(second.clone()).or_default();
        table.orderings.push((first.clone(), second.clone()));
        table.rebuild(&self.key);
        Ok(())
    }

    /// Listeners in invocation order.
    pub fn listeners(&self) -> Arc<[Callback]> {
        Arc::clone(&self.read_table().sorted)
    }

    pub fn phase_order(&self) -> Vec<NamespacedName> {
        let table = self.read_table();
        table
            .sorted_phases(&self.key)
            .into_iter()
            .map(|i| table.phases.get_index(i).map(|(k, _)| k.clone()))
            .collect::<Option<Vec<_>>>()
            .unwrap_or_default()
    }

    /// Calls every listener in order and collects the results.
    pub fn invoke(&self, args: &[Value]) -> Vec<Value> {
        let listeners = self.listeners();
        listeners.iter().map(|cb| cb.call(args)).collect()
    }

    /// Binds every scanned listener for this event's key and registers it in
    /// its phase. Handles that fail to bind are logged and skipped.
    pub fn register_scanned(&self, scan: &ScanResult, loader: &dyn ClassLoader) -> usize {
        let Some(handles) = scan.listeners_for(&self.key) else {
            return 0;
        };

        let mut bound = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.create_callback(loader, &self.key.callback_type, &self.method) {
                Ok(callback) => bound.push((handle.phase().clone(), callback)),
                Err(e) => {
                    error!(handle = %handle, error = %e, "Error creating callback instance");
                }
            }
        }

        let registered = bound.len();
        let mut table = self.write_table();
        for (phase, callback) in bound {
            table.phases.entry(phase).or_default().push(callback);
        }
        table.rebuild(&self.key);
        debug!(event = %self.key, registered, "Registered scanned listeners");
        registered
    }

    fn read_table(&self) -> std::sync::RwLockReadGuard<'_, PhaseTable> {
        self.table.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_table(&self) -> std::sync::RwLockWriteGuard<'_, PhaseTable> {
        self.table.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("key", &self.key)
            .field("method", &self.method)
            .field("listeners", &self.read_table().sorted.len())
            .finish()
    }
}

impl PhaseTable {
    fn rebuild(&mut self, key: &EventKey) {
        let order = self.sorted_phases(key);
        let mut sorted = Vec::new();
        for i in order {
            if let Some((_, callbacks)) = self.phases.get_index(i) {
                sorted.extend(callbacks.iter().cloned());
            }
        }
        self.sorted = Arc::from(sorted);
    }

    /// Topological order of phase indices; ties go to the earliest-mentioned
    /// phase. Phases caught in a cycle keep their mention order.
    fn sorted_phases(&self, key: &EventKey) -> Vec<usize> {
        let count = self.phases.len();
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut in_degree = vec![0usize; count];
        for (first, second) in &self.orderings {
            let (Some(a), Some(b)) = (
                self.phases.get_index_of(first),
                self.phases.get_index_of(second),
            ) else {
                continue;
            };
            if !successors[a].contains(&b) {
                successors[a].push(b);
                in_degree[b] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..count).filter(|i| in_degree[*i] == 0).collect();
        let mut order = Vec::with_capacity(count);
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &succ in &successors[next] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.insert(succ);
                }
            }
        }

        if order.len() < count {
            let cyclic: Vec<usize> = (0..count).filter(|i| !order.contains(i)).collect();
            let names: Vec<String> = cyclic
                .iter()
                .filter_map(|i| self.phases.get_index(*i).map(|(k, _)| k.to_string()))
                .collect();
            warn!(event = %key, phases = ?names, "Event phase ordering contains a cycle");
            order.extend(cyclic);
        }
        order
    }
}

/// A named collection of events, keyed by [`EventKey`].
pub struct EventBus {
    name: NamespacedName,
    events: RwLock<IndexMap<EventKey, Arc<Event>>>,
}

impl EventBus {
    pub fn new(name: NamespacedName) -> Self {
        Self {
            name,
            events: RwLock::new(IndexMap::new()),
        }
    }

    pub fn name(&self) -> &NamespacedName {
        &self.name
    }

    /// Adds `event` unless an event with the same key is already present.
    pub fn add_event(&self, event: Arc<Event>) -> bool {
        let mut events = self.events.write().unwrap_or_else(|e| e.into_inner());
        if events.contains_key(event.key()) {
            warn!(bus = %self.name, event = %event.key(), "Event bus already contains an event with this key");
            return false;
        }
        events.insert(event.key().clone(), event);
        true
    }

    pub fn event(&self, key: &EventKey) -> Option<Arc<Event>> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn events(&self) -> Vec<Arc<Event>> {
        self.events
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Registers `callback` with the event matching its type and `qualifier`.
    pub fn register(&self, qualifier: &str, phase: &NamespacedName, callback: Callback) -> bool {
        let key = EventKey::new(callback.callback_type().clone(), qualifier);
        match self.event(&key) {
            Some(event) => {
                event.register(phase, callback);
                true
            }
            None => false,
        }
    }

    /// Resolves every scanned bus event addressed to this bus and adds it.
    /// Handles that fail to resolve are logged and skipped.
    pub fn add_scanned(&self, scan: &ScanResult, loader: &dyn ClassLoader) -> usize {
        let Some(handles) = scan.bus_events_for(&self.name) else {
            return 0;
        };

        let mut added = 0;
        for handle in handles {
            match handle.get_event(loader) {
                Ok(event) => {
                    if self.add_event(event) {
                        added += 1;
                    }
                }
                Err(e) => {
                    error!(bus = %self.name, handle = %handle, error = %e, "Error adding event to bus");
                }
            }
        }
        added
    }
}
