//! Turns one compiled class into listener and bus-event handles.
//!
//! [`ClassScanner`] is a [`ClassVisitor`]; it never loads the class. Whatever
//! it finds goes to a [`ScanSink`], which is how the orchestrator collects
//! handles, tracks which classes were scanned and queues companion holders.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, warn};

use crate::classfile::{
    ACC_PUBLIC, Annotation, ClassHeader, ClassVisitor, ElementValue, InnerClassEntry, MemberInfo,
    read_class,
};
use crate::descriptor::{JavaType, MethodDescriptor};
use crate::error::ClassFormatError;
use crate::handle::{BusEventHandle, ListenerHandle};
use crate::ident::NamespacedName;
use crate::key::EventKey;
use crate::markers::{
    BUS_EVENT_VALUE_ELEMENT, DEFAULT_QUALIFIER, LISTEN_PHASE_ELEMENT, LISTEN_QUALIFIER_ELEMENT,
    LISTEN_VALUE_ELEMENT, Markers, SCAN_SIDE_ELEMENT, Side, default_phase,
};

/// Receives everything a [`ClassScanner`] discovers.
pub trait ScanSink {
    fn listener_found(&mut self, handle: ListenerHandle);

    fn bus_event_found(&mut self, handle: BusEventHandle);

    /// Called with the internal name of a class carrying the scan marker, or
    /// of any class scanned in forced mode.
    fn mark_scanned(&mut self, internal_name: &str);

    /// Called with the internal name of a probable companion holder.
    fn queue_companion(&mut self, internal_name: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    pub side: Side,
    /// Scan even without the class-level scan marker.
    pub forced: bool,
    pub queue_companions: bool,
}

impl ScanOptions {
    /// A class found by walking a mod's roots.
    pub fn walk(side: Side) -> Self {
        Self {
            side,
            forced: false,
            queue_companions: true,
        }
    }

    /// A class named explicitly by the mod.
    pub fn explicit(side: Side) -> Self {
        Self {
            side,
            forced: true,
            queue_companions: true,
        }
    }

    /// A class queued as a companion holder.
    pub fn companion(side: Side) -> Self {
        Self {
            side,
            forced: true,
            queue_companions: false,
        }
    }
}

pub struct ClassScanner<'a, S: ScanSink> {
    markers: &'a Markers,
    options: ScanOptions,
    sink: &'a mut S,
    class_name: String,
    should_scan: bool,
    inner_classes: HashSet<(String, String)>,
}

impl<'a, S: ScanSink> ClassScanner<'a, S> {
    pub fn new(markers: &'a Markers, options: ScanOptions, sink: &'a mut S) -> Self {
        Self {
            markers,
            options,
            sink,
            class_name: String::new(),
            should_scan: options.forced,
            inner_classes: HashSet::new(),
        }
    }

    fn visit_scan_marker(&mut self, annotation: &Annotation) {
        debug!(class = %self.class_name, "Found annotated class");
        self.sink.mark_scanned(&self.class_name);

        let admitted = match annotation.element(SCAN_SIDE_ELEMENT) {
            Some(ElementValue::Enum { value, .. }) => self.options.side.admits(value),
            _ => true,
        };
        self.should_scan = admitted;
        if !admitted {
            debug!(class = %self.class_name, "Skipping class on the wrong side");
        }
    }

    fn visit_bus_event(&mut self, field: &MemberInfo, annotation: &Annotation) {
        let mut names = Vec::new();
        if let Some(ElementValue::Array(values)) = annotation.element(BUS_EVENT_VALUE_ELEMENT) {
            for value in values {
                let ElementValue::String(raw) = value else {
                    continue;
                };
                let name = match NamespacedName::parse(raw) {
                    Ok(name) => name,
                    Err(e) => {
                        warn!(
                            class = %self.class_name,
                            field = %field.name,
                            name = %raw,
                            error = %e,
                            "Encountered invalid event bus name in bus event annotation"
                        );
                        continue;
                    }
                };
                if names.contains(&name) {
                    warn!(
                        class = %self.class_name,
                        field = %field.name,
                        name = %name,
                        "Event bus name mentioned multiple times in bus event annotation. Ignoring..."
                    );
                    continue;
                }
                names.push(name);
            }
        }

        if names.is_empty() {
            warn!(
                class = %self.class_name,
                field = %field.name,
                "No bus names present in bus event annotation. Ignoring..."
            );
            return;
        }
        self.sink
            .bus_event_found(BusEventHandle::new(names, self.class_name.clone(), field.name.clone()));
    }

    fn visit_listen(&mut self, method: &MemberInfo, descriptor: &MethodDescriptor, annotation: &Annotation) {
        let target = format!("{}.{}{}", self.class_name, method.name, method.descriptor);

        let callback_type = match annotation.element(LISTEN_VALUE_ELEMENT) {
            Some(ElementValue::Class(desc)) => match JavaType::parse(desc) {
                Ok(ty) => ty,
                Err(e) => {
                    warn!(listener = %target, error = %e, "Listen annotation names an unreadable callback type");
                    return;
                }
            },
            _ => {
                warn!(listener = %target, "Listen annotation is missing its callback type. Ignoring...");
                return;
            }
        };

        let qualifier = match annotation.element(LISTEN_QUALIFIER_ELEMENT) {
            Some(ElementValue::String(q)) => q.clone(),
            _ => DEFAULT_QUALIFIER.to_string(),
        };

        let mut phase = default_phase();
        if let Some(ElementValue::String(raw)) = annotation.element(LISTEN_PHASE_ELEMENT) {
            match NamespacedName::parse(raw) {
                Ok(parsed) => phase = parsed,
                Err(e) => {
                    warn!(listener = %target, phase = %raw, error = %e, "Encountered invalid phase");
                }
            }
        }

        self.sink.listener_found(ListenerHandle::new(
            EventKey::new(callback_type, qualifier),
            phase,
            self.class_name.clone(),
            method.name.clone(),
            descriptor.clone(),
            method.is_static(),
        ));
    }
}

impl<S: ScanSink> ClassVisitor for ClassScanner<'_, S> {
    fn visit(&mut self, header: &ClassHeader) {
        self.class_name = header.name.clone();
        if self.options.forced {
            self.sink.mark_scanned(&self.class_name);
        }
    }

    fn visit_annotation(&mut self, annotation: &Annotation) {
        if annotation.descriptor == self.markers.scan {
            self.visit_scan_marker(annotation);
        }
    }

    fn visit_inner_class(&mut self, entry: &InnerClassEntry) {
        if !self.should_scan || entry.name == self.class_name || entry.access & ACC_PUBLIC == 0 {
            return;
        }
        if let Some(simple) = &entry.inner_name {
            self.inner_classes.insert((entry.name.clone(), simple.clone()));
        }
    }

    fn visit_field(&mut self, field: &MemberInfo) {
        if !self.should_scan || !field.is_public() {
            return;
        }

        if self.options.queue_companions
            && field.is_static()
            && let Ok(JavaType::Object(field_type)) = JavaType::parse(&field.descriptor)
            && self
                .inner_classes
                .contains(&(field_type.clone(), field.name.clone()))
        {
            debug!(class = %self.class_name, companion = %field_type, "Queueing companion holder");
            self.sink.queue_companion(&field_type);
        }

        for annotation in &field.annotations {
            if annotation.descriptor == self.markers.bus_event {
                self.visit_bus_event(field, annotation);
            }
        }
    }

    fn visit_method(&mut self, method: &MemberInfo) {
        if !self.should_scan || !method.is_public() {
            return;
        }
        let markers = self.markers;
        let mut listens = method
            .annotations
            .iter()
            .filter(|a| a.descriptor == markers.listen)
            .peekable();
        if listens.peek().is_none() {
            return;
        }

        let descriptor = match MethodDescriptor::parse(&method.descriptor) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(
                    class = %self.class_name,
                    method = %method.name,
                    error = %e,
                    "Listener method has an unreadable descriptor"
                );
                return;
            }
        };
        for annotation in listens {
            self.visit_listen(method, &descriptor, annotation);
        }
    }
}

/// Scans one class's bytes into `sink`.
pub fn scan_class<S: ScanSink>(
    bytes: &[u8],
    markers: &Markers,
    options: ScanOptions,
    sink: &mut S,
) -> Result<(), ClassFormatError> {
    let mut scanner = ClassScanner::new(markers, options, sink);
    read_class(bytes, &mut scanner)
}

/// Like [`scan_class`], but logs a failure against `location` and the owning
/// mods instead of returning it.
pub fn scan_class_logged<S: ScanSink>(
    bytes: &[u8],
    location: &dyn fmt::Display,
    mod_ids: &str,
    markers: &Markers,
    options: ScanOptions,
    sink: &mut S,
) -> bool {
    match scan_class(bytes, markers, options, sink) {
        Ok(()) => true,
        Err(e) => {
            warn!(class = %location, mod_ids, error = %e, "Error scanning class");
            false
        }
    }
}
