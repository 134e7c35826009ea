//! Handles produced by scanning, and their lazy resolution against a
//! [`ClassLoader`].

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::descriptor::{JavaType, MethodDescriptor, internal_to_binary};
use crate::error::ResolveError;
use crate::event::Event;
use crate::ident::NamespacedName;
use crate::key::EventKey;
use crate::runtime::{Callback, ClassLoader, FieldAccess, InterfaceMethod};

/// A discovered `@Listen` method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerHandle {
    key: EventKey,
    phase: NamespacedName,
    owner: String,
    method_name: String,
    descriptor: MethodDescriptor,
    is_static: bool,
}

impl ListenerHandle {
    pub fn new(
        key: EventKey,
        phase: NamespacedName,
        owner: impl Into<String>,
        method_name: impl Into<String>,
        descriptor: MethodDescriptor,
        is_static: bool,
    ) -> Self {
        Self {
            key,
            phase,
            owner: owner.into(),
            method_name: method_name.into(),
            descriptor,
            is_static,
        }
    }

    pub fn key(&self) -> &EventKey {
        &self.key
    }

    pub fn phase(&self) -> &NamespacedName {
        &self.phase
    }

    /// Internal name of the declaring class.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Builds an instance of `callback_type` whose `method` forwards to the
    /// discovered method.
    ///
    /// Loads the owner class. Instance methods are bound to the owner's
    /// singleton. A return type that does not fit `method` is only warned
    /// about. Calling this again builds an equivalent, independent callback.
    pub fn create_callback(
        &self,
        loader: &dyn ClassLoader,
        callback_type: &JavaType,
        method: &InterfaceMethod,
    ) -> Result<Callback, ResolveError> {
        let class = loader
            .load_class(&self.owner)
            .ok_or_else(|| ResolveError::ClassNotFound(internal_to_binary(&self.owner)))?;

        self.check_signature(loader, callback_type, method);

        if self.is_static {
            let body = class
                .static_method(&self.method_name, &self.descriptor)
                .cloned()
                .ok_or_else(|| self.method_not_found("static"))?;
            Ok(Callback::new(callback_type.clone(), method.clone(), move |args| {
                body(args)
            }))
        } else {
            let body = class
                .instance_method(&self.method_name, &self.descriptor)
                .cloned()
                .ok_or_else(|| self.method_not_found("instance"))?;
            let receiver = class
                .singleton()
                .cloned()
                .ok_or_else(|| ResolveError::MissingSingleton {
                    class: internal_to_binary(&self.owner),
                    method: self.method_name.clone(),
                })?;
            Ok(Callback::new(callback_type.clone(), method.clone(), move |args| {
                body(&receiver, args)
            }))
        }
    }

    fn check_signature(&self, loader: &dyn ClassLoader, callback_type: &JavaType, method: &InterfaceMethod) {
        let callback = format!("{}.{}{}", callback_type.class_name(), method.name, method.descriptor);
        if !loader.is_assignable(&method.descriptor.ret, &self.descriptor.ret) {
            warn!(
                listener = %self.target(),
                callback = %callback,
                "Callback listener has a return type that is incompatible with its callback interface. \
                 The associated event may fail when called."
            );
        }
        if method.descriptor.params.len() != self.descriptor.params.len() {
            warn!(
                listener = %self.target(),
                callback = %callback,
                "Callback listener takes a different number of parameters than its callback interface"
            );
        }
    }

    fn method_not_found(&self, kind: &'static str) -> ResolveError {
        ResolveError::MethodNotFound {
            class: internal_to_binary(&self.owner),
            name: self.method_name.clone(),
            descriptor: self.descriptor.to_string(),
            kind,
        }
    }

    fn target(&self) -> String {
        format!("{}.{}{}", self.owner, self.method_name, self.descriptor)
    }
}

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let static_str = if self.is_static { "static " } else { "" };
        write!(
            f,
            "ListenerHandle{{{}({}) -> {static_str}{}}}",
            self.key,
            self.phase,
            self.target()
        )
    }
}

/// A discovered `@BusEvent` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEventHandle {
    bus_names: Vec<NamespacedName>,
    owner: String,
    field_name: String,
}

impl BusEventHandle {
    pub fn new(bus_names: Vec<NamespacedName>, owner: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            bus_names,
            owner: owner.into(),
            field_name: field_name.into(),
        }
    }

    pub fn bus_names(&self) -> &[NamespacedName] {
        &self.bus_names
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Reads the event held by the discovered field, loading its owner.
    pub fn get_event(&self, loader: &dyn ClassLoader) -> Result<Arc<Event>, ResolveError> {
        let class_name = internal_to_binary(&self.owner);
        let class = loader
            .load_class(&self.owner)
            .ok_or_else(|| ResolveError::ClassNotFound(class_name.clone()))?;

        let uninitialized = || ResolveError::UninitializedField {
            class: class_name.clone(),
            field: self.field_name.clone(),
        };

        match class.field(&self.field_name) {
            None => Err(ResolveError::FieldNotFound {
                class: class_name.clone(),
                field: self.field_name.clone(),
            }),
            Some(FieldAccess::Static(read)) => read().ok_or_else(uninitialized),
            Some(FieldAccess::Property(read)) => {
                let holder = class
                    .singleton()
                    .or(class.companion())
                    .ok_or_else(|| ResolveError::MissingHolderInstance {
                        class: class_name.clone(),
                        field: self.field_name.clone(),
                    })?;
                read(holder).ok_or_else(uninitialized)
            }
        }
    }
}

impl fmt::Display for BusEventHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.bus_names.iter().map(ToString::to_string).collect();
        write!(
            f,
            "BusEventHandle{{{}.{} -> [{}]}}",
            self.owner,
            self.field_name,
            names.join(", ")
        )
    }
}
