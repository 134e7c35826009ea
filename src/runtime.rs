//! Host-side class model that scanned handles bind against.
//!
//! Scanning never needs a class to be loaded. Binding does: a
//! [`ListenerHandle`](crate::handle::ListenerHandle) resolves its owner
//! through a [`ClassLoader`] and captures the method body it finds there.
//! [`ClassRegistry`] is the stock loader. Hosts register every class that
//! carries listeners or bus events under its internal name, together with a
//! closure that builds it; the closure runs the first time the class is
//! loaded and never again.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use tracing::debug;

use crate::descriptor::{JavaType, MethodDescriptor, OBJECT_INTERNAL_NAME};
use crate::event::Event;

pub type Object = Arc<dyn Any + Send + Sync>;

/// An argument to or a result of a callback.
#[derive(Clone)]
pub enum Value {
    Void,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Object(Object),
}

impl Value {
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Value::Object(Arc::new(value))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Object(obj) => obj.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("Void"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(_) => f.write_str("Object(..)"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

pub type StaticFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;
pub type InstanceFn = Arc<dyn Fn(&Object, &[Value]) -> Value + Send + Sync>;
pub type StaticFieldFn = Arc<dyn Fn() -> Option<Arc<Event>> + Send + Sync>;
pub type PropertyFn = Arc<dyn Fn(&Object) -> Option<Arc<Event>> + Send + Sync>;

/// The single abstract method of a callback interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceMethod {
    pub name: String,
    pub descriptor: MethodDescriptor,
}

impl InterfaceMethod {
    pub fn new(name: impl Into<String>, descriptor: MethodDescriptor) -> Self {
        Self {
            name: name.into(),
            descriptor,
        }
    }
}

/// An instance of a callback interface whose method forwards to a bound body.
#[derive(Clone)]
pub struct Callback {
    callback_type: JavaType,
    method: InterfaceMethod,
    target: StaticFn,
}

impl Callback {
    pub fn new(
        callback_type: JavaType,
        method: InterfaceMethod,
        target: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            callback_type,
            method,
            target: Arc::new(target),
        }
    }

    pub fn callback_type(&self) -> &JavaType {
        &self.callback_type
    }

    pub fn method(&self) -> &InterfaceMethod {
        &self.method
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.target)(args)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Callback({}.{}{})",
            self.callback_type.class_name(),
            self.method.name,
            self.method.descriptor
        )
    }
}

pub enum FieldAccess {
    /// A plain static field.
    Static(StaticFieldFn),
    /// A property read through the owner's singleton or companion instance.
    Property(PropertyFn),
}

/// A loaded class as far as binding is concerned.
pub struct RuntimeClass {
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    singleton: Option<Object>,
    companion: Option<Object>,
    static_methods: HashMap<(String, String), StaticFn>,
    instance_methods: HashMap<(String, String), InstanceFn>,
    fields: HashMap<String, FieldAccess>,
}

impl RuntimeClass {
    pub fn builder(internal_name: &str) -> RuntimeClassBuilder {
        RuntimeClassBuilder {
            class: RuntimeClass {
                name: internal_name.to_string(),
                super_name: Some(OBJECT_INTERNAL_NAME.to_string()),
                interfaces: Vec::new(),
                singleton: None,
                companion: None,
                static_methods: HashMap::new(),
                instance_methods: HashMap::new(),
                fields: HashMap::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn super_name(&self) -> Option<&str> {
        self.super_name.as_deref()
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn singleton(&self) -> Option<&Object> {
        self.singleton.as_ref()
    }

    pub fn companion(&self) -> Option<&Object> {
        self.companion.as_ref()
    }

    pub fn static_method(&self, name: &str, descriptor: &MethodDescriptor) -> Option<&StaticFn> {
        self.static_methods
            .get(&(name.to_string(), descriptor.to_string()))
    }

    pub fn instance_method(&self, name: &str, descriptor: &MethodDescriptor) -> Option<&InstanceFn> {
        self.instance_methods
            .get(&(name.to_string(), descriptor.to_string()))
    }

    pub fn field(&self, name: &str) -> Option<&FieldAccess> {
        self.fields.get(name)
    }
}

impl fmt::Debug for RuntimeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeClass")
            .field("name", &self.name)
            .field("super_name", &self.super_name)
            .field("interfaces", &self.interfaces)
            .field("singleton", &self.singleton.is_some())
            .field("companion", &self.companion.is_some())
            .field("static_methods", &self.static_methods.len())
            .field("instance_methods", &self.instance_methods.len())
            .field("fields", &self.fields.len())
            .finish()
    }
}

pub struct RuntimeClassBuilder {
    class: RuntimeClass,
}

impl RuntimeClassBuilder {
    pub fn extends(mut self, super_name: &str) -> Self {
        self.class.super_name = Some(super_name.to_string());
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.class.interfaces.push(interface.to_string());
        self
    }

    pub fn singleton<T: Any + Send + Sync>(mut self, instance: T) -> Self {
        self.class.singleton = Some(Arc::new(instance));
        self
    }

    pub fn companion<T: Any + Send + Sync>(mut self, instance: T) -> Self {
        self.class.companion = Some(Arc::new(instance));
        self
    }

    pub fn static_method(
        mut self,
        name: &str,
        descriptor: &str,
        body: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.class
            .static_methods
            .insert((name.to_string(), descriptor.to_string()), Arc::new(body));
        self
    }

    pub fn instance_method(
        mut self,
        name: &str,
        descriptor: &str,
        body: impl Fn(&Object, &[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.class
            .instance_methods
            .insert((name.to_string(), descriptor.to_string()), Arc::new(body));
        self
    }

    pub fn static_field(
        mut self,
        name: &str,
        read: impl Fn() -> Option<Arc<Event>> + Send + Sync + 'static,
    ) -> Self {
        self.class
            .fields
            .insert(name.to_string(), FieldAccess::Static(Arc::new(read)));
        self
    }

    pub fn property(
        mut self,
        name: &str,
        read: impl Fn(&Object) -> Option<Arc<Event>> + Send + Sync + 'static,
    ) -> Self {
        self.class
            .fields
            .insert(name.to_string(), FieldAccess::Property(Arc::new(read)));
        self
    }

    pub fn build(self) -> RuntimeClass {
        self.class
    }
}

pub trait ClassLoader: Send + Sync {
    /// Loads a class by internal name, initializing it on first use.
    fn load_class(&self, internal_name: &str) -> Option<Arc<RuntimeClass>>;

    /// Direct superclass and interfaces of `internal_name`, looked up without
    /// initializing it. Unknown classes have none.
    fn supertypes(&self, internal_name: &str) -> Vec<String>;

    /// Whether a value of type `source` can be used where `target` is expected.
    fn is_assignable(&self, target: &JavaType, source: &JavaType) -> bool {
        if target == source {
            return true;
        }
        match (target, source) {
            (JavaType::Object(t), s) if t == OBJECT_INTERNAL_NAME => s.is_reference(),
            (JavaType::Object(t), JavaType::Object(s)) => is_subtype(self, s, t),
            (JavaType::Array(t), JavaType::Array(s)) => {
                t.is_reference() && s.is_reference() && self.is_assignable(t, s)
            }
            _ => false,
        }
    }
}

fn is_subtype<L: ClassLoader + ?Sized>(loader: &L, sub: &str, sup: &str) -> bool {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([sub.to_string()]);
    while let Some(name) = queue.pop_front() {
        if name == sup {
            return true;
        }
        if !seen.insert(name.clone()) {
            continue;
        }
        queue.extend(loader.supertypes(&name));
    }
    false
}

type ClassInit = Box<dyn Fn() -> RuntimeClass + Send + Sync>;

struct LazyClass {
    init: ClassInit,
    loaded: OnceLock<Arc<RuntimeClass>>,
}

/// A [`ClassLoader`] over explicitly registered classes.
///
/// Type checks during binding only consult supertypes declared through
/// [`ClassRegistry::declare_supertypes`] or read from classes that are
/// already loaded, so they never run an initializer.
#[derive(Default)]
pub struct ClassRegistry {
    classes: RwLock<HashMap<String, Arc<LazyClass>>>,
    hierarchy: RwLock<HashMap<String, Vec<String>>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `init` as the initializer of `internal_name`, replacing any
    /// earlier registration.
    pub fn register(
        &self,
        internal_name: &str,
        init: impl Fn() -> RuntimeClass + Send + Sync + 'static,
    ) {
        let lazy = Arc::new(LazyClass {
            init: Box::new(init),
            loaded: OnceLock::new(),
        });
        self.classes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(internal_name.to_string(), lazy);
    }

    /// Records the direct supertypes of `internal_name` for assignability
    /// checks, replacing any earlier declaration.
    pub fn declare_supertypes(&self, internal_name: &str, supertypes: &[&str]) {
        self.hierarchy
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                internal_name.to_string(),
                supertypes.iter().map(|s| s.to_string()).collect(),
            );
    }

    pub fn is_registered(&self, internal_name: &str) -> bool {
        self.classes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(internal_name)
    }

    /// Whether `internal_name` has been initialized yet.
    pub fn is_loaded(&self, internal_name: &str) -> bool {
        self.classes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(internal_name)
            .is_some_and(|lazy| lazy.loaded.get().is_some())
    }
}

impl ClassLoader for ClassRegistry {
    fn load_class(&self, internal_name: &str) -> Option<Arc<RuntimeClass>> {
        let lazy = self
            .classes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(internal_name)
            .cloned()?;
        let class = lazy.loaded.get_or_init(|| {
            debug!(class = internal_name, "Initializing class");
            Arc::new((lazy.init)())
        });
        Some(Arc::clone(class))
    }

    fn supertypes(&self, internal_name: &str) -> Vec<String> {
        if let Some(declared) = self
            .hierarchy
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(internal_name)
        {
            return declared.clone();
        }
        let lazy = self
            .classes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(internal_name)
            .cloned();
        match lazy.as_ref().and_then(|lazy| lazy.loaded.get()) {
            Some(class) => class
                .super_name()
                .map(str::to_string)
                .into_iter()
                .chain(class.interfaces().iter().cloned())
                .collect(),
            None => Vec::new(),
        }
    }
}
