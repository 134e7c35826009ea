//! Writes small but valid class files for tests.
//!
//! Shared by the unit tests (included through `#[path]`) and the integration
//! tests, so it only depends on `std`.

#![allow(dead_code)]

use std::collections::HashMap;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;

pub const SCAN: &str = "Lcom/kneelawk/commonevents/api/Scan;";
pub const SCAN_SIDE: &str = "Lcom/kneelawk/commonevents/api/Scan$Side;";
pub const LISTEN: &str = "Lcom/kneelawk/commonevents/api/Listen;";
pub const BUS_EVENT: &str = "Lcom/kneelawk/commonevents/api/BusEvent;";

#[derive(Debug, Clone)]
pub enum Elem {
    Int(i32),
    Long(i64),
    Str(String),
    Enum(String, String),
    Class(String),
    Array(Vec<Elem>),
    Ann(Ann),
}

#[derive(Debug, Clone)]
pub struct Ann {
    pub descriptor: String,
    pub visible: bool,
    pub elements: Vec<(String, Elem)>,
}

impl Ann {
    pub fn new(descriptor: &str) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            visible: true,
            elements: Vec::new(),
        }
    }

    pub fn invisible(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn element(mut self, name: &str, value: Elem) -> Self {
        self.elements.push((name.to_string(), value));
        self
    }
}

/// `@Scan` with an optional `side` value (`CLIENT`, `SERVER`, `BOTH`).
pub fn scan_marker(side: Option<&str>) -> Ann {
    let ann = Ann::new(SCAN).invisible();
    match side {
        Some(side) => ann.element("side", Elem::Enum(SCAN_SIDE.into(), side.into())),
        None => ann,
    }
}

/// `@Listen(value = callback.class, qualifier = .., phase = ..)`.
pub fn listen(callback: &str, qualifier: Option<&str>, phase: Option<&str>) -> Ann {
    let mut ann = Ann::new(LISTEN)
        .invisible()
        .element("value", Elem::Class(format!("L{callback};")));
    if let Some(q) = qualifier {
        ann = ann.element("qualifier", Elem::Str(q.into()));
    }
    if let Some(p) = phase {
        ann = ann.element("phase", Elem::Str(p.into()));
    }
    ann
}

/// `@BusEvent({names...})`.
pub fn bus_event(names: &[&str]) -> Ann {
    Ann::new(BUS_EVENT).invisible().element(
        "value",
        Elem::Array(names.iter().map(|n| Elem::Str(n.to_string())).collect()),
    )
}

#[derive(Debug, Clone)]
pub struct Member {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub annotations: Vec<Ann>,
}

impl Member {
    pub fn new(access: u16, name: &str, descriptor: &str) -> Self {
        Self {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            annotations: Vec::new(),
        }
    }

    pub fn public(name: &str, descriptor: &str) -> Self {
        Self::new(ACC_PUBLIC, name, descriptor)
    }

    pub fn public_static(name: &str, descriptor: &str) -> Self {
        Self::new(ACC_PUBLIC | ACC_STATIC, name, descriptor)
    }

    pub fn annotate(mut self, ann: Ann) -> Self {
        self.annotations.push(ann);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Inner {
    pub name: String,
    pub outer: Option<String>,
    pub inner_name: Option<String>,
    pub access: u16,
}

impl Inner {
    pub fn public(name: &str, outer: &str, inner_name: &str) -> Self {
        Self {
            name: name.to_string(),
            outer: Some(outer.to_string()),
            inner_name: Some(inner_name.to_string()),
            access: ACC_PUBLIC | ACC_STATIC | ACC_FINAL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassSpec {
    pub name: String,
    pub access: u16,
    pub annotations: Vec<Ann>,
    pub inner: Vec<Inner>,
    pub fields: Vec<Member>,
    pub methods: Vec<Member>,
}

impl ClassSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            access: ACC_PUBLIC,
            annotations: Vec::new(),
            inner: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn annotation(mut self, ann: Ann) -> Self {
        self.annotations.push(ann);
        self
    }

    pub fn inner(mut self, inner: Inner) -> Self {
        self.inner.push(inner);
        self
    }

    pub fn field(mut self, member: Member) -> Self {
        self.fields.push(member);
        self
    }

    pub fn method(mut self, member: Member) -> Self {
        self.methods.push(member);
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut pool = Pool::default();
        let mut body = Vec::new();

        put_u2(&mut body, self.access);
        put_u2(&mut body, pool.class(&self.name));
        put_u2(&mut body, pool.class("java/lang/Object"));
        put_u2(&mut body, 0);

        put_u2(&mut body, self.fields.len() as u16);
        for field in &self.fields {
            write_member(&mut body, &mut pool, field, false);
        }
        put_u2(&mut body, self.methods.len() as u16);
        for method in &self.methods {
            write_member(&mut body, &mut pool, method, true);
        }

        let mut attributes = annotation_attributes(&mut pool, &self.annotations);
        if !self.inner.is_empty() {
            let mut data = Vec::new();
            put_u2(&mut data, self.inner.len() as u16);
            for inner in &self.inner {
                put_u2(&mut data, pool.class(&inner.name));
                let outer = inner.outer.as_deref().map(|o| pool.class(o)).unwrap_or(0);
                put_u2(&mut data, outer);
                let simple = inner.inner_name.as_deref().map(|n| pool.utf8(n)).unwrap_or(0);
                put_u2(&mut data, simple);
                put_u2(&mut data, inner.access);
            }
            attributes.push((pool.utf8("InnerClasses"), data));
        }
        write_attributes(&mut body, &attributes);

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        put_u2(&mut out, 0);
        put_u2(&mut out, 61);
        put_u2(&mut out, pool.count);
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&body);
        out
    }
}

struct Pool {
    bytes: Vec<u8>,
    count: u16,
    utf8: HashMap<String, u16>,
    classes: HashMap<String, u16>,
}

impl Default for Pool {
    fn default() -> Self {
        Self {
            bytes: Vec::new(),
            count: 1,
            utf8: HashMap::new(),
            classes: HashMap::new(),
        }
    }
}

impl Pool {
    fn utf8(&mut self, s: &str) -> u16 {
        if let Some(index) = self.utf8.get(s) {
            return *index;
        }
        self.bytes.push(1);
        put_u2(&mut self.bytes, s.len() as u16);
        self.bytes.extend_from_slice(s.as_bytes());
        let index = self.next(1);
        self.utf8.insert(s.to_string(), index);
        index
    }

    fn class(&mut self, name: &str) -> u16 {
        if let Some(index) = self.classes.get(name) {
            return *index;
        }
        let name_index = self.utf8(name);
        self.bytes.push(7);
        put_u2(&mut self.bytes, name_index);
        let index = self.next(1);
        self.classes.insert(name.to_string(), index);
        index
    }

    fn int(&mut self, value: i32) -> u16 {
        self.bytes.push(3);
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self.next(1)
    }

    fn long(&mut self, value: i64) -> u16 {
        self.bytes.push(5);
        self.bytes.extend_from_slice(&value.to_be_bytes());
        self.next(2)
    }

    fn next(&mut self, slots: u16) -> u16 {
        let index = self.count;
        self.count += slots;
        index
    }
}

fn put_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn write_member(out: &mut Vec<u8>, pool: &mut Pool, member: &Member, with_code: bool) {
    put_u2(out, member.access);
    put_u2(out, pool.utf8(&member.name));
    put_u2(out, pool.utf8(&member.descriptor));
    let mut attributes = annotation_attributes(pool, &member.annotations);
    if with_code {
        // Opaque body the reader has to skip.
        attributes.push((pool.utf8("Code"), vec![0, 1, 0, 1, 0, 0, 0, 1, 0xB1, 0, 0, 0, 0]));
    }
    write_attributes(out, &attributes);
}

fn write_attributes(out: &mut Vec<u8>, attributes: &[(u16, Vec<u8>)]) {
    put_u2(out, attributes.len() as u16);
    for (name, data) in attributes {
        put_u2(out, *name);
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
    }
}

fn annotation_attributes(pool: &mut Pool, annotations: &[Ann]) -> Vec<(u16, Vec<u8>)> {
    let mut attributes = Vec::new();
    for (visible, attr) in [
        (true, "RuntimeVisibleAnnotations"),
        (false, "RuntimeInvisibleAnnotations"),
    ] {
        let selected: Vec<&Ann> = annotations.iter().filter(|a| a.visible == visible).collect();
        if selected.is_empty() {
            continue;
        }
        let mut data = Vec::new();
        put_u2(&mut data, selected.len() as u16);
        for ann in selected {
            write_annotation(&mut data, pool, ann);
        }
        attributes.push((pool.utf8(attr), data));
    }
    attributes
}

fn write_annotation(out: &mut Vec<u8>, pool: &mut Pool, ann: &Ann) {
    put_u2(out, pool.utf8(&ann.descriptor));
    put_u2(out, ann.elements.len() as u16);
    for (name, value) in &ann.elements {
        put_u2(out, pool.utf8(name));
        write_elem(out, pool, value);
    }
}

fn write_elem(out: &mut Vec<u8>, pool: &mut Pool, elem: &Elem) {
    match elem {
        Elem::Int(v) => {
            out.push(b'I');
            put_u2(out, pool.int(*v));
        }
        Elem::Long(v) => {
            out.push(b'J');
            put_u2(out, pool.long(*v));
        }
        Elem::Str(s) => {
            out.push(b's');
            put_u2(out, pool.utf8(s));
        }
        Elem::Enum(descriptor, value) => {
            out.push(b'e');
            put_u2(out, pool.utf8(descriptor));
            put_u2(out, pool.utf8(value));
        }
        Elem::Class(descriptor) => {
            out.push(b'c');
            put_u2(out, pool.utf8(descriptor));
        }
        Elem::Array(values) => {
            out.push(b'[');
            put_u2(out, values.len() as u16);
            for value in values {
                write_elem(out, pool, value);
            }
        }
        Elem::Ann(ann) => {
            out.push(b'@');
            write_annotation(out, pool, ann);
        }
    }
}

/// Class header whose constant pool declares `count` slots and fills them
/// with empty Utf8 entries up to a Long in the very last slot.
pub fn class_with_trailing_long(count: u16) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
    put_u2(&mut out, 0);
    put_u2(&mut out, 61);
    put_u2(&mut out, count);
    for _ in 1..count - 1 {
        out.push(1);
        put_u2(&mut out, 0);
    }
    out.push(5);
    out.extend_from_slice(&0i64.to_be_bytes());
    out.extend_from_slice(&[0; 16]);
    out
}
