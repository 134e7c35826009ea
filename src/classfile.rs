//! Class-file reader.
//!
//! Decodes just enough of the class-file layout to find annotations: the
//! constant pool, the class header, field and method tables, and the
//! `RuntimeVisibleAnnotations`, `RuntimeInvisibleAnnotations` and
//! `InnerClasses` attributes. Everything else, including method bodies, is
//! skipped by length. A parsed [`ClassFile`] is replayed into a
//! [`ClassVisitor`] in a fixed order: header, class annotations (visible
//! first), inner-class records, fields, methods, end.

use crate::error::ClassFormatError;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;

const MAGIC: u32 = 0xCAFE_BABE;
const MAX_ANNOTATION_DEPTH: usize = 32;

const ATTR_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
const ATTR_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
const ATTR_INNER_CLASSES: &str = "InnerClasses";

type Result<T> = std::result::Result<T, ClassFormatError>;

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    /// `B`, `C`, `I` and `S` constants.
    Int(i32),
    Boolean(bool),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Enum { descriptor: String, value: String },
    /// A class literal, as a field descriptor (`Lcom/example/Foo;`).
    Class(String),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub descriptor: String,
    pub visible: bool,
    pub elements: Vec<(String, ElementValue)>,
}

impl Annotation {
    pub fn element(&self, name: &str) -> Option<&ElementValue> {
        self.elements
            .iter()
            .find(|(element, _)| element == name)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHeader {
    pub major_version: u16,
    pub minor_version: u16,
    pub access: u16,
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
}

/// One entry of the `InnerClasses` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassEntry {
    pub name: String,
    pub outer_name: Option<String>,
    /// Simple name; absent for anonymous classes.
    pub inner_name: Option<String>,
    pub access: u16,
}

/// A field or method.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub annotations: Vec<Annotation>,
}

impl MemberInfo {
    pub fn is_public(&self) -> bool {
        self.access & ACC_PUBLIC != 0
    }

    pub fn is_static(&self) -> bool {
        self.access & ACC_STATIC != 0
    }
}

pub trait ClassVisitor {
    fn visit(&mut self, _header: &ClassHeader) {}

    fn visit_annotation(&mut self, _annotation: &Annotation) {}

    fn visit_inner_class(&mut self, _entry: &InnerClassEntry) {}

    fn visit_field(&mut self, _field: &MemberInfo) {}

    fn visit_method(&mut self, _method: &MemberInfo) {}

    fn visit_end(&mut self) {}
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub header: ClassHeader,
    pub annotations: Vec<Annotation>,
    pub inner_classes: Vec<InnerClassEntry>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut input = Bytes::new(bytes);

        let magic = input.u4()?;
        if magic != MAGIC {
            return Err(ClassFormatError::BadMagic(magic));
        }
        let minor_version = input.u2()?;
        let major_version = input.u2()?;
        let pool = ConstantPool::read(&mut input)?;

        let access = input.u2()?;
        let name = pool.class_name(input.u2()?)?.to_string();
        let super_index = input.u2()?;
        let super_name = if super_index == 0 {
            None
        } else {
            Some(pool.class_name(super_index)?.to_string())
        };
        let interface_count = input.u2()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(pool.class_name(input.u2()?)?.to_string());
        }

        let fields = read_members(&mut input, &pool)?;
        let methods = read_members(&mut input, &pool)?;

        let mut annotations = AnnotationSet::default();
        let mut inner_classes = Vec::new();
        let attribute_count = input.u2()?;
        for _ in 0..attribute_count {
            let (attr_name, mut body) = read_attribute(&mut input, &pool)?;
            match attr_name {
                ATTR_INNER_CLASSES => inner_classes = read_inner_classes(&mut body, &pool)?,
                _ => annotations.read(attr_name, &mut body, &pool)?,
            }
        }

        Ok(Self {
            header: ClassHeader {
                major_version,
                minor_version,
                access,
                name,
                super_name,
                interfaces,
            },
            annotations: annotations.into_vec(),
            inner_classes,
            fields,
            methods,
        })
    }

    pub fn accept(&self, visitor: &mut dyn ClassVisitor) {
        visitor.visit(&self.header);
        for annotation in &self.annotations {
            visitor.visit_annotation(annotation);
        }
        for entry in &self.inner_classes {
            visitor.visit_inner_class(entry);
        }
        for field in &self.fields {
            visitor.visit_field(field);
        }
        for method in &self.methods {
            visitor.visit_method(method);
        }
        visitor.visit_end();
    }
}

/// Parses `bytes` and replays it into `visitor`.
pub fn read_class(bytes: &[u8], visitor: &mut dyn ClassVisitor) -> Result<()> {
    ClassFile::parse(bytes)?.accept(visitor);
    Ok(())
}

struct Bytes<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Bytes<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(ClassFormatError::UnexpectedEof { offset: self.pos })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u1(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u2(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u4(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u8(&mut self) -> Result<u64> {
        Ok(((self.u4()? as u64) << 32) | self.u4()? as u64)
    }
}

#[derive(Debug)]
enum Constant {
    /// Slot 0 and the second slot of longs and doubles.
    Unusable,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    Other,
}

struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn read(input: &mut Bytes<'_>) -> Result<Self> {
        let count = input.u2()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Unusable);

        let mut index = 1u16;
        while index < count {
            let tag = input.u1()?;
            let constant = match tag {
                1 => {
                    let len = input.u2()? as usize;
                    Constant::Utf8(decode_modified_utf8(input.take(len)?))
                }
                3 => Constant::Integer(input.u4()? as i32),
                4 => Constant::Float(f32::from_bits(input.u4()?)),
                5 => Constant::Long(input.u8()? as i64),
                6 => Constant::Double(f64::from_bits(input.u8()?)),
                7 => Constant::Class(input.u2()?),
                8 => Constant::String(input.u2()?),
                // Module and Package.
                16 | 19 | 20 => {
                    input.take(2)?;
                    Constant::Other
                }
                15 => {
                    input.take(3)?;
                    Constant::Other
                }
                // Field/method/interface refs, NameAndType, Dynamic, InvokeDynamic.
                9 | 10 | 11 | 12 | 17 | 18 => {
                    input.take(4)?;
                    Constant::Other
                }
                _ => return Err(ClassFormatError::UnknownConstantTag { tag, index }),
            };

            let wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
            if wide && index + 1 >= count {
                return Err(ClassFormatError::TruncatedWideConstant(index));
            }
            entries.push(constant);
            index += 1;
            if wide {
                entries.push(Constant::Unusable);
                index += 1;
            }
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => Err(ClassFormatError::BadConstantIndex(index)),
            Some(constant) => Ok(constant),
        }
    }

    fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s),
            _ => Err(ClassFormatError::WrongConstantKind {
                index,
                expected: "Utf8",
            }),
        }
    }

    fn optional_utf8(&self, index: u16) -> Result<Option<&str>> {
        if index == 0 {
            Ok(None)
        } else {
            self.utf8(index).map(Some)
        }
    }

    fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Class(name_index) => self.utf8(*name_index),
            _ => Err(ClassFormatError::WrongConstantKind {
                index,
                expected: "Class",
            }),
        }
    }

    fn optional_class_name(&self, index: u16) -> Result<Option<&str>> {
        if index == 0 {
            Ok(None)
        } else {
            self.class_name(index).map(Some)
        }
    }

    fn string(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::String(utf8_index) => self.utf8(*utf8_index),
            // Annotation string constants point straight at a Utf8 entry.
            Constant::Utf8(s) => Ok(s),
            _ => Err(ClassFormatError::WrongConstantKind {
                index,
                expected: "String",
            }),
        }
    }

    fn int(&self, index: u16) -> Result<i32> {
        match self.get(index)? {
            Constant::Integer(v) => Ok(*v),
            _ => Err(ClassFormatError::WrongConstantKind {
                index,
                expected: "Integer",
            }),
        }
    }
}

fn read_attribute<'a, 'p>(
    input: &mut Bytes<'a>,
    pool: &'p ConstantPool,
) -> Result<(&'p str, Bytes<'a>)> {
    let name = pool.utf8(input.u2()?)?;
    let len = input.u4()? as usize;
    Ok((name, Bytes::new(input.take(len)?)))
}

fn read_members(input: &mut Bytes<'_>, pool: &ConstantPool) -> Result<Vec<MemberInfo>> {
    let count = input.u2()?;
    let mut members = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let access = input.u2()?;
        let name = pool.utf8(input.u2()?)?.to_string();
        let descriptor = pool.utf8(input.u2()?)?.to_string();

        let mut annotations = AnnotationSet::default();
        let attribute_count = input.u2()?;
        for _ in 0..attribute_count {
            let (attr_name, mut body) = read_attribute(input, pool)?;
            annotations.read(attr_name, &mut body, pool)?;
        }

        members.push(MemberInfo {
            access,
            name,
            descriptor,
            annotations: annotations.into_vec(),
        });
    }
    Ok(members)
}

fn read_inner_classes(input: &mut Bytes<'_>, pool: &ConstantPool) -> Result<Vec<InnerClassEntry>> {
    let count = input.u2()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = pool.class_name(input.u2()?)?.to_string();
        let outer_name = pool.optional_class_name(input.u2()?)?.map(str::to_string);
        let inner_name = pool.optional_utf8(input.u2()?)?.map(str::to_string);
        let access = input.u2()?;
        entries.push(InnerClassEntry {
            name,
            outer_name,
            inner_name,
            access,
        });
    }
    Ok(entries)
}

#[derive(Default)]
struct AnnotationSet {
    visible: Vec<Annotation>,
    invisible: Vec<Annotation>,
}

impl AnnotationSet {
    /// Reads `body` if `attr_name` is an annotations attribute; ignores it otherwise.
    fn read(&mut self, attr_name: &str, body: &mut Bytes<'_>, pool: &ConstantPool) -> Result<()> {
        let (target, visible) = match attr_name {
            ATTR_VISIBLE_ANNOTATIONS => (&mut self.visible, true),
            ATTR_INVISIBLE_ANNOTATIONS => (&mut self.invisible, false),
            _ => return Ok(()),
        };
        let count = body.u2()?;
        for _ in 0..count {
            target.push(read_annotation(body, pool, visible, 0)?);
        }
        Ok(())
    }

    fn into_vec(self) -> Vec<Annotation> {
        let mut all = self.visible;
        all.extend(self.invisible);
        all
    }
}

fn read_annotation(
    input: &mut Bytes<'_>,
    pool: &ConstantPool,
    visible: bool,
    depth: usize,
) -> Result<Annotation> {
    if depth > MAX_ANNOTATION_DEPTH {
        return Err(ClassFormatError::TooDeep(MAX_ANNOTATION_DEPTH));
    }
    let descriptor = pool.utf8(input.u2()?)?.to_string();
    let pair_count = input.u2()?;
    let mut elements = Vec::with_capacity(pair_count as usize);
    for _ in 0..pair_count {
        let name = pool.utf8(input.u2()?)?.to_string();
        let value = read_element_value(input, pool, visible, depth)?;
        elements.push((name, value));
    }
    Ok(Annotation {
        descriptor,
        visible,
        elements,
    })
}

fn read_element_value(
    input: &mut Bytes<'_>,
    pool: &ConstantPool,
    visible: bool,
    depth: usize,
) -> Result<ElementValue> {
    if depth > MAX_ANNOTATION_DEPTH {
        return Err(ClassFormatError::TooDeep(MAX_ANNOTATION_DEPTH));
    }
    let tag = input.u1()? as char;
    let value = match tag {
        'B' | 'C' | 'I' | 'S' => ElementValue::Int(pool.int(input.u2()?)?),
        'Z' => ElementValue::Boolean(pool.int(input.u2()?)? != 0),
        'J' => {
            let index = input.u2()?;
            match pool.get(index)? {
                Constant::Long(v) => ElementValue::Long(*v),
                _ => {
                    return Err(ClassFormatError::WrongConstantKind {
                        index,
                        expected: "Long",
                    });
                }
            }
        }
        'F' => {
            let index = input.u2()?;
            match pool.get(index)? {
                Constant::Float(v) => ElementValue::Float(*v),
                _ => {
                    return Err(ClassFormatError::WrongConstantKind {
                        index,
                        expected: "Float",
                    });
                }
            }
        }
        'D' => {
            let index = input.u2()?;
            match pool.get(index)? {
                Constant::Double(v) => ElementValue::Double(*v),
                _ => {
                    return Err(ClassFormatError::WrongConstantKind {
                        index,
                        expected: "Double",
                    });
                }
            }
        }
        's' => ElementValue::String(pool.string(input.u2()?)?.to_string()),
        'e' => {
            let descriptor = pool.utf8(input.u2()?)?.to_string();
            let value = pool.utf8(input.u2()?)?.to_string();
            ElementValue::Enum { descriptor, value }
        }
        'c' => ElementValue::Class(pool.utf8(input.u2()?)?.to_string()),
        '@' => ElementValue::Annotation(read_annotation(input, pool, visible, depth + 1)?),
        '[' => {
            let count = input.u2()?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(read_element_value(input, pool, visible, depth + 1)?);
            }
            ElementValue::Array(values)
        }
        other => return Err(ClassFormatError::BadElementTag(other)),
    };
    Ok(value)
}

/// Decodes the class-file flavor of UTF-8: `NUL` as two bytes and
/// supplementary characters as surrogate pairs.
fn decode_modified_utf8(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i] as u16;
        if b & 0x80 == 0 {
            units.push(b);
            i += 1;
        } else if b & 0xE0 == 0xC0 && i + 1 < bytes.len() {
            units.push(((b & 0x1F) << 6) | (bytes[i + 1] as u16 & 0x3F));
            i += 2;
        } else if b & 0xF0 == 0xE0 && i + 2 < bytes.len() {
            units.push(((b & 0x0F) << 12) | ((bytes[i + 1] as u16 & 0x3F) << 6) | (bytes[i + 2] as u16 & 0x3F));
            i += 3;
        } else {
            units.push(0xFFFD);
            i += 1;
        }
    }
    String::from_utf16_lossy(&units)
}
