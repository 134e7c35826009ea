//! JVM type and method descriptors.

use std::fmt;

use crate::error::ClassFormatError;

pub const OBJECT_INTERNAL_NAME: &str = "java/lang/Object";

/// The JVM rejects array types with more dimensions than this.
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JavaType {
    Void,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// A class or interface, by internal name (`java/lang/String`).
    Object(String),
    Array(Box<JavaType>),
}

impl JavaType {
    pub fn object(internal_name: impl Into<String>) -> Self {
        JavaType::Object(internal_name.into())
    }

    /// Parses a complete field descriptor such as `Ljava/lang/String;` or `[I`.
    pub fn parse(descriptor: &str) -> Result<Self, ClassFormatError> {
        match parse_prefix(descriptor)? {
            (ty, "") if ty != JavaType::Void => Ok(ty),
            _ => Err(bad(descriptor)),
        }
    }

    pub fn internal_name(&self) -> Option<&str> {
        match self {
            JavaType::Object(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, JavaType::Object(_) | JavaType::Array(_))
    }

    /// Source-level spelling: `int`, `java.lang.String`, `byte[][]`.
    pub fn class_name(&self) -> String {
        match self {
            JavaType::Object(name) => internal_to_binary(name),
            JavaType::Array(inner) => format!("{}[]", inner.class_name()),
            primitive => primitive_keyword(primitive).to_string(),
        }
    }
}

impl fmt::Display for JavaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JavaType::Void => f.write_str("V"),
            JavaType::Boolean => f.write_str("Z"),
            JavaType::Byte => f.write_str("B"),
            JavaType::Char => f.write_str("C"),
            JavaType::Short => f.write_str("S"),
            JavaType::Int => f.write_str("I"),
            JavaType::Long => f.write_str("J"),
            JavaType::Float => f.write_str("F"),
            JavaType::Double => f.write_str("D"),
            JavaType::Object(name) => write!(f, "L{name};"),
            JavaType::Array(inner) => write!(f, "[{inner}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub params: Vec<JavaType>,
    pub ret: JavaType,
}

impl MethodDescriptor {
    pub fn new(params: Vec<JavaType>, ret: JavaType) -> Self {
        Self { params, ret }
    }

    /// Parses `(Ljava/lang/String;I)V` style descriptors.
    pub fn parse(descriptor: &str) -> Result<Self, ClassFormatError> {
        let mut rest = descriptor.strip_prefix('(').ok_or_else(|| bad(descriptor))?;
        let mut params = Vec::new();
        loop {
            if let Some(after) = rest.strip_prefix(')') {
                rest = after;
                break;
            }
            let (param, after) = parse_prefix(rest).map_err(|_| bad(descriptor))?;
            if param == JavaType::Void {
                return Err(bad(descriptor));
            }
            params.push(param);
            rest = after;
        }

        match parse_prefix(rest).map_err(|_| bad(descriptor))? {
            (ret, "") => Ok(Self { params, ret }),
            _ => Err(bad(descriptor)),
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            write!(f, "{param}")?;
        }
        write!(f, "){}", self.ret)
    }
}

pub fn internal_to_binary(internal_name: &str) -> String {
    internal_name.replace('/', ".")
}

pub fn binary_to_internal(class_name: &str) -> String {
    class_name.replace('.', "/")
}

fn parse_prefix(input: &str) -> Result<(JavaType, &str), ClassFormatError> {
    let element = input.trim_start_matches('[');
    let dimensions = input.len() - element.len();
    if dimensions > MAX_ARRAY_DIMENSIONS {
        return Err(bad(input));
    }
    let (mut ty, rest) = parse_element(element).map_err(|_| bad(input))?;
    if dimensions > 0 && ty == JavaType::Void {
        return Err(bad(input));
    }
    for _ in 0..dimensions {
        ty = JavaType::Array(Box::new(ty));
    }
    Ok((ty, rest))
}

fn parse_element(input: &str) -> Result<(JavaType, &str), ClassFormatError> {
    let mut chars = input.chars();
    let ty = match chars.next() {
        Some('V') => JavaType::Void,
        Some('Z') => JavaType::Boolean,
        Some('B') => JavaType::Byte,
        Some('C') => JavaType::Char,
        Some('S') => JavaType::Short,
        Some('I') => JavaType::Int,
        Some('J') => JavaType::Long,
        Some('F') => JavaType::Float,
        Some('D') => JavaType::Double,
        Some('L') => {
            let body = chars.as_str();
            let end = body.find(';').ok_or_else(|| bad(input))?;
            if end == 0 {
                return Err(bad(input));
            }
            return Ok((JavaType::Object(body[..end].to_string()), &body[end + 1..]));
        }
        _ => return Err(bad(input)),
    };
    Ok((ty, chars.as_str()))
}

fn primitive_keyword(ty: &JavaType) -> &'static str {
    match ty {
        JavaType::Void => "void",
        JavaType::Boolean => "boolean",
        JavaType::Byte => "byte",
        JavaType::Char => "char",
        JavaType::Short => "short",
        JavaType::Int => "int",
        JavaType::Long => "long",
        JavaType::Float => "float",
        JavaType::Double => "double",
        JavaType::Object(_) | JavaType::Array(_) => unreachable!("not a primitive"),
    }
}

fn bad(descriptor: &str) -> ClassFormatError {
    ClassFormatError::BadDescriptor(descriptor.to_string())
}
