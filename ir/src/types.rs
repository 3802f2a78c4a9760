//! Type language of the IR.
//!
//! Types are plain values compared structurally. Two records with the same
//! ordered field names and field types are the same type, no matter where
//! they were constructed.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Primitive {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Unit,
}

impl Primitive {
    pub const ALL: [Primitive; 12] = [
        Primitive::Bool,
        Primitive::I8,
        Primitive::I16,
        Primitive::I32,
        Primitive::I64,
        Primitive::U8,
        Primitive::U16,
        Primitive::U32,
        Primitive::U64,
        Primitive::F32,
        Primitive::F64,
        Primitive::Unit,
    ];

    /// IR spelling. The unit type is spelled `unit`.
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::I8 => "i8",
            Primitive::I16 => "i16",
            Primitive::I32 => "i32",
            Primitive::I64 => "i64",
            Primitive::U8 => "u8",
            Primitive::U16 => "u16",
            Primitive::U32 => "u32",
            Primitive::U64 => "u64",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
            Primitive::Unit => "unit",
        }
    }

    /// Spelling in generated Rust.
    pub fn rust_name(self) -> &'static str {
        match self {
            Primitive::Unit => "()",
            other => other.name(),
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Primitive::I8
                | Primitive::I16
                | Primitive::I32
                | Primitive::I64
                | Primitive::U8
                | Primitive::U16
                | Primitive::U32
                | Primitive::U64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Primitive::F32 | Primitive::F64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamDirection {
    /// Values are pulled out of the stream.
    In,
    /// Values are pushed into the stream.
    Out,
    Bidirectional,
}

impl StreamDirection {
    pub fn name(self) -> &'static str {
        match self {
            StreamDirection::In => "in",
            StreamDirection::Out => "out",
            StreamDirection::Bidirectional => "inout",
        }
    }

    pub fn can_push(self) -> bool {
        matches!(self, StreamDirection::Out | StreamDirection::Bidirectional)
    }
}

/// A named member of a record, or a named alternative of a variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Field {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(Primitive),
    Record(Vec<Field>),
    /// Tagged union. An alternative without payload carries `unit`.
    Variant(Vec<Field>),
    Tuple(Vec<Type>),
    /// Shared n-dimensional array. Only the rank is part of the type; the
    /// extent of each dimension is given where an array is constructed.
    Array {
        element: Box<Type>,
        rank: usize,
    },
    Stream {
        item: Box<Type>,
        direction: StreamDirection,
    },
    Function {
        inputs: Vec<Type>,
        output: Option<Box<Type>>,
    },
}

impl Type {
    pub fn unit() -> Self {
        Type::Primitive(Primitive::Unit)
    }

    pub fn bool() -> Self {
        Type::Primitive(Primitive::Bool)
    }

    pub fn i32() -> Self {
        Type::Primitive(Primitive::I32)
    }

    pub fn i64() -> Self {
        Type::Primitive(Primitive::I64)
    }

    pub fn f64() -> Self {
        Type::Primitive(Primitive::F64)
    }

    pub fn record<N: Into<String>>(fields: impl IntoIterator<Item = (N, Type)>) -> Self {
        Type::Record(
            fields
                .into_iter()
                .map(|(name, ty)| Field::new(name, ty))
                .collect(),
        )
    }

    pub fn variant<N: Into<String>>(alternatives: impl IntoIterator<Item = (N, Type)>) -> Self {
        Type::Variant(
            alternatives
                .into_iter()
                .map(|(name, ty)| Field::new(name, ty))
                .collect(),
        )
    }

    pub fn tuple(elements: impl IntoIterator<Item = Type>) -> Self {
        Type::Tuple(elements.into_iter().collect())
    }

    pub fn array(element: Type, rank: usize) -> Self {
        Type::Array {
            element: Box::new(element),
            rank,
        }
    }

    pub fn stream(item: Type, direction: StreamDirection) -> Self {
        Type::Stream {
            item: Box::new(item),
            direction,
        }
    }

    pub fn function(inputs: impl IntoIterator<Item = Type>, output: Option<Type>) -> Self {
        Type::Function {
            inputs: inputs.into_iter().collect(),
            output: output.map(Box::new),
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Type::Primitive(Primitive::Unit))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Primitive(Primitive::Bool))
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Type::Stream { .. })
    }

    /// Record field or variant alternative by name, with its position.
    pub fn member(&self, name: &str) -> Option<(usize, &Field)> {
        match self {
            Type::Record(fields) | Type::Variant(fields) => {
                fields.iter().enumerate().find(|(_, f)| f.name == name)
            }
            _ => None,
        }
    }

    /// Types directly nested in this one, in declaration order.
    pub fn children(&self) -> Vec<&Type> {
        match self {
            Type::Primitive(_) => Vec::new(),
            Type::Record(fields) | Type::Variant(fields) => fields.iter().map(|f| &f.ty).collect(),
            Type::Tuple(elems) => elems.iter().collect(),
            Type::Array { element, .. } => vec![element.as_ref()],
            Type::Stream { item, .. } => vec![item.as_ref()],
            Type::Function { inputs, output } => {
                let mut out: Vec<&Type> = inputs.iter().collect();
                if let Some(output) = output {
                    out.push(output.as_ref());
                }
                out
            }
        }
    }

    /// True if a stream occurs anywhere below this type (not counting the
    /// type itself).
    pub fn contains_nested_stream(&self) -> bool {
        self.children()
            .into_iter()
            .any(|child| child.is_stream() || child.contains_nested_stream())
    }
}

impl From<Primitive> for Type {
    fn from(p: Primitive) -> Self {
        Type::Primitive(p)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(p) => write!(f, "{}", p.name()),
            Type::Record(fields) => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.ty)?;
                }
                write!(f, "}}")
            }
            Type::Variant(alts) => {
                write!(f, "<")?;
                for (i, alt) in alts.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}: {}", alt.name, alt.ty)?;
                }
                write!(f, ">")
            }
            Type::Tuple(elems) => {
                write!(f, "(")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", elem)?;
                }
                write!(f, ")")
            }
            Type::Array { element, rank } => write!(f, "tensor<{} x {}>", element, rank),
            Type::Stream { item, direction } => write!(f, "stream<{}, {}>", direction.name(), item),
            Type::Function { inputs, output } => {
                write!(f, "fn(")?;
                for (i, input) in inputs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", input)?;
                }
                write!(f, ")")?;
                if let Some(output) = output {
                    write!(f, " -> {}", output)?;
                }
                Ok(())
            }
        }
    }
}
