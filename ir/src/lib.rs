use std::collections::BTreeMap;
use std::fmt;

pub mod builder;
pub mod pretty;
pub mod types;

#[cfg(test)]
mod snapshots;

pub use crate::types::{Field, Primitive, StreamDirection, Type};

// Id types for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl ValueId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for ValueId {
    fn from(idx: usize) -> Self {
        ValueId(idx as u32)
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueDecl {
    pub ty: Type,
}

impl ValueDecl {
    pub fn new(ty: Type) -> Self {
        ValueDecl { ty }
    }
}

/// Well-known attribute keys carried on functions.
pub mod attrs {
    pub const TASK_NAME: &str = "task_name";
    pub const MOD_NAME: &str = "mod_name";
    pub const IS_EVENT_HANDLER: &str = "is_event_handler";
    pub const IS_INIT: &str = "is_init";
    pub const RUST_NAME: &str = "rust_name";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// Presence-only marker.
    Unit,
    Str(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(BTreeMap<String, AttrValue>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), AttrValue::Str(value.into()));
    }

    pub fn set_flag(&mut self, key: impl Into<String>) {
        self.0.insert(key.into(), AttrValue::Unit);
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(AttrValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Unit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    Abs,
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Not => "not",
            UnaryOp::Abs => "abs",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    And,
    Or,
}

impl BinOp {
    pub fn name(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Rem => "rem",
            BinOp::BitAnd => "bitand",
            BinOp::BitOr => "bitor",
            BinOp::BitXor => "bitxor",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn name(self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Lt => "lt",
            CmpOp::Le => "le",
            CmpOp::Gt => "gt",
            CmpOp::Ge => "ge",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

/// Straight-line sequence of operations. Region blocks end in a terminator
/// operation; function bodies end in `return`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub args: Vec<ValueId>,
    pub ops: Vec<Operation>,
}

impl Block {
    pub fn new(args: Vec<ValueId>) -> Self {
        Block {
            args,
            ops: Vec::new(),
        }
    }

    pub fn terminator(&self) -> Option<&Operation> {
        self.ops.last().filter(|op| op.kind.is_terminator())
    }
}

/// Pre/post-condition loop. `before` receives the loop-carried values
/// (initialized from `inits`) and ends in `LoopCondition`; `after` receives
/// the condition's pass-through values and ends in `LoopYield`, whose operands
/// become the next iteration's carried values.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOp {
    pub inits: Vec<ValueId>,
    pub before: Block,
    pub after: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    Constant(Literal),
    Unary {
        op: UnaryOp,
        operand: ValueId,
    },
    Binary {
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    /// Binary operation on reference-counted operands (`Rc<Array<..>>`).
    BinaryRc {
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Compare {
        op: CmpOp,
        lhs: ValueId,
        rhs: ValueId,
    },
    Call {
        callee: String,
        args: Vec<ValueId>,
    },
    CallIndirect {
        callee: ValueId,
        args: Vec<ValueId>,
    },
    FieldAccess {
        aggregate: ValueId,
        field: String,
    },
    EnumCheck {
        value: ValueId,
        variant: String,
    },
    EnumAccess {
        value: ValueId,
        variant: String,
    },
    /// Field values in the record's declaration order.
    MakeStruct {
        fields: Vec<ValueId>,
    },
    MakeEnum {
        variant: String,
        payload: Option<ValueId>,
    },
    MakeTensor {
        shape: Vec<usize>,
        elements: Vec<ValueId>,
    },
    MakeTuple {
        elements: Vec<ValueId>,
    },
    MethodCall {
        receiver: ValueId,
        method: String,
        args: Vec<ValueId>,
    },
    If {
        cond: ValueId,
        then_block: Block,
        else_block: Block,
    },
    Loop(LoopOp),
    LoopBreak {
        values: Vec<ValueId>,
    },
    LoopCondition {
        cond: ValueId,
        args: Vec<ValueId>,
    },
    LoopYield {
        values: Vec<ValueId>,
    },
    BlockResult {
        value: Option<ValueId>,
    },
    Emit {
        value: ValueId,
    },
    Panic {
        message: Option<String>,
    },
    Return {
        value: Option<ValueId>,
    },
}

impl OpKind {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            OpKind::Constant(_) => "constant",
            OpKind::Unary { .. } => "unary",
            OpKind::Binary { .. } => "binary",
            OpKind::BinaryRc { .. } => "binary_rc",
            OpKind::Compare { .. } => "compare",
            OpKind::Call { .. } => "call",
            OpKind::CallIndirect { .. } => "call_indirect",
            OpKind::FieldAccess { .. } => "field_access",
            OpKind::EnumCheck { .. } => "enum_check",
            OpKind::EnumAccess { .. } => "enum_access",
            OpKind::MakeStruct { .. } => "make_struct",
            OpKind::MakeEnum { .. } => "make_enum",
            OpKind::MakeTensor { .. } => "make_tensor",
            OpKind::MakeTuple { .. } => "make_tuple",
            OpKind::MethodCall { .. } => "method_call",
            OpKind::If { .. } => "if",
            OpKind::Loop(_) => "loop",
            OpKind::LoopBreak { .. } => "loop.break",
            OpKind::LoopCondition { .. } => "loop.condition",
            OpKind::LoopYield { .. } => "loop.yield",
            OpKind::BlockResult { .. } => "block.result",
            OpKind::Emit { .. } => "emit",
            OpKind::Panic { .. } => "panic",
            OpKind::Return { .. } => "return",
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            OpKind::LoopBreak { .. }
                | OpKind::LoopCondition { .. }
                | OpKind::LoopYield { .. }
                | OpKind::BlockResult { .. }
                | OpKind::Return { .. }
        )
    }

    /// Values read by this operation itself, excluding nested regions.
    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            OpKind::Constant(_) | OpKind::Panic { .. } => Vec::new(),
            OpKind::Unary { operand, .. } => vec![*operand],
            OpKind::Binary { lhs, rhs, .. }
            | OpKind::BinaryRc { lhs, rhs, .. }
            | OpKind::Compare { lhs, rhs, .. } => vec![*lhs, *rhs],
            OpKind::Call { args, .. } => args.clone(),
            OpKind::CallIndirect { callee, args } => {
                let mut out = vec![*callee];
                out.extend(args.iter().copied());
                out
            }
            OpKind::FieldAccess { aggregate, .. } => vec![*aggregate],
            OpKind::EnumCheck { value, .. } | OpKind::EnumAccess { value, .. } => vec![*value],
            OpKind::MakeStruct { fields } => fields.clone(),
            OpKind::MakeEnum { payload, .. } => payload.iter().copied().collect(),
            OpKind::MakeTensor { elements, .. } | OpKind::MakeTuple { elements } => {
                elements.clone()
            }
            OpKind::MethodCall { receiver, args, .. } => {
                let mut out = vec![*receiver];
                out.extend(args.iter().copied());
                out
            }
            OpKind::If { cond, .. } => vec![*cond],
            OpKind::Loop(lp) => lp.inits.clone(),
            OpKind::LoopBreak { values } | OpKind::LoopYield { values } => values.clone(),
            OpKind::LoopCondition { cond, args } => {
                let mut out = vec![*cond];
                out.extend(args.iter().copied());
                out
            }
            OpKind::BlockResult { value } | OpKind::Return { value } => {
                value.iter().copied().collect()
            }
            OpKind::Emit { value } => vec![*value],
        }
    }

    /// Nested regions with their labels, in program order.
    pub fn regions(&self) -> Vec<(&'static str, &Block)> {
        match self {
            OpKind::If {
                then_block,
                else_block,
                ..
            } => vec![("then", then_block), ("else", else_block)],
            OpKind::Loop(lp) => vec![("before", &lp.before), ("after", &lp.after)],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub results: Vec<ValueId>,
    pub kind: OpKind,
}

impl Operation {
    pub fn new(kind: OpKind, results: Vec<ValueId>) -> Self {
        Operation { results, kind }
    }

    pub fn result(&self) -> Option<ValueId> {
        self.results.first().copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub inputs: Vec<Type>,
    pub output: Option<Type>,
    /// Entry block; its arguments are the function parameters.
    pub body: Block,
    pub attrs: Attributes,
    /// Declared but not defined here. Produces no code.
    pub external: bool,
    pub values: Vec<ValueDecl>,
}

impl Function {
    pub fn value(&self, id: ValueId) -> Option<&ValueDecl> {
        self.values.get(id.index())
    }

    pub fn value_type(&self, id: ValueId) -> Option<&Type> {
        self.value(id).map(|decl| &decl.ty)
    }

    pub fn args(&self) -> &[ValueId] {
        &self.body.args
    }

    /// Name used for this function in generated code.
    pub fn rust_name(&self) -> &str {
        self.attrs.get_str(attrs::RUST_NAME).unwrap_or(&self.name)
    }

    pub fn task_name(&self) -> Option<&str> {
        self.attrs.get_str(attrs::TASK_NAME)
    }

    pub fn mod_name(&self) -> Option<&str> {
        self.attrs.get_str(attrs::MOD_NAME)
    }

    pub fn is_event_handler(&self) -> bool {
        self.attrs.has(attrs::IS_EVENT_HANDLER)
    }

    pub fn is_init(&self) -> bool {
        self.attrs.has(attrs::IS_INIT)
    }

    pub fn function_type(&self) -> Type {
        Type::function(self.inputs.iter().cloned(), self.output.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub name: Option<String>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: Some(name.into()),
            functions: Vec::new(),
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}
