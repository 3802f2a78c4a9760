//! Structural verification run before rendering.
//!
//! The checks are local: operand counts and types, terminator placement,
//! loop and branch shapes, task handler signatures, value scoping. They exist
//! so the emitter never produces malformed Rust; they do not type-check the
//! program beyond that.

use crate::error::{Location, RenderError, StructuralError};
use ir::{
    BinOp, Block, Function, Literal, Module, OpKind, Operation, Primitive, Type, UnaryOp,
    ValueId,
};
use std::collections::{HashMap, HashSet};

const KEYWORDS: &[&str] = &[
    "Self", "abstract", "as", "async", "await", "become", "box", "break", "const", "continue",
    "crate", "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "if", "impl",
    "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "self", "static", "struct", "super", "trait", "true", "try", "type", "typeof",
    "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name != "_"
        && !KEYWORDS.contains(&name)
}

/// `v<n>` and `event` name locals in generated bodies, so a function called
/// that way would be shadowed at its call sites.
fn is_reserved(name: &str) -> bool {
    let numbered = name
        .strip_prefix('v')
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
    numbered || name == "event"
}

fn check_identifier(name: &str) -> Result<(), StructuralError> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(StructuralError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

/// Member names must be printable and streams may only appear at the top.
fn check_type(ty: &Type) -> Result<(), StructuralError> {
    if ty.contains_nested_stream() {
        return Err(StructuralError::NestedStream { ty: ty.to_string() });
    }
    check_member_names(ty)
}

fn check_member_names(ty: &Type) -> Result<(), StructuralError> {
    if let Type::Record(fields) | Type::Variant(fields) = ty {
        let mut seen = HashSet::new();
        for field in fields {
            check_identifier(&field.name)?;
            if !seen.insert(field.name.as_str()) {
                return Err(StructuralError::DuplicateMember {
                    name: field.name.clone(),
                    ty: ty.to_string(),
                });
            }
        }
    }
    for child in ty.children() {
        check_member_names(child)?;
    }
    Ok(())
}

/// Whether `lit` is representable in `p` without overflow. Rust rejects
/// out-of-range integer literals and finite floats that round to infinity.
fn literal_in_range(lit: &Literal, p: Primitive) -> bool {
    fn fits<T: TryFrom<i128>>(v: i128) -> bool {
        T::try_from(v).is_ok()
    }
    let int = match lit {
        Literal::Int(v) => i128::from(*v),
        Literal::UInt(v) => i128::from(*v),
        Literal::Float(v) => {
            return p != Primitive::F32 || !v.is_finite() || (*v as f32).is_finite();
        }
        Literal::Bool(_) | Literal::Unit => return true,
    };
    match p {
        Primitive::I8 => fits::<i8>(int),
        Primitive::I16 => fits::<i16>(int),
        Primitive::I32 => fits::<i32>(int),
        Primitive::I64 => fits::<i64>(int),
        Primitive::U8 => fits::<u8>(int),
        Primitive::U16 => fits::<u16>(int),
        Primitive::U32 => fits::<u32>(int),
        Primitive::U64 => fits::<u64>(int),
        _ => true,
    }
}

fn literal_display(lit: &Literal) -> String {
    match lit {
        Literal::Int(v) => v.to_string(),
        Literal::UInt(v) => v.to_string(),
        Literal::Float(v) => v.to_string(),
        Literal::Bool(b) => b.to_string(),
        Literal::Unit => "()".to_string(),
    }
}

fn same(expected: &Type, found: &Type) -> Result<(), StructuralError> {
    if expected == found {
        Ok(())
    } else {
        Err(StructuralError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        })
    }
}

fn type_list(types: &[&Type]) -> String {
    types
        .iter()
        .map(|ty| ty.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn verify_module(module: &Module) -> Result<(), RenderError> {
    let module_error = |kind| RenderError::structural(Location::module(), kind);
    match module.name.as_deref() {
        None | Some("") => return Err(module_error(StructuralError::MissingModuleName)),
        Some(name) => check_identifier(name).map_err(module_error)?,
    }
    let mut defined = HashSet::new();
    for function in &module.functions {
        verify_function(module, function)?;
        if function.external {
            continue;
        }
        // Plain functions share the module scope, task functions their impl.
        let scope = function.task_name().and(function.mod_name()).unwrap_or("");
        if !defined.insert((scope, function.rust_name())) {
            return Err(RenderError::structural(
                Location::function(&function.name),
                StructuralError::DuplicateMember {
                    name: function.rust_name().to_string(),
                    ty: module.name.clone().unwrap_or_default(),
                },
            ));
        }
    }
    verify_tasks(module)
}

/// Task functions sharing a module must agree on the task's state and
/// interface types, since the scaffolding is emitted once per module.
fn verify_tasks(module: &Module) -> Result<(), RenderError> {
    struct Seen<'a> {
        task_name: &'a str,
        state: Option<&'a Type>,
        interface: Option<(Option<&'a Type>, Option<&'a Type>)>,
    }
    let mut seen: HashMap<&str, Seen<'_>> = HashMap::new();
    for function in module.functions.iter().filter(|f| !f.external) {
        let (Some(task_name), Some(mod_name)) = (function.task_name(), function.mod_name()) else {
            continue;
        };
        let arg_type = |i: usize| {
            function
                .args()
                .get(i)
                .and_then(|arg| function.value_type(*arg))
        };
        let fail = |what| {
            RenderError::structural(
                Location::function(&function.name),
                StructuralError::TaskStateMismatch {
                    module: mod_name.to_string(),
                    what,
                },
            )
        };
        let interface = function
            .is_event_handler()
            .then(|| (arg_type(1), arg_type(2)));
        match seen.get_mut(mod_name) {
            None => {
                seen.insert(
                    mod_name,
                    Seen {
                        task_name,
                        state: arg_type(0),
                        interface,
                    },
                );
            }
            Some(prev) => {
                if prev.task_name != task_name {
                    return Err(fail("the task name"));
                }
                if prev.state != arg_type(0) {
                    return Err(fail("the state type"));
                }
                if let Some(current) = interface {
                    match prev.interface {
                        Some(first) if first != current => {
                            return Err(fail("the interface types"))
                        }
                        Some(_) => {}
                        None => prev.interface = Some(current),
                    }
                }
            }
        }
    }
    verify_task_type_names(module)
}

/// Task types are spelled by their task module everywhere in the output, so
/// one structural type may stand for only one of them.
fn verify_task_type_names(module: &Module) -> Result<(), RenderError> {
    let mut owners: HashMap<&Type, String> = HashMap::new();
    for function in module.functions.iter().filter(|f| !f.external) {
        let (Some(task_name), Some(mod_name)) = (function.task_name(), function.mod_name()) else {
            continue;
        };
        let arg_type = |i: usize| {
            function
                .args()
                .get(i)
                .and_then(|arg| function.value_type(*arg))
        };
        let mut named = vec![(arg_type(0), task_name)];
        if function.is_event_handler() {
            named.push((arg_type(1), "IInterface"));
            let outbound = match arg_type(2) {
                Some(Type::Stream { item, direction })
                    if direction.can_push() && matches!(**item, Type::Variant(_)) =>
                {
                    Some(item.as_ref())
                }
                _ => None,
            };
            named.push((outbound, "OInterface"));
        }
        for (ty, name) in named {
            let Some(ty) = ty else {
                continue;
            };
            let path = format!("{}::{}", mod_name, name);
            match owners.get(ty) {
                Some(first) if *first != path => {
                    return Err(RenderError::structural(
                        Location::function(&function.name),
                        StructuralError::SharedTaskType {
                            ty: ty.to_string(),
                            first: first.clone(),
                            second: path,
                        },
                    ))
                }
                Some(_) => {}
                None => {
                    owners.insert(ty, path);
                }
            }
        }
    }
    Ok(())
}

pub fn verify_function(module: &Module, function: &Function) -> Result<(), RenderError> {
    let fail = |kind| RenderError::structural(Location::function(&function.name), kind);

    for ty in function.inputs.iter().chain(function.output.iter()) {
        check_type(ty).map_err(fail)?;
    }
    for decl in &function.values {
        check_type(&decl.ty).map_err(fail)?;
    }
    if is_reserved(function.rust_name()) {
        return Err(fail(StructuralError::ReservedName {
            name: function.rust_name().to_string(),
        }));
    }
    if function.external {
        return Ok(());
    }
    check_identifier(function.rust_name()).map_err(fail)?;

    let args = function.args();
    if args.len() != function.inputs.len() {
        return Err(fail(StructuralError::BodyArity {
            expected: function.inputs.len(),
            found: args.len(),
        }));
    }
    let mut arg_types = Vec::with_capacity(args.len());
    for (index, (arg, expected)) in args.iter().zip(&function.inputs).enumerate() {
        let found = function
            .value_type(*arg)
            .ok_or(StructuralError::UnknownValue { value: *arg })
            .map_err(fail)?;
        if found != expected {
            return Err(fail(StructuralError::BodyArgument {
                index,
                expected: expected.to_string(),
                found: found.to_string(),
            }));
        }
        arg_types.push(found);
    }

    let has_task_attrs = function.task_name().is_some() || function.is_event_handler();
    let mut outbound = None;
    let mut in_task = false;
    if has_task_attrs {
        let Some(mod_name) = function.mod_name() else {
            return Err(fail(StructuralError::MissingTaskModule));
        };
        check_identifier(mod_name).map_err(fail)?;
        let Some(task_name) = function.task_name() else {
            return Err(fail(StructuralError::MissingTaskModule));
        };
        check_identifier(task_name).map_err(fail)?;
        in_task = true;

        if function.is_event_handler() {
            if arg_types.len() != 3 {
                return Err(fail(StructuralError::HandlerArity {
                    found: arg_types.len(),
                }));
            }
            let handler_arg = |position, expected, found: &Type| StructuralError::HandlerArgument {
                position,
                expected,
                found: found.to_string(),
            };
            if !matches!(arg_types[0], Type::Record(_)) {
                return Err(fail(handler_arg("first", "a struct", arg_types[0])));
            }
            if !matches!(arg_types[1], Type::Variant(_)) {
                return Err(fail(handler_arg("second", "an enum", arg_types[1])));
            }
            match arg_types[2] {
                Type::Stream { item, .. } => outbound = Some(item.as_ref()),
                other => return Err(fail(handler_arg("third", "a stream", other))),
            }
        } else {
            match arg_types.first() {
                Some(Type::Record(_)) => {}
                Some(other) => {
                    return Err(fail(StructuralError::MethodReceiver {
                        found: other.to_string(),
                    }))
                }
                None => {
                    return Err(fail(StructuralError::MethodReceiver {
                        found: "no arguments".to_string(),
                    }))
                }
            }
        }
    }
    // Start hooks are listed in a task module's directive.
    if function.is_init() && !in_task {
        return Err(fail(StructuralError::OutsideTask { op: "on_start" }));
    }

    let mut verifier = FnVerifier {
        module,
        function,
        defined: HashSet::new(),
        trail: Vec::new(),
        loops: Vec::new(),
        in_task,
        outbound,
    };
    verifier.verify_block(&function.body, "", Region::Body)
}

#[derive(Clone, Copy)]
enum Region<'a> {
    Body,
    IfBranch { result: Option<&'a Type> },
    LoopBefore,
    LoopAfter,
}

struct LoopCtx<'a> {
    results: Vec<&'a Type>,
    carried: Vec<&'a Type>,
}

struct FnVerifier<'a> {
    module: &'a Module,
    function: &'a Function,
    defined: HashSet<ValueId>,
    /// Definition order, for popping a block's values when it closes.
    trail: Vec<ValueId>,
    loops: Vec<LoopCtx<'a>>,
    in_task: bool,
    outbound: Option<&'a Type>,
}

impl<'a> FnVerifier<'a> {
    fn at(&self, path: &str, op: &Operation) -> Location {
        Location::op(&self.function.name, path, op.kind.mnemonic())
    }

    fn decl(&self, value: ValueId) -> Result<&'a Type, StructuralError> {
        self.function
            .value_type(value)
            .ok_or(StructuralError::UnknownValue { value })
    }

    /// Type of a value that must be in scope.
    fn used(&self, value: ValueId) -> Result<&'a Type, StructuralError> {
        if !self.defined.contains(&value) {
            return Err(StructuralError::UnknownValue { value });
        }
        self.decl(value)
    }

    fn define(&mut self, value: ValueId) -> Result<(), StructuralError> {
        self.decl(value)?;
        if self.defined.insert(value) {
            self.trail.push(value);
        }
        Ok(())
    }

    fn verify_block(
        &mut self,
        block: &'a Block,
        prefix: &str,
        region: Region<'a>,
    ) -> Result<(), RenderError> {
        let mark = self.trail.len();
        for arg in &block.args {
            self.define(*arg).map_err(|kind| {
                RenderError::structural(Location::function(&self.function.name), kind)
            })?;
        }

        for (i, op) in block.ops.iter().enumerate() {
            let path = if prefix.is_empty() {
                i.to_string()
            } else {
                format!("{}.{}", prefix, i)
            };
            if op.kind.is_terminator() && i + 1 != block.ops.len() {
                return Err(RenderError::structural(
                    self.at(&path, op),
                    StructuralError::MisplacedTerminator {
                        op: op.kind.mnemonic(),
                    },
                ));
            }
            self.verify_op(op, &path, region)?;
        }
        self.check_end(block, prefix, region)?;

        while self.trail.len() > mark {
            if let Some(value) = self.trail.pop() {
                self.defined.remove(&value);
            }
        }
        Ok(())
    }

    /// The last operation must be a terminator that fits the region.
    fn check_end(&self, block: &Block, prefix: &str, region: Region<'a>) -> Result<(), RenderError> {
        let last = block.ops.last();
        let kind = last.map(|op| &op.kind);
        let error = match region {
            Region::Body => match kind {
                Some(OpKind::Return { .. }) => None,
                _ => Some(StructuralError::MissingTerminator {
                    region: "function body",
                    expected: "return",
                }),
            },
            Region::IfBranch { .. } => match kind {
                Some(OpKind::BlockResult { .. } | OpKind::LoopBreak { .. } | OpKind::Return { .. }) => {
                    None
                }
                Some(other) => Some(StructuralError::BadIfTerminator {
                    found: other.mnemonic(),
                }),
                None => Some(StructuralError::BadIfTerminator { found: "nothing" }),
            },
            Region::LoopBefore => match kind {
                Some(OpKind::LoopCondition { .. }) => None,
                _ => Some(StructuralError::MissingTerminator {
                    region: "loop before",
                    expected: "loop.condition",
                }),
            },
            Region::LoopAfter => match kind {
                Some(OpKind::LoopYield { .. }) => None,
                _ => Some(StructuralError::MissingTerminator {
                    region: "loop after",
                    expected: "loop.yield",
                }),
            },
        };
        match (error, last) {
            (None, _) => Ok(()),
            (Some(kind), Some(op)) => {
                let index = block.ops.len() - 1;
                let path = if prefix.is_empty() {
                    index.to_string()
                } else {
                    format!("{}.{}", prefix, index)
                };
                Err(RenderError::structural(self.at(&path, op), kind))
            }
            (Some(kind), None) => {
                let location = if prefix.is_empty() {
                    Location::function(&self.function.name)
                } else {
                    Location::op(&self.function.name, prefix, "region")
                };
                Err(RenderError::structural(location, kind))
            }
        }
    }

    fn verify_op(
        &mut self,
        op: &'a Operation,
        path: &str,
        region: Region<'a>,
    ) -> Result<(), RenderError> {
        self.check_op(op, region)
            .map_err(|kind| RenderError::structural(self.at(path, op), kind))?;

        match &op.kind {
            OpKind::If {
                then_block,
                else_block,
                ..
            } => {
                let result = match op.results.first() {
                    Some(value) => Some(
                        self.decl(*value)
                            .map_err(|kind| RenderError::structural(self.at(path, op), kind))?,
                    ),
                    None => None,
                };
                let branch = Region::IfBranch { result };
                self.verify_block(then_block, &format!("{}.then", path), branch)?;
                self.verify_block(else_block, &format!("{}.else", path), branch)?;
            }
            OpKind::Loop(lp) => {
                let decls = |values: &[ValueId]| -> Result<Vec<&'a Type>, StructuralError> {
                    values.iter().map(|v| self.decl(*v)).collect()
                };
                let ctx = decls(&op.results)
                    .and_then(|results| Ok((results, decls(&lp.before.args)?)))
                    .map_err(|kind| RenderError::structural(self.at(path, op), kind))?;
                self.loops.push(LoopCtx {
                    results: ctx.0,
                    carried: ctx.1,
                });
                self.verify_block(&lp.before, &format!("{}.before", path), Region::LoopBefore)?;
                self.verify_block(&lp.after, &format!("{}.after", path), Region::LoopAfter)?;
                self.loops.pop();
            }
            _ => {}
        }

        for result in &op.results {
            self.define(*result)
                .map_err(|kind| RenderError::structural(self.at(path, op), kind))?;
        }
        Ok(())
    }

    fn expect_results(&self, op: &Operation, count: usize) -> Result<(), StructuralError> {
        if op.results.len() == count {
            Ok(())
        } else {
            Err(StructuralError::ResultCount {
                expected: count,
                found: op.results.len(),
            })
        }
    }

    fn single_result(&self, op: &Operation) -> Result<&'a Type, StructuralError> {
        self.expect_results(op, 1)?;
        self.decl(op.results[0])
    }

    fn check_operands(&self, values: &[ValueId], expected: &[&Type]) -> Result<(), StructuralError> {
        if values.len() != expected.len() {
            return Err(StructuralError::OperandCount {
                expected: expected.len(),
                found: values.len(),
            });
        }
        for (index, (value, expected)) in values.iter().zip(expected).enumerate() {
            let found = self.used(*value)?;
            if found != *expected {
                return Err(StructuralError::OperandType {
                    index,
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_op(&self, op: &'a Operation, region: Region<'a>) -> Result<(), StructuralError> {
        for value in op.kind.operands() {
            self.used(value)?;
        }
        match &op.kind {
            OpKind::Constant(lit) => {
                let ty = self.single_result(op)?;
                let fits = match (lit, ty) {
                    (Literal::Bool(_), Type::Primitive(Primitive::Bool)) => true,
                    (Literal::Int(v), Type::Primitive(p)) if p.is_integer() => {
                        *v >= 0 || !p.name().starts_with('u')
                    }
                    (Literal::UInt(_), Type::Primitive(p)) => p.is_integer(),
                    (Literal::Float(_), Type::Primitive(p)) => p.is_float(),
                    (Literal::Unit, Type::Primitive(Primitive::Unit)) => true,
                    _ => false,
                };
                if !fits {
                    return Err(StructuralError::TypeMismatch {
                        expected: ty.to_string(),
                        found: format!("{:?}", lit),
                    });
                }
                match ty {
                    Type::Primitive(p) if !literal_in_range(lit, *p) => {
                        Err(StructuralError::LiteralRange {
                            literal: literal_display(lit),
                            ty: p.name().to_string(),
                        })
                    }
                    _ => Ok(()),
                }
            }
            OpKind::Unary { op: unary, operand } => {
                let ty = self.single_result(op)?;
                let operand = self.used(*operand)?;
                same(ty, operand)?;
                let fits = match (unary, operand) {
                    (UnaryOp::Not, Type::Primitive(p)) => *p == Primitive::Bool || p.is_integer(),
                    (UnaryOp::Neg | UnaryOp::Abs, Type::Primitive(p)) => {
                        p.is_float() || (p.is_integer() && !p.name().starts_with('u'))
                    }
                    (_, Type::Primitive(p)) => p.is_float(),
                    _ => false,
                };
                if !fits {
                    return Err(StructuralError::TypeMismatch {
                        expected: format!("an operand type supporting '{}'", unary.name()),
                        found: operand.to_string(),
                    });
                }
                Ok(())
            }
            OpKind::Binary { op: bin, lhs, rhs } => {
                let ty = self.single_result(op)?;
                let lhs = self.used(*lhs)?;
                same(lhs, self.used(*rhs)?)?;
                same(ty, lhs)?;
                let fits = match (bin, lhs) {
                    (BinOp::And | BinOp::Or, Type::Primitive(p)) => *p == Primitive::Bool,
                    (BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor, Type::Primitive(p)) => {
                        *p == Primitive::Bool || p.is_integer()
                    }
                    (BinOp::Shl | BinOp::Shr, Type::Primitive(p)) => p.is_integer(),
                    (_, Type::Primitive(p)) => p.is_integer() || p.is_float(),
                    _ => false,
                };
                if !fits {
                    return Err(StructuralError::TypeMismatch {
                        expected: format!("an operand type supporting '{}'", bin.name()),
                        found: lhs.to_string(),
                    });
                }
                Ok(())
            }
            // Element-wise arithmetic on shared tensors.
            OpKind::BinaryRc { lhs, rhs, .. } => {
                let ty = self.single_result(op)?;
                let lhs = self.used(*lhs)?;
                same(lhs, self.used(*rhs)?)?;
                same(ty, lhs)?;
                if !matches!(lhs, Type::Array { .. }) {
                    return Err(StructuralError::TypeMismatch {
                        expected: "a tensor type".to_string(),
                        found: lhs.to_string(),
                    });
                }
                Ok(())
            }
            OpKind::Compare { lhs, rhs, .. } => {
                let ty = self.single_result(op)?;
                same(self.used(*lhs)?, self.used(*rhs)?)?;
                same(&Type::bool(), ty)
            }
            OpKind::Call { callee, args } => {
                let target = self.module.function(callee).ok_or_else(|| {
                    StructuralError::UnknownCallee {
                        name: callee.clone(),
                    }
                })?;
                let inputs: Vec<&Type> = target.inputs.iter().collect();
                self.check_operands(args, &inputs)?;
                self.check_call_result(op, target.output.as_ref())
            }
            OpKind::CallIndirect { callee, args } => match self.used(*callee)? {
                Type::Function { inputs, output } => {
                    let inputs: Vec<&Type> = inputs.iter().collect();
                    self.check_operands(args, &inputs)?;
                    self.check_call_result(op, output.as_deref())
                }
                other => Err(StructuralError::TypeMismatch {
                    expected: "a function type".to_string(),
                    found: other.to_string(),
                }),
            },
            OpKind::FieldAccess { aggregate, field } => {
                let ty = self.single_result(op)?;
                let record = self.used(*aggregate)?;
                if !matches!(record, Type::Record(_)) {
                    return Err(StructuralError::TypeMismatch {
                        expected: "a struct type".to_string(),
                        found: record.to_string(),
                    });
                }
                let (_, decl) = record.member(field).ok_or_else(|| StructuralError::UnknownField {
                    field: field.clone(),
                    ty: record.to_string(),
                })?;
                same(&decl.ty, ty)
            }
            OpKind::EnumCheck { value, variant } => {
                let ty = self.single_result(op)?;
                self.variant_payload(self.used(*value)?, variant)?;
                same(&Type::bool(), ty)
            }
            OpKind::EnumAccess { value, variant } => {
                let ty = self.single_result(op)?;
                let payload = self.variant_payload(self.used(*value)?, variant)?;
                same(payload, ty)
            }
            OpKind::MakeStruct { fields } => match self.single_result(op)? {
                Type::Record(decls) => {
                    let expected: Vec<&Type> = decls.iter().map(|f| &f.ty).collect();
                    self.check_operands(fields, &expected)
                }
                other => Err(StructuralError::TypeMismatch {
                    expected: "a struct type".to_string(),
                    found: other.to_string(),
                }),
            },
            OpKind::MakeEnum { variant, payload } => {
                let ty = self.single_result(op)?;
                let expected = self.variant_payload(ty, variant)?;
                match payload {
                    Some(value) => self.check_operands(&[*value], &[expected]),
                    None if expected.is_unit() => Ok(()),
                    None => Err(StructuralError::OperandCount {
                        expected: 1,
                        found: 0,
                    }),
                }
            }
            OpKind::MakeTensor { shape, elements } => match self.single_result(op)? {
                Type::Array { element, rank } => {
                    let count = shape
                        .iter()
                        .try_fold(1usize, |acc, dim| acc.checked_mul(*dim));
                    if shape.len() != *rank || count != Some(elements.len()) {
                        return Err(StructuralError::TensorShape {
                            shape: shape.clone(),
                            rank: *rank,
                            found: elements.len(),
                        });
                    }
                    let expected = vec![element.as_ref(); elements.len()];
                    self.check_operands(elements, &expected)
                }
                other => Err(StructuralError::TypeMismatch {
                    expected: "a tensor type".to_string(),
                    found: other.to_string(),
                }),
            },
            OpKind::MakeTuple { elements } => match self.single_result(op)? {
                Type::Tuple(types) => {
                    let expected: Vec<&Type> = types.iter().collect();
                    self.check_operands(elements, &expected)
                }
                other => Err(StructuralError::TypeMismatch {
                    expected: "a tuple type".to_string(),
                    found: other.to_string(),
                }),
            },
            OpKind::MethodCall { method, .. } => {
                check_identifier(method)?;
                if op.results.len() > 1 {
                    return Err(StructuralError::ResultCount {
                        expected: 1,
                        found: op.results.len(),
                    });
                }
                Ok(())
            }
            OpKind::If { cond, .. } => {
                same(&Type::bool(), self.used(*cond)?)?;
                if op.results.len() > 1 {
                    return Err(StructuralError::ResultCount {
                        expected: 1,
                        found: op.results.len(),
                    });
                }
                Ok(())
            }
            OpKind::Loop(lp) => {
                let carried = lp.before.args.len();
                if lp.inits.len() != carried {
                    return Err(StructuralError::LoopArity {
                        what: "initializers",
                        expected: carried,
                        found: lp.inits.len(),
                    });
                }
                self.loop_types("initializers", &lp.before.args, &lp.inits)?;
                if lp.after.args.len() != op.results.len() {
                    return Err(StructuralError::LoopArity {
                        what: "after-block arguments",
                        expected: op.results.len(),
                        found: lp.after.args.len(),
                    });
                }
                self.loop_types("after-block arguments", &op.results, &lp.after.args)
            }
            OpKind::LoopCondition { cond, args } => {
                self.expect_results(op, 0)?;
                same(&Type::bool(), self.used(*cond)?)?;
                let frame = self.loops.last().ok_or(StructuralError::BreakOutsideLoop)?;
                if args.len() != frame.results.len() {
                    return Err(StructuralError::LoopArity {
                        what: "condition arguments",
                        expected: frame.results.len(),
                        found: args.len(),
                    });
                }
                self.pass_types("condition arguments", &frame.results, args)
            }
            OpKind::LoopYield { values } => {
                self.expect_results(op, 0)?;
                let frame = self.loops.last().ok_or(StructuralError::BreakOutsideLoop)?;
                if values.len() != frame.carried.len() {
                    return Err(StructuralError::LoopArity {
                        what: "yielded values",
                        expected: frame.carried.len(),
                        found: values.len(),
                    });
                }
                self.pass_types("yielded values", &frame.carried, values)
            }
            OpKind::LoopBreak { values } => {
                self.expect_results(op, 0)?;
                let frame = self.loops.last().ok_or(StructuralError::BreakOutsideLoop)?;
                if values.len() != frame.results.len() {
                    return Err(StructuralError::BreakArity {
                        expected: frame.results.len(),
                        found: values.len(),
                    });
                }
                let found = values
                    .iter()
                    .map(|v| self.used(*v))
                    .collect::<Result<Vec<_>, _>>()?;
                if found != frame.results {
                    return Err(StructuralError::BreakType {
                        expected: type_list(&frame.results),
                        found: type_list(&found),
                    });
                }
                Ok(())
            }
            OpKind::BlockResult { value } => {
                self.expect_results(op, 0)?;
                let Region::IfBranch { result } = region else {
                    return Ok(());
                };
                let found = value.map(|v| self.used(v)).transpose()?;
                match (result, found) {
                    (None, None) => Ok(()),
                    (Some(a), Some(b)) if a == b => Ok(()),
                    (expected, found) => Err(StructuralError::IfResultMismatch {
                        expected: expected.map_or_else(|| "no value".to_string(), |t| t.to_string()),
                        found: found.map_or_else(|| "no value".to_string(), |t| t.to_string()),
                    }),
                }
            }
            OpKind::Emit { value } => {
                self.expect_results(op, 0)?;
                if !self.in_task {
                    return Err(StructuralError::OutsideTask { op: "emit" });
                }
                match self.outbound {
                    Some(item) => same(item, self.used(*value)?),
                    None => Ok(()),
                }
            }
            OpKind::Panic { .. } => self.expect_results(op, 0),
            OpKind::Return { value } => {
                self.expect_results(op, 0)?;
                match (&self.function.output, value) {
                    (None, None) => Ok(()),
                    (None, Some(_)) => Err(StructuralError::ReturnFromVoid),
                    (Some(expected), None) => Err(StructuralError::MissingReturnValue {
                        expected: expected.to_string(),
                    }),
                    (Some(expected), Some(value)) => {
                        let found = self.used(*value)?;
                        if found == expected {
                            Ok(())
                        } else {
                            Err(StructuralError::ReturnMismatch {
                                expected: expected.to_string(),
                                found: found.to_string(),
                            })
                        }
                    }
                }
            }
        }
    }

    fn check_call_result(&self, op: &Operation, output: Option<&Type>) -> Result<(), StructuralError> {
        match output {
            Some(output) => same(output, self.single_result(op)?),
            None => self.expect_results(op, 0),
        }
    }

    fn variant_payload(&self, ty: &'a Type, variant: &str) -> Result<&'a Type, StructuralError> {
        if !matches!(ty, Type::Variant(_)) {
            return Err(StructuralError::TypeMismatch {
                expected: "an enum type".to_string(),
                found: ty.to_string(),
            });
        }
        ty.member(variant)
            .map(|(_, alt)| &alt.ty)
            .ok_or_else(|| StructuralError::UnknownVariant {
                variant: variant.to_string(),
                ty: ty.to_string(),
            })
    }

    /// Types of `found` must equal the declared types of `expected`.
    fn loop_types(
        &self,
        what: &'static str,
        expected: &[ValueId],
        found: &[ValueId],
    ) -> Result<(), StructuralError> {
        let expected = expected
            .iter()
            .map(|v| self.decl(*v))
            .collect::<Result<Vec<_>, _>>()?;
        self.pass_types(what, &expected, found)
    }

    fn pass_types(
        &self,
        what: &'static str,
        expected: &[&Type],
        found: &[ValueId],
    ) -> Result<(), StructuralError> {
        let found = found
            .iter()
            .map(|v| self.decl(*v))
            .collect::<Result<Vec<_>, _>>()?;
        if found.as_slice() != expected {
            return Err(StructuralError::LoopType {
                what,
                expected: type_list(expected),
                found: type_list(&found),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ir::builder::FunctionBuilder;
    use ir::{CmpOp, StreamDirection};

    fn module_of(functions: Vec<Function>) -> Module {
        let mut module = Module::new("toplevel");
        module.functions = functions;
        module
    }

    fn code_for(module: &Module) -> &'static str {
        match verify_module(module) {
            Ok(()) => "ok",
            Err(err) => err.code(),
        }
    }

    /// `fn count(n: i64) -> i64` summing up to `n` with a two-value loop.
    fn build_counting_loop() -> Function {
        let mut b = FunctionBuilder::new("count");
        let n = b.arg(Type::i64());
        b.returns(Type::i64());
        let zero = b.constant(Literal::Int(0), Type::i64());
        let results = b.loop_op(
            vec![zero, zero],
            &[Type::i64(), Type::i64()],
            |b, carried| {
                let more = b.compare(CmpOp::Lt, carried[0], n);
                b.loop_condition(more, carried.to_vec());
            },
            |b, args| {
                let one = b.constant(Literal::Int(1), Type::i64());
                let i = b.binary(BinOp::Add, args[0], one, Type::i64());
                let acc = b.binary(BinOp::Add, args[1], i, Type::i64());
                b.loop_yield(vec![i, acc]);
            },
        );
        b.ret(Some(results[1]));
        b.finish()
    }

    fn counter_state() -> Type {
        Type::record([("count", Type::i64())])
    }

    fn counter_input() -> Type {
        Type::variant([("Incr", Type::i64()), ("Reset", Type::unit())])
    }

    fn counter_output() -> Type {
        Type::variant([("Total", Type::i64())])
    }

    fn build_handler(args: usize) -> Function {
        let mut b = FunctionBuilder::new("handle");
        b.event_handler("Counter", "counter");
        let types = [
            counter_state(),
            counter_input(),
            Type::stream(counter_output(), StreamDirection::Out),
        ];
        let params: Vec<ValueId> = types.iter().take(args).map(|t| b.arg(t.clone())).collect();
        if args == 3 {
            let count = b.field_access(params[0], "count", Type::i64());
            let out = b.make_enum("Total", Some(count), counter_output());
            b.emit(out);
        }
        b.ret(None);
        b.finish()
    }

    #[test]
    fn verify_accepts_counting_loop() {
        assert_eq!(code_for(&module_of(vec![build_counting_loop()])), "ok");
    }

    #[test]
    fn verify_rejects_unnamed_module_with_rs001() {
        let mut module = module_of(vec![build_counting_loop()]);
        module.name = None;
        assert_eq!(code_for(&module), "RS001");
        module.name = Some(String::new());
        assert_eq!(code_for(&module), "RS001");
    }

    #[test]
    fn verify_accepts_three_argument_handler() {
        assert_eq!(code_for(&module_of(vec![build_handler(3)])), "ok");
    }

    #[test]
    fn verify_rejects_two_argument_handler_with_rs004() {
        let err = verify_module(&module_of(vec![build_handler(2)])).expect_err("arity");
        assert_eq!(err.kind(), Some(&StructuralError::HandlerArity { found: 2 }));
        assert_eq!(
            err.to_string(),
            "[RS004] function 'handle': task event handlers are expected to have 3 arguments, found 2"
        );
    }

    #[test]
    fn verify_rejects_non_stream_third_handler_argument_with_rs005() {
        let mut b = FunctionBuilder::new("handle");
        b.event_handler("Counter", "counter");
        b.arg(counter_state());
        b.arg(counter_input());
        b.arg(Type::i32());
        b.ret(None);
        let err = verify_module(&module_of(vec![b.finish()])).expect_err("third arg");
        assert_eq!(
            err.kind(),
            Some(&StructuralError::HandlerArgument {
                position: "third",
                expected: "a stream",
                found: "i32".to_string(),
            })
        );
    }

    #[test]
    fn verify_rejects_task_name_without_module_with_rs006() {
        let mut b = FunctionBuilder::new("step");
        b.attrs_mut().set_str(ir::attrs::TASK_NAME, "Counter");
        b.arg(counter_state());
        b.ret(None);
        assert_eq!(code_for(&module_of(vec![b.finish()])), "RS006");
    }

    #[test]
    fn verify_rejects_disagreeing_task_state_with_rs007() {
        let mut b = FunctionBuilder::new("reset");
        b.method_of("Counter", "counter");
        b.arg(Type::record([("total", Type::i64())]));
        b.ret(None);
        let module = module_of(vec![build_handler(3), b.finish()]);
        let err = verify_module(&module).expect_err("state mismatch");
        assert_eq!(
            err.kind(),
            Some(&StructuralError::TaskStateMismatch {
                module: "counter".to_string(),
                what: "the state type",
            })
        );
    }

    #[test]
    fn verify_rejects_emit_outside_task_with_rs008() {
        let mut b = FunctionBuilder::new("loose");
        let x = b.arg(Type::i32());
        b.emit(x);
        b.ret(None);
        assert_eq!(code_for(&module_of(vec![b.finish()])), "RS008");
    }

    #[test]
    fn verify_rejects_break_outside_loop_with_rs010() {
        let mut b = FunctionBuilder::new("f");
        let c = b.arg(Type::bool());
        b.if_op(c, None, |b| b.loop_break(vec![]), |b| b.block_result(None));
        b.ret(None);
        let err = verify_module(&module_of(vec![b.finish()])).expect_err("break");
        assert_eq!(err.code(), "RS010");
        assert_eq!(
            err.to_string(),
            "[RS010] function 'f', op 0.then.0 ('loop.break'): must be inside a loop region"
        );
    }

    fn build_loop_with_break(break_values: fn(ValueId) -> Vec<ValueId>) -> Function {
        let mut b = FunctionBuilder::new("search");
        let limit = b.arg(Type::i32());
        b.returns(Type::i32());
        let zero = b.constant(Literal::Int(0), Type::i32());
        let results = b.loop_op(
            vec![zero],
            &[Type::i32()],
            |b, carried| {
                let more = b.compare(CmpOp::Lt, carried[0], limit);
                b.loop_condition(more, carried.to_vec());
            },
            |b, args| {
                let i = args[0];
                let stop = b.compare(CmpOp::Eq, i, limit);
                b.if_op(
                    stop,
                    None,
                    |b| {
                        let values = break_values(i);
                        b.loop_break(values)
                    },
                    |b| b.block_result(None),
                );
                b.loop_yield(vec![i]);
            },
        );
        b.ret(Some(results[0]));
        b.finish()
    }

    #[test]
    fn verify_accepts_break_matching_loop_results() {
        let function = build_loop_with_break(|i| vec![i]);
        assert_eq!(code_for(&module_of(vec![function])), "ok");
    }

    #[test]
    fn verify_rejects_break_arity_with_rs011() {
        let function = build_loop_with_break(|_| vec![]);
        let err = verify_module(&module_of(vec![function])).expect_err("arity");
        assert_eq!(
            err.kind(),
            Some(&StructuralError::BreakArity {
                expected: 1,
                found: 0
            })
        );
        assert_eq!(
            err.to_string().split(':').next(),
            Some("[RS011] function 'search', op 1.after.1.then.0 ('loop.break')")
        );
    }

    #[test]
    fn verify_rejects_bad_if_terminator_with_rs013() {
        let mut b = FunctionBuilder::new("f");
        let c = b.arg(Type::bool());
        b.if_op(
            c,
            None,
            |b| {
                b.constant(Literal::Int(1), Type::i32());
            },
            |b| b.block_result(None),
        );
        b.ret(None);
        let err = verify_module(&module_of(vec![b.finish()])).expect_err("terminator");
        assert_eq!(
            err.kind(),
            Some(&StructuralError::BadIfTerminator { found: "constant" })
        );

        let mut b = FunctionBuilder::new("g");
        let c = b.arg(Type::bool());
        b.if_op(c, None, |_| {}, |b| b.block_result(None));
        b.ret(None);
        let err = verify_module(&module_of(vec![b.finish()])).expect_err("empty branch");
        assert_eq!(
            err.kind(),
            Some(&StructuralError::BadIfTerminator { found: "nothing" })
        );
    }

    #[test]
    fn verify_rejects_misplaced_terminator_with_rs016() {
        let mut b = FunctionBuilder::new("f");
        b.ret(None);
        b.constant(Literal::Unit, Type::unit());
        b.ret(None);
        assert_eq!(code_for(&module_of(vec![b.finish()])), "RS016");
    }

    #[test]
    fn verify_checks_returns() {
        let mut b = FunctionBuilder::new("void");
        let x = b.arg(Type::i32());
        b.ret(Some(x));
        assert_eq!(code_for(&module_of(vec![b.finish()])), "RS020");

        let mut b = FunctionBuilder::new("missing");
        b.returns(Type::i32());
        b.ret(None);
        assert_eq!(code_for(&module_of(vec![b.finish()])), "RS021");

        let mut b = FunctionBuilder::new("mismatch");
        let x = b.arg(Type::bool());
        b.returns(Type::i32());
        b.ret(Some(x));
        assert_eq!(code_for(&module_of(vec![b.finish()])), "RS022");

        let mut b = FunctionBuilder::new("unterminated");
        b.constant(Literal::Int(3), Type::i32());
        assert_eq!(code_for(&module_of(vec![b.finish()])), "RS015");
    }

    #[test]
    fn verify_rejects_values_used_outside_their_region() {
        let mut b = FunctionBuilder::new("leak");
        let c = b.arg(Type::bool());
        b.returns(Type::i32());
        let mut inner = None;
        b.if_op(
            c,
            None,
            |b| {
                inner = Some(b.constant(Literal::Int(1), Type::i32()));
                b.block_result(None);
            },
            |b| b.block_result(None),
        );
        b.ret(inner);
        let err = verify_module(&module_of(vec![b.finish()])).expect_err("scoping");
        assert_eq!(err.code(), "RS039");
    }

    #[test]
    fn verify_hides_carried_values_from_the_after_block() {
        let mut b = FunctionBuilder::new("swap");
        let x = b.arg(Type::i64());
        let y = b.arg(Type::i64());
        let carried = b.begin_block(&[Type::i64(), Type::i64()]);
        let more = b.compare(CmpOp::Lt, carried[0], carried[1]);
        b.loop_condition(more, carried.clone());
        let before = b.end_block();
        b.begin_block(&[Type::i64(), Type::i64()]);
        b.loop_yield(vec![carried[1], carried[0]]);
        let after = b.end_block();
        b.push(
            OpKind::Loop(ir::LoopOp {
                inits: vec![x, y],
                before,
                after,
            }),
            &[Type::i64(), Type::i64()],
        );
        b.ret(None);
        let err = verify_module(&module_of(vec![b.finish()])).expect_err("scoping");
        assert_eq!(
            err.kind(),
            Some(&StructuralError::UnknownValue { value: carried[1] })
        );
    }

    #[test]
    fn verify_checks_tensor_shape() {
        let build = |shape: Vec<usize>| {
            let mut b = FunctionBuilder::new("tensor");
            let x = b.arg(Type::i64());
            let t = b.op(
                OpKind::MakeTensor {
                    shape,
                    elements: vec![x, x, x, x],
                },
                Type::array(Type::i64(), 2),
            );
            b.returns(Type::array(Type::i64(), 2));
            b.ret(Some(t));
            module_of(vec![b.finish()])
        };
        assert_eq!(code_for(&build(vec![2, 2])), "ok");
        assert_eq!(code_for(&build(vec![4])), "RS037");
        assert_eq!(code_for(&build(vec![3, 2])), "RS037");
    }

    #[test]
    fn verify_checks_calls_against_callee_signature() {
        let mut ext = FunctionBuilder::new("source");
        ext.arg(Type::i32());
        ext.returns(Type::i32());
        ext.external();

        let mut b = FunctionBuilder::new("caller");
        let flag = b.arg(Type::bool());
        b.call("source", vec![flag], Some(Type::i32()));
        b.call("nowhere", vec![], None);
        b.ret(None);
        let err = verify_module(&module_of(vec![ext.finish(), b.finish()])).expect_err("call");
        assert_eq!(err.code(), "RS032");
    }

    #[test]
    fn verify_rejects_unsigned_negation() {
        let mut b = FunctionBuilder::new("neg");
        let x = b.arg(Type::Primitive(Primitive::U32));
        let y = b.op(
            OpKind::Unary {
                op: UnaryOp::Neg,
                operand: x,
            },
            Type::Primitive(Primitive::U32),
        );
        b.returns(Type::Primitive(Primitive::U32));
        b.ret(Some(y));
        assert_eq!(code_for(&module_of(vec![b.finish()])), "RS033");
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("count"));
        assert!(is_identifier("_tmp1"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("_"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier("type"));
        assert!(!is_identifier("a-b"));
    }

    #[test]
    fn nested_streams_are_rejected() {
        let stream = Type::stream(Type::i32(), ir::StreamDirection::In);
        assert!(check_type(&stream).is_ok());
        let err = check_type(&Type::tuple([stream])).expect_err("nested stream");
        assert_eq!(err.code(), "RS038");
    }

    #[test]
    fn duplicate_members_are_rejected() {
        let twice = Type::record([("a", Type::i32()), ("a", Type::bool())]);
        assert_eq!(check_type(&twice).map_err(|e| e.code()), Err("RS041"));
    }

    #[test]
    fn member_names_must_be_identifiers() {
        let bad = Type::record([("ok", Type::variant([("match", Type::unit())]))]);
        assert_eq!(
            check_type(&bad),
            Err(StructuralError::InvalidIdentifier {
                name: "match".to_string()
            })
        );
    }

    fn constant_of(lit: Literal, ty: Type) -> Module {
        let mut b = FunctionBuilder::new("lit");
        b.constant(lit, ty);
        b.ret(None);
        module_of(vec![b.finish()])
    }

    #[test]
    fn verify_rejects_out_of_range_literals_with_rs042() {
        let i8_ty = Type::Primitive(Primitive::I8);
        let err = verify_module(&constant_of(Literal::Int(300), i8_ty.clone())).expect_err("300");
        assert_eq!(
            err.kind(),
            Some(&StructuralError::LiteralRange {
                literal: "300".to_string(),
                ty: "i8".to_string()
            })
        );
        assert_eq!(code_for(&constant_of(Literal::Int(-128), i8_ty.clone())), "ok");
        assert_eq!(code_for(&constant_of(Literal::Int(-129), i8_ty)), "RS042");
        assert_eq!(code_for(&constant_of(Literal::UInt(u64::MAX), Type::i32())), "RS042");
        assert_eq!(
            code_for(&constant_of(
                Literal::UInt(u64::MAX),
                Type::Primitive(Primitive::U64)
            )),
            "ok"
        );
        assert_eq!(
            code_for(&constant_of(Literal::Int(256), Type::Primitive(Primitive::U8))),
            "RS042"
        );
    }

    #[test]
    fn verify_rejects_f32_literals_that_overflow() {
        let f32_ty = Type::Primitive(Primitive::F32);
        assert_eq!(code_for(&constant_of(Literal::Float(1e300), f32_ty.clone())), "RS042");
        assert_eq!(code_for(&constant_of(Literal::Float(1e300), Type::f64())), "ok");
        assert_eq!(code_for(&constant_of(Literal::Float(f64::INFINITY), f32_ty.clone())), "ok");
        assert_eq!(code_for(&constant_of(Literal::Float(0.5), f32_ty)), "ok");
    }

    #[test]
    fn verify_rejects_start_hook_outside_task() {
        let mut b = FunctionBuilder::new("boot");
        b.init();
        b.ret(None);
        let err = verify_module(&module_of(vec![b.finish()])).expect_err("no task");
        assert_eq!(err.kind(), Some(&StructuralError::OutsideTask { op: "on_start" }));
        assert_eq!(err.code(), "RS008");
    }

    #[test]
    fn verify_rejects_functions_named_like_locals() {
        for name in ["v0", "v12", "event"] {
            let mut b = FunctionBuilder::new("f");
            b.rust_name(name);
            b.ret(None);
            let err = verify_module(&module_of(vec![b.finish()])).expect_err(name);
            assert_eq!(
                err.kind(),
                Some(&StructuralError::ReservedName {
                    name: name.to_string()
                })
            );
        }
        let mut ext = FunctionBuilder::new("v3");
        ext.external();
        assert_eq!(code_for(&module_of(vec![ext.finish()])), "RS043");

        for name in ["v", "va", "v1x", "events"] {
            let mut b = FunctionBuilder::new(name);
            b.ret(None);
            assert_eq!(code_for(&module_of(vec![b.finish()])), "ok", "{}", name);
        }
    }

    #[test]
    fn verify_rejects_task_types_shared_between_modules() {
        let mut tick = FunctionBuilder::new("tick");
        tick.method_of("Clock", "clock");
        tick.arg(counter_state());
        tick.ret(None);
        let err = verify_module(&module_of(vec![build_handler(3), tick.finish()]))
            .expect_err("one state record, two tasks");
        assert_eq!(
            err.kind(),
            Some(&StructuralError::SharedTaskType {
                ty: counter_state().to_string(),
                first: "counter::Counter".to_string(),
                second: "clock::Clock".to_string(),
            })
        );
        assert_eq!(err.code(), "RS044");
    }

    #[test]
    fn verify_rejects_same_type_as_both_interfaces() {
        let mut b = FunctionBuilder::new("echo");
        b.event_handler("Echo", "echo");
        b.arg(counter_state());
        b.arg(counter_input());
        b.arg(Type::stream(counter_input(), StreamDirection::Out));
        b.ret(None);
        assert_eq!(code_for(&module_of(vec![b.finish()])), "RS044");
    }
}
