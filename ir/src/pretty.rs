//! Stable pretty-printer for the IR, used for golden snapshot tests and
//! for diagnostics.
//!
//! The output is deterministic: value ids print as `%n`, operations print
//! their mnemonic followed by operands and a `: type` suffix for results.

use crate::{AttrValue, Block, Function, Literal, Module, OpKind, Operation, ValueId};
use std::fmt::{self, Write};

/// Pretty-print a module to a stable string representation.
pub fn pretty_print_module(module: &Module) -> String {
    PrettyModule(module).to_string()
}

/// Pretty-print a single function.
pub fn pretty_print_function(function: &Function) -> String {
    let mut out = String::new();
    // Writing into a String never fails.
    let _ = write_function(&mut out, function, 0);
    out
}

pub struct PrettyModule<'a>(pub &'a Module);

impl fmt::Display for PrettyModule<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let module = self.0;
        writeln!(f, "module {} {{", module.name.as_deref().unwrap_or("<anonymous>"))?;
        for (i, function) in module.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let mut text = String::new();
            write_function(&mut text, function, 1)?;
            f.write_str(&text)?;
        }
        writeln!(f, "}}")
    }
}

fn pad(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str("  ");
    }
}

fn write_function(out: &mut String, function: &Function, indent: usize) -> fmt::Result {
    pad(out, indent);
    if function.external {
        write!(out, "extern ")?;
    }
    write!(out, "fn {}(", function.name)?;
    if function.external {
        write_list(out, function.inputs.iter())?;
    } else {
        for (i, arg) in function.args().iter().enumerate() {
            if i > 0 {
                write!(out, ", ")?;
            }
            write!(out, "{}: {}", arg, value_type(function, *arg))?;
        }
    }
    write!(out, ")")?;
    if let Some(output) = &function.output {
        write!(out, " -> {}", output)?;
    }
    if !function.attrs.is_empty() {
        write!(out, " attributes {{")?;
        for (i, (key, value)) in function.attrs.iter().enumerate() {
            if i > 0 {
                write!(out, ", ")?;
            }
            match value {
                AttrValue::Unit => write!(out, "{}", key)?,
                AttrValue::Str(s) => write!(out, "{} = {:?}", key, s)?,
            }
        }
        write!(out, "}}")?;
    }
    if function.external {
        writeln!(out)?;
        return Ok(());
    }
    writeln!(out, " {{")?;
    for op in &function.body.ops {
        write_op(out, function, op, indent + 1)?;
    }
    pad(out, indent);
    writeln!(out, "}}")
}

fn value_type(function: &Function, id: ValueId) -> String {
    function
        .value_type(id)
        .map(|ty| ty.to_string())
        .unwrap_or_else(|| "<undefined>".to_string())
}

fn write_list<T: fmt::Display>(
    out: &mut String,
    items: impl Iterator<Item = T>,
) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(out, ", ")?;
        }
        write!(out, "{}", item)?;
    }
    Ok(())
}

fn literal(lit: &Literal) -> String {
    match lit {
        Literal::Bool(b) => b.to_string(),
        Literal::Int(v) => v.to_string(),
        Literal::UInt(v) => format!("{}u", v),
        Literal::Float(v) => format!("{:?}", v),
        Literal::Unit => "()".to_string(),
    }
}

fn write_op(out: &mut String, function: &Function, op: &Operation, indent: usize) -> fmt::Result {
    pad(out, indent);
    if !op.results.is_empty() {
        write_list(out, op.results.iter())?;
        write!(out, " = ")?;
    }
    write!(out, "{}", op.kind.mnemonic())?;
    match &op.kind {
        OpKind::Constant(lit) => write!(out, " {}", literal(lit))?,
        OpKind::Unary { op: u, operand } => write!(out, " {} {}", u.name(), operand)?,
        OpKind::Binary { op: b, lhs, rhs } | OpKind::BinaryRc { op: b, lhs, rhs } => {
            write!(out, " {} {}, {}", b.name(), lhs, rhs)?
        }
        OpKind::Compare { op: c, lhs, rhs } => write!(out, " {} {}, {}", c.name(), lhs, rhs)?,
        OpKind::Call { callee, args } => {
            write!(out, " @{}(", callee)?;
            write_list(out, args.iter())?;
            write!(out, ")")?;
        }
        OpKind::CallIndirect { callee, args } => {
            write!(out, " {}(", callee)?;
            write_list(out, args.iter())?;
            write!(out, ")")?;
        }
        OpKind::FieldAccess { aggregate, field } => write!(out, " {}.{}", aggregate, field)?,
        OpKind::EnumCheck { value, variant } => write!(out, " {} is {}", value, variant)?,
        OpKind::EnumAccess { value, variant } => write!(out, " {} as {}", value, variant)?,
        OpKind::MakeStruct { fields } => {
            write!(out, "(")?;
            write_list(out, fields.iter())?;
            write!(out, ")")?;
        }
        OpKind::MakeEnum { variant, payload } => {
            write!(out, " {}", variant)?;
            if let Some(payload) = payload {
                write!(out, "({})", payload)?;
            }
        }
        OpKind::MakeTensor { shape, elements } => {
            write!(out, " [")?;
            write_list(out, shape.iter())?;
            write!(out, "] (")?;
            write_list(out, elements.iter())?;
            write!(out, ")")?;
        }
        OpKind::MakeTuple { elements } => {
            write!(out, "(")?;
            write_list(out, elements.iter())?;
            write!(out, ")")?;
        }
        OpKind::MethodCall {
            receiver,
            method,
            args,
        } => {
            write!(out, " {}.{}(", receiver, method)?;
            write_list(out, args.iter())?;
            write!(out, ")")?;
        }
        OpKind::If { cond, .. } => write!(out, " {}", cond)?,
        OpKind::Loop(lp) => {
            write!(out, "(")?;
            write_list(out, lp.inits.iter())?;
            write!(out, ")")?;
        }
        OpKind::LoopBreak { values } | OpKind::LoopYield { values } => {
            write!(out, "(")?;
            write_list(out, values.iter())?;
            write!(out, ")")?;
        }
        OpKind::LoopCondition { cond, args } => {
            write!(out, " {}(", cond)?;
            write_list(out, args.iter())?;
            write!(out, ")")?;
        }
        OpKind::BlockResult { value } | OpKind::Return { value } => {
            if let Some(value) = value {
                write!(out, " {}", value)?;
            }
        }
        OpKind::Emit { value } => write!(out, " {}", value)?,
        OpKind::Panic { message } => {
            if let Some(message) = message {
                write!(out, " {:?}", message)?;
            }
        }
    }
    if !op.results.is_empty() {
        write!(out, " : ")?;
        write_list(
            out,
            op.results.iter().map(|id| value_type(function, *id)),
        )?;
    }
    let regions = op.kind.regions();
    if regions.is_empty() {
        writeln!(out)?;
        return Ok(());
    }
    writeln!(out, " {{")?;
    for (label, block) in regions {
        write_region(out, function, label, block, indent)?;
    }
    pad(out, indent);
    writeln!(out, "}}")
}

fn write_region(
    out: &mut String,
    function: &Function,
    label: &str,
    block: &Block,
    indent: usize,
) -> fmt::Result {
    pad(out, indent);
    write!(out, "{}", label)?;
    if !block.args.is_empty() {
        write!(out, "(")?;
        for (i, arg) in block.args.iter().enumerate() {
            if i > 0 {
                write!(out, ", ")?;
            }
            write!(out, "{}: {}", arg, value_type(function, *arg))?;
        }
        write!(out, ")")?;
    }
    writeln!(out, ":")?;
    for op in &block.ops {
        write_op(out, function, op, indent + 1)?;
    }
    Ok(())
}
