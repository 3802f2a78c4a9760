//! Operation emitter.
//!
//! Walks each function body in program order and turns every operation into
//! Rust statements through the [`Printer`], asking the [`TypeRegistry`] for
//! type spellings on the way. Input is expected to have passed
//! [`crate::verify`]; anything that still does not line up is reported as an
//! internal error rather than papered over.

mod control;
mod task;

use crate::error::RenderError;
use crate::options::RenderOptions;
use crate::printer::{Printer, RenderedModule};
use crate::registry::{tuple_text, TypeRegistry, RC_IMPORT};
use ir::{Function, Literal, Module, OpKind, Operation, Primitive, Type, UnaryOp, ValueId};

use self::control::LoopFrame;
use self::task::TaskTable;

/// Which flavour of Rust function a body is emitted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FnRole {
    Plain,
    /// Event handler of a task: `&mut self` plus an `event` parameter.
    Handler,
    /// Other method of a task: `&mut self` plus ordinary parameters.
    Method,
}

impl FnRole {
    fn of(function: &Function) -> Self {
        match (function.task_name(), function.mod_name()) {
            (Some(_), Some(_)) if function.is_event_handler() => FnRole::Handler,
            (Some(_), Some(_)) => FnRole::Method,
            _ => FnRole::Plain,
        }
    }
}

/// Per-function emission state.
struct FnCtx<'f> {
    function: &'f Function,
    loops: Vec<LoopFrame>,
}

impl<'f> FnCtx<'f> {
    fn new(function: &'f Function) -> Self {
        Self {
            function,
            loops: Vec::new(),
        }
    }

    fn ty(&self, value: ValueId) -> Result<&'f Type, RenderError> {
        self.function.value_type(value).ok_or_else(|| {
            RenderError::internal(format!(
                "value {} has no declaration in '{}'",
                value, self.function.name
            ))
        })
    }
}

pub(crate) struct Emitter<'m> {
    module: &'m Module,
    options: &'m RenderOptions,
    registry: TypeRegistry,
    printer: Printer,
    tasks: TaskTable,
}

impl<'m> Emitter<'m> {
    pub(crate) fn new(module: &'m Module, options: &'m RenderOptions) -> Self {
        Self {
            module,
            options,
            registry: TypeRegistry::new(&options.runtime_prelude, &options.ndarray_version),
            printer: Printer::new(),
            tasks: TaskTable::collect(module),
        }
    }

    pub(crate) fn emit_module(mut self) -> Result<RenderedModule, RenderError> {
        let module_name = self
            .module
            .name
            .clone()
            .ok_or_else(|| RenderError::internal("rendering a module without a name"))?;
        self.tasks.register_aliases(&mut self.printer);
        for function in &self.module.functions {
            if function.external {
                log::trace!("skipping external function '{}'", function.name);
                continue;
            }
            self.emit_function(function)?;
        }
        let nominal_types = self.registry.len();
        let rendered = self.printer.flush(
            &module_name,
            self.options.crate_path(),
            self.options.include.as_deref(),
        );
        log::debug!(
            "module '{}': {} nominal types, {} dependencies",
            module_name,
            nominal_types,
            rendered.dependencies.len()
        );
        Ok(rendered)
    }

    fn emit_function(&mut self, function: &Function) -> Result<(), RenderError> {
        let role = FnRole::of(function);
        log::debug!("emitting function '{}' as {:?}", function.name, role);
        self.printer.clear_aliases();
        self.printer.begin_item();

        if role != FnRole::Plain {
            self.open_task_impl(function, role)?;
        }

        let mut params = Vec::new();
        for (i, arg) in function.args().iter().enumerate() {
            match (role, i) {
                (FnRole::Handler | FnRole::Method, 0) => {
                    self.printer.set_alias(*arg, "self");
                    params.push("&mut self".to_string());
                }
                (FnRole::Handler, 1) => {
                    self.printer.set_alias(*arg, "event");
                    let ty = self.type_of(function, *arg)?;
                    params.push(format!("event: {}", ty));
                }
                // Outbound events go through `self.emit`.
                (FnRole::Handler, 2) => {}
                _ => {
                    let ty = self.type_of(function, *arg)?;
                    let name = self.printer.print(*arg);
                    params.push(format!("{}: {}", name, ty));
                }
            }
        }
        let mut header = format!("pub fn {}({})", function.rust_name(), params.join(", "));
        if let Some(output) = &function.output {
            let output = self.rust_type(output)?;
            header.push_str(&format!(" -> {}", output));
        }
        header.push_str(" {");

        if self.options.annotate {
            match role {
                FnRole::Handler => self.printer.write_body("// Task"),
                FnRole::Method => self.printer.write_body("// Method"),
                FnRole::Plain => {}
            }
        }
        self.printer.open(&header);
        let mut ctx = FnCtx::new(function);
        self.emit_ops(&mut ctx, &function.body.ops)?;
        self.printer.close("}");

        if role != FnRole::Plain {
            self.printer.close("}");
        }
        Ok(())
    }

    fn rust_type(&mut self, ty: &Type) -> Result<String, RenderError> {
        self.registry.rust_type(ty, &mut self.printer)
    }

    fn type_of(&mut self, function: &Function, value: ValueId) -> Result<String, RenderError> {
        let ty = function.value_type(value).ok_or_else(|| {
            RenderError::internal(format!("value {} has no declaration", value))
        })?;
        self.rust_type(ty)
    }

    fn use_prelude(&mut self) {
        self.printer.write_import(self.registry.prelude_import());
    }

    fn emit_ops(&mut self, ctx: &mut FnCtx<'_>, ops: &[Operation]) -> Result<(), RenderError> {
        for op in ops {
            self.emit_op(ctx, op)?;
        }
        Ok(())
    }

    /// `let` prefix binding the results of `op`, empty when it has none.
    fn binding(&mut self, ctx: &FnCtx<'_>, results: &[ValueId]) -> Result<String, RenderError> {
        match results {
            [] => Ok(String::new()),
            [single] => {
                let ty = self.rust_type(ctx.ty(*single)?)?;
                let name = self.printer.print(*single);
                Ok(format!("let {}: {} = ", name, ty))
            }
            many => {
                let mut names = Vec::new();
                let mut types = Vec::new();
                for value in many {
                    types.push(self.rust_type(ctx.ty(*value)?)?);
                    names.push(self.printer.print(*value));
                }
                Ok(format!(
                    "let {}: {} = ",
                    tuple_text(&names),
                    tuple_text(&types)
                ))
            }
        }
    }

    /// Emit `<binding><expr>;` for a single-line operation.
    fn emit_expr(
        &mut self,
        ctx: &FnCtx<'_>,
        op: &Operation,
        expr: String,
    ) -> Result<(), RenderError> {
        let binding = self.binding(ctx, &op.results)?;
        self.printer.write_body(&format!("{}{};", binding, expr));
        Ok(())
    }

    fn emit_op(&mut self, ctx: &mut FnCtx<'_>, op: &Operation) -> Result<(), RenderError> {
        match &op.kind {
            OpKind::Constant(lit) => {
                let ty = match op.result() {
                    Some(result) => ctx.ty(result)?,
                    None => return Ok(()),
                };
                let text = literal_text(lit, ty);
                self.emit_expr(ctx, op, text)
            }
            OpKind::Unary { op: unary, operand } => {
                let x = self.printer.print(*operand);
                let text = match unary {
                    UnaryOp::Neg => format!("-{}", x),
                    UnaryOp::Not => format!("!{}", x),
                    // Natural logarithm; `f64::log` takes a base.
                    UnaryOp::Log => {
                        let ty = self.rust_type(ctx.ty(*operand)?)?;
                        format!("{}::ln({})", ty, x)
                    }
                    other => {
                        let ty = self.rust_type(ctx.ty(*operand)?)?;
                        format!("{}::{}({})", ty, other.name(), x)
                    }
                };
                self.emit_expr(ctx, op, text)
            }
            OpKind::Binary { op: bin, lhs, rhs } => {
                let text = format!(
                    "{} {} {}",
                    self.printer.print(*lhs),
                    bin.symbol(),
                    self.printer.print(*rhs)
                );
                self.emit_expr(ctx, op, text)
            }
            OpKind::BinaryRc { op: bin, lhs, rhs } => {
                self.printer.write_import(RC_IMPORT);
                let text = format!(
                    "Rc::new(&*{} {} &*{})",
                    self.printer.print(*lhs),
                    bin.symbol(),
                    self.printer.print(*rhs)
                );
                self.emit_expr(ctx, op, text)
            }
            OpKind::Compare { op: cmp, lhs, rhs } => {
                let text = format!(
                    "{} {} {}",
                    self.printer.print(*lhs),
                    cmp.symbol(),
                    self.printer.print(*rhs)
                );
                self.emit_expr(ctx, op, text)
            }
            OpKind::Call { callee, args } => {
                let target = self
                    .module
                    .function(callee)
                    .map(|f| f.rust_name().to_string())
                    .unwrap_or_else(|| callee.clone());
                let text = format!("{}({})", target, self.printer.print_list(args));
                self.emit_expr(ctx, op, text)
            }
            OpKind::CallIndirect { callee, args } => {
                let text = format!(
                    "({})({})",
                    self.printer.print(*callee),
                    self.printer.print_list(args)
                );
                self.emit_expr(ctx, op, text)
            }
            OpKind::FieldAccess { aggregate, field } => {
                self.use_prelude();
                let text = format!("access!({}, {})", self.printer.print(*aggregate), field);
                self.emit_expr(ctx, op, text)
            }
            OpKind::EnumCheck { value, variant } => {
                self.use_prelude();
                let enum_name = self.rust_type(ctx.ty(*value)?)?;
                let text = format!(
                    "is!({}::{}, {})",
                    enum_name,
                    variant,
                    self.printer.print(*value)
                );
                self.emit_expr(ctx, op, text)
            }
            OpKind::EnumAccess { value, variant } => {
                self.use_prelude();
                let enum_name = self.rust_type(ctx.ty(*value)?)?;
                let text = format!(
                    "unwrap!({}::{}, {})",
                    enum_name,
                    variant,
                    self.printer.print(*value)
                );
                self.emit_expr(ctx, op, text)
            }
            OpKind::MakeStruct { fields } => self.emit_make_struct(ctx, op, fields),
            OpKind::MakeEnum { variant, payload } => {
                self.use_prelude();
                let result = single_result(op)?;
                let enum_name = self.rust_type(ctx.ty(result)?)?;
                let payload = match payload {
                    Some(value) => self.printer.print(*value),
                    None => "()".to_string(),
                };
                let text = format!("enwrap!({}::{}, {})", enum_name, variant, payload);
                self.emit_expr(ctx, op, text)
            }
            OpKind::MakeTensor { shape, elements } => {
                let result = single_result(op)?;
                // Registers the Rc and ndarray imports.
                self.rust_type(ctx.ty(result)?)?;
                let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
                let text = format!(
                    "Rc::new(Array::from_shape_vec({}, vec![{}]).unwrap())",
                    tuple_text(&dims),
                    self.printer.print_list(elements)
                );
                self.emit_expr(ctx, op, text)
            }
            OpKind::MakeTuple { elements } => {
                let parts: Vec<String> = elements.iter().map(|v| self.printer.print(*v)).collect();
                let text = tuple_text(&parts);
                self.emit_expr(ctx, op, text)
            }
            OpKind::MethodCall {
                receiver,
                method,
                args,
            } => {
                let text = format!(
                    "{}.{}({})",
                    self.printer.print(*receiver),
                    method,
                    self.printer.print_list(args)
                );
                self.emit_expr(ctx, op, text)
            }
            OpKind::If {
                cond,
                then_block,
                else_block,
            } => self.emit_if(ctx, op, *cond, then_block, else_block),
            OpKind::Loop(lp) => self.emit_loop(ctx, op, lp),
            OpKind::LoopBreak { values } => self.emit_loop_break(values),
            OpKind::LoopCondition { cond, args } => self.emit_loop_condition(ctx, *cond, args),
            OpKind::LoopYield { values } => self.emit_loop_yield(ctx, values),
            OpKind::BlockResult { value } => {
                if let Some(value) = value {
                    let name = self.printer.print(*value);
                    self.printer.write_body(&name);
                }
                Ok(())
            }
            OpKind::Emit { value } => {
                let text = format!("self.emit({});", self.printer.print(*value));
                self.printer.write_body(&text);
                Ok(())
            }
            OpKind::Panic { message } => {
                let text = match message {
                    Some(message) => format!("panic!({});", panic_message(message)),
                    None => "panic!();".to_string(),
                };
                self.printer.write_body(&text);
                Ok(())
            }
            OpKind::Return { value } => {
                let text = match value {
                    Some(value) => format!("return {};", self.printer.print(*value)),
                    None => "return;".to_string(),
                };
                self.printer.write_body(&text);
                Ok(())
            }
        }
    }

    fn emit_make_struct(
        &mut self,
        ctx: &FnCtx<'_>,
        op: &Operation,
        fields: &[ValueId],
    ) -> Result<(), RenderError> {
        self.use_prelude();
        let result = single_result(op)?;
        let record = ctx.ty(result)?;
        let Type::Record(decls) = record else {
            return Err(RenderError::internal(format!(
                "make_struct produces non-record type {}",
                record
            )));
        };
        let struct_name = self.rust_type(record)?;
        let inits: Vec<String> = decls
            .iter()
            .zip(fields)
            .map(|(decl, value)| format!("{}: {}", decl.name, self.printer.print(*value)))
            .collect();
        let text = if inits.is_empty() {
            format!("new!({} {{}})", struct_name)
        } else {
            format!("new!({} {{ {} }})", struct_name, inits.join(", "))
        };
        self.emit_expr(ctx, op, text)
    }
}

fn single_result(op: &Operation) -> Result<ValueId, RenderError> {
    op.result().ok_or_else(|| {
        RenderError::internal(format!("'{}' without a result", op.kind.mnemonic()))
    })
}

fn literal_text(lit: &Literal, ty: &Type) -> String {
    match lit {
        Literal::Bool(b) => b.to_string(),
        Literal::Int(v) => v.to_string(),
        Literal::UInt(v) => v.to_string(),
        Literal::Float(v) => float_text(*v, ty),
        Literal::Unit => "()".to_string(),
    }
}

fn float_text(value: f64, ty: &Type) -> String {
    let prefix = match ty {
        Type::Primitive(Primitive::F32) => "f32",
        _ => "f64",
    };
    if value.is_nan() {
        format!("{}::NAN", prefix)
    } else if value.is_infinite() && value > 0.0 {
        format!("{}::INFINITY", prefix)
    } else if value.is_infinite() {
        format!("{}::NEG_INFINITY", prefix)
    } else {
        // Debug formatting always keeps a decimal point or exponent.
        format!("{:?}", value)
    }
}

/// Quoted panic message. Braces are doubled before quoting so the `\u{..}`
/// escapes produced by the quoting stay intact.
fn panic_message(message: &str) -> String {
    format!("{:?}", message.replace('{', "{{").replace('}', "}}"))
}
