//! Structured control flow: `if` regions and pre/post-condition loops.
//!
//! A loop becomes a Rust `loop` with one `let mut` per carried value. The
//! before block runs first; its condition either breaks out with the
//! pass-through values or binds them to the after block's arguments. The
//! after block ends by reassigning the carried locals.

use super::{Emitter, FnCtx};
use crate::error::RenderError;
use ir::{Block, LoopOp, Operation, ValueId};

pub(super) struct LoopFrame {
    /// Names of the `let mut` locals holding the carried values.
    carried: Vec<String>,
    after_args: Vec<ValueId>,
}

fn break_text(values: &[String]) -> String {
    match values {
        [] => "break;".to_string(),
        [single] => format!("break {};", single),
        many => format!("break ({});", many.join(", ")),
    }
}

impl Emitter<'_> {
    pub(super) fn emit_if(
        &mut self,
        ctx: &mut FnCtx<'_>,
        op: &Operation,
        cond: ValueId,
        then_block: &Block,
        else_block: &Block,
    ) -> Result<(), RenderError> {
        let binding = self.binding(ctx, &op.results)?;
        let cond = self.printer.print(cond);
        self.printer.open(&format!("{}if {} {{", binding, cond));
        self.emit_ops(ctx, &then_block.ops)?;
        self.printer.reopen("} else {");
        self.emit_ops(ctx, &else_block.ops)?;
        if binding.is_empty() {
            self.printer.close("}");
        } else {
            self.printer.close("};");
        }
        Ok(())
    }

    pub(super) fn emit_loop(
        &mut self,
        ctx: &mut FnCtx<'_>,
        op: &Operation,
        lp: &LoopOp,
    ) -> Result<(), RenderError> {
        if lp.before.args.len() != lp.inits.len() {
            return Err(RenderError::internal(format!(
                "loop carries {} values but has {} initializers",
                lp.before.args.len(),
                lp.inits.len()
            )));
        }
        if self.options.annotate && !lp.inits.is_empty() {
            self.printer.write_body("// Loop variables");
        }
        let mut carried = Vec::new();
        for (arg, init) in lp.before.args.iter().zip(&lp.inits) {
            let ty = self.rust_type(ctx.ty(*arg)?)?;
            let name = self.printer.print(*arg);
            let init = self.printer.print(*init);
            self.printer
                .write_body(&format!("let mut {}: {} = {};", name, ty, init));
            carried.push(name);
        }

        let binding = self.binding(ctx, &op.results)?;
        self.printer.open(&format!("{}loop {{", binding));
        ctx.loops.push(LoopFrame {
            carried,
            after_args: lp.after.args.clone(),
        });
        if self.options.annotate {
            self.printer.write_body("// Before");
        }
        self.emit_ops(ctx, &lp.before.ops)?;
        self.emit_ops(ctx, &lp.after.ops)?;
        ctx.loops.pop();
        self.printer.close("};");
        Ok(())
    }

    pub(super) fn emit_loop_condition(
        &mut self,
        ctx: &mut FnCtx<'_>,
        cond: ValueId,
        args: &[ValueId],
    ) -> Result<(), RenderError> {
        let after_args = match ctx.loops.last() {
            Some(frame) => frame.after_args.clone(),
            None => return Err(RenderError::internal("loop.condition outside a loop")),
        };
        if after_args.len() != args.len() {
            return Err(RenderError::internal(format!(
                "loop.condition passes {} values to {} after-block arguments",
                args.len(),
                after_args.len()
            )));
        }
        let cond = self.printer.print(cond);
        let passed: Vec<String> = args.iter().map(|v| self.printer.print(*v)).collect();
        self.printer.open(&format!("if !{} {{", cond));
        self.printer.write_body(&break_text(&passed));
        self.printer.close("}");

        if self.options.annotate {
            self.printer.write_body("// After");
        }
        for (after_arg, value) in after_args.iter().zip(&passed) {
            let ty = self.rust_type(ctx.ty(*after_arg)?)?;
            let name = self.printer.print(*after_arg);
            self.printer
                .write_body(&format!("let {}: {} = {};", name, ty, value));
        }
        Ok(())
    }

    pub(super) fn emit_loop_yield(
        &mut self,
        ctx: &mut FnCtx<'_>,
        values: &[ValueId],
    ) -> Result<(), RenderError> {
        let carried = match ctx.loops.last() {
            Some(frame) => frame.carried.clone(),
            None => return Err(RenderError::internal("loop.yield outside a loop")),
        };
        if carried.len() != values.len() {
            return Err(RenderError::internal(format!(
                "loop.yield produces {} values for {} carried locals",
                values.len(),
                carried.len()
            )));
        }
        // Yielded values are never carried locals (those are out of scope in
        // the after block), so plain sequential assignment is safe.
        for (target, value) in carried.iter().zip(values) {
            let value = self.printer.print(*value);
            self.printer.write_body(&format!("{} = {};", target, value));
        }
        Ok(())
    }

    pub(super) fn emit_loop_break(&mut self, values: &[ValueId]) -> Result<(), RenderError> {
        let values: Vec<String> = values.iter().map(|v| self.printer.print(*v)).collect();
        self.printer.write_body(&break_text(&values));
        Ok(())
    }
}
