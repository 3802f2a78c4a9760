//! Builder for IR functions.
//!
//! Blocks are built on a stack: `begin_block` opens a nested region block,
//! `end_block` closes it and hands it back so it can be placed into an
//! `If` or `Loop` operation. Operations are always appended to the innermost
//! open block.

use crate::{
    attrs, Attributes, BinOp, Block, CmpOp, Function, Literal, LoopOp, OpKind, Operation, Type,
    ValueDecl, ValueId,
};

pub struct FunctionBuilder {
    name: String,
    inputs: Vec<Type>,
    output: Option<Type>,
    attrs: Attributes,
    external: bool,
    values: Vec<ValueDecl>,
    blocks: Vec<Block>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            output: None,
            attrs: Attributes::new(),
            external: false,
            values: Vec::new(),
            blocks: vec![Block::default()],
        }
    }

    /// Declare a parameter and return the entry block argument bound to it.
    pub fn arg(&mut self, ty: Type) -> ValueId {
        self.inputs.push(ty.clone());
        let id = self.fresh(ty);
        self.blocks[0].args.push(id);
        id
    }

    pub fn returns(&mut self, ty: Type) -> &mut Self {
        self.output = Some(ty);
        self
    }

    pub fn external(&mut self) -> &mut Self {
        self.external = true;
        self
    }

    pub fn rust_name(&mut self, name: &str) -> &mut Self {
        self.attrs.set_str(attrs::RUST_NAME, name);
        self
    }

    /// Mark as an event handler of task `task_name` living in module `mod_name`.
    pub fn event_handler(&mut self, task_name: &str, mod_name: &str) -> &mut Self {
        self.method_of(task_name, mod_name);
        self.attrs.set_flag(attrs::IS_EVENT_HANDLER);
        self
    }

    /// Mark as a plain method of task `task_name` living in module `mod_name`.
    pub fn method_of(&mut self, task_name: &str, mod_name: &str) -> &mut Self {
        self.attrs.set_str(attrs::TASK_NAME, task_name);
        self.attrs.set_str(attrs::MOD_NAME, mod_name);
        self
    }

    pub fn init(&mut self) -> &mut Self {
        self.attrs.set_flag(attrs::IS_INIT);
        self
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes {
        &mut self.attrs
    }

    /// Allocate a value without attaching it to anything.
    pub fn fresh(&mut self, ty: Type) -> ValueId {
        let id = ValueId::from(self.values.len());
        self.values.push(ValueDecl::new(ty));
        id
    }

    pub fn begin_block(&mut self, arg_types: &[Type]) -> Vec<ValueId> {
        let args: Vec<ValueId> = arg_types
            .iter()
            .map(|ty| self.fresh(ty.clone()))
            .collect();
        self.blocks.push(Block::new(args.clone()));
        args
    }

    pub fn end_block(&mut self) -> Block {
        assert!(self.blocks.len() > 1, "end_block called on the entry block");
        self.blocks.pop().unwrap_or_default()
    }

    /// Append an operation producing one result per entry of `result_types`.
    pub fn push(&mut self, kind: OpKind, result_types: &[Type]) -> Vec<ValueId> {
        let results: Vec<ValueId> = result_types
            .iter()
            .map(|ty| self.fresh(ty.clone()))
            .collect();
        self.push_with_results(kind, results.clone());
        results
    }

    pub fn push_with_results(&mut self, kind: OpKind, results: Vec<ValueId>) {
        if let Some(block) = self.blocks.last_mut() {
            block.ops.push(Operation::new(kind, results));
        }
    }

    /// Append an operation with a single result.
    pub fn op(&mut self, kind: OpKind, ty: Type) -> ValueId {
        let id = self.fresh(ty);
        self.push_with_results(kind, vec![id]);
        id
    }

    /// Append an operation without results.
    pub fn op_void(&mut self, kind: OpKind) {
        self.push_with_results(kind, Vec::new());
    }

    pub fn constant(&mut self, lit: Literal, ty: Type) -> ValueId {
        self.op(OpKind::Constant(lit), ty)
    }

    pub fn binary(&mut self, op: BinOp, lhs: ValueId, rhs: ValueId, ty: Type) -> ValueId {
        self.op(OpKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn compare(&mut self, op: CmpOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.op(OpKind::Compare { op, lhs, rhs }, Type::bool())
    }

    pub fn call(&mut self, callee: &str, args: Vec<ValueId>, ty: Option<Type>) -> Option<ValueId> {
        let kind = OpKind::Call {
            callee: callee.to_string(),
            args,
        };
        match ty {
            Some(ty) => Some(self.op(kind, ty)),
            None => {
                self.op_void(kind);
                None
            }
        }
    }

    pub fn field_access(&mut self, aggregate: ValueId, field: &str, ty: Type) -> ValueId {
        self.op(
            OpKind::FieldAccess {
                aggregate,
                field: field.to_string(),
            },
            ty,
        )
    }

    pub fn make_struct(&mut self, fields: Vec<ValueId>, ty: Type) -> ValueId {
        self.op(OpKind::MakeStruct { fields }, ty)
    }

    pub fn make_enum(&mut self, variant: &str, payload: Option<ValueId>, ty: Type) -> ValueId {
        self.op(
            OpKind::MakeEnum {
                variant: variant.to_string(),
                payload,
            },
            ty,
        )
    }

    /// Build an `if` whose branches are produced by the two closures.
    pub fn if_op(
        &mut self,
        cond: ValueId,
        result: Option<Type>,
        then_fn: impl FnOnce(&mut Self),
        else_fn: impl FnOnce(&mut Self),
    ) -> Option<ValueId> {
        self.begin_block(&[]);
        then_fn(self);
        let then_block = self.end_block();
        self.begin_block(&[]);
        else_fn(self);
        let else_block = self.end_block();
        let kind = OpKind::If {
            cond,
            then_block,
            else_block,
        };
        match result {
            Some(ty) => Some(self.op(kind, ty)),
            None => {
                self.op_void(kind);
                None
            }
        }
    }

    /// Build a loop carrying `inits`. `before_fn` receives the carried values
    /// and must end with `loop_condition`; `after_fn` receives the condition's
    /// pass-through values and must end with `loop_yield`.
    pub fn loop_op(
        &mut self,
        inits: Vec<ValueId>,
        result_types: &[Type],
        before_fn: impl FnOnce(&mut Self, &[ValueId]),
        after_fn: impl FnOnce(&mut Self, &[ValueId]),
    ) -> Vec<ValueId> {
        let carried: Vec<Type> = inits
            .iter()
            .map(|v| {
                self.values
                    .get(v.index())
                    .map_or_else(Type::unit, |decl| decl.ty.clone())
            })
            .collect();
        let before_args = self.begin_block(&carried);
        before_fn(self, &before_args);
        let before = self.end_block();
        let after_args = self.begin_block(result_types);
        after_fn(self, &after_args);
        let after = self.end_block();
        self.push(
            OpKind::Loop(LoopOp {
                inits,
                before,
                after,
            }),
            result_types,
        )
    }

    pub fn loop_condition(&mut self, cond: ValueId, args: Vec<ValueId>) {
        self.op_void(OpKind::LoopCondition { cond, args });
    }

    pub fn loop_yield(&mut self, values: Vec<ValueId>) {
        self.op_void(OpKind::LoopYield { values });
    }

    pub fn loop_break(&mut self, values: Vec<ValueId>) {
        self.op_void(OpKind::LoopBreak { values });
    }

    pub fn block_result(&mut self, value: Option<ValueId>) {
        self.op_void(OpKind::BlockResult { value });
    }

    pub fn emit(&mut self, value: ValueId) {
        self.op_void(OpKind::Emit { value });
    }

    pub fn ret(&mut self, value: Option<ValueId>) {
        self.op_void(OpKind::Return { value });
    }

    pub fn finish(mut self) -> Function {
        assert_eq!(self.blocks.len(), 1, "unterminated nested block");
        let body = self.blocks.pop().unwrap_or_default();
        Function {
            name: self.name,
            inputs: self.inputs,
            output: self.output,
            body,
            attrs: self.attrs,
            external: self.external,
            values: self.values,
        }
    }
}
