#![no_main]

use ir::builder::FunctionBuilder;
use ir::{
    BinOp, CmpOp, Function, Literal, LoopOp, Module, OpKind, Primitive, StreamDirection, Type,
    ValueId,
};
use libfuzzer_sys::fuzz_target;
use rustgen::{render_module, RenderOptions};

const MAX_FUNCTIONS: usize = 3;
const MAX_ARGS: usize = 4;
const MAX_OPS: usize = 10;
const MAX_MEMBERS: usize = 3;
const MAX_DEPTH: usize = 3;
const NAMES: [&str; 6] = ["a", "b", "c", "Incr", "Reset", "type"];

struct ByteCursor<'a> {
    data: &'a [u8],
    idx: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, idx: 0 }
    }

    fn next_u8(&mut self) -> u8 {
        if self.idx >= self.data.len() {
            return 0;
        }
        let b = self.data[self.idx];
        self.idx += 1;
        b
    }

    fn next_u32(&mut self) -> u32 {
        let mut out = 0u32;
        for shift in 0..4 {
            out |= (self.next_u8() as u32) << (shift * 8);
        }
        out
    }

    fn gen_range(&mut self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        (self.next_u32() as usize) % max
    }

    fn gen_bool(&mut self) -> bool {
        (self.next_u8() & 1) == 1
    }
}

fn random_name(cur: &mut ByteCursor<'_>) -> &'static str {
    NAMES[cur.gen_range(NAMES.len())]
}

fn random_type(cur: &mut ByteCursor<'_>, depth: usize) -> Type {
    let choices = if depth >= MAX_DEPTH { 1 } else { 7 };
    match cur.gen_range(choices) {
        0 => Type::Primitive(Primitive::ALL[cur.gen_range(Primitive::ALL.len())]),
        1 => Type::record(
            (0..cur.gen_range(MAX_MEMBERS + 1))
                .map(|_| (random_name(cur), random_type(cur, depth + 1)))
                .collect::<Vec<_>>(),
        ),
        2 => Type::variant(
            (0..1 + cur.gen_range(MAX_MEMBERS))
                .map(|_| (random_name(cur), random_type(cur, depth + 1)))
                .collect::<Vec<_>>(),
        ),
        3 => Type::tuple(
            (0..cur.gen_range(MAX_MEMBERS + 1))
                .map(|_| random_type(cur, depth + 1))
                .collect::<Vec<_>>(),
        ),
        4 => Type::array(random_type(cur, depth + 1), 1 + cur.gen_range(3)),
        5 => {
            let direction = match cur.gen_range(3) {
                0 => StreamDirection::In,
                1 => StreamDirection::Out,
                _ => StreamDirection::Bidirectional,
            };
            Type::stream(random_type(cur, depth + 1), direction)
        }
        _ => Type::function(
            (0..cur.gen_range(MAX_MEMBERS))
                .map(|_| random_type(cur, depth + 1))
                .collect::<Vec<_>>(),
            cur.gen_bool().then(|| random_type(cur, depth + 1)),
        ),
    }
}

fn random_value(cur: &mut ByteCursor<'_>, live: &[ValueId]) -> ValueId {
    // Occasionally reference something that is not in scope.
    if live.is_empty() || cur.gen_range(8) == 0 {
        return ValueId(cur.gen_range(64) as u32);
    }
    live[cur.gen_range(live.len())]
}

fn random_literal(cur: &mut ByteCursor<'_>) -> Literal {
    match cur.gen_range(5) {
        0 => Literal::Bool(cur.gen_bool()),
        1 => Literal::Int(cur.next_u32() as i32 as i64),
        2 => Literal::UInt(cur.next_u32() as u64),
        3 => Literal::Float(f32::from_bits(cur.next_u32()) as f64),
        _ => Literal::Unit,
    }
}

fn random_op(
    cur: &mut ByteCursor<'_>,
    b: &mut FunctionBuilder,
    live: &mut Vec<ValueId>,
    depth: usize,
) {
    let ty = random_type(cur, MAX_DEPTH - 1);
    let result = match cur.gen_range(12) {
        0 => Some(b.constant(random_literal(cur), ty)),
        1 => {
            let (lhs, rhs) = (random_value(cur, live), random_value(cur, live));
            Some(b.binary(BinOp::Add, lhs, rhs, ty))
        }
        2 => {
            let (lhs, rhs) = (random_value(cur, live), random_value(cur, live));
            Some(b.compare(CmpOp::Lt, lhs, rhs))
        }
        3 => {
            let aggregate = random_value(cur, live);
            Some(b.field_access(aggregate, random_name(cur), ty))
        }
        4 => {
            let payload = cur.gen_bool().then(|| random_value(cur, live));
            Some(b.make_enum(random_name(cur), payload, ty))
        }
        5 => {
            let fields = (0..cur.gen_range(MAX_MEMBERS + 1))
                .map(|_| random_value(cur, live))
                .collect();
            Some(b.make_struct(fields, ty))
        }
        6 => {
            let elements = (0..cur.gen_range(5)).map(|_| random_value(cur, live)).collect();
            let shape = (0..1 + cur.gen_range(2)).map(|_| cur.gen_range(3)).collect();
            Some(b.op(OpKind::MakeTensor { shape, elements }, ty))
        }
        7 => {
            let value = random_value(cur, live);
            b.emit(value);
            None
        }
        8 if depth < MAX_DEPTH => {
            let cond = random_value(cur, live);
            let result_types: Vec<Type> = cur.gen_bool().then(|| ty.clone()).into_iter().collect();
            b.begin_block(&[]);
            random_region_end(cur, b, &mut live.clone(), depth + 1);
            let then_block = b.end_block();
            b.begin_block(&[]);
            random_region_end(cur, b, &mut live.clone(), depth + 1);
            let else_block = b.end_block();
            let results = b.push(
                OpKind::If {
                    cond,
                    then_block,
                    else_block,
                },
                &result_types,
            );
            results.first().copied()
        }
        9 if depth < MAX_DEPTH => {
            let inits: Vec<ValueId> = (0..cur.gen_range(3)).map(|_| random_value(cur, live)).collect();
            let carried_types: Vec<Type> = inits
                .iter()
                .map(|_| random_type(cur, MAX_DEPTH - 1))
                .collect();
            let result_types: Vec<Type> = (0..cur.gen_range(3))
                .map(|_| random_type(cur, MAX_DEPTH - 1))
                .collect();

            let carried = b.begin_block(&carried_types);
            let mut scope = live.clone();
            scope.extend_from_slice(&carried);
            for _ in 0..cur.gen_range(3) {
                random_op(cur, b, &mut scope, depth + 1);
            }
            let cond = random_value(cur, &scope);
            let args = (0..cur.gen_range(3)).map(|_| random_value(cur, &scope)).collect();
            b.loop_condition(cond, args);
            let before = b.end_block();

            let after_args = b.begin_block(&result_types);
            let mut scope = live.clone();
            scope.extend_from_slice(&after_args);
            for _ in 0..cur.gen_range(3) {
                random_op(cur, b, &mut scope, depth + 1);
            }
            let values = (0..cur.gen_range(3)).map(|_| random_value(cur, &scope)).collect();
            b.loop_yield(values);
            let after = b.end_block();

            let results = b.push(
                OpKind::Loop(LoopOp {
                    inits,
                    before,
                    after,
                }),
                &result_types,
            );
            live.extend(results);
            None
        }
        10 => {
            let callee = random_name(cur);
            let args = (0..cur.gen_range(MAX_ARGS)).map(|_| random_value(cur, live)).collect();
            b.call(callee, args, cur.gen_bool().then_some(ty))
        }
        _ => {
            let values = (0..cur.gen_range(3)).map(|_| random_value(cur, live)).collect();
            b.loop_break(values);
            None
        }
    };
    live.extend(result);
}

/// A few operations followed by one of the terminators an `if` branch takes.
fn random_region_end(
    cur: &mut ByteCursor<'_>,
    b: &mut FunctionBuilder,
    live: &mut Vec<ValueId>,
    depth: usize,
) {
    for _ in 0..cur.gen_range(3) {
        random_op(cur, b, live, depth);
    }
    match cur.gen_range(3) {
        0 => {
            let value = cur.gen_bool().then(|| random_value(cur, live));
            b.block_result(value)
        }
        1 => {
            let values = (0..cur.gen_range(2)).map(|_| random_value(cur, live)).collect();
            b.loop_break(values)
        }
        _ => {}
    }
}

fn build_function(cur: &mut ByteCursor<'_>, index: usize) -> Function {
    let mut b = FunctionBuilder::new(format!("f{}", index));
    match cur.gen_range(6) {
        0 => {
            b.event_handler("Task", "task");
        }
        1 => {
            b.method_of("Task", "task");
        }
        2 => {
            b.external();
        }
        _ => {}
    }
    let mut live: Vec<ValueId> = (0..cur.gen_range(MAX_ARGS))
        .map(|_| {
            let ty = random_type(cur, 0);
            b.arg(ty)
        })
        .collect();
    let output = cur.gen_bool().then(|| random_type(cur, 1));
    if let Some(output) = output {
        b.returns(output);
    }
    for _ in 0..cur.gen_range(MAX_OPS) {
        random_op(cur, &mut b, &mut live, 0);
    }
    if cur.gen_range(8) != 0 {
        let value = cur.gen_bool().then(|| random_value(cur, &live));
        b.ret(value);
    }
    b.finish()
}

fn build_module(cur: &mut ByteCursor<'_>) -> Module {
    let mut module = Module::new("fuzzed");
    if cur.gen_range(16) == 0 {
        module.name = None;
    }
    for index in 0..1 + cur.gen_range(MAX_FUNCTIONS) {
        module.functions.push(build_function(cur, index));
    }
    module
}

fuzz_target!(|data: &[u8]| {
    let mut cursor = ByteCursor::new(data);
    let module = build_module(&mut cursor);
    // Verified modules must render; nothing may panic either way.
    match render_module(&module, &RenderOptions::default()) {
        Ok(rendered) => assert!(rendered.source.contains("pub mod fuzzed {")),
        Err(err) => assert!(err.code().starts_with("RS")),
    }
});
