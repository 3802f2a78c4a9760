use ir::builder::FunctionBuilder;
use ir::{BinOp, CmpOp, Function, Literal, Module, OpKind, Type, UnaryOp};
use rustgen::{render_module, render_modules, RenderOptions};

fn module_of(functions: Vec<Function>) -> Module {
    let mut module = Module::new("toplevel");
    module.functions = functions;
    module
}

fn render(module: &Module) -> rustgen::RenderedModule {
    render_module(module, &RenderOptions::default()).expect("module renders")
}

fn build_add(name: &str) -> Function {
    let mut b = FunctionBuilder::new(name);
    let x = b.arg(Type::i32());
    let y = b.arg(Type::i32());
    b.returns(Type::i32());
    let sum = b.binary(BinOp::Add, x, y, Type::i32());
    b.ret(Some(sum));
    b.finish()
}

fn point() -> Type {
    Type::record([("x", Type::i32()), ("y", Type::i32())])
}

fn shape() -> Type {
    Type::variant([("A", point()), ("B", Type::unit())])
}

#[test]
fn test_render_plain_function() {
    let out = render(&module_of(vec![build_add("add")]));
    insta::assert_snapshot!(out.source, @r###"
    pub mod toplevel {
        pub fn add(v0: i32, v1: i32) -> i32 {
            let v2: i32 = v0 + v1;
            return v2;
        }
    }
    "###);
    assert!(out.uses.is_empty());
    assert!(out.dependencies.is_empty());
}

#[test]
fn test_nominal_types_are_defined_once_before_use() {
    let mut b = FunctionBuilder::new("mk");
    let p = b.arg(point());
    b.returns(shape());
    let e = b.make_enum("A", Some(p), shape());
    b.ret(Some(e));

    let mut again = FunctionBuilder::new("unit_case");
    again.returns(shape());
    let unit = again.constant(Literal::Unit, Type::unit());
    let e = again.make_enum("B", Some(unit), shape());
    again.ret(Some(e));

    let out = render(&module_of(vec![b.finish(), again.finish()]));
    let expected = r#"pub mod toplevel {
    use arc_runtime::prelude::*;

    #[rewrite]
    pub struct Struct0 {
        pub x: i32,
        pub y: i32,
    }

    #[rewrite]
    pub enum Enum0 {
        A(Struct0),
        B(()),
    }

    pub fn mk(v0: Struct0) -> Enum0 {
        let v1: Enum0 = enwrap!(Enum0::A, v0);
        return v1;
    }

    pub fn unit_case() -> Enum0 {
        let v0: () = ();
        let v1: Enum0 = enwrap!(Enum0::B, v0);
        return v1;
    }
}
"#;
    assert_eq!(out.source, expected);
    assert_eq!(
        out.uses,
        "pub use crate::toplevel::Struct0;\npub use crate::toplevel::Enum0;\n"
    );
}

#[test]
fn test_loop_with_two_carried_values() {
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

    let out = render(&module_of(vec![b.finish()]));
    let expected = r#"pub mod toplevel {
    pub fn count(v0: i64) -> i64 {
        let v1: i64 = 0;
        // Loop variables
        let mut v2: i64 = v1;
        let mut v3: i64 = v1;
        let (v4, v5): (i64, i64) = loop {
            // Before
            let v6: bool = v2 < v0;
            if !v6 {
                break (v2, v3);
            }
            // After
            let v7: i64 = v2;
            let v8: i64 = v3;
            let v9: i64 = 1;
            let v10: i64 = v7 + v9;
            let v11: i64 = v8 + v10;
            v2 = v10;
            v3 = v11;
        };
        return v5;
    }
}
"#;
    assert_eq!(out.source, expected);
}

#[test]
fn test_annotations_can_be_switched_off() {
    let mut b = FunctionBuilder::new("spin");
    let n = b.arg(Type::i32());
    b.loop_op(
        vec![n],
        &[],
        |b, carried| {
            let zero = b.constant(Literal::Int(0), Type::i32());
            let more = b.compare(CmpOp::Gt, carried[0], zero);
            b.loop_condition(more, vec![]);
        },
        |b, _| {
            let zero = b.constant(Literal::Int(0), Type::i32());
            b.loop_yield(vec![zero]);
        },
    );
    b.ret(None);
    let module = module_of(vec![b.finish()]);

    let options = RenderOptions::from_toml_str("annotate = false").expect("valid options");
    let out = render_module(&module, &options).expect("renders");
    assert!(!out.source.contains("//"));
    assert!(out.source.contains("        loop {\n"));
    assert!(out.source.contains("break;"));
    assert!(out.source.contains("        };\n        return;\n"));
}

#[test]
fn test_if_with_result() {
    let mut b = FunctionBuilder::new("pick");
    let c = b.arg(Type::bool());
    let x = b.arg(Type::f64());
    b.returns(Type::f64());
    let r = b.if_op(
        c,
        Some(Type::f64()),
        |b| b.block_result(Some(x)),
        |b| {
            let half = b.constant(Literal::Float(0.5), Type::f64());
            b.block_result(Some(half));
        },
    );
    b.ret(r);

    let out = render(&module_of(vec![b.finish()]));
    let expected = r#"pub mod toplevel {
    pub fn pick(v0: bool, v1: f64) -> f64 {
        let v2: f64 = if v0 {
            v1
        } else {
            let v3: f64 = 0.5;
            v3
        };
        return v2;
    }
}
"#;
    assert_eq!(out.source, expected);
}

#[test]
fn test_value_names_restart_for_each_function() {
    let out = render(&module_of(vec![build_add("first"), build_add("second")]));
    assert!(out.source.contains("pub fn first(v0: i32, v1: i32) -> i32 {"));
    assert!(out.source.contains("pub fn second(v0: i32, v1: i32) -> i32 {"));
    assert!(out.source.contains("    }\n\n    pub fn second"));
}

#[test]
fn test_external_functions_are_called_by_rust_name() {
    let mut ext = FunctionBuilder::new("source");
    ext.arg(Type::i32());
    ext.returns(Type::i32());
    ext.external();
    ext.rust_name("read_source");

    let mut b = FunctionBuilder::new("caller");
    b.rust_name("call_it");
    let x = b.arg(Type::i32());
    b.returns(Type::i32());
    let r = b.call("source", vec![x], Some(Type::i32()));
    b.ret(r);

    let out = render(&module_of(vec![ext.finish(), b.finish()]));
    assert!(out.source.contains("pub fn call_it(v0: i32) -> i32 {"));
    assert!(out.source.contains("let v1: i32 = read_source(v0);"));
    assert!(!out.source.contains("fn read_source"));
    assert!(!out.source.contains("fn source"));
}

#[test]
fn test_tensors_pull_in_ndarray() {
    let mut b = FunctionBuilder::new("grid");
    let x = b.arg(Type::i64());
    let ty = Type::array(Type::i64(), 2);
    b.returns(ty.clone());
    let t = b.op(
        OpKind::MakeTensor {
            shape: vec![2, 2],
            elements: vec![x, x, x, x],
        },
        ty.clone(),
    );
    let doubled = b.op(
        OpKind::BinaryRc {
            op: BinOp::Add,
            lhs: t,
            rhs: t,
        },
        ty,
    );
    b.ret(Some(doubled));

    let out = render(&module_of(vec![b.finish()]));
    assert_eq!(
        out.dependencies,
        vec![("ndarray".to_string(), "0.13.0".to_string())]
    );
    assert!(out
        .source
        .starts_with("// cargo-dependency: ndarray = \"0.13.0\"\n\npub mod toplevel {\n"));
    assert!(out.source.contains("    use std::rc::Rc;\n    use ndarray::{Array, Dim, Ix};\n"));
    assert!(out
        .source
        .contains("pub fn grid(v0: i64) -> Rc<Array<i64, Dim<[Ix; 2]>>> {"));
    assert!(out.source.contains(
        "let v1: Rc<Array<i64, Dim<[Ix; 2]>>> = Rc::new(Array::from_shape_vec((2, 2), vec![v0, v0, v0, v0]).unwrap());"
    ));
    assert!(out
        .source
        .contains("let v2: Rc<Array<i64, Dim<[Ix; 2]>>> = Rc::new(&*v1 + &*v1);"));
}

#[test]
fn test_rendering_is_deterministic() {
    let build = || {
        let mut b = FunctionBuilder::new("mk");
        let p = b.arg(point());
        let q = b.arg(Type::record([("z", shape())]));
        b.returns(Type::tuple([point(), Type::record([("z", shape())])]));
        let t = b.op(
            OpKind::MakeTuple {
                elements: vec![p, q],
            },
            Type::tuple([point(), Type::record([("z", shape())])]),
        );
        b.ret(Some(t));
        module_of(vec![b.finish()])
    };
    let first = render(&build());
    let second = render(&build());
    assert_eq!(first, second);
    assert_eq!(first.source.matches("#[rewrite]").count(), 3);
}

#[test]
fn test_options_shape_the_output() {
    let options = RenderOptions::from_toml_str(
        r#"
crate_name = "pipeline"
include = "use crate::helpers::*;"
runtime_prelude = "my_runtime::prelude::*"
"#,
    )
    .expect("valid options");
    let mut b = FunctionBuilder::new("origin");
    b.returns(point());
    let zero = b.constant(Literal::Int(0), Type::i32());
    let p = b.make_struct(vec![zero, zero], point());
    b.ret(Some(p));

    let out = render_module(&module_of(vec![b.finish()]), &options).expect("renders");
    assert!(out.source.contains(
        "    use my_runtime::prelude::*;\n\n    use crate::helpers::*;\n\n    #[rewrite]\n"
    ));
    assert!(out.source.contains("let v1: Struct0 = new!(Struct0 { x: v0, y: v0 });"));
    assert_eq!(out.uses, "pub use pipeline::toplevel::Struct0;\n");
}

#[test]
fn test_each_module_numbers_its_own_types() {
    let mut first = FunctionBuilder::new("a");
    first.arg(point());
    first.ret(None);
    let mut second = FunctionBuilder::new("b");
    second.arg(shape());
    second.ret(None);

    let mut other = Module::new("other");
    other.functions.push(second.finish());
    let modules = vec![module_of(vec![first.finish()]), other];
    let out = render_modules(&modules, &RenderOptions::default()).expect("renders");
    assert_eq!(out.len(), 2);
    assert!(out[0].source.contains("pub struct Struct0"));
    assert!(out[1].source.contains("pub struct Struct0"));
    assert!(out[1].source.contains("pub enum Enum0"));
    assert_eq!(
        out[1].uses,
        "pub use crate::other::Struct0;\npub use crate::other::Enum0;\n"
    );
}

#[test]
fn test_invalid_module_produces_no_output() {
    let mut b = FunctionBuilder::new("bad");
    let x = b.arg(Type::i32());
    b.ret(Some(x));
    let err = render_module(&module_of(vec![b.finish()]), &RenderOptions::default())
        .expect_err("void function returning a value");
    assert_eq!(err.code(), "RS020");

    let mut unnamed = module_of(vec![build_add("add")]);
    unnamed.name = None;
    let err = render_module(&unnamed, &RenderOptions::default()).expect_err("unnamed");
    assert_eq!(err.code(), "RS001");
}

#[test]
fn test_unary_ops_indirect_calls_and_panics() {
    let mut b = FunctionBuilder::new("apply");
    let f = b.arg(Type::function([Type::f64()], Some(Type::f64())));
    let x = b.arg(Type::f64());
    let flag = b.arg(Type::bool());
    b.returns(Type::f64());
    let unary = |b: &mut FunctionBuilder, op, operand, ty| {
        b.op(OpKind::Unary { op, operand }, ty)
    };
    let ln = unary(&mut b, UnaryOp::Log, x, Type::f64());
    let root = unary(&mut b, UnaryOp::Sqrt, ln, Type::f64());
    let neg = unary(&mut b, UnaryOp::Neg, root, Type::f64());
    let bad = unary(&mut b, UnaryOp::Not, flag, Type::bool());
    let applied = b.op(
        OpKind::CallIndirect {
            callee: f,
            args: vec![neg],
        },
        Type::f64(),
    );
    b.if_op(
        bad,
        None,
        |b| {
            b.op_void(OpKind::Panic {
                message: Some("bad {input}\u{7}".to_string()),
            });
            b.block_result(None);
        },
        |b| b.block_result(None),
    );
    b.ret(Some(applied));

    let out = render(&module_of(vec![b.finish()]));
    let expected = r#"pub mod toplevel {
    pub fn apply(v0: fn(f64) -> f64, v1: f64, v2: bool) -> f64 {
        let v3: f64 = f64::ln(v1);
        let v4: f64 = f64::sqrt(v3);
        let v5: f64 = -v4;
        let v6: bool = !v2;
        let v7: f64 = (v0)(v5);
        if v6 {
            panic!("bad {{input}}\u{7}");
        } else {
        }
        return v7;
    }
}
"#;
    assert_eq!(out.source, expected);
}

#[test]
fn test_method_calls_with_and_without_result() {
    let mut b = FunctionBuilder::new("larger");
    let x = b.arg(Type::f64());
    let y = b.arg(Type::f64());
    b.returns(Type::f64());
    let max = b.op(
        OpKind::MethodCall {
            receiver: x,
            method: "max".to_string(),
            args: vec![y],
        },
        Type::f64(),
    );
    b.op_void(OpKind::MethodCall {
        receiver: max,
        method: "to_string".to_string(),
        args: vec![],
    });
    b.op_void(OpKind::Panic { message: None });
    b.ret(Some(max));

    let out = render(&module_of(vec![b.finish()]));
    assert!(out.source.contains("        let v2: f64 = v0.max(v1);\n        v2.to_string();\n        panic!();\n        return v2;\n"));
}

#[test]
fn test_break_out_of_loop_body() {
    let mut b = FunctionBuilder::new("find");
    let n = b.arg(Type::i64());
    b.returns(Type::i64());
    let zero = b.constant(Literal::Int(0), Type::i64());
    let results = b.loop_op(
        vec![zero],
        &[Type::i64()],
        |b, carried| {
            let more = b.compare(CmpOp::Lt, carried[0], n);
            b.loop_condition(more, vec![carried[0]]);
        },
        |b, args| {
            let ten = b.constant(Literal::Int(10), Type::i64());
            let hit = b.compare(CmpOp::Eq, args[0], ten);
            b.if_op(hit, None, |b| b.loop_break(vec![args[0]]), |b| b.block_result(None));
            let one = b.constant(Literal::Int(1), Type::i64());
            let next = b.binary(BinOp::Add, args[0], one, Type::i64());
            b.loop_yield(vec![next]);
        },
    );
    b.ret(Some(results[0]));

    let out = render(&module_of(vec![b.finish()]));
    let expected = r#"pub mod toplevel {
    pub fn find(v0: i64) -> i64 {
        let v1: i64 = 0;
        // Loop variables
        let mut v2: i64 = v1;
        let v3: i64 = loop {
            // Before
            let v4: bool = v2 < v0;
            if !v4 {
                break v2;
            }
            // After
            let v5: i64 = v2;
            let v6: i64 = 10;
            let v7: bool = v5 == v6;
            if v7 {
                break v5;
            } else {
            }
            let v8: i64 = 1;
            let v9: i64 = v5 + v8;
            v2 = v9;
        };
        return v3;
    }
}
"#;
    assert_eq!(out.source, expected);
}

#[test]
fn test_swapping_loop_reads_after_block_copies() {
    let mut b = FunctionBuilder::new("order");
    let x = b.arg(Type::i64());
    let y = b.arg(Type::i64());
    b.returns(Type::i64());
    let results = b.loop_op(
        vec![x, y],
        &[Type::i64(), Type::i64()],
        |b, carried| {
            let more = b.compare(CmpOp::Lt, carried[0], carried[1]);
            b.loop_condition(more, carried.to_vec());
        },
        |b, args| b.loop_yield(vec![args[1], args[0]]),
    );
    b.ret(Some(results[0]));

    let out = render(&module_of(vec![b.finish()]));
    let expected = r#"pub mod toplevel {
    pub fn order(v0: i64, v1: i64) -> i64 {
        // Loop variables
        let mut v2: i64 = v0;
        let mut v3: i64 = v1;
        let (v4, v5): (i64, i64) = loop {
            // Before
            let v6: bool = v2 < v3;
            if !v6 {
                break (v2, v3);
            }
            // After
            let v7: i64 = v2;
            let v8: i64 = v3;
            v2 = v8;
            v3 = v7;
        };
        return v4;
    }
}
"#;
    assert_eq!(out.source, expected);
}
