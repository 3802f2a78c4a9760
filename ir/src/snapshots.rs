//! Golden snapshot tests for the IR pretty-printer.
//!
//! These tests verify that the textual IR dump remains stable across changes.

#[cfg(test)]
mod tests {
    use crate::builder::FunctionBuilder;
    use crate::pretty::{pretty_print_function, pretty_print_module};
    use crate::*;

    /// Snapshot: fn add(x: i32, y: i32) -> i32 { x + y }
    #[test]
    fn snapshot_add() {
        let mut b = FunctionBuilder::new("add");
        let x = b.arg(Type::i32());
        let y = b.arg(Type::i32());
        b.returns(Type::i32());
        let sum = b.binary(BinOp::Add, x, y, Type::i32());
        b.ret(Some(sum));

        let mut module = Module::new("demo");
        module.functions.push(b.finish());

        let expected = r#"module demo {
  fn add(%0: i32, %1: i32) -> i32 {
    %2 = binary add %0, %1 : i32
    return %2
  }
}
"#;
        assert_eq!(pretty_print_module(&module), expected, "add snapshot mismatch");
    }

    /// Snapshot: counting loop next to an external declaration
    #[test]
    fn snapshot_counting_loop() {
        let mut ext = FunctionBuilder::new("source");
        ext.arg(Type::i32());
        ext.returns(Type::i32());
        ext.external();
        ext.rust_name("src");

        let mut b = FunctionBuilder::new("count");
        let n = b.arg(Type::i32());
        b.returns(Type::i32());
        let zero = b.constant(Literal::Int(0), Type::i32());
        let res = b.loop_op(
            vec![zero],
            &[Type::i32()],
            |b, args| {
                let c = b.compare(CmpOp::Lt, args[0], n);
                b.loop_condition(c, vec![args[0]]);
            },
            |b, args| {
                let one = b.constant(Literal::Int(1), Type::i32());
                let next = b.binary(BinOp::Add, args[0], one, Type::i32());
                b.loop_yield(vec![next]);
            },
        );
        b.ret(Some(res[0]));

        let mut module = Module::new("demo");
        module.functions.push(ext.finish());
        module.functions.push(b.finish());

        let expected = r#"module demo {
  extern fn source(i32) -> i32 attributes {rust_name = "src"}

  fn count(%0: i32) -> i32 {
    %1 = constant 0 : i32
    %7 = loop(%1) : i32 {
    before(%2: i32):
      %3 = compare lt %2, %0 : bool
      loop.condition %3(%2)
    after(%4: i32):
      %5 = constant 1 : i32
      %6 = binary add %4, %5 : i32
      loop.yield(%6)
    }
    return %7
  }
}
"#;
        assert_eq!(pretty_print_module(&module), expected, "loop snapshot mismatch");
    }

    /// Snapshot: event handler with enum plumbing
    #[test]
    fn snapshot_event_handler() {
        let state = Type::record([("count", Type::i64())]);
        let input = Type::variant([("Inc", Type::i64()), ("Reset", Type::unit())]);
        let output = Type::variant([("Total", Type::i64())]);

        let mut b = FunctionBuilder::new("handle");
        b.event_handler("Counter", "counter");
        let this = b.arg(state);
        let event = b.arg(input);
        b.arg(Type::stream(output.clone(), StreamDirection::Out));
        let is_inc = b.op(
            OpKind::EnumCheck {
                value: event,
                variant: "Inc".to_string(),
            },
            Type::bool(),
        );
        b.if_op(
            is_inc,
            None,
            |b| {
                let total = b.field_access(this, "count", Type::i64());
                let out = b.make_enum("Total", Some(total), output.clone());
                b.emit(out);
                b.block_result(None);
            },
            |b| {
                b.op_void(OpKind::Panic {
                    message: Some("unexpected".to_string()),
                });
                b.block_result(None);
            },
        );
        b.ret(None);

        let expected = r#"fn handle(%0: {count: i64}, %1: <Inc: i64 | Reset: unit>, %2: stream<out, <Total: i64>>) attributes {is_event_handler, mod_name = "counter", task_name = "Counter"} {
  %3 = enum_check %1 is Inc : bool
  if %3 {
  then:
    %4 = field_access %0.count : i64
    %5 = make_enum Total(%4) : <Total: i64>
    emit %5
    block.result
  else:
    panic "unexpected"
    block.result
  }
  return
}
"#;
        assert_eq!(pretty_print_function(&b.finish()), expected);
    }
}
