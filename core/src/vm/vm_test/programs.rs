use super::*;

#[test]
fn adds_two_literals() {
    let body = lambda(
        vec![Instruction::IntPush(3), Instruction::IntPush(4), Instruction::IPlus, Instruction::Ret],
        2,
        0,
        0,
    );
    assert_eq!(exec_with_new_vm(&body, &[]).unwrap(), vec![Value::Int(7)]);
}

#[test]
fn increments_its_parameter() {
    let body = lambda(
        vec![Instruction::VarPush(0), Instruction::IntPush(1), Instruction::IPlus, Instruction::Ret],
        2,
        1,
        1,
    );
    assert_eq!(exec_with_new_vm(&body, &[Value::Int(41)]).unwrap(), vec![Value::Int(42)]);
}

#[test]
fn makefunc_reads_captured_slot() {
    let inner = lambda(vec![Instruction::VarPush(0), Instruction::Ret], 1, 0, 1);
    let outer = lambda(
        vec![
            Instruction::IntPush(10),
            Instruction::VarSave(0),
            Instruction::Pop,
            Instruction::PushClosure,
            Instruction::MakeFunc(inner.clone()),
            Instruction::PopCall,
            Instruction::Ret,
        ],
        2,
        0,
        1,
    );
    assert_eq!(exec_with_new_vm(&outer, &[]).unwrap(), vec![Value::Int(10)]);

    // Same thing from the host side.
    let mut vm = Vm::new();
    let closure = Frame::from_values(vec![Value::Int(10)]);
    let func = Callable::function(inner, Some(closure));
    assert_eq!(vm.call(&func, &[]).unwrap(), vec![Value::Int(10)]);
}

#[test]
fn callee_frame_is_closure_then_args_then_nil_locals() {
    // vars = [captured, a, b, local]
    let body = lambda(
        vec![
            Instruction::VarPush(0),
            Instruction::VarPush(1),
            Instruction::VarPush(2),
            Instruction::VarPush(3),
            Instruction::Ret,
        ],
        4,
        2,
        4,
    );
    let func = Callable::function(body, Some(Frame::from_values(vec![Value::str("c")])));
    let mut vm = Vm::new();
    let out = vm.call(&func, &[Value::Int(1), Value::Int(2)]).unwrap();
    assert_eq!(out, vec![Value::str("c"), Value::Int(1), Value::Int(2), Value::Nil]);
}

#[test]
fn falling_off_the_end_returns() {
    let body = lambda(vec![Instruction::IntPush(1), Instruction::IntPush(2)], 2, 0, 0);
    assert_eq!(exec_with_new_vm(&body, &[]).unwrap(), vec![Value::Int(1), Value::Int(2)]);
}

#[test]
fn ret_ignores_trailing_code() {
    let body = lambda(vec![Instruction::IntPush(1), Instruction::Ret, Instruction::IntPush(2)], 2, 0, 0);
    assert_eq!(exec_with_new_vm(&body, &[]).unwrap(), vec![Value::Int(1)]);
}

#[test]
fn save_keeps_value_on_stack() {
    let body = lambda(
        vec![
            Instruction::IntPush(5),
            Instruction::VarSave(0),
            Instruction::VarPush(0),
            Instruction::IPlus,
            Instruction::Ret,
        ],
        2,
        0,
        1,
    );
    assert_eq!(exec_with_new_vm(&body, &[]).unwrap(), vec![Value::Int(10)]);
}

#[test]
fn globals_are_shared_across_calls() {
    let mut vm = Vm::new();
    let globals = vm.init_globals(2);
    let body = lambda(
        vec![
            Instruction::IntPush(9),
            Instruction::GlobalSave(1),
            Instruction::Pop,
            Instruction::GlobalPush(1),
            Instruction::GlobalPush(1),
            Instruction::IPlus,
            Instruction::Ret,
        ],
        2,
        0,
        0,
    );
    assert_eq!(vm.exec(&body).unwrap(), vec![Value::Int(18)]);
    assert_eq!(globals.get(1).unwrap(), Value::Int(9));
    assert_eq!(globals.get(0).unwrap(), Value::Nil);
}

#[test]
fn integer_arithmetic_is_exact() {
    let run = |insts: Vec<Instruction>| exec_with_new_vm(&lambda(insts, 2, 0, 0), &[]);

    assert_eq!(
        run(vec![Instruction::IntPush(-7), Instruction::IntPush(2), Instruction::IDivide]).unwrap(),
        vec![Value::Int(-3)]
    );
    assert_eq!(
        run(vec![Instruction::IntPush(6), Instruction::IntPush(7), Instruction::ITimes]).unwrap(),
        vec![Value::Int(42)]
    );
    assert_eq!(
        run(vec![Instruction::IntPush(2), Instruction::IntPush(9), Instruction::IMinus]).unwrap(),
        vec![Value::Int(-7)]
    );

    let err = run(vec![Instruction::IntPush(1), Instruction::IntPush(0), Instruction::IDivide]).unwrap_err();
    assert!(matches!(err.kind(), VmError::DivisionByZero));
    assert!(!err.is_fatal());

    let err = run(vec![Instruction::IntPush(i64::MAX), Instruction::IntPush(1), Instruction::IPlus]).unwrap_err();
    assert!(matches!(err.kind(), VmError::IntegerOverflow { op: "i_plus" }));

    let err = run(vec![Instruction::IntPush(i64::MIN), Instruction::INegate]).unwrap_err();
    assert!(matches!(err.kind(), VmError::IntegerOverflow { op: "i_negate" }));

    let err = run(vec![Instruction::IntPush(i64::MIN), Instruction::IntPush(-1), Instruction::IDivide]).unwrap_err();
    assert!(matches!(err.kind(), VmError::IntegerOverflow { .. }));
}

#[test]
fn incr_and_decr_mutate_top_in_place() {
    let body = lambda(
        vec![
            Instruction::IntPush(4),
            Instruction::IIncr,
            Instruction::IIncr,
            Instruction::IDecr,
            Instruction::Ret,
        ],
        1,
        0,
        0,
    );
    assert_eq!(exec_with_new_vm(&body, &[]).unwrap(), vec![Value::Int(5)]);

    let body = lambda(vec![Instruction::ConstPush(Value::Real(1.0)), Instruction::IIncr], 1, 0, 0);
    let err = exec_with_new_vm(&body, &[]).unwrap_err();
    assert!(matches!(err.kind(), VmError::TypeMismatch { expected: "Int", found: "Real" }));
}

#[test]
fn integer_comparisons_push_bool() {
    let cases = [
        (Instruction::IEq, 3, 3, true),
        (Instruction::INeq, 3, 3, false),
        (Instruction::IGt, 4, 3, true),
        (Instruction::IGe, 3, 3, true),
        (Instruction::ILt, 4, 3, false),
        (Instruction::ILe, 2, 3, true),
    ];
    for (op, a, b, expected) in cases {
        let body = lambda(vec![Instruction::IntPush(a), Instruction::IntPush(b), op], 2, 0, 0);
        assert_eq!(exec_with_new_vm(&body, &[]).unwrap(), vec![Value::Bool(expected)]);
    }
}

#[test]
fn real_arithmetic_follows_ieee() {
    let real = |r: f64| Instruction::ConstPush(Value::Real(r));
    let run = |insts: Vec<Instruction>| exec_with_new_vm(&lambda(insts, 2, 0, 0), &[]).unwrap();

    assert_eq!(run(vec![real(1.5), real(2.25), Instruction::FPlus]), vec![Value::Real(3.75)]);
    assert_eq!(run(vec![real(1.0), real(0.0), Instruction::FDivide]), vec![Value::Real(f64::INFINITY)]);
    assert_eq!(run(vec![real(2.0), Instruction::FNegate]), vec![Value::Real(-2.0)]);

    let nan = f64::NAN;
    assert_eq!(run(vec![real(nan), real(nan), Instruction::FEq]), vec![Value::Bool(false)]);
    assert_eq!(run(vec![real(nan), real(nan), Instruction::FNeq]), vec![Value::Bool(true)]);
    assert_eq!(run(vec![real(nan), real(1.0), Instruction::FLt]), vec![Value::Bool(false)]);
    assert_eq!(run(vec![real(0.5), real(1.0), Instruction::FLe]), vec![Value::Bool(true)]);
}

#[test]
fn no_cross_kind_coercion() {
    let body = lambda(
        vec![
            Instruction::IntPush(1),
            Instruction::ConstPush(Value::Real(2.0)),
            Instruction::IPlus,
            Instruction::Ret,
        ],
        2,
        0,
        0,
    );
    let err = exec_with_new_vm(&body, &[]).unwrap_err();
    assert!(matches!(err.kind(), VmError::TypeMismatch { expected: "Int", found: "Real" }));

    let body = lambda(
        vec![Instruction::ConstPush(Value::Real(2.0)), Instruction::IntPush(1), Instruction::FTimes],
        2,
        0,
        0,
    );
    let err = exec_with_new_vm(&body, &[]).unwrap_err();
    assert!(matches!(err.kind(), VmError::TypeMismatch { expected: "Real", found: "Int" }));
}

#[test]
fn logical_opcodes() {
    let t = || Instruction::ConstPush(Value::Bool(true));
    let f = || Instruction::ConstPush(Value::Bool(false));
    let run = |insts: Vec<Instruction>| exec_with_new_vm(&lambda(insts, 2, 0, 0), &[]).unwrap();

    assert_eq!(run(vec![t(), Instruction::LogNot]), vec![Value::Bool(false)]);
    assert_eq!(run(vec![t(), f(), Instruction::LogEq]), vec![Value::Bool(false)]);
    assert_eq!(run(vec![f(), f(), Instruction::LogEq]), vec![Value::Bool(true)]);
    assert_eq!(run(vec![t(), f(), Instruction::LogNeq]), vec![Value::Bool(true)]);

    let err = exec_with_new_vm(&lambda(vec![Instruction::IntPush(0), Instruction::LogNot], 1, 0, 0), &[]).unwrap_err();
    assert!(matches!(err.kind(), VmError::TypeMismatch { expected: "Bool", .. }));
}

#[test]
fn mem_eq_compares_heap_values_by_identity() {
    let shared = Value::array(vec![Value::Int(1)]);
    let twin = Value::array(vec![Value::Int(1)]);
    let run = |a: Value, b: Value, op: Instruction| {
        exec_with_new_vm(
            &lambda(vec![Instruction::ConstPush(a), Instruction::ConstPush(b), op], 2, 0, 0),
            &[],
        )
        .unwrap()
    };

    assert_eq!(run(shared.clone(), shared.clone(), Instruction::MemEq), vec![Value::Bool(true)]);
    assert_eq!(run(shared.clone(), twin.clone(), Instruction::MemEq), vec![Value::Bool(false)]);
    assert_eq!(run(shared, twin, Instruction::MemNeq), vec![Value::Bool(true)]);
    assert_eq!(run(Value::Int(3), Value::Int(3), Instruction::MemEq), vec![Value::Bool(true)]);
    assert_eq!(run(Value::str("a"), Value::str("a"), Instruction::MemEq), vec![Value::Bool(true)]);
    assert_eq!(run(Value::Int(3), Value::Real(3.0), Instruction::MemEq), vec![Value::Bool(false)]);
}

#[test]
fn exceeding_max_stack_size_is_fatal() {
    let body = Rc::new(
        Lambda::new(
            program(vec![Instruction::IntPush(1), Instruction::IntPush(2), Instruction::Ret]),
            1,
            0,
            0,
        )
        .with_positions(line_per_inst(3)),
    );
    let mut vm = Vm::new();
    let err = vm.exec(&body).unwrap_err();
    assert!(matches!(err.kind(), VmError::StackOverflow { limit: 1 }));
    assert!(err.is_fatal());
    assert_eq!(err.position(), Some(&Position::new(2, 1)));
    assert!(vm.stack().is_empty());
    assert_eq!(vm.stack().depth(), 0);
}

#[test]
fn errors_carry_the_failing_instruction_position() {
    let body = Rc::new(
        Lambda::new(
            program(vec![
                Instruction::IntPush(1),
                Instruction::ConstPush(Value::str("x")),
                Instruction::IPlus,
                Instruction::Ret,
            ]),
            2,
            0,
            0,
        )
        .with_positions(line_per_inst(4)),
    );
    let err = exec_with_new_vm(&body, &[]).unwrap_err();
    assert_eq!(err.position(), Some(&Position::new(3, 1)));
    assert_eq!(err.to_string(), "3:1: type mismatch: expected Int, found String");
}

#[test]
fn innermost_position_wins() {
    let mut inner_pl = PosList::new();
    inner_pl.push(0, Position::in_file("inner.asy", 7, 2));
    let inner = Rc::new(
        Lambda::new(program(vec![Instruction::IntPush(1), Instruction::IntPush(0), Instruction::IDivide]), 2, 0, 0)
            .with_positions(inner_pl),
    );
    let outer = Rc::new(
        Lambda::new(
            program(vec![
                Instruction::PushClosure,
                Instruction::MakeFunc(inner),
                Instruction::PopCall,
                Instruction::Ret,
            ]),
            1,
            0,
            0,
        )
        .with_positions(line_per_inst(4)),
    );
    let err = exec_with_new_vm(&outer, &[]).unwrap_err();
    assert_eq!(err.position(), Some(&Position::in_file("inner.asy", 7, 2)));
    assert_eq!(err.to_string(), "inner.asy:7:2: integer division by zero");
}

#[test]
fn slot_out_of_range_is_fatal() {
    // Not validated on purpose: the interpreter must still fail safely.
    let body = lambda(vec![Instruction::VarPush(3)], 1, 0, 1);
    let err = exec_with_new_vm(&body, &[]).unwrap_err();
    assert!(matches!(err.kind(), VmError::IndexOutOfBounds { what: "frame", index: 3, len: 1 }));
    assert!(err.is_fatal());
}

#[test]
fn failed_run_restores_the_stack() {
    let mut vm = Vm::new();
    vm.stack_mut().push(99i64).unwrap();
    let body = lambda(
        vec![Instruction::IntPush(1), Instruction::IntPush(2), Instruction::Pop, Instruction::Pop, Instruction::Pop],
        2,
        0,
        0,
    );
    let err = vm.exec(&body).unwrap_err();
    assert!(matches!(err.kind(), VmError::StackUnderflow));
    assert_eq!(vm.stack().as_slice(), &[Value::Int(99)]);

    let ok = lambda(vec![Instruction::IntPush(5)], 1, 0, 0);
    assert_eq!(vm.exec(&ok).unwrap(), vec![Value::Int(5)]);
}

#[test]
fn missing_arguments_underflow() {
    let body = lambda(vec![Instruction::VarPush(0)], 1, 2, 2);
    let err = exec_with_new_vm(&body, &[Value::Int(1)]).unwrap_err();
    assert!(matches!(err.kind(), VmError::StackUnderflow));
}

#[test]
fn surplus_arguments_are_rejected() {
    let mut vm = Vm::new();
    vm.stack_mut().push(99i64).unwrap();
    let body = Rc::new(Lambda::new(program(vec![Instruction::VarPush(0)]), 1, 1, 1).with_name("one"));
    let err = vm.exec_with(&body, &[Value::Int(1), Value::Int(2)]).unwrap_err();
    assert!(matches!(err.kind(), VmError::MalformedLambda(msg) if msg == "one takes 1 arguments, got 2"));
    assert_eq!(vm.stack().as_slice(), &[Value::Int(99)]);
    assert_eq!(vm.exec_with(&body, &[Value::Int(1)]).unwrap(), vec![Value::Int(1)]);
}
