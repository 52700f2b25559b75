use super::*;

fn subtract(stack: &mut Stack) -> VmResult<()> {
    let b = stack.pop_as::<i64>()?;
    let a = stack.pop_as::<i64>()?;
    stack.push(a - b)
}

fn negate(stack: &mut Stack) -> VmResult<()> {
    let a = stack.pop_as::<i64>()?;
    stack.push(-a)
}

fn stack_with(values: &[i64]) -> Stack {
    let mut stack = Stack::new(&VmConfig::default());
    for v in values {
        stack.push(*v).unwrap();
    }
    stack
}

#[test]
fn native_pops_args_and_pushes_result() {
    let f = Callable::native("sub", subtract);
    let mut stack = stack_with(&[10, 3]);
    f.invoke(&mut stack).unwrap();
    assert_eq!(stack.as_slice(), &[Value::Int(7)]);
}

#[test]
fn undefined_call_fails_without_touching_the_stack() {
    let mut stack = stack_with(&[1, 2]);
    let err = Callable::undefined().invoke(&mut stack).unwrap_err();
    assert!(matches!(err, VmError::UndefinedCall));
    assert!(!err.is_fatal());
    assert_eq!(stack.as_slice(), &[Value::Int(1), Value::Int(2)]);
}

#[test]
fn undefined_is_a_shared_instance() {
    assert!(Rc::ptr_eq(&Callable::undefined(), &Callable::undefined()));
}

#[test]
fn undefined_call_from_bytecode_is_located() {
    let body = Rc::new(
        Lambda::new(
            program(vec![
                Instruction::IntPush(1),
                Instruction::ConstPush(Value::Callable(Callable::undefined())),
                Instruction::PopCall,
                Instruction::Ret,
            ]),
            2,
            0,
            0,
        )
        .with_positions(line_per_inst(4)),
    );
    let mut vm = Vm::new();
    let err = vm.exec(&body).unwrap_err();
    assert!(matches!(err.kind(), VmError::UndefinedCall));
    assert_eq!(err.position(), Some(&Position::new(3, 1)));
    assert!(vm.stack().is_empty());
}

#[test]
fn thunk_matches_push_then_call() {
    let f = Callable::native("sub", subtract);
    let bound = Callable::thunk(f.clone(), Value::Int(10));

    let mut via_thunk = stack_with(&[3]);
    bound.invoke(&mut via_thunk).unwrap();

    let mut direct = stack_with(&[3]);
    direct.push(10i64).unwrap();
    f.invoke(&mut direct).unwrap();

    assert_eq!(via_thunk.as_slice(), direct.as_slice());
    assert_eq!(via_thunk.as_slice(), &[Value::Int(-7)]);
}

#[test]
fn thunk_binds_interpreted_function_argument() {
    let add = lambda(vec![Instruction::VarPush(0), Instruction::VarPush(1), Instruction::IPlus], 2, 2, 2);
    let bound = Callable::thunk(Callable::function(add, None), Value::Int(5));
    let mut vm = Vm::new();
    assert_eq!(vm.call(&bound, &[Value::Int(1)]).unwrap(), vec![Value::Int(6)]);
}

#[test]
fn function_identity_needs_same_lambda_and_closure() {
    let body = lambda(vec![Instruction::Ret], 0, 0, 1);
    let frame_a = Frame::from_values(vec![Value::Int(1)]);
    let frame_b = Frame::from_values(vec![Value::Int(1)]);

    let f1 = Callable::function(body.clone(), Some(frame_a.clone()));
    let f2 = Callable::function(body.clone(), Some(frame_a));
    let g = Callable::function(body.clone(), Some(frame_b));
    let open1 = Callable::function(body.clone(), None);
    let open2 = Callable::function(body, None);
    let other = Callable::function(lambda(vec![Instruction::Ret], 0, 0, 1), None);

    assert!(f1.identity_equals(&f1));
    assert!(f1.identity_equals(&f2) && f2.identity_equals(&f1));
    assert!(!f1.identity_equals(&g) && !g.identity_equals(&f1));
    assert!(open1.identity_equals(&open2));
    assert!(!open1.identity_equals(&f1) && !f1.identity_equals(&open1));
    assert!(!open1.identity_equals(&other));
}

#[test]
fn native_identity_is_function_address() {
    let a = Callable::native("sub", subtract);
    let b = Callable::native("minus", subtract);
    let c = Callable::native("neg", negate);
    assert!(a.identity_equals(&a));
    assert!(a.identity_equals(&b) && b.identity_equals(&a));
    assert!(!a.identity_equals(&c));
}

#[test]
fn thunks_and_undefined_are_never_identical() {
    let thunk = Callable::thunk(Callable::native("sub", subtract), Value::Int(1));
    let undefined = Callable::undefined();
    assert!(!thunk.identity_equals(&thunk));
    assert!(!undefined.identity_equals(&undefined));
    assert!(!undefined.identity_equals(&thunk));
    assert!(!Callable::native("sub", subtract).identity_equals(&undefined));
}

#[test]
fn func_eq_opcode_uses_identity() {
    let f = Callable::native("sub", subtract);
    let run = |a: Rc<Callable>, b: Rc<Callable>, op: Instruction| {
        exec_with_new_vm(
            &lambda(
                vec![Instruction::ConstPush(Value::Callable(a)), Instruction::ConstPush(Value::Callable(b)), op],
                2,
                0,
                0,
            ),
            &[],
        )
        .unwrap()
    };
    assert_eq!(run(f.clone(), f.clone(), Instruction::FuncEq), vec![Value::Bool(true)]);
    assert_eq!(run(f.clone(), Callable::undefined(), Instruction::FuncNeq), vec![Value::Bool(true)]);
    assert_eq!(run(Callable::undefined(), Callable::undefined(), Instruction::FuncEq), vec![Value::Bool(false)]);
}

#[test]
fn distinct_closures_from_one_lambda_differ() {
    // Each run of `outer` builds a function over a fresh frame.
    let inner = lambda(vec![Instruction::Ret], 0, 0, 0);
    let outer = lambda(vec![Instruction::PushClosure, Instruction::MakeFunc(inner)], 1, 0, 0);
    let mut vm = Vm::new();
    let a = vm.exec(&outer).unwrap().remove(0).as_callable().unwrap();
    let b = vm.exec(&outer).unwrap().remove(0).as_callable().unwrap();
    assert!(!a.identity_equals(&b));
    assert!(a.identity_equals(&a));
}

#[test]
fn builtin_opcode_calls_native_directly() {
    let body = lambda(
        vec![
            Instruction::IntPush(9),
            Instruction::IntPush(4),
            Instruction::Builtin(Native::new("sub", subtract)),
            Instruction::Ret,
        ],
        2,
        0,
        0,
    );
    assert_eq!(exec_with_new_vm(&body, &[]).unwrap(), vec![Value::Int(5)]);
}

#[test]
fn native_errors_are_located() {
    fn fail(_stack: &mut Stack) -> VmResult<()> {
        Err(anyhow::anyhow!("backend refused path").into())
    }
    let body = Rc::new(
        Lambda::new(program(vec![Instruction::Builtin(Native::new("draw.fail", fail))]), 0, 0, 0)
            .with_positions(line_per_inst(1)),
    );
    let err = exec_with_new_vm(&body, &[]).unwrap_err();
    assert!(matches!(err.kind(), VmError::Native(_)));
    assert_eq!(err.to_string(), "1:1: backend refused path");
}

#[test]
fn oversized_closure_is_malformed() {
    let body = lambda(vec![Instruction::Ret], 0, 1, 1);
    let func = Callable::function(body, Some(Frame::from_values(vec![Value::Nil])));
    let mut vm = Vm::new();
    let err = vm.call(&func, &[Value::Int(1)]).unwrap_err();
    assert!(matches!(err.kind(), VmError::MalformedLambda(_)));
    assert!(err.is_fatal());
    assert!(vm.stack().is_empty());
}

#[test]
fn captured_slots_are_copied_but_frames_are_shared() {
    // Slot 1 of the enclosing frame refers to the frame itself, so the callee
    // can write through it with fieldsave.
    let enclosing = Frame::from_values(vec![Value::Int(1), Value::Nil]);
    enclosing.set(1, Value::Frame(enclosing.clone())).unwrap();
    let body = lambda(
        vec![
            Instruction::IntPush(2),
            Instruction::VarSave(0),
            Instruction::Pop,
            Instruction::IntPush(7),
            Instruction::VarPush(1),
            Instruction::FieldSave(0),
            Instruction::Ret,
        ],
        2,
        0,
        2,
    );
    let func = Callable::function(body, Some(enclosing.clone()));
    let mut vm = Vm::new();
    assert_eq!(vm.call(&func, &[]).unwrap(), vec![Value::Int(7)]);
    assert_eq!(enclosing.get(0).unwrap(), Value::Int(7));
    enclosing.clear();
}

#[test]
fn teardown_breaks_closure_cycles() {
    // The function is stored into the frame it closes over.
    let inner = lambda(vec![Instruction::IntPush(1)], 1, 0, 1);
    let outer = lambda(
        vec![
            Instruction::PushClosure,
            Instruction::MakeFunc(inner),
            Instruction::VarSave(0),
            Instruction::Ret,
        ],
        1,
        0,
        1,
    );
    let mut vm = Vm::new();
    let func = vm.exec(&outer).unwrap().remove(0).as_callable().unwrap();
    let frame = match &*func {
        Callable::Function { closure: Some(frame), .. } => Rc::downgrade(frame),
        other => panic!("unexpected {:?}", other),
    };
    drop(func);
    assert!(frame.upgrade().is_some(), "frame keeps itself alive through its closure");
    assert!(vm.stack().live_frames() >= 1);

    vm.reset();
    assert!(frame.upgrade().is_none());
}

#[test]
fn call_depth_is_bounded() {
    let mut vm = Vm::with_config(VmConfig {
        max_call_depth: 16,
        ..VmConfig::default()
    });
    let globals = vm.init_globals(1);
    let forever = lambda(vec![Instruction::GlobalPush(0), Instruction::PopCall, Instruction::Ret], 1, 0, 0);
    globals.set(0, Value::Callable(Callable::function(forever.clone(), None))).unwrap();

    let err = vm.exec(&forever).unwrap_err();
    assert!(matches!(err.kind(), VmError::CallDepthExceeded { limit: 16 }));
    assert!(err.is_fatal());
    assert_eq!(vm.stack().depth(), 0);
    assert!(vm.stack().is_empty());
}
