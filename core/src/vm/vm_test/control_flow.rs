use std::sync::{Arc, atomic::AtomicBool};

use super::*;

/// Encode `insts`, letting each one refer to labels of the program being built.
fn build(insts: impl FnOnce(&Program) -> Vec<Instruction>) -> Program {
    let mut program = Program::new();
    for inst in insts(&program) {
        program.encode(inst);
    }
    program
}

fn sum_to_ten() -> Rc<Lambda> {
    // vars = [i, sum]
    let code = build(|p| {
        vec![
            Instruction::IntPush(1),
            Instruction::VarSave(0),
            Instruction::Pop,
            Instruction::IntPush(0),
            Instruction::VarSave(1),
            Instruction::Pop,
            // loop head
            Instruction::VarPush(0),
            Instruction::IntPush(10),
            Instruction::IGt,
            Instruction::CJmp(p.label(20)),
            Instruction::VarPush(1),
            Instruction::VarPush(0),
            Instruction::IPlus,
            Instruction::VarSave(1),
            Instruction::Pop,
            Instruction::VarPush(0),
            Instruction::IIncr,
            Instruction::VarSave(0),
            Instruction::Pop,
            Instruction::Jmp(p.label(6)),
            // exit
            Instruction::VarPush(1),
            Instruction::Ret,
        ]
    });
    Rc::new(Lambda::new(code, 2, 0, 2))
}

#[test]
fn loop_sums_one_to_ten() {
    assert_eq!(exec_with_new_vm(&sum_to_ten(), &[]).unwrap(), vec![Value::Int(55)]);
}

#[test]
fn njmp_branches_on_false() {
    let code = build(|p| {
        vec![
            Instruction::VarPush(0),
            Instruction::NJmp(p.label(4)),
            Instruction::IntPush(1),
            Instruction::Ret,
            Instruction::IntPush(2),
            Instruction::Ret,
        ]
    });
    let body = Rc::new(Lambda::new(code, 1, 1, 1));
    assert_eq!(exec_with_new_vm(&body, &[Value::Bool(true)]).unwrap(), vec![Value::Int(1)]);
    assert_eq!(exec_with_new_vm(&body, &[Value::Bool(false)]).unwrap(), vec![Value::Int(2)]);
}

#[test]
fn jump_to_end_finishes_the_call() {
    let code = build(|p| vec![Instruction::IntPush(5), Instruction::Jmp(p.label(3)), Instruction::IntPush(6)]);
    let body = Rc::new(Lambda::new(code, 2, 0, 0));
    assert_eq!(exec_with_new_vm(&body, &[]).unwrap(), vec![Value::Int(5)]);
}

#[test]
fn jump_past_end_is_fatal() {
    let code = build(|p| vec![Instruction::Jmp(p.label(7)), Instruction::Ret]);
    let body = Rc::new(Lambda::new(code, 0, 0, 0));
    let err = exec_with_new_vm(&body, &[]).unwrap_err();
    assert!(matches!(err.kind(), VmError::LabelOutOfBounds { offset: 7, len: 2 }));
    assert!(err.is_fatal());
}

#[test]
fn jump_into_another_program_is_fatal() {
    let other = program(vec![Instruction::Ret]);
    let body = lambda(vec![Instruction::Jmp(other.begin())], 0, 0, 0);
    let err = exec_with_new_vm(&body, &[]).unwrap_err();
    assert!(matches!(err.kind(), VmError::LabelMismatch));
    assert!(err.is_fatal());
}

#[test]
fn conditional_jump_needs_bool() {
    let code = build(|p| vec![Instruction::IntPush(1), Instruction::CJmp(p.end())]);
    let body = Rc::new(Lambda::new(code, 1, 0, 0));
    let err = exec_with_new_vm(&body, &[]).unwrap_err();
    assert!(matches!(err.kind(), VmError::TypeMismatch { expected: "Bool", found: "Int" }));
    assert!(!err.is_fatal());
}

#[test]
fn raised_interrupt_stops_a_loop() {
    let code = build(|p| vec![Instruction::Jmp(p.begin())]);
    let body = Rc::new(Lambda::new(code, 0, 0, 0));
    let flag = Arc::new(AtomicBool::new(true));
    let mut vm = Vm::new();
    vm.set_interrupt(flag.clone());

    let err = vm.exec(&body).unwrap_err();
    assert!(matches!(err.kind(), VmError::Interrupted));
    assert!(!err.is_fatal());
    assert!(vm.stack().is_empty());
    assert_eq!(vm.stack().depth(), 0);

    // The flag stays raised until the host lowers it.
    assert!(matches!(vm.exec(&sum_to_ten()).unwrap_err().kind(), VmError::Interrupted));
    flag.store(false, std::sync::atomic::Ordering::Relaxed);
    assert_eq!(vm.exec(&sum_to_ten()).unwrap(), vec![Value::Int(55)]);
}

#[test]
fn recursive_factorial_through_globals() {
    // fact(n) = n <= 1 ? 1 : n * fact(n - 1), stored in global slot 0
    let code = build(|p| {
        vec![
            Instruction::VarPush(0),
            Instruction::IntPush(1),
            Instruction::ILe,
            Instruction::NJmp(p.label(6)),
            Instruction::IntPush(1),
            Instruction::Ret,
            Instruction::VarPush(0),
            Instruction::VarPush(0),
            Instruction::IDecr,
            Instruction::GlobalPush(0),
            Instruction::PopCall,
            Instruction::ITimes,
            Instruction::Ret,
        ]
    });
    let fact = Rc::new(Lambda::new(code, 3, 1, 1).with_name("fact"));

    let mut vm = Vm::new();
    let globals = vm.init_globals(1);
    globals.set(0, Value::Callable(Callable::function(fact.clone(), None))).unwrap();
    assert_eq!(vm.exec_with(&fact, &[Value::Int(10)]).unwrap(), vec![Value::Int(3628800)]);
    assert_eq!(vm.exec_with(&fact, &[Value::Int(0)]).unwrap(), vec![Value::Int(1)]);
}

#[test]
fn runaway_recursion_restores_the_vm() {
    let mut vm = Vm::with_config(VmConfig {
        max_call_depth: 50,
        ..VmConfig::default()
    });
    let globals = vm.init_globals(1);
    let body = lambda(vec![Instruction::IntPush(0), Instruction::GlobalPush(0), Instruction::PopCall], 2, 0, 0);
    globals.set(0, Value::Callable(Callable::function(body.clone(), None))).unwrap();

    vm.stack_mut().push(99i64).unwrap();
    let err = vm.exec(&body).unwrap_err();
    assert!(matches!(err.kind(), VmError::CallDepthExceeded { limit: 50 }));
    assert_eq!(vm.stack().as_slice(), &[Value::Int(99)]);
    assert_eq!(vm.stack().depth(), 0);

    // Still usable afterwards.
    vm.set_max_call_depth(8);
    assert!(matches!(
        vm.exec(&body).unwrap_err().kind(),
        VmError::CallDepthExceeded { limit: 8 }
    ));
}

#[test]
fn popcall_requires_a_function() {
    let body = Rc::new(
        Lambda::new(program(vec![Instruction::IntPush(3), Instruction::PopCall]), 1, 0, 0)
            .with_positions(line_per_inst(2)),
    );
    let err = exec_with_new_vm(&body, &[]).unwrap_err();
    assert_eq!(err.to_string(), "2:1: type mismatch: expected Function, found Int");
}
