use std::rc::Rc;

use tracing::trace;

use crate::val::{Instance, Value};
use crate::vm::alloc::FrameRef;
use crate::vm::bytecode::Instruction;
use crate::vm::callable::Callable;
use crate::vm::error::{VmError, VmResult};
use crate::vm::lambda::{Lambda, Record};
use crate::vm::program::Label;
use crate::vm::stack::Stack;

use super::math::{
    bool_compare, int_binop, int_compare, int_divide, int_negate, int_step, real_binop, real_compare, real_negate,
};

enum Flow {
    Next,
    Jump(usize),
    Return,
}

/// Run `body` as one call: pop its arguments, execute until `ret` (or the end
/// of its program), and leave its results on the stack.
pub(crate) fn run_lambda(stack: &mut Stack, body: &Rc<Lambda>, closure: Option<&FrameRef>) -> VmResult<()> {
    let captured = closure.map_or(0, |frame| frame.len());
    if captured + body.params > body.vars {
        return Err(VmError::malformed(format!(
            "{}: closure ({}) + params ({}) exceeds vars ({})",
            body.display_name(),
            captured,
            body.params,
            body.vars
        )));
    }
    if stack.available() < body.params {
        return Err(VmError::StackUnderflow);
    }

    stack.enter_call()?;
    trace!(
        target: "pathvm::vm::call",
        lambda = body.display_name(),
        depth = stack.depth(),
        params = body.params,
        "enter"
    );

    let frame = stack.new_frame(body.vars);
    let mut seeded = Ok(());
    frame.fill(|slots| {
        if let Some(closure) = closure {
            closure.copy_prefix_into(&mut slots[..captured]);
        }
        seeded = stack.move_args_into(&mut slots[captured..captured + body.params]);
    });
    if let Err(err) = seeded {
        stack.leave_call();
        return Err(err);
    }

    let saved_floor = stack.raise_floor();
    let saved_ceiling = stack.raise_ceiling(body.max_stack_size);
    let result = execute(stack, body, &frame);
    stack.restore_ceiling(saved_ceiling);
    stack.restore_floor(saved_floor);
    stack.leave_call();

    trace!(target: "pathvm::vm::call", lambda = body.display_name(), ok = result.is_ok(), "leave");
    result
}

fn execute(stack: &mut Stack, body: &Lambda, frame: &FrameRef) -> VmResult<()> {
    let code = body.code.instructions();
    let len = code.len();
    let mut pc = 0usize;
    while let Some(inst) = code.get(pc) {
        let flow = step(stack, body, frame, inst).map_err(|err| err.located(body.pl.get_pos_at(pc)))?;
        match flow {
            Flow::Next => pc += 1,
            Flow::Jump(target) if target <= len => pc = target,
            Flow::Jump(target) => {
                return Err(VmError::LabelOutOfBounds {
                    offset: target as isize,
                    len,
                }
                .located(body.pl.get_pos_at(pc)));
            }
            Flow::Return => break,
        }
    }
    Ok(())
}

#[inline]
fn jump_target(stack: &Stack, body: &Lambda, label: &Label) -> VmResult<usize> {
    stack.poll_interrupt()?;
    body.code.offset_of(label)
}

fn step(stack: &mut Stack, body: &Lambda, frame: &FrameRef, inst: &Instruction) -> VmResult<Flow> {
    match inst {
        Instruction::Pop => {
            stack.pop()?;
        }
        Instruction::IntPush(i) => stack.push(*i)?,
        Instruction::ConstPush(value) => stack.push(value.clone())?,

        Instruction::VarPush(slot) => {
            let value = frame.get(*slot)?;
            stack.push(value)?;
        }
        Instruction::VarSave(slot) => frame.set(*slot, stack.top()?.clone())?,
        Instruction::GlobalPush(slot) => {
            let value = stack.globals().get(*slot)?;
            stack.push(value)?;
        }
        Instruction::GlobalSave(slot) => {
            let value = stack.top()?.clone();
            stack.globals().set(*slot, value)?;
        }
        Instruction::FieldPush(index) => {
            let target = stack.pop()?;
            stack.push(field_get(&target, *index)?)?;
        }
        Instruction::FieldSave(index) => {
            let target = stack.pop()?;
            field_set(&target, *index, stack.top()?.clone())?;
        }

        Instruction::MemEq | Instruction::MemNeq => {
            let b = stack.pop()?;
            let a = stack.pop()?;
            let same = a.same_ref(&b);
            stack.push(if matches!(inst, Instruction::MemEq) { same } else { !same })?;
        }
        Instruction::FuncEq | Instruction::FuncNeq => {
            let b = stack.pop_as::<Rc<Callable>>()?;
            let a = stack.pop_as::<Rc<Callable>>()?;
            let same = a.identity_equals(&b);
            stack.push(if matches!(inst, Instruction::FuncEq) { same } else { !same })?;
        }

        Instruction::IPlus => int_binop(stack, "i_plus", i64::checked_add)?,
        Instruction::IMinus => int_binop(stack, "i_minus", i64::checked_sub)?,
        Instruction::ITimes => int_binop(stack, "i_times", i64::checked_mul)?,
        Instruction::IDivide => int_divide(stack)?,
        Instruction::INegate => int_negate(stack)?,

        Instruction::LogNot => {
            let b = stack.pop_as::<bool>()?;
            stack.push(!b)?;
        }
        Instruction::LogEq => bool_compare(stack, PartialEq::eq)?,
        Instruction::LogNeq => bool_compare(stack, PartialEq::ne)?,

        Instruction::IIncr => int_step(stack, 1, "i_incr")?,
        Instruction::IDecr => int_step(stack, -1, "i_decr")?,
        Instruction::IEq => int_compare(stack, PartialEq::eq)?,
        Instruction::INeq => int_compare(stack, PartialEq::ne)?,
        Instruction::IGt => int_compare(stack, PartialOrd::gt)?,
        Instruction::IGe => int_compare(stack, PartialOrd::ge)?,
        Instruction::ILt => int_compare(stack, PartialOrd::lt)?,
        Instruction::ILe => int_compare(stack, PartialOrd::le)?,

        Instruction::FPlus => real_binop(stack, |a, b| a + b)?,
        Instruction::FMinus => real_binop(stack, |a, b| a - b)?,
        Instruction::FTimes => real_binop(stack, |a, b| a * b)?,
        Instruction::FDivide => real_binop(stack, |a, b| a / b)?,
        Instruction::FNegate => real_negate(stack)?,
        Instruction::FEq => real_compare(stack, PartialEq::eq)?,
        Instruction::FNeq => real_compare(stack, PartialEq::ne)?,
        Instruction::FGt => real_compare(stack, PartialOrd::gt)?,
        Instruction::FGe => real_compare(stack, PartialOrd::ge)?,
        Instruction::FLt => real_compare(stack, PartialOrd::lt)?,
        Instruction::FLe => real_compare(stack, PartialOrd::le)?,

        Instruction::Builtin(native) => native.call(stack)?,
        Instruction::Jmp(label) => return Ok(Flow::Jump(jump_target(stack, body, label)?)),
        Instruction::CJmp(label) | Instruction::NJmp(label) => {
            let target = jump_target(stack, body, label)?;
            let cond = stack.pop_as::<bool>()?;
            if cond == matches!(inst, Instruction::CJmp(_)) {
                return Ok(Flow::Jump(target));
            }
        }
        Instruction::PopCall => {
            stack.poll_interrupt()?;
            let callee = stack.pop_as::<Rc<Callable>>()?;
            callee.invoke(stack)?;
        }

        Instruction::PushClosure => stack.push(Value::Frame(frame.clone()))?,
        Instruction::MakeFunc(lambda) => {
            let closure = stack.pop_as::<FrameRef>()?;
            stack.push(Callable::function(lambda.clone(), Some(closure)))?;
        }
        Instruction::Ret => return Ok(Flow::Return),

        Instruction::Alloc(record) => alloc_instance(stack, record)?,
    }
    Ok(Flow::Next)
}

/// Build an instance of `record`, run its initializer on it and push it.
pub(crate) fn alloc_instance(stack: &mut Stack, record: &Rc<Record>) -> VmResult<()> {
    if record.init.params != 1 {
        return Err(VmError::malformed(format!(
            "initializer of {} must take exactly one parameter",
            record.display_name()
        )));
    }
    let instance = Rc::new(Instance::new(record.clone()));
    let base = stack.len();
    stack.push(Value::Instance(instance.clone()))?;
    run_lambda(stack, &record.init, None)?;
    stack.truncate(base);
    stack.push(Value::Instance(instance))
}

fn field_get(target: &Value, index: usize) -> VmResult<Value> {
    match target {
        Value::Instance(instance) => instance.field(index),
        Value::Array(array) => array.borrow().get(index),
        Value::Frame(frame) => frame.get(index),
        other => Err(VmError::type_mismatch("Record", other.type_name())),
    }
}

fn field_set(target: &Value, index: usize, value: Value) -> VmResult<()> {
    match target {
        Value::Instance(instance) => instance.set_field(index, value),
        Value::Array(array) => array.borrow_mut().set(index, value),
        Value::Frame(frame) => frame.set(index, value),
        other => Err(VmError::type_mismatch("Record", other.type_name())),
    }
}
