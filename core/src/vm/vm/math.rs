use crate::val::Value;
use crate::vm::error::{VmError, VmResult};
use crate::vm::stack::Stack;

// Binary operators pop the right operand first.

#[inline]
pub(super) fn int_binop(stack: &mut Stack, op: &'static str, f: fn(i64, i64) -> Option<i64>) -> VmResult<()> {
    let b = stack.pop_as::<i64>()?;
    let a = stack.pop_as::<i64>()?;
    let result = f(a, b).ok_or(VmError::IntegerOverflow { op })?;
    stack.push(result)
}

/// Truncating division. `i64::MIN / -1` overflows.
#[inline]
pub(super) fn int_divide(stack: &mut Stack) -> VmResult<()> {
    let b = stack.pop_as::<i64>()?;
    let a = stack.pop_as::<i64>()?;
    if b == 0 {
        return Err(VmError::DivisionByZero);
    }
    let result = a.checked_div(b).ok_or(VmError::IntegerOverflow { op: "i_divide" })?;
    stack.push(result)
}

#[inline]
pub(super) fn int_negate(stack: &mut Stack) -> VmResult<()> {
    let a = stack.pop_as::<i64>()?;
    let result = a.checked_neg().ok_or(VmError::IntegerOverflow { op: "i_negate" })?;
    stack.push(result)
}

#[inline]
pub(super) fn int_compare(stack: &mut Stack, f: fn(&i64, &i64) -> bool) -> VmResult<()> {
    let b = stack.pop_as::<i64>()?;
    let a = stack.pop_as::<i64>()?;
    stack.push(f(&a, &b))
}

/// Adjust the integer on top of the stack without popping it.
#[inline]
pub(super) fn int_step(stack: &mut Stack, delta: i64, op: &'static str) -> VmResult<()> {
    match stack.top_mut()? {
        Value::Int(i) => {
            *i = i.checked_add(delta).ok_or(VmError::IntegerOverflow { op })?;
            Ok(())
        }
        other => Err(VmError::type_mismatch("Int", other.type_name())),
    }
}

#[inline]
pub(super) fn real_binop(stack: &mut Stack, f: fn(f64, f64) -> f64) -> VmResult<()> {
    let b = stack.pop_as::<f64>()?;
    let a = stack.pop_as::<f64>()?;
    stack.push(f(a, b))
}

#[inline]
pub(super) fn real_negate(stack: &mut Stack) -> VmResult<()> {
    let a = stack.pop_as::<f64>()?;
    stack.push(-a)
}

#[inline]
pub(super) fn real_compare(stack: &mut Stack, f: fn(&f64, &f64) -> bool) -> VmResult<()> {
    let b = stack.pop_as::<f64>()?;
    let a = stack.pop_as::<f64>()?;
    stack.push(f(&a, &b))
}

#[inline]
pub(super) fn bool_compare(stack: &mut Stack, f: fn(&bool, &bool) -> bool) -> VmResult<()> {
    let b = stack.pop_as::<bool>()?;
    let a = stack.pop_as::<bool>()?;
    stack.push(f(&a, &b))
}
