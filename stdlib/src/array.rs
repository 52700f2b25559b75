use std::{cell::RefCell, rc::Rc};

use anyhow::anyhow;
use pathvm_core::module::Module;
use pathvm_core::val::{Array, ArrayRef, Value};
use pathvm_core::vm::{Native, Stack, VmResult};

#[derive(Debug, Default)]
pub struct ArrayModule;

impl ArrayModule {
    pub fn new() -> Self {
        Self
    }

    /// `n` Nil elements.
    fn new_array(stack: &mut Stack) -> VmResult<()> {
        let n = stack.pop_as::<i64>()?;
        let n = usize::try_from(n).map_err(|_| anyhow!("array.new: negative length {}", n))?;
        stack.push(Value::Array(Rc::new(RefCell::new(Array::new(n)))))
    }

    /// Append in place and push the same array back.
    fn push(stack: &mut Stack) -> VmResult<()> {
        let value = stack.pop()?;
        let array = stack.pop_as::<ArrayRef>()?;
        array.borrow_mut().push(value);
        stack.push(Value::Array(array))
    }

    fn length(stack: &mut Stack) -> VmResult<()> {
        let array = stack.pop_as::<ArrayRef>()?;
        let len = array.borrow().len();
        stack.push(len as i64)
    }

    fn get(stack: &mut Stack) -> VmResult<()> {
        let index = index(stack.pop_as::<i64>()?)?;
        let array = stack.pop_as::<ArrayRef>()?;
        let value = array.borrow().get(index)?;
        stack.push(value)
    }

    fn set(stack: &mut Stack) -> VmResult<()> {
        let value = stack.pop()?;
        let index = index(stack.pop_as::<i64>()?)?;
        let array = stack.pop_as::<ArrayRef>()?;
        array.borrow_mut().set(index, value.clone())?;
        stack.push(value)
    }
}

fn index(i: i64) -> VmResult<usize> {
    usize::try_from(i).map_err(|_| anyhow!("negative array index {}", i).into())
}

impl Module for ArrayModule {
    fn name(&self) -> &str {
        "array"
    }

    fn description(&self) -> &str {
        "Growable arrays"
    }

    fn natives(&self) -> Vec<Native> {
        vec![
            Native::new("array.new", Self::new_array),
            Native::new("array.push", Self::push),
            Native::new("array.length", Self::length),
            Native::new("array.get", Self::get),
            Native::new("array.set", Self::set),
        ]
    }
}
