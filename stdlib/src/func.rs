use std::rc::Rc;

use pathvm_core::module::Module;
use pathvm_core::val::Value;
use pathvm_core::vm::{Callable, Native, Stack, VmResult};

#[derive(Debug, Default)]
pub struct FuncModule;

impl FuncModule {
    pub fn new() -> Self {
        Self
    }

    /// `bind(f, x)`: a callable that pushes `x` and then calls `f`.
    fn bind(stack: &mut Stack) -> VmResult<()> {
        let arg = stack.pop()?;
        let func = stack.pop_as::<Rc<Callable>>()?;
        stack.push(Value::Callable(Callable::thunk(func, arg)))
    }
}

impl Module for FuncModule {
    fn name(&self) -> &str {
        "func"
    }

    fn description(&self) -> &str {
        "Partial application"
    }

    fn natives(&self) -> Vec<Native> {
        vec![Native::new("func.bind", Self::bind)]
    }
}
