use std::rc::Rc;

use pathvm_core::module::Module;
use pathvm_core::vm::{Native, Stack, VmResult};

#[derive(Debug, Default)]
pub struct StringModule;

impl StringModule {
    pub fn new() -> Self {
        Self
    }

    fn concat(stack: &mut Stack) -> VmResult<()> {
        let b = stack.pop_as::<Rc<str>>()?;
        let a = stack.pop_as::<Rc<str>>()?;
        let mut out = String::with_capacity(a.len() + b.len());
        out.push_str(&a);
        out.push_str(&b);
        stack.push(out)
    }

    /// Length in characters, not bytes.
    fn length(stack: &mut Stack) -> VmResult<()> {
        let s = stack.pop_as::<Rc<str>>()?;
        stack.push(s.chars().count() as i64)
    }
}

impl Module for StringModule {
    fn name(&self) -> &str {
        "string"
    }

    fn natives(&self) -> Vec<Native> {
        vec![
            Native::new("string.concat", Self::concat),
            Native::new("string.length", Self::length),
        ]
    }
}
