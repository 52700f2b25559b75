use std::io::Write;

use anyhow::Context;
use pathvm_core::module::Module;
use pathvm_core::val::Value;
use pathvm_core::vm::{Native, Stack, VmResult};

#[derive(Debug, Default)]
pub struct IoModule;

impl IoModule {
    pub fn new() -> Self {
        Self
    }

    /// Print one value followed by a newline. Pushes nothing.
    fn write(stack: &mut Stack) -> VmResult<()> {
        let value = stack.pop()?;
        let mut out = std::io::stdout().lock();
        write_value(&mut out, &value).context("io.write")?;
        Ok(())
    }
}

pub(crate) fn write_value(out: &mut impl Write, value: &Value) -> std::io::Result<()> {
    writeln!(out, "{}", value)
}

impl Module for IoModule {
    fn name(&self) -> &str {
        "io"
    }

    fn description(&self) -> &str {
        "Standard output"
    }

    fn natives(&self) -> Vec<Native> {
        vec![Native::new("io.write", Self::write)]
    }
}
