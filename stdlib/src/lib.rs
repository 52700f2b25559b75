//! Native builtins for pathvm.
//!
//! Every native follows the stack contract: it pops its arguments (last
//! argument on top) and pushes its result. Natives are registered under
//! qualified names such as `math.sqrt`, which is how bytecode images refer
//! to them.

pub mod array;
pub mod draw;
pub mod func;
pub mod io;
pub mod math;
pub mod string;


use anyhow::Result;
use pathvm_core::module::ModuleRegistry;
#[cfg(test)]
use pathvm_core::{
    val::Value,
    vm::{Callable, Vm, VmResult},
};

/// Register all stdlib modules with the given registry
pub fn register_stdlib_modules(registry: &mut ModuleRegistry) -> Result<()> {
    registry.register_module("math", Box::new(math::MathModule::new()))?;
    registry.register_module("io", Box::new(io::IoModule::new()))?;
    registry.register_module("array", Box::new(array::ArrayModule::new()))?;
    registry.register_module("string", Box::new(string::StringModule::new()))?;
    registry.register_module("func", Box::new(func::FuncModule::new()))?;
    registry.register_module("draw", Box::new(draw::DrawModule::new()))?;
    Ok(())
}

/// Registry with every stdlib module loaded.
pub fn stdlib_registry() -> Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    register_stdlib_modules(&mut registry)?;
    Ok(registry)
}

#[cfg(test)]
pub(crate) fn call_native(name: &str, args: &[Value]) -> VmResult<Vec<Value>> {
    let registry = stdlib_registry().expect("stdlib registers");
    let native = registry
        .get_native(name)
        .unwrap_or_else(|| panic!("native {} is not registered", name));
    Vm::new().call(&Callable::Native(native), args)
}
