mod math;
mod run;

use std::{
    rc::Rc,
    sync::{Arc, atomic::AtomicBool},
};

use tracing::{debug, error, warn};

use crate::val::{Instance, Value};
use crate::vm::alloc::{self, Frame, FrameRef};
use crate::vm::callable::Callable;
use crate::vm::config::VmConfig;
use crate::vm::error::{VmError, VmResult};
use crate::vm::lambda::{Lambda, Record};
use crate::vm::stack::Stack;

pub(crate) use run::run_lambda;

/// Host-facing interpreter.
///
/// Owns the execution stack and the global frame. A failed run leaves the
/// stack exactly as it was before the run started.
pub struct Vm {
    stack: Stack,
    config: VmConfig,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        alloc::set_pool_limit(config.frame_pool_limit);
        Self {
            stack: Stack::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut Stack {
        &mut self.stack
    }

    /// Replace the global frame read by `globalpush`/`globalsave`.
    pub fn set_globals(&mut self, globals: FrameRef) {
        self.stack.set_globals(globals);
    }

    /// Install a fresh global frame of `len` Nil slots.
    pub fn init_globals(&mut self, len: usize) -> FrameRef {
        let globals = Frame::new(len);
        self.stack.set_globals(globals.clone());
        globals
    }

    pub fn globals(&self) -> FrameRef {
        self.stack.globals().clone()
    }

    /// Poll `flag` at every call and jump; a raised flag aborts the run with
    /// [`VmError::Interrupted`]. Clearing the flag is up to the host.
    pub fn set_interrupt(&mut self, flag: Arc<AtomicBool>) {
        self.stack.set_interrupt(Some(flag));
    }

    pub fn set_max_call_depth(&mut self, limit: usize) {
        self.config.max_call_depth = limit;
        self.stack.set_max_call_depth(limit);
    }

    /// Run a zero-parameter lambda and return what it left on the stack.
    pub fn exec(&mut self, lambda: &Rc<Lambda>) -> VmResult<Vec<Value>> {
        self.exec_with(lambda, &[])
    }

    /// Run `lambda` with `args` as its parameters. Too few arguments is a
    /// stack underflow; too many is rejected before anything runs.
    pub fn exec_with(&mut self, lambda: &Rc<Lambda>, args: &[Value]) -> VmResult<Vec<Value>> {
        if args.len() != lambda.params {
            let err = if args.len() < lambda.params {
                VmError::StackUnderflow
            } else {
                VmError::malformed(format!(
                    "{} takes {} arguments, got {}",
                    lambda.display_name(),
                    lambda.params,
                    args.len()
                ))
            };
            return Err(self.report(lambda.display_name().to_string(), err));
        }
        let callable = Callable::function(lambda.clone(), None);
        self.call(&callable, args)
    }

    /// Invoke any callable with `args` pushed in order; returns its results.
    pub fn call(&mut self, callable: &Callable, args: &[Value]) -> VmResult<Vec<Value>> {
        let base = self.stack.len();
        let result = self.guarded(base, |stack| {
            for arg in args {
                stack.push(arg.clone())?;
            }
            callable.invoke(stack)
        });
        match result {
            Ok(()) => Ok(self.stack.split_off(base)),
            Err(err) => Err(self.report(callable.describe(), err)),
        }
    }

    /// Allocate and initialize an instance of `record`.
    pub fn alloc(&mut self, record: &Rc<Record>) -> VmResult<Rc<Instance>> {
        let base = self.stack.len();
        let result = self.guarded(base, |stack| run::alloc_instance(stack, record));
        if let Err(err) = result {
            return Err(self.report(format!("init of {}", record.display_name()), err));
        }
        let value = self.stack.pop()?;
        self.stack.truncate(base);
        value.get()
    }

    /// Clear every frame this VM created that is still referenced. Values
    /// captured by surviving closures become Nil.
    pub fn reset(&mut self) -> usize {
        self.stack.truncate(0);
        self.stack.set_depth(0);
        self.stack.sweep_frames()
    }

    fn guarded(&mut self, base: usize, f: impl FnOnce(&mut Stack) -> VmResult<()>) -> VmResult<()> {
        let depth = self.stack.depth();
        let ceiling = self.stack.ceiling();
        let floor = self.stack.raise_floor();
        let result = f(&mut self.stack);
        self.stack.restore_floor(floor);
        if result.is_err() {
            self.stack.truncate(base);
            self.stack.set_depth(depth);
            self.stack.restore_ceiling(ceiling);
        }
        result
    }

    fn report(&self, what: String, err: VmError) -> VmError {
        if err.is_fatal() {
            error!(target: "pathvm::vm", call = %what, error = %err, "run aborted");
        } else if matches!(err.kind(), VmError::Interrupted) {
            debug!(target: "pathvm::vm", call = %what, "run interrupted");
        } else {
            warn!(target: "pathvm::vm", call = %what, error = %err, "runtime error");
        }
        err
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Vm {
    fn drop(&mut self) {
        let swept = self.reset();
        if swept > 0 {
            debug!(target: "pathvm::vm::alloc", frames = swept, "cleared surviving frames");
        }
    }
}
