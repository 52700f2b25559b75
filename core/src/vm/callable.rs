use std::{fmt, rc::Rc};

use tracing::trace;

use crate::val::Value;

use super::alloc::FrameRef;
use super::error::{VmError, VmResult};
use super::lambda::Lambda;
use super::stack::Stack;
use super::vm::run_lambda;

/// Native entry point. Natives pop their own arguments and push their result.
pub type Bltin = fn(&mut Stack) -> VmResult<()>;

/// Host function reference with the name it is registered under.
#[derive(Clone, Copy)]
pub struct Native {
    name: &'static str,
    func: Bltin,
}

impl Native {
    pub const fn new(name: &'static str, func: Bltin) -> Self {
        Self { name, func }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn call(&self, stack: &mut Stack) -> VmResult<()> {
        (self.func)(stack)
    }

    /// Same host function, regardless of the registered name.
    pub fn same(&self, other: &Native) -> bool {
        std::ptr::fn_addr_eq(self.func, other.func)
    }
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Native({})", self.name)
    }
}

/// Everything `popcall` can invoke.
pub enum Callable {
    /// Interpreted lambda closing over its defining frame.
    Function { body: Rc<Lambda>, closure: Option<FrameRef> },
    Native(Native),
    /// Partial application: `arg` is pushed before `func` runs.
    Thunk { func: Rc<Callable>, arg: Value },
    /// Placeholder for a function that was declared but never defined.
    Undefined,
}

thread_local! {
    static UNDEFINED: Rc<Callable> = Rc::new(Callable::Undefined);
}

impl Callable {
    pub fn function(body: Rc<Lambda>, closure: Option<FrameRef>) -> Rc<Callable> {
        Rc::new(Callable::Function { body, closure })
    }

    pub fn native(name: &'static str, func: Bltin) -> Rc<Callable> {
        Rc::new(Callable::Native(Native::new(name, func)))
    }

    pub fn thunk(func: Rc<Callable>, arg: Value) -> Rc<Callable> {
        Rc::new(Callable::Thunk { func, arg })
    }

    /// The shared undefined placeholder of this thread.
    pub fn undefined() -> Rc<Callable> {
        UNDEFINED.with(Rc::clone)
    }

    pub fn invoke(&self, stack: &mut Stack) -> VmResult<()> {
        match self {
            Callable::Function { body, closure } => run_lambda(stack, body, closure.as_ref()),
            Callable::Native(native) => {
                trace!(target: "pathvm::vm::call", native = native.name(), "native");
                native.call(stack)
            }
            Callable::Thunk { func, arg } => {
                stack.push(arg.clone())?;
                func.invoke(stack)
            }
            Callable::Undefined => Err(VmError::UndefinedCall),
        }
    }

    /// Identity used by `func_eq`. Thunks and the undefined placeholder are
    /// never identical to anything, themselves included.
    pub fn identity_equals(&self, other: &Callable) -> bool {
        match (self, other) {
            (
                Callable::Function { body: a, closure: ca },
                Callable::Function { body: b, closure: cb },
            ) => {
                Rc::ptr_eq(a, b)
                    && match (ca, cb) {
                        (Some(x), Some(y)) => Rc::ptr_eq(x, y),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (Callable::Native(a), Callable::Native(b)) => a.same(b),
            _ => false,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Callable::Function { .. } => "function",
            Callable::Native(_) => "native",
            Callable::Thunk { .. } => "thunk",
            Callable::Undefined => "undefined",
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Callable::Function { body, .. } => format!("function {}", body.display_name()),
            Callable::Native(native) => format!("native {}", native.name()),
            Callable::Thunk { func, .. } => format!("thunk of {}", func.describe()),
            Callable::Undefined => "undefined function".to_string(),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({})", self.describe())
    }
}
