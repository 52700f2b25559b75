pub mod module;
pub mod util;
pub mod val;

// Stack bytecode VM: programs, lambdas, callables and the interpreter loop
pub mod vm;
