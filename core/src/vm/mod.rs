//! Stack bytecode VM
//!
//! Instructions, programs and labels, compiled lambdas and records, the
//! callable kinds, the frame pool and the interpreter loop that ties them
//! together.

mod alloc;
mod bytecode;
mod callable;
mod config;
mod disasm;
mod error;
pub mod image;
mod lambda;
mod program;
mod stack;
#[allow(clippy::module_inception)]
mod vm;

pub use alloc::{DEFAULT_POOL_LIMIT, Frame, FrameArena, FrameRef, pooled_buffers, set_pool_limit};
pub use bytecode::{Instruction, Opcode};
pub use callable::{Bltin, Callable, Native};
pub use config::VmConfig;
pub use disasm::{disassemble, disassemble_all, print, print_inst};
pub use error::{VmError, VmResult};
pub use image::Image;
pub use lambda::{InstPos, Lambda, PosList, Position, Record};
pub use program::{Instructions, Label, Program};
pub use stack::Stack;
pub use vm::Vm;
