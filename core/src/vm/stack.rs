use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::val::{FromValue, Value};

use super::alloc::{Frame, FrameArena, FrameRef};
use super::config::VmConfig;
use super::error::{VmError, VmResult};

/// Execution stack shared by interpreted code and natives.
///
/// Besides the operand values it carries the per-run state the interpreter
/// needs across calls: the current push ceiling, call depth, the global
/// frame and the frame arena.
pub struct Stack {
    values: Vec<Value>,
    floor: usize,
    ceiling: usize,
    depth: usize,
    max_call_depth: usize,
    globals: FrameRef,
    arena: FrameArena,
    interrupt: Option<Arc<AtomicBool>>,
}

impl Stack {
    pub fn new(config: &VmConfig) -> Self {
        Self {
            values: Vec::with_capacity(config.initial_stack_capacity),
            floor: 0,
            ceiling: usize::MAX,
            depth: 0,
            max_call_depth: config.max_call_depth,
            globals: Frame::new(0),
            arena: FrameArena::new(),
            interrupt: None,
        }
    }

    /// Push a value. Fails once the running lambda's `max_stack_size` is used up.
    #[inline]
    pub fn push(&mut self, value: impl Into<Value>) -> VmResult<()> {
        if self.values.len() >= self.ceiling {
            return Err(VmError::StackOverflow { limit: self.ceiling });
        }
        self.values.push(value.into());
        Ok(())
    }

    /// Pop a value. A call can never pop below the values it was given.
    #[inline]
    pub fn pop(&mut self) -> VmResult<Value> {
        if self.values.len() <= self.floor {
            return Err(VmError::StackUnderflow);
        }
        self.values.pop().ok_or(VmError::StackUnderflow)
    }

    /// Pop and downcast in one step.
    #[inline]
    pub fn pop_as<T: FromValue>(&mut self) -> VmResult<T> {
        self.pop()?.get()
    }

    #[inline]
    pub fn top(&self) -> VmResult<&Value> {
        if self.values.len() <= self.floor {
            return Err(VmError::StackUnderflow);
        }
        self.values.last().ok_or(VmError::StackUnderflow)
    }

    #[inline]
    pub fn top_mut(&mut self) -> VmResult<&mut Value> {
        if self.values.len() <= self.floor {
            return Err(VmError::StackUnderflow);
        }
        self.values.last_mut().ok_or(VmError::StackUnderflow)
    }

    /// Values the current call may pop.
    #[inline]
    pub fn available(&self) -> usize {
        self.values.len().saturating_sub(self.floor)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
    }

    /// Drain values above `len` into a vector, bottom first.
    pub(crate) fn split_off(&mut self, len: usize) -> Vec<Value> {
        let at = len.min(self.values.len());
        self.values.split_off(at)
    }

    /// Move the top `dest.len()` values into `dest`, first pushed first.
    pub(crate) fn move_args_into(&mut self, dest: &mut [Value]) -> VmResult<()> {
        if dest.len() > self.available() {
            return Err(VmError::StackUnderflow);
        }
        let base = self.values.len() - dest.len();
        for (slot, value) in dest.iter_mut().zip(self.values.drain(base..)) {
            *slot = value;
        }
        Ok(())
    }

    pub fn globals(&self) -> &FrameRef {
        &self.globals
    }

    pub(crate) fn set_globals(&mut self, globals: FrameRef) {
        self.arena.register(&globals);
        self.globals = globals;
    }

    /// A Nil-filled frame tracked by this stack's arena.
    pub(crate) fn new_frame(&mut self, len: usize) -> FrameRef {
        let frame = Frame::new(len);
        self.arena.register(&frame);
        frame
    }

    pub(crate) fn sweep_frames(&mut self) -> usize {
        self.arena.sweep()
    }

    pub fn live_frames(&self) -> usize {
        self.arena.live()
    }

    /// Forbid popping below the current top; returns the previous floor.
    pub(crate) fn raise_floor(&mut self) -> usize {
        std::mem::replace(&mut self.floor, self.values.len())
    }

    pub(crate) fn restore_floor(&mut self, floor: usize) {
        self.floor = floor;
    }

    #[inline]
    pub(crate) fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Allow `headroom` more values above the current top, reserving them.
    pub(crate) fn raise_ceiling(&mut self, headroom: usize) -> usize {
        let previous = self.ceiling;
        self.values.reserve(headroom);
        self.ceiling = self.values.len().saturating_add(headroom);
        previous
    }

    pub(crate) fn restore_ceiling(&mut self, ceiling: usize) {
        self.ceiling = ceiling;
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn enter_call(&mut self) -> VmResult<()> {
        if self.depth >= self.max_call_depth {
            return Err(VmError::CallDepthExceeded {
                limit: self.max_call_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave_call(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub(crate) fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
    }

    pub(crate) fn set_max_call_depth(&mut self, limit: usize) {
        self.max_call_depth = limit;
    }

    pub(crate) fn set_interrupt(&mut self, flag: Option<Arc<AtomicBool>>) {
        self.interrupt = flag;
    }

    /// Fail with [`VmError::Interrupted`] once the host raised the flag.
    #[inline]
    pub(crate) fn poll_interrupt(&self) -> VmResult<()> {
        match &self.interrupt {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(VmError::Interrupted),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Stack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("values", &self.values)
            .field("depth", &self.depth)
            .finish()
    }
}
