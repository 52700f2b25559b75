use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use tracing::trace;

use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::Value;

use super::error::{VmError, VmResult};

pub type FrameRef = Rc<Frame>;

pub const DEFAULT_POOL_LIMIT: usize = 256;

thread_local! {
    static TLS_FRAME_POOL: RefCell<FastHashMap<usize, Vec<Vec<Value>>>> = RefCell::new(fast_hash_map_new());
    static TLS_POOLED: Cell<usize> = const { Cell::new(0) };
    static TLS_POOL_LIMIT: Cell<usize> = const { Cell::new(DEFAULT_POOL_LIMIT) };
}

/// Cap the number of slot buffers kept for reuse on this thread.
pub fn set_pool_limit(limit: usize) {
    TLS_POOL_LIMIT.with(|cell| cell.set(limit));
    if TLS_POOLED.with(Cell::get) > limit {
        TLS_FRAME_POOL.with(|cell| cell.borrow_mut().clear());
        TLS_POOLED.with(|cell| cell.set(0));
    }
}

/// Number of slot buffers currently parked in this thread's pool.
pub fn pooled_buffers() -> usize {
    TLS_POOLED.with(Cell::get)
}

fn take_buffer(len: usize) -> Vec<Value> {
    let reused = TLS_FRAME_POOL.with(|cell| cell.borrow_mut().get_mut(&len).and_then(Vec::pop));
    match reused {
        Some(mut buf) => {
            TLS_POOLED.with(|cell| cell.set(cell.get().saturating_sub(1)));
            buf.resize(len, Value::Nil);
            buf
        }
        None => {
            trace!(target: "pathvm::vm::alloc", slots = len, "frame_pool.miss");
            vec![Value::Nil; len]
        }
    }
}

// The buffer must already be cleared: dropping its values may drop other
// frames, which re-enter the pool.
fn give_buffer(len: usize, buf: Vec<Value>) {
    debug_assert!(buf.is_empty());
    let limit = TLS_POOL_LIMIT.with(Cell::get);
    let pooled = TLS_POOLED.with(Cell::get);
    if pooled >= limit {
        return;
    }
    // Thread-local storage may already be gone during thread teardown.
    let _ = TLS_FRAME_POOL.try_with(|cell| {
        if let Ok(mut pool) = cell.try_borrow_mut() {
            pool.entry(len).or_default().push(buf);
            TLS_POOLED.with(|c| c.set(pooled + 1));
        }
    });
}

/// Fixed-size array of variable slots for one activation.
///
/// Frames are shared: closures keep their defining frame alive and
/// `pushclosure` exposes the current frame as a value.
pub struct Frame {
    slots: RefCell<Vec<Value>>,
}

impl Frame {
    /// A frame of `len` Nil slots, reusing a pooled buffer when one fits.
    pub fn new(len: usize) -> FrameRef {
        Rc::new(Self {
            slots: RefCell::new(take_buffer(len)),
        })
    }

    pub fn from_values(values: Vec<Value>) -> FrameRef {
        Rc::new(Self {
            slots: RefCell::new(values),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> VmResult<Value> {
        let slots = self.slots.borrow();
        slots.get(index).cloned().ok_or(VmError::IndexOutOfBounds {
            what: "frame",
            index,
            len: slots.len(),
        })
    }

    pub fn set(&self, index: usize, value: Value) -> VmResult<()> {
        // The old value is dropped after the borrow ends.
        let old = {
            let mut slots = self.slots.borrow_mut();
            let len = slots.len();
            let slot = slots
                .get_mut(index)
                .ok_or(VmError::IndexOutOfBounds { what: "frame", index, len })?;
            std::mem::replace(slot, value)
        };
        drop(old);
        Ok(())
    }

    /// Copy the first `n` slots of `self` into `dest`.
    pub(crate) fn copy_prefix_into(&self, dest: &mut [Value]) {
        let slots = self.slots.borrow();
        for (to, from) in dest.iter_mut().zip(slots.iter()) {
            *to = from.clone();
        }
    }

    pub(crate) fn fill(&self, f: impl FnOnce(&mut [Value])) {
        f(&mut self.slots.borrow_mut());
    }

    /// Reset every slot to Nil, releasing whatever the frame referenced.
    pub fn clear(&self) {
        let old: Vec<Value> = self.slots.borrow_mut().iter_mut().map(std::mem::take).collect();
        drop(old);
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        let mut buf = std::mem::take(self.slots.get_mut());
        let len = buf.len();
        buf.clear();
        give_buffer(len, buf);
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame(len={})", self.len())
    }
}

/// Weak registry of every frame a VM created.
///
/// Closures stored into their own defining frame form reference cycles that
/// `Rc` cannot free. Sweeping clears the slots of every frame still alive,
/// which breaks those cycles.
#[derive(Default)]
pub struct FrameArena {
    frames: RefCell<Vec<Weak<Frame>>>,
    prune_at: Cell<usize>,
}

const PRUNE_FLOOR: usize = 64;

impl FrameArena {
    pub fn new() -> Self {
        Self {
            frames: RefCell::new(Vec::new()),
            prune_at: Cell::new(PRUNE_FLOOR),
        }
    }

    pub fn register(&self, frame: &FrameRef) {
        let mut frames = self.frames.borrow_mut();
        frames.push(Rc::downgrade(frame));
        if frames.len() >= self.prune_at.get() {
            frames.retain(|weak| weak.strong_count() > 0);
            self.prune_at.set((frames.len() * 2).max(PRUNE_FLOOR));
        }
    }

    /// Frames registered here that are still referenced.
    pub fn live(&self) -> usize {
        self.frames.borrow().iter().filter(|weak| weak.strong_count() > 0).count()
    }

    /// Clear every live frame and forget them all.
    pub fn sweep(&self) -> usize {
        let frames = std::mem::take(&mut *self.frames.borrow_mut());
        let live: Vec<FrameRef> = frames.iter().filter_map(Weak::upgrade).collect();
        let count = live.len();
        for frame in &live {
            frame.clear();
        }
        drop(live);
        self.prune_at.set(PRUNE_FLOOR);
        if count > 0 {
            trace!(target: "pathvm::vm::alloc", frames = count, "frame_arena.sweep");
        }
        count
    }
}

impl fmt::Debug for FrameArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameArena")
            .field("tracked", &self.frames.borrow().len())
            .finish()
    }
}
