use std::{
    cell::{Ref, RefCell},
    cmp::Ordering,
    fmt,
    rc::{Rc, Weak},
};

use super::bytecode::Instruction;
use super::error::{VmError, VmResult};

type Code = RefCell<Vec<Instruction>>;

/// Append-only instruction buffer.
///
/// Labels are offsets into the buffer rather than addresses, so growing the
/// buffer never invalidates a label handed out earlier.
#[derive(Default)]
pub struct Program {
    code: Rc<Code>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one instruction.
    pub fn encode(&mut self, inst: Instruction) {
        self.code.borrow_mut().push(inst);
    }

    pub fn begin(&self) -> Label {
        self.label(0)
    }

    pub fn end(&self) -> Label {
        self.label(self.len())
    }

    /// Label at an arbitrary offset. Offsets past `end()` are legal labels
    /// but cannot be dereferenced.
    pub fn label(&self, offset: usize) -> Label {
        Label {
            code: Rc::downgrade(&self.code),
            offset,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.code.borrow().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.borrow().is_empty()
    }

    /// Overwrite an already encoded instruction, typically a forward jump
    /// whose target was unknown when it was emitted.
    pub fn patch(&mut self, at: &Label, inst: Instruction) -> VmResult<()> {
        let offset = self.offset_of(at)?;
        let mut code = self.code.borrow_mut();
        let len = code.len();
        let slot = code.get_mut(offset).ok_or(VmError::LabelOutOfBounds {
            offset: offset as isize,
            len,
        })?;
        *slot = inst;
        Ok(())
    }

    pub fn same(&self, other: &Program) -> bool {
        Rc::ptr_eq(&self.code, &other.code)
    }

    pub fn owns(&self, label: &Label) -> bool {
        std::ptr::eq(label.code.as_ptr(), Rc::as_ptr(&self.code))
    }

    /// Offset of a label that must belong to this program.
    pub fn offset_of(&self, label: &Label) -> VmResult<usize> {
        if self.owns(label) {
            Ok(label.offset)
        } else {
            Err(VmError::LabelMismatch)
        }
    }

    /// Walk the instructions from `begin()` to `end()`.
    pub fn iter(&self) -> Instructions {
        Instructions {
            cursor: self.begin(),
            end: self.end(),
        }
    }

    pub(crate) fn instructions(&self) -> Ref<'_, Vec<Instruction>> {
        self.code.borrow()
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.code.borrow().iter()).finish()
    }
}

/// Position in a [`Program`]: the program's identity plus an offset.
///
/// A label does not keep its program alive; a jump instruction stores a
/// label into its own program.
#[derive(Clone, Default)]
pub struct Label {
    code: Weak<Code>,
    offset: usize,
}

impl Label {
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn increment(&mut self) {
        self.offset += 1;
    }

    pub fn decrement(&mut self) -> VmResult<()> {
        self.advance(-1)
    }

    pub fn advance(&mut self, n: isize) -> VmResult<()> {
        match self.offset.checked_add_signed(n) {
            Some(target) if isize::try_from(target).is_ok() => {
                self.offset = target;
                Ok(())
            }
            _ => Err(VmError::LabelOutOfBounds {
                offset: (self.offset as isize).saturating_add(n),
                len: self.program_len(),
            }),
        }
    }

    /// Copy of this label moved by `n` instructions.
    pub fn advanced(&self, n: isize) -> VmResult<Label> {
        let mut next = self.clone();
        next.advance(n)?;
        Ok(next)
    }

    /// Signed instruction count from `self` to `other`.
    pub fn distance_to(&self, other: &Label) -> VmResult<isize> {
        if !self.same_program(other) {
            return Err(VmError::LabelMismatch);
        }
        Ok(other.offset as isize - self.offset as isize)
    }

    pub fn same_program(&self, other: &Label) -> bool {
        Weak::ptr_eq(&self.code, &other.code)
    }

    /// The instruction this label points at.
    pub fn dereference(&self) -> VmResult<Instruction> {
        let code = self.code.upgrade().ok_or(VmError::DanglingLabel)?;
        let code = code.borrow();
        code.get(self.offset).cloned().ok_or(VmError::LabelOutOfBounds {
            offset: self.offset as isize,
            len: code.len(),
        })
    }

    fn program_len(&self) -> usize {
        self.code.upgrade().map(|code| code.borrow().len()).unwrap_or(0)
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.same_program(other) && self.offset == other.offset
    }
}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.same_program(other) {
            Some(self.offset.cmp(&other.offset))
        } else {
            None
        }
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Label(@{})", self.offset)
    }
}

/// Iterator over a program's instructions, driven by a [`Label`] cursor.
pub struct Instructions {
    cursor: Label,
    end: Label,
}

impl Iterator for Instructions {
    type Item = Instruction;

    fn next(&mut self) -> Option<Instruction> {
        if self.cursor == self.end {
            return None;
        }
        let inst = self.cursor.dereference().ok()?;
        self.cursor.increment();
        Some(inst)
    }
}
