use std::{fmt, rc::Rc, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::util::fast_map::{VisitedSet, fast_hash_set_new};
use crate::val::Value;

use super::bytecode::Instruction;
use super::error::{VmError, VmResult};
use super::program::{Label, Program};

/// Source position attached to instructions for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<Arc<str>>,
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self {
            file: None,
            line,
            column,
        }
    }

    pub fn in_file(file: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        Self {
            file: Some(file.into()),
            line,
            column,
        }
    }

    /// Sentinel for "no position recorded".
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_known(&self) -> bool {
        self.line != 0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_known() {
            return write!(f, "<unknown>");
        }
        match &self.file {
            Some(file) => write!(f, "{}:{}:{}", file, self.line, self.column),
            None => write!(f, "{}:{}", self.line, self.column),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstPos {
    pub offset: usize,
    pub pos: Position,
}

/// Instruction offset to source position map, kept sorted by offset.
#[derive(Debug, Clone, Default)]
pub struct PosList {
    entries: Vec<InstPos>,
}

impl PosList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `pos` for the instruction at `offset`. Out-of-order entries are
    /// inserted where they belong.
    pub fn push(&mut self, offset: usize, pos: Position) {
        let at = self.entries.partition_point(|entry| entry.offset <= offset);
        self.entries.insert(at, InstPos { offset, pos });
    }

    /// Position of the nearest entry at or before `here`.
    pub fn get_pos(&self, here: &Label) -> Position {
        self.get_pos_at(here.offset())
    }

    pub fn get_pos_at(&self, offset: usize) -> Position {
        let idx = self.entries.partition_point(|entry| entry.offset <= offset);
        match idx.checked_sub(1).and_then(|i| self.entries.get(i)) {
            Some(entry) => entry.pos.clone(),
            None => Position::unknown(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, InstPos> {
        self.entries.iter()
    }
}

/// A compiled function: code plus the sizes the interpreter needs to run it.
pub struct Lambda {
    pub name: Option<String>,
    pub code: Program,
    /// Upper bound on stack growth while this lambda runs.
    pub max_stack_size: usize,
    /// Argument count, not counting the enclosing closure.
    pub params: usize,
    /// Frame slots: captured closure slots, parameters and locals.
    pub vars: usize,
    pub pl: PosList,
}

impl Lambda {
    pub fn new(code: Program, max_stack_size: usize, params: usize, vars: usize) -> Self {
        Self {
            name: None,
            code,
            max_stack_size,
            params,
            vars,
            pl: PosList::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_positions(mut self, pl: PosList) -> Self {
        self.pl = pl;
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    /// Check the frame-layout and jump invariants of this lambda and of every
    /// lambda reachable from it.
    pub fn validate(&self) -> VmResult<()> {
        let mut seen = fast_hash_set_new();
        self.validate_inner(&mut seen)
    }

    fn validate_inner(&self, seen: &mut VisitedSet<Lambda>) -> VmResult<()> {
        if !seen.insert(self as *const Lambda) {
            return Ok(());
        }
        if self.params > self.vars {
            return Err(VmError::malformed(format!(
                "{}: params ({}) exceeds vars ({})",
                self.display_name(),
                self.params,
                self.vars
            )));
        }
        let len = self.code.len();
        for (offset, inst) in self.code.iter().enumerate() {
            match &inst {
                Instruction::VarPush(slot) | Instruction::VarSave(slot) if *slot >= self.vars => {
                    return Err(VmError::malformed(format!(
                        "{}: {} at {} uses slot {} but vars is {}",
                        self.display_name(),
                        inst.opcode(),
                        offset,
                        slot,
                        self.vars
                    )));
                }
                Instruction::Jmp(target) | Instruction::CJmp(target) | Instruction::NJmp(target) => {
                    let target = self.code.offset_of(target)?;
                    if target > len {
                        return Err(VmError::LabelOutOfBounds {
                            offset: target as isize,
                            len,
                        });
                    }
                }
                Instruction::MakeFunc(inner) => inner.validate_inner(seen)?,
                Instruction::ConstPush(Value::Lambda(inner)) => inner.validate_inner(seen)?,
                Instruction::Alloc(record) => record.validate_inner(seen)?,
                _ => {}
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lambda")
            .field("name", &self.display_name())
            .field("params", &self.params)
            .field("vars", &self.vars)
            .field("max_stack_size", &self.max_stack_size)
            .field("len", &self.code.len())
            .finish()
    }
}

/// Record type descriptor: field count and the initializer that fills a new
/// instance. The initializer receives the instance as its only argument.
#[derive(Debug)]
pub struct Record {
    pub name: Option<String>,
    pub size: usize,
    pub init: Rc<Lambda>,
}

impl Record {
    pub fn new(size: usize, init: Rc<Lambda>) -> Self {
        Self { name: None, size, init }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<record>")
    }

    pub fn validate(&self) -> VmResult<()> {
        let mut seen = fast_hash_set_new();
        self.validate_inner(&mut seen)
    }

    fn validate_inner(&self, seen: &mut VisitedSet<Lambda>) -> VmResult<()> {
        if self.init.params != 1 {
            return Err(VmError::malformed(format!(
                "initializer of {} must take exactly one parameter, takes {}",
                self.display_name(),
                self.init.params
            )));
        }
        self.init.validate_inner(seen)
    }
}
