use std::{cell::RefCell, rc::Rc};

use crate::vm::{VmError, VmResult};

use super::{FromValue, Value};

pub type ArrayRef = Rc<RefCell<Array>>;

/// Growable sequence of values. Also the storage of record instances.
#[derive(Clone, Default)]
pub struct Array {
    items: Vec<Value>,
}

impl Array {
    /// An array of `n` default-constructed values.
    pub fn new(n: usize) -> Self {
        Self {
            items: vec![Value::Nil; n],
        }
    }

    pub fn push(&mut self, value: Value) {
        self.items.push(value);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> VmResult<Value> {
        self.items.get(index).cloned().ok_or(VmError::IndexOutOfBounds {
            what: "array",
            index,
            len: self.items.len(),
        })
    }

    pub fn set(&mut self, index: usize, value: Value) -> VmResult<()> {
        let len = self.items.len();
        let slot = self.items.get_mut(index).ok_or(VmError::IndexOutOfBounds {
            what: "array",
            index,
            len,
        })?;
        *slot = value;
        Ok(())
    }

    /// Typed element read: `Int` is never read as `Real` and so on.
    pub fn read<T: FromValue>(&self, index: usize) -> VmResult<T> {
        self.items
            .get(index)
            .ok_or(VmError::IndexOutOfBounds {
                what: "array",
                index,
                len: self.items.len(),
            })?
            .get()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }
}

impl From<Vec<Value>> for Array {
    fn from(items: Vec<Value>) -> Self {
        Self { items }
    }
}

impl FromIterator<Value> for Array {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
