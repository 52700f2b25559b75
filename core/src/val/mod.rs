use std::{cell::RefCell, fmt, rc::Rc};

use crate::util::fast_map::{FastHashSet, VisitedSet, fast_hash_set_new};
use crate::vm::{Callable, FrameRef, Label, Lambda, Record, VmError, VmResult};

mod array;

pub use array::{Array, ArrayRef};


/// Runtime value held on the stack, in frames and in arrays.
///
/// The set of kinds is closed. Reading a value as a kind it does not hold
/// fails with [`VmError::TypeMismatch`]; no conversion is ever attempted.
#[derive(Clone, Default)]
pub enum Value {
    /// Default-constructed value: fresh locals and record fields start here
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(Rc<str>),
    Array(ArrayRef),
    /// Record instance
    Instance(Rc<Instance>),
    Callable(Rc<Callable>),
    /// Frame reference pushed by `pushclosure`
    Frame(FrameRef),
    Lambda(Rc<Lambda>),
    Label(Label),
}

/// An allocated record: exactly `record.size` fields.
pub struct Instance {
    pub record: Rc<Record>,
    pub fields: RefCell<Array>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance({}, fields={})", self.record.display_name(), self.record.size)
    }
}

impl Instance {
    pub fn new(record: Rc<Record>) -> Self {
        let fields = RefCell::new(Array::new(record.size));
        Self { record, fields }
    }

    pub fn field(&self, index: usize) -> VmResult<Value> {
        self.fields.borrow().get(index)
    }

    pub fn set_field(&self, index: usize, value: Value) -> VmResult<()> {
        self.fields.borrow_mut().set(index, value)
    }
}

impl Value {
    #[inline]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Real(_) => "Real",
            Value::Str(_) => "String",
            Value::Array(_) => "Array",
            Value::Instance(_) => "Record",
            Value::Callable(_) => "Function",
            Value::Frame(_) => "Frame",
            Value::Lambda(_) => "Lambda",
            Value::Label(_) => "Label",
        }
    }

    /// Downcast to `T`, failing with a type mismatch for any other kind.
    #[inline]
    pub fn get<T: FromValue>(&self) -> VmResult<T> {
        T::from_value(self).ok_or_else(|| VmError::type_mismatch(T::KIND, self.type_name()))
    }

    pub fn as_int(&self) -> VmResult<i64> {
        self.get()
    }

    pub fn as_real(&self) -> VmResult<f64> {
        self.get()
    }

    pub fn as_bool(&self) -> VmResult<bool> {
        self.get()
    }

    pub fn as_callable(&self) -> VmResult<Rc<Callable>> {
        self.get()
    }

    pub fn str<S: AsRef<str>>(s: S) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(Array::from(items))))
    }

    /// Reference identity as used by `mem_eq`: scalars compare by value,
    /// heap values by address.
    pub fn same_ref(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Callable(a), Value::Callable(b)) => Rc::ptr_eq(a, b),
            (Value::Frame(a), Value::Frame(b)) => Rc::ptr_eq(a, b),
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            (Value::Label(a), Value::Label(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        eq_guarded(self, other, &mut fast_hash_set_new())
    }
}

type ArrayPairs = FastHashSet<(*const RefCell<Array>, *const RefCell<Array>)>;

// Arrays compare element-wise. A pair already under comparison is taken as
// equal so self-referencing arrays terminate.
fn eq_guarded(a: &Value, b: &Value, seen: &mut ArrayPairs) -> bool {
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            if Rc::ptr_eq(x, y) || !seen.insert((Rc::as_ptr(x), Rc::as_ptr(y))) {
                return true;
            }
            items_eq(x.borrow().as_slice(), y.borrow().as_slice(), seen)
        }
        _ => a.same_ref(b),
    }
}

fn items_eq(a: &[Value], b: &[Value], seen: &mut ArrayPairs) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| eq_guarded(x, y, seen))
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        items_eq(self.as_slice(), other.as_slice(), &mut fast_hash_set_new())
    }
}

/// A Rust type that can be read out of a [`Value`].
pub trait FromValue: Sized {
    /// Kind name reported in type-mismatch errors.
    const KIND: &'static str;

    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! impl_from_value {
    ($ty:ty, $kind:literal, $variant:ident) => {
        impl FromValue for $ty {
            const KIND: &'static str = $kind;

            #[inline]
            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(inner) => Some(inner.clone()),
                    _ => None,
                }
            }
        }
    };
}

impl_from_value!(bool, "Bool", Bool);
impl_from_value!(i64, "Int", Int);
impl_from_value!(f64, "Real", Real);
impl_from_value!(Rc<str>, "String", Str);
impl_from_value!(ArrayRef, "Array", Array);
impl_from_value!(Rc<Instance>, "Record", Instance);
impl_from_value!(Rc<Callable>, "Function", Callable);
impl_from_value!(FrameRef, "Frame", Frame);
impl_from_value!(Rc<Lambda>, "Lambda", Lambda);
impl_from_value!(Label, "Label", Label);

impl FromValue for Value {
    const KIND: &'static str = "Value";

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Rc<Callable>> for Value {
    fn from(c: Rc<Callable>) -> Self {
        Value::Callable(c)
    }
}

// Frames and closures can reference each other, so Debug never descends into
// them; only arrays print their contents.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Real(r) => write!(f, "Real({r})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Array(_) => write!(f, "Array({self})"),
            Value::Instance(inst) => write!(f, "Instance({})", inst.record.display_name()),
            Value::Callable(c) => write!(f, "Callable({})", c.kind_name()),
            Value::Frame(frame) => write!(f, "Frame(len={})", frame.len()),
            Value::Lambda(l) => write!(f, "Lambda({})", l.display_name()),
            Value::Label(l) => write!(f, "Label(@{})", l.offset()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        display_guarded(self, f, &mut fast_hash_set_new())
    }
}

// An array already being printed further up renders as `[...]`.
fn display_guarded(value: &Value, f: &mut fmt::Formatter<'_>, open: &mut VisitedSet<RefCell<Array>>) -> fmt::Result {
    match value {
        Value::Nil => write!(f, "nil"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Int(i) => write!(f, "{i}"),
        Value::Real(r) => write!(f, "{r}"),
        Value::Str(s) => write!(f, "{s}"),
        Value::Array(a) => {
            let ptr = Rc::as_ptr(a);
            if !open.insert(ptr) {
                return write!(f, "[...]");
            }
            write!(f, "[")?;
            for (idx, item) in a.borrow().iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                display_guarded(item, f, open)?;
            }
            open.remove(&ptr);
            write!(f, "]")
        }
        Value::Instance(inst) => write!(f, "<record {}>", inst.record.display_name()),
        Value::Callable(c) => write!(f, "<{}>", c.describe()),
        Value::Frame(frame) => write!(f, "<frame {}>", frame.len()),
        Value::Lambda(l) => write!(f, "<lambda {}>", l.display_name()),
        Value::Label(l) => write!(f, "<label @{}>", l.offset()),
    }
}
