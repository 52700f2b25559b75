use anyhow::anyhow;
use pathvm_core::module::Module;
use pathvm_core::vm::{Native, Stack, VmResult};

/// Real arithmetic. Integers are never accepted where a real is expected;
/// `math.to_real` converts explicitly.
#[derive(Debug, Default)]
pub struct MathModule;

impl MathModule {
    pub fn new() -> Self {
        Self
    }

    fn unary(stack: &mut Stack, f: fn(f64) -> f64) -> VmResult<()> {
        let x = stack.pop_as::<f64>()?;
        stack.push(f(x))
    }

    fn sqrt(stack: &mut Stack) -> VmResult<()> {
        Self::unary(stack, f64::sqrt)
    }

    fn sin(stack: &mut Stack) -> VmResult<()> {
        Self::unary(stack, f64::sin)
    }

    fn cos(stack: &mut Stack) -> VmResult<()> {
        Self::unary(stack, f64::cos)
    }

    fn abs(stack: &mut Stack) -> VmResult<()> {
        Self::unary(stack, f64::abs)
    }

    fn pow(stack: &mut Stack) -> VmResult<()> {
        let exp = stack.pop_as::<f64>()?;
        let base = stack.pop_as::<f64>()?;
        stack.push(base.powf(exp))
    }

    /// Largest integer not above the argument.
    fn floor(stack: &mut Stack) -> VmResult<()> {
        let x = stack.pop_as::<f64>()?.floor();
        if !x.is_finite() || x < i64::MIN as f64 || x >= i64::MAX as f64 {
            return Err(anyhow!("math.floor: {} does not fit an integer", x).into());
        }
        stack.push(x as i64)
    }

    fn to_real(stack: &mut Stack) -> VmResult<()> {
        let i = stack.pop_as::<i64>()?;
        stack.push(i as f64)
    }
}

impl Module for MathModule {
    fn name(&self) -> &str {
        "math"
    }

    fn description(&self) -> &str {
        "Real-valued math functions"
    }

    fn natives(&self) -> Vec<Native> {
        vec![
            Native::new("math.sqrt", Self::sqrt),
            Native::new("math.sin", Self::sin),
            Native::new("math.cos", Self::cos),
            Native::new("math.abs", Self::abs),
            Native::new("math.pow", Self::pow),
            Native::new("math.floor", Self::floor),
            Native::new("math.to_real", Self::to_real),
        ]
    }
}
