use pathvm_core::module::Module;
use pathvm_core::val::{ArrayRef, Value};
use pathvm_core::vm::{Native, Stack, VmResult};
use tracing::trace;

/// Helpers shared with the graphics backend.
#[derive(Debug, Default)]
pub struct DrawModule;

impl DrawModule {
    pub fn new() -> Self {
        Self
    }

    /// `adjustdash(pattern, width, arclength, cyclic)`
    fn adjustdash(stack: &mut Stack) -> VmResult<()> {
        let cyclic = stack.pop_as::<bool>()?;
        let arclength = stack.pop_as::<f64>()?;
        let width = stack.pop_as::<f64>()?;
        let pattern = stack.pop_as::<ArrayRef>()?;
        let lengths = {
            let pattern = pattern.borrow();
            (0..pattern.len())
                .map(|i| pattern.read::<f64>(i))
                .collect::<VmResult<Vec<f64>>>()?
        };
        let adjusted = adjust_dash(&lengths, width, arclength, cyclic);
        trace!(target: "pathvm::draw", ?lengths, ?adjusted, arclength, "dash adjusted");
        stack.push(Value::array(adjusted.into_iter().map(Value::Real).collect()))
    }
}

/// Stretch a dash pattern, given in pen widths, so that a whole number of
/// cycles covers `arclength`. An open path also ends on a full first dash.
///
/// A zero arclength or an empty pattern is returned unchanged; a pattern that
/// sums to zero is only scaled.
pub fn adjust_dash(pattern: &[f64], width: f64, arclength: f64, cyclic: bool) -> Vec<f64> {
    if arclength == 0.0 || pattern.is_empty() {
        return pattern.to_vec();
    }
    let scaled: Vec<f64> = pattern.iter().map(|len| len * width).collect();
    let mut sum: f64 = scaled.iter().sum();
    if !cyclic && scaled[0] == 0.0 {
        sum += 1.0e-3 * width;
    }
    if sum <= 0.0 {
        return scaled;
    }
    let ncycle = ((arclength / sum + 0.5).floor()).max(1.0);
    let lead = if cyclic { 0.0 } else { scaled[0] };
    let factor = arclength / (ncycle * sum + lead);
    scaled.into_iter().map(|len| len * factor).collect()
}

impl Module for DrawModule {
    fn name(&self) -> &str {
        "draw"
    }

    fn description(&self) -> &str {
        "Path drawing helpers"
    }

    fn natives(&self) -> Vec<Native> {
        vec![Native::new("draw.adjustdash", Self::adjustdash)]
    }
}
