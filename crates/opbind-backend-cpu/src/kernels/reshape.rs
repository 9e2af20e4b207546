use anyhow::{bail, Result};
use opbind_core::{AttributeError, Attributes, Kernel, Shape, Tensor};

use super::{expect_inputs, normalize_axis};

#[derive(Default)]
pub struct Flatten {
    axis: Option<i64>,
}

impl Kernel for Flatten {
    fn kind(&self) -> &'static str {
        "cpu.Flatten"
    }

    fn initialize(&mut self, attrs: &Attributes) -> Result<(), AttributeError> {
        attrs.reject_unknown(&["axis"])?;
        self.axis = Some(attrs.int_or("axis", 1)?);
        Ok(())
    }

    fn invoke(&mut self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        let Some(axis) = self.axis else {
            bail!("Flatten invoked before initialize");
        };
        expect_inputs("Flatten", inputs, 1, 1)?;
        let input = &inputs[0];
        let dims = input.shape().dims();
        let axis = normalize_axis(axis, dims.len(), true)?;
        let outer = dims[..axis].iter().product::<usize>();
        let inner = dims[axis..].iter().product::<usize>();
        Ok(vec![input.reshaped(Shape::from_slice(&[outer, inner]))?])
    }
}
