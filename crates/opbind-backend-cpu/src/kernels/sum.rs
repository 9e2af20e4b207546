use anyhow::{bail, Result};
use opbind_core::{AttributeError, Attributes, Kernel, Tensor};

use super::elementwise_shape;

/// Variadic elementwise sum.
#[derive(Default)]
pub struct Sum {
    ready: bool,
}

impl Kernel for Sum {
    fn kind(&self) -> &'static str {
        "cpu.Sum"
    }

    fn initialize(&mut self, attrs: &Attributes) -> Result<(), AttributeError> {
        attrs.reject_unknown(&[])?;
        self.ready = true;
        Ok(())
    }

    fn invoke(&mut self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        if !self.ready {
            bail!("Sum invoked before initialize");
        }
        let Some(first) = inputs.first() else {
            bail!("Sum expects at least one input");
        };
        let mut shape = first.shape().clone();
        for t in &inputs[1..] {
            shape = elementwise_shape("Sum", &shape, t.shape())?;
        }
        let mut acc = vec![0.0f32; shape.numel()];
        for t in inputs {
            let values = t.to_f32_vec()?;
            for (i, slot) in acc.iter_mut().enumerate() {
                *slot += values[i % values.len()];
            }
        }
        Ok(vec![Tensor::from_f32(shape, &acc)?])
    }
}
