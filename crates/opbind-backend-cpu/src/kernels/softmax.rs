use anyhow::{bail, Result};
use opbind_core::{AttributeError, Attributes, Kernel, Tensor};

use super::{expect_inputs, normalize_axis};

/// Softmax with the two historical axis semantics.
///
/// Before opset 13 the input is coerced to 2D at `axis` (default 1) and the
/// softmax runs over the flattened trailing block. From opset 13 it runs over
/// the single dimension `axis` (default -1).
pub struct Softmax {
    coerce_2d: bool,
    axis: Option<i64>,
}

impl Softmax {
    pub fn legacy() -> Self {
        Self {
            coerce_2d: true,
            axis: None,
        }
    }

    pub fn v13() -> Self {
        Self {
            coerce_2d: false,
            axis: None,
        }
    }
}

pub(crate) fn softmax_rows(data: &mut [f32], row: usize) {
    if row == 0 {
        return;
    }
    for chunk in data.chunks_mut(row) {
        let max = chunk.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for v in chunk.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        for v in chunk.iter_mut() {
            *v /= sum;
        }
    }
}

impl Kernel for Softmax {
    fn kind(&self) -> &'static str {
        "cpu.Softmax"
    }

    fn initialize(&mut self, attrs: &Attributes) -> Result<(), AttributeError> {
        attrs.reject_unknown(&["axis"])?;
        let default = if self.coerce_2d { 1 } else { -1 };
        self.axis = Some(attrs.int_or("axis", default)?);
        Ok(())
    }

    fn invoke(&mut self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        let Some(axis) = self.axis else {
            bail!("Softmax invoked before initialize");
        };
        expect_inputs("Softmax", inputs, 1, 1)?;
        let input = &inputs[0];
        let dims = input.shape().dims();
        let mut data = input.to_f32_vec()?;

        if self.coerce_2d {
            let axis = normalize_axis(axis, dims.len(), true)?;
            let row = dims[axis..].iter().product::<usize>().max(1);
            softmax_rows(&mut data, row);
        } else {
            let axis = normalize_axis(axis, dims.len(), false)?;
            let n = dims[axis];
            let inner = dims[axis + 1..].iter().product::<usize>();
            if inner == 1 {
                softmax_rows(&mut data, n);
            } else {
                // Gather each strided lane, normalize it, scatter back.
                let outer = dims[..axis].iter().product::<usize>();
                let mut lane = vec![0.0f32; n];
                for o in 0..outer {
                    for i in 0..inner {
                        let base = o * n * inner + i;
                        for (j, v) in lane.iter_mut().enumerate() {
                            *v = data[base + j * inner];
                        }
                        softmax_rows(&mut lane, n);
                        for (j, v) in lane.iter().enumerate() {
                            data[base + j * inner] = *v;
                        }
                    }
                }
            }
        }

        Ok(vec![Tensor::from_f32(input.shape().clone(), &data)?])
    }
}
