use anyhow::{bail, ensure, Result};
use opbind_core::{AttributeError, Attributes, Kernel, Shape, Tensor};

use super::expect_inputs;

pub(crate) fn matmul_2d(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; m * n];
    for i in 0..m {
        for p in 0..k {
            let lhs = a[i * k + p];
            for j in 0..n {
                out[i * n + j] += lhs * b[p * n + j];
            }
        }
    }
    out
}

/// Matrix product of `[.., m, k]` by `[k, n]` or by `[.., k, n]` with the
/// same leading dimensions.
#[derive(Default)]
pub struct MatMul {
    ready: bool,
}

impl Kernel for MatMul {
    fn kind(&self) -> &'static str {
        "cpu.MatMul"
    }

    fn initialize(&mut self, attrs: &Attributes) -> Result<(), AttributeError> {
        attrs.reject_unknown(&[])?;
        self.ready = true;
        Ok(())
    }

    fn invoke(&mut self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        if !self.ready {
            bail!("MatMul invoked before initialize");
        }
        expect_inputs("MatMul", inputs, 2, 2)?;
        let (a, b) = (&inputs[0], &inputs[1]);
        let (ad, bd) = (a.shape().dims(), b.shape().dims());
        ensure!(
            ad.len() >= 2 && bd.len() >= 2,
            "MatMul expects rank >= 2 operands, got {:?} and {:?}",
            ad,
            bd
        );
        let (m, k) = (ad[ad.len() - 2], ad[ad.len() - 1]);
        let (kb, n) = (bd[bd.len() - 2], bd[bd.len() - 1]);
        ensure!(k == kb, "MatMul inner dimension mismatch: {k} vs {kb}");

        let batch_dims = &ad[..ad.len() - 2];
        let shared_rhs = bd.len() == 2;
        ensure!(
            shared_rhs || &bd[..bd.len() - 2] == batch_dims,
            "MatMul batch dimensions differ: {:?} vs {:?}",
            ad,
            bd
        );
        let batch = batch_dims.iter().product::<usize>();

        let (x, y) = (a.to_f32_vec()?, b.to_f32_vec()?);
        let mut out = Vec::with_capacity(batch * m * n);
        for bi in 0..batch {
            let lhs = &x[bi * m * k..(bi + 1) * m * k];
            let rhs = if shared_rhs {
                &y[..]
            } else {
                &y[bi * k * n..(bi + 1) * k * n]
            };
            out.extend(matmul_2d(lhs, rhs, m, k, n));
        }

        let mut shape = batch_dims.to_vec();
        shape.extend([m, n]);
        Ok(vec![Tensor::from_f32(Shape::from_slice(&shape), &out)?])
    }
}

/// `alpha * A' * B' + beta * C` with optional transposes and an optional,
/// broadcastable bias `C`.
pub struct Gemm {
    alpha: f32,
    beta: f32,
    trans_a: bool,
    trans_b: bool,
    ready: bool,
}

impl Default for Gemm {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
            trans_a: false,
            trans_b: false,
            ready: false,
        }
    }
}

fn flag(attrs: &Attributes, name: &str) -> Result<bool, AttributeError> {
    match attrs.int_or(name, 0)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(AttributeError::invalid(
            name,
            format!("must be 0 or 1, got {other}"),
        )),
    }
}

fn transpose(data: &[f32], rows: usize, cols: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; data.len()];
    for r in 0..rows {
        for c in 0..cols {
            out[c * rows + r] = data[r * cols + c];
        }
    }
    out
}

impl Kernel for Gemm {
    fn kind(&self) -> &'static str {
        "cpu.Gemm"
    }

    fn initialize(&mut self, attrs: &Attributes) -> Result<(), AttributeError> {
        attrs.reject_unknown(&["alpha", "beta", "transA", "transB"])?;
        self.alpha = attrs.float_or("alpha", 1.0)?;
        self.beta = attrs.float_or("beta", 1.0)?;
        self.trans_a = flag(attrs, "transA")?;
        self.trans_b = flag(attrs, "transB")?;
        self.ready = true;
        Ok(())
    }

    fn invoke(&mut self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        if !self.ready {
            bail!("Gemm invoked before initialize");
        }
        expect_inputs("Gemm", inputs, 2, 3)?;
        let (a, b) = (&inputs[0], &inputs[1]);
        let (ad, bd) = (a.shape().dims(), b.shape().dims());
        ensure!(
            ad.len() == 2 && bd.len() == 2,
            "Gemm expects 2D operands, got {:?} and {:?}",
            ad,
            bd
        );

        let mut x = a.to_f32_vec()?;
        let (mut m, mut k) = (ad[0], ad[1]);
        if self.trans_a {
            x = transpose(&x, m, k);
            std::mem::swap(&mut m, &mut k);
        }
        let mut y = b.to_f32_vec()?;
        let (mut kb, mut n) = (bd[0], bd[1]);
        if self.trans_b {
            y = transpose(&y, kb, n);
            std::mem::swap(&mut kb, &mut n);
        }
        ensure!(k == kb, "Gemm inner dimension mismatch: {k} vs {kb}");

        let mut out = matmul_2d(&x, &y, m, k, n);
        for v in out.iter_mut() {
            *v *= self.alpha;
        }

        if let Some(c) = inputs.get(2) {
            let bias = c.to_f32_vec()?;
            let cd = c.shape().dims();
            let row_bias = bias.len() == n && (cd.len() == 1 || cd == [1, n]);
            ensure!(
                bias.len() == 1 || row_bias || cd == [m, n],
                "Gemm bias shape {:?} does not broadcast to [{m}, {n}]",
                cd
            );
            for i in 0..m {
                for j in 0..n {
                    let cv = if bias.len() == 1 {
                        bias[0]
                    } else if row_bias {
                        bias[j]
                    } else {
                        bias[i * n + j]
                    };
                    out[i * n + j] += self.beta * cv;
                }
            }
        }

        Ok(vec![Tensor::from_f32(Shape::from_slice(&[m, n]), &out)?])
    }
}
