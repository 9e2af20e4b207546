use anyhow::{bail, ensure, Result};
use opbind_core::{AttributeError, Attributes, Kernel, Shape, Tensor};
use rayon::prelude::*;

fn same_or_scalar(op: &str, a: &Tensor, b: &Tensor) -> Result<Shape> {
    if a.shape() == b.shape() || b.numel() == 1 {
        Ok(a.shape().clone())
    } else if a.numel() == 1 {
        Ok(b.shape().clone())
    } else {
        bail!(
            "{op} shape mismatch: {:?} vs {:?}",
            a.shape().dims(),
            b.shape().dims()
        )
    }
}

fn no_attrs(attrs: &Attributes) -> Result<(), AttributeError> {
    attrs.reject_unknown(&[])
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParBinaryKind {
    Add,
    Sub,
    Mul,
    Div,
}

pub struct ParBinary {
    kind: ParBinaryKind,
    ready: bool,
}

impl ParBinary {
    pub fn new(kind: ParBinaryKind) -> Self {
        Self { kind, ready: false }
    }
}

impl Kernel for ParBinary {
    fn kind(&self) -> &'static str {
        "par.Binary"
    }

    fn initialize(&mut self, attrs: &Attributes) -> Result<(), AttributeError> {
        no_attrs(attrs)?;
        self.ready = true;
        Ok(())
    }

    fn invoke(&mut self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        ensure!(self.ready, "{:?} invoked before initialize", self.kind);
        ensure!(inputs.len() == 2, "{:?} expects 2 inputs", self.kind);
        let op = format!("{:?}", self.kind);
        let shape = same_or_scalar(&op, &inputs[0], &inputs[1])?;
        let (x, y) = (inputs[0].to_f32_vec()?, inputs[1].to_f32_vec()?);
        let kind = self.kind;
        let out = (0..shape.numel())
            .into_par_iter()
            .map(|i| {
                let (a, b) = (x[i % x.len()], y[i % y.len()]);
                match kind {
                    ParBinaryKind::Add => a + b,
                    ParBinaryKind::Sub => a - b,
                    ParBinaryKind::Mul => a * b,
                    ParBinaryKind::Div => a / b,
                }
            })
            .collect::<Vec<_>>();
        Ok(vec![Tensor::from_f32(shape, &out)?])
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParUnaryKind {
    Relu,
    Sigmoid,
}

pub struct ParUnary {
    kind: ParUnaryKind,
    ready: bool,
}

impl ParUnary {
    pub fn new(kind: ParUnaryKind) -> Self {
        Self { kind, ready: false }
    }
}

impl Kernel for ParUnary {
    fn kind(&self) -> &'static str {
        "par.Unary"
    }

    fn initialize(&mut self, attrs: &Attributes) -> Result<(), AttributeError> {
        no_attrs(attrs)?;
        self.ready = true;
        Ok(())
    }

    fn invoke(&mut self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        ensure!(self.ready, "{:?} invoked before initialize", self.kind);
        ensure!(inputs.len() == 1, "{:?} expects 1 input", self.kind);
        let mut data = inputs[0].to_f32_vec()?;
        match self.kind {
            ParUnaryKind::Relu => data.par_iter_mut().for_each(|v| *v = v.max(0.0)),
            ParUnaryKind::Sigmoid => data
                .par_iter_mut()
                .for_each(|v| *v = 1.0 / (1.0 + (-*v).exp())),
        }
        Ok(vec![Tensor::from_f32(inputs[0].shape().clone(), &data)?])
    }
}

/// Opset 13 softmax restricted to the last axis; rows run in parallel.
#[derive(Default)]
pub struct ParSoftmax {
    ready: bool,
}

impl Kernel for ParSoftmax {
    fn kind(&self) -> &'static str {
        "par.Softmax"
    }

    fn initialize(&mut self, attrs: &Attributes) -> Result<(), AttributeError> {
        attrs.reject_unknown(&["axis"])?;
        let axis = attrs.int_or("axis", -1)?;
        if axis != -1 {
            return Err(AttributeError::invalid(
                "axis",
                format!("only the last axis (-1) is supported, got {axis}"),
            ));
        }
        self.ready = true;
        Ok(())
    }

    fn invoke(&mut self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        ensure!(self.ready, "Softmax invoked before initialize");
        ensure!(inputs.len() == 1, "Softmax expects 1 input");
        let input = &inputs[0];
        let row = input.shape().dims().last().copied().unwrap_or(1).max(1);
        let mut data = input.to_f32_vec()?;
        data.par_chunks_mut(row).for_each(|chunk| {
            let max = chunk.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mut sum = 0.0;
            for v in chunk.iter_mut() {
                *v = (*v - max).exp();
                sum += *v;
            }
            for v in chunk.iter_mut() {
                *v /= sum;
            }
        });
        Ok(vec![Tensor::from_f32(input.shape().clone(), &data)?])
    }
}

/// 2D matrix product; output rows run in parallel.
#[derive(Default)]
pub struct ParMatMul {
    ready: bool,
}

impl Kernel for ParMatMul {
    fn kind(&self) -> &'static str {
        "par.MatMul"
    }

    fn initialize(&mut self, attrs: &Attributes) -> Result<(), AttributeError> {
        no_attrs(attrs)?;
        self.ready = true;
        Ok(())
    }

    fn invoke(&mut self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        ensure!(self.ready, "MatMul invoked before initialize");
        ensure!(inputs.len() == 2, "MatMul expects 2 inputs");
        let (ad, bd) = (inputs[0].shape().dims(), inputs[1].shape().dims());
        ensure!(
            ad.len() == 2 && bd.len() == 2,
            "par MatMul supports 2D operands only, got {:?} and {:?}",
            ad,
            bd
        );
        let (m, k, n) = (ad[0], ad[1], bd[1]);
        ensure!(k == bd[0], "MatMul inner dimension mismatch: {k} vs {}", bd[0]);
        let (a, b) = (inputs[0].to_f32_vec()?, inputs[1].to_f32_vec()?);

        let mut out = vec![0.0f32; m * n];
        out.par_chunks_mut(n.max(1)).enumerate().for_each(|(i, row)| {
            for p in 0..k {
                let lhs = a[i * k + p];
                for (j, slot) in row.iter_mut().enumerate() {
                    *slot += lhs * b[p * n + j];
                }
            }
        });
        Ok(vec![Tensor::from_f32(Shape::from_slice(&[m, n]), &out)?])
    }
}

#[derive(Default)]
pub struct ParSum {
    ready: bool,
}

impl Kernel for ParSum {
    fn kind(&self) -> &'static str {
        "par.Sum"
    }

    fn initialize(&mut self, attrs: &Attributes) -> Result<(), AttributeError> {
        no_attrs(attrs)?;
        self.ready = true;
        Ok(())
    }

    fn invoke(&mut self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        ensure!(self.ready, "Sum invoked before initialize");
        let Some(first) = inputs.first() else {
            bail!("Sum expects at least one input");
        };
        for t in &inputs[1..] {
            ensure!(
                t.shape() == first.shape(),
                "par Sum requires equal shapes: {:?} vs {:?}",
                first.shape().dims(),
                t.shape().dims()
            );
        }
        let columns = inputs
            .iter()
            .map(Tensor::to_f32_vec)
            .collect::<Result<Vec<_>>>()?;
        let out = (0..first.numel())
            .into_par_iter()
            .map(|i| columns.iter().map(|c| c[i]).sum::<f32>())
            .collect::<Vec<_>>();
        Ok(vec![Tensor::from_f32(first.shape().clone(), &out)?])
    }
}
