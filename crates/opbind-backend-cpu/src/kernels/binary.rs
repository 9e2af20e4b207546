use anyhow::{bail, Result};
use opbind_core::{AttributeError, Attributes, DType, Kernel, Tensor};

use super::{elementwise_shape, expect_inputs};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryKind {
    Add,
    Sub,
    Mul,
    Div,
    PRelu,
    And,
    Or,
    Xor,
}

impl BinaryKind {
    fn is_logical(self) -> bool {
        matches!(self, BinaryKind::And | BinaryKind::Or | BinaryKind::Xor)
    }

    fn apply_f32(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryKind::Add => a + b,
            BinaryKind::Sub => a - b,
            BinaryKind::Mul => a * b,
            BinaryKind::Div => a / b,
            BinaryKind::PRelu => {
                if a < 0.0 {
                    a * b
                } else {
                    a
                }
            }
            BinaryKind::And | BinaryKind::Or | BinaryKind::Xor => unreachable!(),
        }
    }

    fn apply_bool(self, a: bool, b: bool) -> bool {
        match self {
            BinaryKind::And => a && b,
            BinaryKind::Or => a || b,
            BinaryKind::Xor => a ^ b,
            _ => unreachable!(),
        }
    }
}

/// Elementwise arithmetic (f32) and logical (bool) ops.
pub struct BinaryOp {
    kind: BinaryKind,
    ready: bool,
}

impl BinaryOp {
    pub fn new(kind: BinaryKind) -> Self {
        Self { kind, ready: false }
    }
}

impl Kernel for BinaryOp {
    fn kind(&self) -> &'static str {
        "cpu.BinaryOp"
    }

    fn initialize(&mut self, attrs: &Attributes) -> Result<(), AttributeError> {
        // Opset 7 replaced explicit broadcast flags with implicit broadcasting.
        for legacy in ["broadcast", "axis"] {
            if attrs.contains(legacy) {
                return Err(AttributeError::invalid(
                    legacy,
                    "legacy broadcast attributes are not supported since opset 7",
                ));
            }
        }
        attrs.reject_unknown(&[])?;
        self.ready = true;
        Ok(())
    }

    fn invoke(&mut self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        if !self.ready {
            bail!("{:?} invoked before initialize", self.kind);
        }
        let op = format!("{:?}", self.kind);
        expect_inputs(&op, inputs, 2, 2)?;
        let (a, b) = (&inputs[0], &inputs[1]);
        let shape = elementwise_shape(&op, a.shape(), b.shape())?;
        let n = shape.numel();

        if self.kind.is_logical() {
            let (x, y) = (a.to_bool_vec()?, b.to_bool_vec()?);
            let out = (0..n)
                .map(|i| self.kind.apply_bool(x[i % x.len()], y[i % y.len()]))
                .collect::<Vec<_>>();
            return Ok(vec![Tensor::from_bool(shape, &out)?]);
        }

        if a.dtype() != DType::F32 || b.dtype() != DType::F32 {
            bail!("{op} expects f32 inputs");
        }
        let (x, y) = (a.to_f32_vec()?, b.to_f32_vec()?);
        let out = (0..n)
            .map(|i| self.kind.apply_f32(x[i % x.len()], y[i % y.len()]))
            .collect::<Vec<_>>();
        Ok(vec![Tensor::from_f32(shape, &out)?])
    }
}
