use anyhow::{bail, Result};
use opbind_core::{AttributeError, Attributes, Kernel, Tensor};

use super::expect_inputs;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryKind {
    Relu,
    LeakyRelu,
    Sigmoid,
    Tanh,
    Exp,
    Neg,
    Abs,
    Erf,
    Gelu,
    Identity,
}

/// Error function, Abramowitz and Stegun 7.1.26. Absolute error below 1.5e-7.
pub fn erf(x: f32) -> f32 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = f64::from(x).abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    (sign * (1.0 - poly * (-x * x).exp())) as f32
}

pub struct Unary {
    kind: UnaryKind,
    alpha: f32,
    ready: bool,
}

impl Unary {
    pub fn new(kind: UnaryKind) -> Self {
        Self {
            kind,
            alpha: 0.01,
            ready: false,
        }
    }

    fn apply(&self, x: f32) -> f32 {
        match self.kind {
            UnaryKind::Relu => x.max(0.0),
            UnaryKind::LeakyRelu => {
                if x < 0.0 {
                    self.alpha * x
                } else {
                    x
                }
            }
            UnaryKind::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            UnaryKind::Tanh => x.tanh(),
            UnaryKind::Exp => x.exp(),
            UnaryKind::Neg => -x,
            UnaryKind::Abs => x.abs(),
            UnaryKind::Erf => erf(x),
            UnaryKind::Gelu => 0.5 * x * (1.0 + erf(x / std::f32::consts::SQRT_2)),
            UnaryKind::Identity => x,
        }
    }
}

impl Kernel for Unary {
    fn kind(&self) -> &'static str {
        "cpu.Unary"
    }

    fn initialize(&mut self, attrs: &Attributes) -> Result<(), AttributeError> {
        if self.kind == UnaryKind::LeakyRelu {
            attrs.reject_unknown(&["alpha"])?;
            self.alpha = attrs.float_or("alpha", 0.01)?;
            if !self.alpha.is_finite() {
                return Err(AttributeError::invalid("alpha", "must be finite"));
            }
        } else {
            attrs.reject_unknown(&[])?;
        }
        self.ready = true;
        Ok(())
    }

    fn invoke(&mut self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        if !self.ready {
            bail!("{:?} invoked before initialize", self.kind);
        }
        expect_inputs(&format!("{:?}", self.kind), inputs, 1, 1)?;
        let input = &inputs[0];
        if self.kind == UnaryKind::Identity {
            return Ok(vec![input.clone()]);
        }
        let out = input
            .to_f32_vec()?
            .into_iter()
            .map(|x| self.apply(x))
            .collect::<Vec<_>>();
        Ok(vec![Tensor::from_f32(input.shape().clone(), &out)?])
    }
}
