mod binary;
mod matmul;
mod reshape;
mod softmax;
mod sum;
mod unary;

pub use binary::{BinaryKind, BinaryOp};
pub use matmul::{Gemm, MatMul};
pub use reshape::Flatten;
pub use softmax::Softmax;
pub use sum::Sum;
pub use unary::{erf, Unary, UnaryKind};

use anyhow::{ensure, Result};
use opbind_core::{Shape, Tensor};

pub(crate) fn expect_inputs(op: &str, inputs: &[Tensor], min: usize, max: usize) -> Result<()> {
    ensure!(
        inputs.len() >= min && inputs.len() <= max,
        "{op} expects {min}..={max} inputs, got {}",
        inputs.len()
    );
    Ok(())
}

/// Output shape of an elementwise op over two operands. Shapes must match
/// unless one side is a single element, so a non-empty output never indexes
/// an empty operand.
pub(crate) fn elementwise_shape(op: &str, a: &Shape, b: &Shape) -> Result<Shape> {
    if a == b {
        return Ok(a.clone());
    }
    if b.numel() == 1 {
        return Ok(a.clone());
    }
    if a.numel() == 1 {
        return Ok(b.clone());
    }
    anyhow::bail!(
        "{op} shape mismatch: {:?} vs {:?}",
        a.dims(),
        b.dims()
    )
}

/// Resolves a possibly negative axis against `rank`. `inclusive` allows
/// `axis == rank`, as Flatten does.
pub(crate) fn normalize_axis(axis: i64, rank: usize, inclusive: bool) -> Result<usize> {
    let rank = rank as i64;
    let upper = if inclusive { rank } else { rank - 1 };
    let resolved = if axis < 0 { axis + rank } else { axis };
    ensure!(
        (0..=upper).contains(&resolved),
        "axis {axis} out of range for rank {rank}"
    );
    Ok(resolved as usize)
}
