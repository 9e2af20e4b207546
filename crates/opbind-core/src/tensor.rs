use anyhow::{bail, ensure, Result};
use bytes::Bytes;
use smallvec::SmallVec;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    F32,
    I64,
    Bool,
}

impl DType {
    pub fn byte_size(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::I64 => 8,
            DType::Bool => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }
    pub fn scalar() -> Self {
        Self(SmallVec::new())
    }
    pub fn rank(&self) -> usize {
        self.0.len()
    }
    pub fn dims(&self) -> &[usize] {
        &self.0
    }
    /// Zero for any zero-sized dimension; one for a scalar.
    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }
}

#[derive(Clone, Debug)]
pub struct TensorDesc {
    pub dtype: DType,
    pub shape: Shape,
}

/// Dense host tensor. Data is little-endian and contiguous.
#[derive(Clone, Debug)]
pub struct Tensor {
    pub desc: TensorDesc,
    pub data: Bytes,
}

impl Tensor {
    pub fn from_bytes(dtype: DType, shape: Shape, data: Bytes) -> Result<Self> {
        let expected = shape.numel() * dtype.byte_size();
        ensure!(
            data.len() == expected,
            "tensor byte size mismatch: got {}, expected {}",
            data.len(),
            expected
        );
        Ok(Self {
            desc: TensorDesc { dtype, shape },
            data,
        })
    }

    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self> {
        let mut raw = Vec::with_capacity(values.len() * 4);
        for v in values {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        Self::from_bytes(DType::F32, shape, Bytes::from(raw))
    }

    pub fn from_i64(shape: Shape, values: &[i64]) -> Result<Self> {
        let mut raw = Vec::with_capacity(values.len() * 8);
        for v in values {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        Self::from_bytes(DType::I64, shape, Bytes::from(raw))
    }

    pub fn from_bool(shape: Shape, values: &[bool]) -> Result<Self> {
        let raw = values.iter().map(|v| u8::from(*v)).collect::<Vec<_>>();
        Self::from_bytes(DType::Bool, shape, Bytes::from(raw))
    }

    pub fn dtype(&self) -> DType {
        self.desc.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.desc.shape
    }

    pub fn numel(&self) -> usize {
        self.desc.shape.numel()
    }

    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        if self.desc.dtype != DType::F32 {
            bail!("expected f32 tensor, got {:?}", self.desc.dtype);
        }
        Ok(self
            .data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    pub fn to_i64_vec(&self) -> Result<Vec<i64>> {
        if self.desc.dtype != DType::I64 {
            bail!("expected i64 tensor, got {:?}", self.desc.dtype);
        }
        Ok(self
            .data
            .chunks_exact(8)
            .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect())
    }

    pub fn to_bool_vec(&self) -> Result<Vec<bool>> {
        if self.desc.dtype != DType::Bool {
            bail!("expected bool tensor, got {:?}", self.desc.dtype);
        }
        Ok(self.data.iter().map(|b| *b != 0).collect())
    }

    /// Same data, new shape. Element count must match.
    pub fn reshaped(&self, shape: Shape) -> Result<Self> {
        ensure!(
            shape.numel() == self.numel(),
            "cannot reshape {:?} into {:?}",
            self.desc.shape.dims(),
            shape.dims()
        );
        Ok(Self {
            desc: TensorDesc {
                dtype: self.desc.dtype,
                shape,
            },
            data: self.data.clone(),
        })
    }
}
