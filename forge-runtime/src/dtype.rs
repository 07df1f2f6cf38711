//! Element types surfaced by the tensor-graph runtime.
//!
//! The runtime may produce tensors in `fp32`, `fp16`, `bf16` or `int64`. The
//! sampling pipeline always works in `f32`; everything upstream of it keeps
//! the runtime's native dtype so KV-cache memory growth stays under the
//! model's control rather than ballooning to `f32`.

use half::{bf16, f16};

/// Tag describing the element type backing a [`crate::tensor::DynTensor`].
///
/// This tag is switched on exactly once, at the point where a tensor's raw
/// bytes are read out of the runtime. It must never leak past that boundary:
/// callers downstream of `to_f32` only ever see `f32` slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Fp32,
    Fp16,
    Bf16,
    Int64,
}

impl ElementType {
    /// Size in bytes of one element of this type.
    pub fn byte_size(self) -> usize {
        match self {
            ElementType::Fp32 => 4,
            ElementType::Fp16 => 2,
            ElementType::Bf16 => 2,
            ElementType::Int64 => 8,
        }
    }
}

/// Owned, dtype-tagged element buffer for a tensor.
///
/// This is the one place dtype dispatch happens; every other module in the
/// workspace either consumes `Int64` buffers (token ids, masks) or `f32`
/// slices obtained via [`ElementBuffer::to_f32`].
#[derive(Debug, Clone)]
pub enum ElementBuffer {
    Fp32(Vec<f32>),
    Fp16(Vec<f16>),
    Bf16(Vec<bf16>),
    Int64(Vec<i64>),
}

impl ElementBuffer {
    pub fn element_type(&self) -> ElementType {
        match self {
            ElementBuffer::Fp32(_) => ElementType::Fp32,
            ElementBuffer::Fp16(_) => ElementType::Fp16,
            ElementBuffer::Bf16(_) => ElementType::Bf16,
            ElementBuffer::Int64(_) => ElementType::Int64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ElementBuffer::Fp32(v) => v.len(),
            ElementBuffer::Fp16(v) => v.len(),
            ElementBuffer::Bf16(v) => v.len(),
            ElementBuffer::Int64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widen to `f32`, element by element. This is the only place a float
    /// dtype is converted; the result is always a fresh, owned `Vec<f32>`.
    ///
    /// Panics if called on an `Int64` buffer -- callers must not treat token
    /// ids as floating-point data.
    pub fn to_f32(&self) -> Vec<f32> {
        match self {
            ElementBuffer::Fp32(v) => v.clone(),
            ElementBuffer::Fp16(v) => v.iter().map(|x| x.to_f32()).collect(),
            ElementBuffer::Bf16(v) => v.iter().map(|x| x.to_f32()).collect(),
            ElementBuffer::Int64(_) => panic!("cannot widen an int64 buffer to f32"),
        }
    }

    /// View the buffer as `i64`s. Panics on a float buffer.
    pub fn as_i64(&self) -> &[i64] {
        match self {
            ElementBuffer::Int64(v) => v,
            _ => panic!("expected an int64 buffer"),
        }
    }
}
