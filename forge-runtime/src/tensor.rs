use crate::dtype::{ElementBuffer, ElementType};

/// One declared model dimension. `-1` in `spec.md`'s vocabulary is
/// represented as [`Dimension::Symbolic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Fixed(usize),
    Symbolic,
}

/// Metadata for one named input or output of a loaded model.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub name: String,
    pub dtype: ElementType,
    pub shape: Vec<Dimension>,
}

impl NodeInfo {
    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

/// An owned tensor value: a dtype-tagged element buffer plus its concrete
/// shape at allocation or read time.
///
/// `DynTensor` is the facade's sole value type. The caller owns every
/// `DynTensor` it receives; the facade never retains a reference to it past
/// the call that produced it (`spec.md` §4.1).
#[derive(Debug, Clone)]
pub struct DynTensor {
    pub shape: Vec<usize>,
    pub data: ElementBuffer,
}

impl DynTensor {
    pub fn new(shape: Vec<usize>, data: ElementBuffer) -> Self {
        debug_assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "tensor shape does not match element count"
        );
        DynTensor { shape, data }
    }

    /// Zero-length (`seq = 0` at `dim`) tensor of the given dtype and shape,
    /// used to seed the KV-past slots of a session's first step.
    pub fn zeros(shape: Vec<usize>, dtype: ElementType) -> Self {
        let len = shape.iter().product();
        let data = match dtype {
            ElementType::Fp32 => ElementBuffer::Fp32(vec![0.0; len]),
            ElementType::Fp16 => ElementBuffer::Fp16(vec![half::f16::ZERO; len]),
            ElementType::Bf16 => ElementBuffer::Bf16(vec![half::bf16::ZERO; len]),
            ElementType::Int64 => ElementBuffer::Int64(vec![0; len]),
        };
        DynTensor { shape, data }
    }

    pub fn from_i64(shape: Vec<usize>, data: Vec<i64>) -> Self {
        DynTensor::new(shape, ElementBuffer::Int64(data))
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    pub fn dim(&self, axis: usize) -> usize {
        self.shape[axis]
    }
}
