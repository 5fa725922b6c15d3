use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    F32,
    I32,
    I64,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::F32 => write!(f, "float32"),
            ElementType::I32 => write!(f, "int32"),
            ElementType::I64 => write!(f, "int64"),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum TensorError {
    ShapeOverflow,
    ShapeMismatch { expected: usize, got: usize },
    ElementTypeMismatch { expected: ElementType, got: ElementType },
}

impl fmt::Display for TensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorError::ShapeOverflow => write!(f, "shape dimensions overflow when multiplied"),
            TensorError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {expected} elements, got {got}")
            }
            TensorError::ElementTypeMismatch { expected, got } => {
                write!(f, "element type mismatch: expected {expected}, got {got}")
            }
        }
    }
}

impl std::error::Error for TensorError {}

/// Number of elements described by `shape`.
pub fn element_count(shape: &[usize]) -> Result<usize, TensorError> {
    shape.iter().try_fold(1usize, |product, &dim| {
        product.checked_mul(dim).ok_or(TensorError::ShapeOverflow)
    })
}

/// Contiguous row-major buffer whose length always matches its shape.
///
/// Shape and data are fixed at construction; use `into_data` to take the
/// elements back out.
#[derive(Clone, PartialEq)]
pub struct Tensor<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T: fmt::Debug> fmt::Debug for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("data", &self.data)
            .finish()
    }
}

impl<T> Tensor<T> {
    pub fn new(shape: Vec<usize>, data: Vec<T>) -> Result<Self, TensorError> {
        let expected = element_count(&shape)?;
        if expected != data.len() {
            return Err(TensorError::ShapeMismatch {
                expected,
                got: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T: Default + Clone> Tensor<T> {
    pub fn zeros(shape: Vec<usize>) -> Result<Self, TensorError> {
        let count = element_count(&shape)?;
        Ok(Self {
            shape,
            data: vec![T::default(); count],
        })
    }
}

/// A tensor of one of the element types exchanged with a model.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorBuffer {
    F32(Tensor<f32>),
    I32(Tensor<i32>),
    I64(Tensor<i64>),
}

impl TensorBuffer {
    pub fn zeros(element_type: ElementType, shape: Vec<usize>) -> Result<Self, TensorError> {
        Ok(match element_type {
            ElementType::F32 => TensorBuffer::F32(Tensor::zeros(shape)?),
            ElementType::I32 => TensorBuffer::I32(Tensor::zeros(shape)?),
            ElementType::I64 => TensorBuffer::I64(Tensor::zeros(shape)?),
        })
    }

    /// Build an integer buffer of the requested type from token ids.
    pub fn from_ids(
        element_type: ElementType,
        shape: Vec<usize>,
        ids: &[i32],
    ) -> Result<Self, TensorError> {
        match element_type {
            ElementType::I32 => Ok(TensorBuffer::I32(Tensor::new(shape, ids.to_vec())?)),
            ElementType::I64 => Ok(TensorBuffer::I64(Tensor::new(
                shape,
                ids.iter().map(|&id| id as i64).collect(),
            )?)),
            ElementType::F32 => Err(TensorError::ElementTypeMismatch {
                expected: ElementType::I32,
                got: ElementType::F32,
            }),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            TensorBuffer::F32(_) => ElementType::F32,
            TensorBuffer::I32(_) => ElementType::I32,
            TensorBuffer::I64(_) => ElementType::I64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            TensorBuffer::F32(t) => t.shape(),
            TensorBuffer::I32(t) => t.shape(),
            TensorBuffer::I64(t) => t.shape(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorBuffer::F32(t) => t.len(),
            TensorBuffer::I32(t) => t.len(),
            TensorBuffer::I64(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_f32(&self) -> Result<&[f32], TensorError> {
        match self {
            TensorBuffer::F32(t) => Ok(t.data()),
            other => Err(TensorError::ElementTypeMismatch {
                expected: ElementType::F32,
                got: other.element_type(),
            }),
        }
    }

    /// Token ids held by an integer buffer. int64 values are narrowed.
    pub fn to_ids(&self) -> Result<Vec<i32>, TensorError> {
        match self {
            TensorBuffer::I32(t) => Ok(t.data().to_vec()),
            TensorBuffer::I64(t) => Ok(t.data().iter().map(|&v| v as i32).collect()),
            TensorBuffer::F32(_) => Err(TensorError::ElementTypeMismatch {
                expected: ElementType::I32,
                got: ElementType::F32,
            }),
        }
    }
}

impl From<Tensor<f32>> for TensorBuffer {
    fn from(tensor: Tensor<f32>) -> Self {
        TensorBuffer::F32(tensor)
    }
}

impl From<Tensor<i32>> for TensorBuffer {
    fn from(tensor: Tensor<i32>) -> Self {
        TensorBuffer::I32(tensor)
    }
}

impl From<Tensor<i64>> for TensorBuffer {
    fn from(tensor: Tensor<i64>) -> Self {
        TensorBuffer::I64(tensor)
    }
}
