use crate::{probe, Device, InferError};
use parley_base::{ElementType, TensorBuffer};

/// Declared tensor of a loaded model. Dynamic dimensions are `-1`.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorInfo {
    pub name: String,
    pub shape: Vec<i64>,
    pub element_type: ElementType,
}

impl TensorInfo {
    pub fn new(name: impl Into<String>, shape: Vec<i64>, element_type: ElementType) -> Self {
        Self {
            name: name.into(),
            shape,
            element_type,
        }
    }

    /// Size of dimension `index`, if declared and fixed.
    pub fn fixed_dim(&self, index: usize) -> Option<usize> {
        self.shape
            .get(index)
            .copied()
            .filter(|&dim| dim > 0)
            .map(|dim| dim as usize)
    }

    /// Whether `shape` can be fed to this tensor: same rank, and every fixed
    /// dimension matches.
    pub fn accepts(&self, shape: &[usize]) -> bool {
        self.shape.len() == shape.len()
            && self
                .shape
                .iter()
                .zip(shape)
                .all(|(&declared, &actual)| declared <= 0 || declared as usize == actual)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterpreterOptions {
    pub num_threads: usize,
}

/// Accelerator resource attached to an interpreter.
pub trait Delegate: Send {
    fn device(&self) -> &Device;

    /// Release the accelerator resource. Called after the interpreter bound
    /// to it has been closed.
    fn close(&mut self) -> Result<(), InferError>;
}

/// A loaded computation graph able to run forward passes.
pub trait Interpreter: Send {
    fn inputs(&self) -> &[TensorInfo];
    fn outputs(&self) -> &[TensorInfo];

    /// Run one forward pass. Outputs are returned in declared order.
    fn run(&mut self, inputs: &[TensorBuffer]) -> Result<Vec<TensorBuffer>, InferError>;

    /// First-use check run right after an accelerated build.
    fn warm_up(&mut self) -> Result<(), InferError> {
        Ok(())
    }

    fn close(&mut self);
}

/// An inference runtime able to build interpreters from serialized models.
pub trait Backend {
    fn name(&self) -> &str;

    fn probe(&self, device: &Device) -> bool {
        probe::accelerator_available(device)
    }

    fn create_delegate(&self, device: &Device) -> Result<Box<dyn Delegate>, InferError>;

    fn build_interpreter(
        &self,
        model: &[u8],
        options: &InterpreterOptions,
        delegate: Option<&dyn Delegate>,
    ) -> Result<Box<dyn Interpreter>, InferError>;
}
