use crate::{Interpreter, TensorInfo};

pub const DEFAULT_MAX_SEQ_LEN: usize = 512;
pub const DEFAULT_VOCAB_SIZE: usize = 32000;

/// Model properties fixed for the lifetime of a handle.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
    pub max_seq_len: usize,
    pub vocab_size: usize,
    pub inputs: Vec<TensorInfo>,
    pub outputs: Vec<TensorInfo>,
}

impl ModelMetadata {
    /// Read the declared tensors of a freshly built interpreter.
    ///
    /// The sequence length comes from dimension 1 of the first input and the
    /// vocabulary size from the last dimension of the first output. Missing
    /// or dynamic dimensions fall back to the defaults with a warning.
    pub fn extract(interpreter: &dyn Interpreter) -> Self {
        let inputs = interpreter.inputs().to_vec();
        let outputs = interpreter.outputs().to_vec();

        let max_seq_len = match inputs.first().and_then(|input| input.fixed_dim(1)) {
            Some(len) => len,
            None => {
                log::warn!(
                    "could not read sequence length from model inputs, using {DEFAULT_MAX_SEQ_LEN}"
                );
                DEFAULT_MAX_SEQ_LEN
            }
        };

        let vocab_size = match outputs
            .first()
            .and_then(|output| output.shape.len().checked_sub(1).and_then(|last| output.fixed_dim(last)))
        {
            Some(size) => size,
            None => {
                log::warn!(
                    "could not read vocabulary size from model outputs, using {DEFAULT_VOCAB_SIZE}"
                );
                DEFAULT_VOCAB_SIZE
            }
        };

        log::debug!("model metadata: max_seq_len={max_seq_len}, vocab_size={vocab_size}");
        Self {
            max_seq_len,
            vocab_size,
            inputs,
            outputs,
        }
    }
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self {
            max_seq_len: DEFAULT_MAX_SEQ_LEN,
            vocab_size: DEFAULT_VOCAB_SIZE,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}
