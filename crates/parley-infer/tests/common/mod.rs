#![allow(dead_code)]

use parley_base::{ElementType, Tensor, TensorBuffer};
use parley_infer::{
    Backend, Delegate, Device, InferError, Interpreter, InterpreterOptions, TensorInfo,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub type Responder =
    Arc<dyn Fn(usize, &[TensorBuffer]) -> Result<Vec<TensorBuffer>, InferError> + Send + Sync>;

/// In-memory backend whose failures and outputs are scripted per test.
#[derive(Clone)]
pub struct ScriptedBackend {
    pub events: Arc<Mutex<Vec<String>>>,
    pub seen: Arc<Mutex<Vec<Vec<TensorBuffer>>>>,
    pub thread_counts: Arc<Mutex<Vec<usize>>>,
    pub probe_result: bool,
    pub probe_panics: bool,
    pub delegate_fails: bool,
    pub accelerated_build_fails: bool,
    pub warm_up_fails: bool,
    pub cpu_build_fails: bool,
    pub delegate_close_fails: bool,
    pub inputs: Vec<TensorInfo>,
    pub outputs: Vec<TensorInfo>,
    pub responder: Responder,
}

impl ScriptedBackend {
    pub fn new(inputs: Vec<TensorInfo>, outputs: Vec<TensorInfo>, responder: Responder) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            seen: Arc::new(Mutex::new(Vec::new())),
            thread_counts: Arc::new(Mutex::new(Vec::new())),
            probe_result: true,
            probe_panics: false,
            delegate_fails: false,
            accelerated_build_fails: false,
            warm_up_fails: false,
            cpu_build_fails: false,
            delegate_close_fails: false,
            inputs,
            outputs,
            responder,
        }
    }

    /// A single-input model echoing a zero float32 `[1, 4]` output.
    pub fn simple() -> Self {
        Self::new(
            vec![TensorInfo::new("x", vec![1, 4], ElementType::F32)],
            vec![TensorInfo::new("y", vec![1, 4], ElementType::F32)],
            Arc::new(|_, _| {
                Ok(vec![TensorBuffer::F32(
                    Tensor::new(vec![1, 4], vec![0.0; 4]).unwrap(),
                )])
            }),
        )
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn seen(&self) -> Vec<Vec<TensorBuffer>> {
        self.seen.lock().unwrap().clone()
    }

    fn record(&self, event: &str) {
        self.events.lock().unwrap().push(event.to_string());
    }
}

impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn probe(&self, _device: &Device) -> bool {
        if self.probe_panics {
            panic!("capability lookup failed");
        }
        self.probe_result
    }

    fn create_delegate(&self, device: &Device) -> Result<Box<dyn Delegate>, InferError> {
        if self.delegate_fails {
            return Err(InferError::UnsupportedDevice(device.clone()));
        }
        self.record("delegate.create");
        Ok(Box::new(ScriptedDelegate {
            device: device.clone(),
            events: self.events.clone(),
            close_fails: self.delegate_close_fails,
        }))
    }

    fn build_interpreter(
        &self,
        _model: &[u8],
        options: &InterpreterOptions,
        delegate: Option<&dyn Delegate>,
    ) -> Result<Box<dyn Interpreter>, InferError> {
        self.thread_counts.lock().unwrap().push(options.num_threads);
        let accelerated = delegate.is_some();
        if accelerated && self.accelerated_build_fails {
            return Err(InferError::Backend("delegate rejected the graph".to_string()));
        }
        if !accelerated && self.cpu_build_fails {
            return Err(InferError::Backend("corrupt model".to_string()));
        }
        self.record(if accelerated {
            "interpreter.build.accelerated"
        } else {
            "interpreter.build.cpu"
        });
        Ok(Box::new(ScriptedInterpreter {
            backend: self.clone(),
            warm_up_fails: accelerated && self.warm_up_fails,
            calls: AtomicUsize::new(0),
        }))
    }
}

struct ScriptedDelegate {
    device: Device,
    events: Arc<Mutex<Vec<String>>>,
    close_fails: bool,
}

impl Delegate for ScriptedDelegate {
    fn device(&self) -> &Device {
        &self.device
    }

    fn close(&mut self) -> Result<(), InferError> {
        self.events.lock().unwrap().push("delegate.close".to_string());
        if self.close_fails {
            return Err(InferError::Backend("driver went away".to_string()));
        }
        Ok(())
    }
}

struct ScriptedInterpreter {
    backend: ScriptedBackend,
    warm_up_fails: bool,
    calls: AtomicUsize,
}

impl Interpreter for ScriptedInterpreter {
    fn inputs(&self) -> &[TensorInfo] {
        &self.backend.inputs
    }

    fn outputs(&self) -> &[TensorInfo] {
        &self.backend.outputs
    }

    fn run(&mut self, inputs: &[TensorBuffer]) -> Result<Vec<TensorBuffer>, InferError> {
        self.backend.seen.lock().unwrap().push(inputs.to_vec());
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.backend.responder)(call, inputs)
    }

    fn warm_up(&mut self) -> Result<(), InferError> {
        if self.warm_up_fails {
            return Err(InferError::Inference("first run on accelerator failed".to_string()));
        }
        Ok(())
    }

    fn close(&mut self) {
        self.backend.record("interpreter.close");
    }
}

pub fn one_hot(len: usize, index: usize) -> Vec<f32> {
    let mut logits = vec![0.0; len];
    logits[index] = 10.0;
    logits
}

/// Text model over `vocab` ids with sequence dimension `max_seq` (`-1` for
/// dynamic). Call `n` returns `script[n]` as `[1, vocab]` logits, repeating
/// the last entry.
pub fn llm_backend(vocab: usize, max_seq: i64, script: Vec<Vec<f32>>) -> ScriptedBackend {
    ScriptedBackend::new(
        vec![TensorInfo::new("input_ids", vec![1, max_seq], ElementType::I32)],
        vec![TensorInfo::new("logits", vec![1, vocab as i64], ElementType::F32)],
        Arc::new(move |call, _| {
            let logits = script
                .get(call)
                .or_else(|| script.last())
                .cloned()
                .unwrap_or_default();
            Ok(vec![TensorBuffer::F32(Tensor::new(vec![1, vocab], logits)?)])
        }),
    )
}

/// Transcription model taking `[1, 80, 3000]` features and answering with
/// `tokens` as int32.
pub fn whisper_backend(tokens: Vec<i32>) -> ScriptedBackend {
    ScriptedBackend::new(
        vec![TensorInfo::new("input_features", vec![1, 80, 3000], ElementType::F32)],
        vec![TensorInfo::new("sequences", vec![1, -1], ElementType::I32)],
        Arc::new(move |_, _| {
            Ok(vec![TensorBuffer::I32(Tensor::new(
                vec![1, tokens.len()],
                tokens.clone(),
            )?)])
        }),
    )
}
