use super::{LlmEngine, PromptTokenizer};
use crate::{sampler, GenerationConfig, InferError, Result};
use rand::Rng;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Prompt plus generated tokens, append-only and bounded by the model's
/// context length.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSequence {
    tokens: Vec<i32>,
    prompt_len: usize,
    capacity: usize,
}

impl TokenSequence {
    /// Start from `prompt`, keeping at most `capacity` of its tokens.
    pub fn new(prompt: &[i32], capacity: usize) -> Self {
        let prompt = &prompt[..prompt.len().min(capacity)];
        Self {
            tokens: prompt.to_vec(),
            prompt_len: prompt.len(),
            capacity,
        }
    }

    /// Append a token. Returns `false` and leaves the sequence unchanged when
    /// it is already full.
    pub fn push(&mut self, id: i32) -> bool {
        if self.is_full() {
            return false;
        }
        self.tokens.push(id);
        true
    }

    pub fn is_full(&self) -> bool {
        self.tokens.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.tokens
    }

    pub fn prompt(&self) -> &[i32] {
        &self.tokens[..self.prompt_len]
    }

    pub fn generated(&self) -> &[i32] {
        &self.tokens[self.prompt_len..]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    pub max_tokens: usize,
    pub config: GenerationConfig,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            config: GenerationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LlmToken {
    Text(String),
    Eos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model produced its end-of-sequence token.
    Eos,
    /// `max_tokens` tokens were generated.
    MaxTokens,
    /// The sequence reached the model's context length.
    ContextFull,
    /// The logits were empty and no token could be picked.
    NoToken,
    /// The token callback asked to stop.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub tokens: Vec<i32>,
    pub stop: StopReason,
}

/// Autoregressive loop over `engine`.
///
/// Each step runs the whole sequence through the model and picks the next
/// token: greedily when the temperature is zero or below, otherwise by
/// temperature and top-K sampling. The end-of-sequence token is not part of
/// the result. `on_token` sees every generated token and returns `false` to
/// stop early.
///
/// The context length is checked after each token, so a prompt that already
/// fills the context still gets one forward pass and at most one token.
pub fn generate_tokens<R: Rng + ?Sized>(
    engine: &mut LlmEngine,
    prompt: &[i32],
    options: &GenerateOptions,
    is_eos: impl Fn(i32) -> bool,
    rng: &mut R,
    mut on_token: impl FnMut(i32) -> bool,
) -> Result<Generation> {
    if !engine.is_initialized() {
        return Err(InferError::NotInitialized);
    }
    options.config.validate()?;

    let mut sequence = TokenSequence::new(prompt, engine.max_seq_len());
    let mut generated = Vec::new();
    let mut stop = StopReason::MaxTokens;

    for _ in 0..options.max_tokens {
        let logits = engine.run_inference(sequence.as_slice())?;
        let next = if options.config.temperature <= 0.0 {
            sampler::greedy_decode(&logits)
        } else {
            sampler::sample_token(&logits, &options.config, rng)
        };

        let Some(next) = next else {
            stop = StopReason::NoToken;
            break;
        };
        let id = next as i32;
        if is_eos(id) {
            stop = StopReason::Eos;
            break;
        }

        generated.push(id);
        let appended = sequence.push(id);
        if !on_token(id) {
            stop = StopReason::Cancelled;
            break;
        }
        if !appended || sequence.is_full() {
            stop = StopReason::ContextFull;
            break;
        }
    }

    log::debug!("generated {} tokens, stopped: {:?}", generated.len(), stop);
    Ok(Generation {
        tokens: generated,
        stop,
    })
}

/// Prompt-in, text-out generation over an engine and its tokenizer.
pub struct TextGenerator<T: PromptTokenizer> {
    engine: LlmEngine,
    tokenizer: T,
}

impl<T: PromptTokenizer> TextGenerator<T> {
    pub fn new(engine: LlmEngine, tokenizer: T) -> Self {
        Self { engine, tokenizer }
    }

    pub fn engine(&self) -> &LlmEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut LlmEngine {
        &mut self.engine
    }

    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }

    pub fn generate_content(&mut self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        let Self { engine, tokenizer } = self;
        if !engine.is_initialized() {
            return Err(InferError::NotInitialized);
        }
        let ids = tokenizer.encode(prompt)?;
        let generation = generate_tokens(
            engine,
            &ids,
            options,
            |id| tokenizer.is_eos(id),
            &mut rand::thread_rng(),
            |_| true,
        )?;
        tokenizer.decode(&generation.tokens)
    }

    /// Generate and send each token's text over `tx` as it is produced,
    /// finishing with `LlmToken::Eos`.
    ///
    /// Sends block, so this must run on a blocking thread (for example
    /// `tokio::task::spawn_blocking`). Dropping the receiver stops generation.
    pub fn generate_content_stream(
        &mut self,
        prompt: &str,
        options: &GenerateOptions,
        tx: &mpsc::Sender<LlmToken>,
    ) -> Result<Generation> {
        let Self { engine, tokenizer } = self;
        if !engine.is_initialized() {
            return Err(InferError::NotInitialized);
        }
        let ids = tokenizer.encode(prompt)?;

        let mut decode_error = None;
        let generation = generate_tokens(
            engine,
            &ids,
            options,
            |id| tokenizer.is_eos(id),
            &mut rand::thread_rng(),
            |id| {
                let text = match tokenizer.decode_token(id) {
                    Ok(text) => text,
                    Err(err) => {
                        decode_error = Some(err);
                        return false;
                    }
                };
                text.is_empty() || tx.blocking_send(LlmToken::Text(text)).is_ok()
            },
        )?;

        if let Some(err) = decode_error {
            return Err(err);
        }
        if generation.stop != StopReason::Cancelled {
            // receiver may already be gone
            let _ = tx.blocking_send(LlmToken::Eos);
        }
        Ok(generation)
    }
}

/// Receiving end of a streaming generation as a `Stream`.
pub struct TokenStream {
    rx: mpsc::Receiver<LlmToken>,
}

impl TokenStream {
    pub fn new(rx: mpsc::Receiver<LlmToken>) -> Self {
        Self { rx }
    }
}

impl futures_core::Stream for TokenStream {
    type Item = LlmToken;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
