use crate::{InferError, Result};
use std::collections::HashMap;
use std::path::Path;
use tokenizers::Tokenizer;

const SPACE_MARKER: char = '\u{2581}';

/// Text to token ids and back, for prompting a text model.
pub trait PromptTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<i32>>;
    fn decode(&self, ids: &[i32]) -> Result<String>;

    /// Text of one generated token, for streaming.
    fn decode_token(&self, id: i32) -> Result<String> {
        self.decode(&[id])
    }

    fn is_eos(&self, id: i32) -> bool;
}

/// Word-level tokenizer over a plain-text vocabulary.
///
/// The vocabulary has one token per line, optionally followed by a score
/// separated by a tab or space. Ids are assigned in line order, skipping
/// blank lines.
#[derive(Debug, Clone)]
pub struct VocabTokenizer {
    token_to_id: HashMap<String, i32>,
    id_to_token: Vec<String>,
    unk_token: String,
    pub bos_id: i32,
    pub eos_id: i32,
    pub pad_id: i32,
    pub unk_id: i32,
    pub add_bos: bool,
}

impl VocabTokenizer {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            InferError::Tokenizer(format!("failed to read vocabulary {}: {}", path.display(), e))
        })?;
        let tokenizer = Self::from_lines(text.lines());
        if tokenizer.is_empty() {
            return Err(InferError::Tokenizer(format!(
                "vocabulary {} is empty",
                path.display()
            )));
        }
        Ok(tokenizer)
    }

    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut tokenizer = Self {
            token_to_id: HashMap::new(),
            id_to_token: Vec::new(),
            unk_token: "<unk>".to_string(),
            bos_id: 1,
            eos_id: 2,
            pad_id: 0,
            unk_id: 3,
            add_bos: true,
        };

        for line in lines {
            let Some(token) = line.trim().split(['\t', ' ']).next().filter(|t| !t.is_empty())
            else {
                continue;
            };
            let id = tokenizer.id_to_token.len() as i32;
            match token {
                "<s>" | "<bos>" | "[BOS]" => tokenizer.bos_id = id,
                "</s>" | "<eos>" | "[EOS]" => tokenizer.eos_id = id,
                "<pad>" | "[PAD]" => tokenizer.pad_id = id,
                "<unk>" | "[UNK]" => {
                    tokenizer.unk_id = id;
                    tokenizer.unk_token = token.to_string();
                }
                _ => {}
            }
            tokenizer.token_to_id.insert(token.to_string(), id);
            tokenizer.id_to_token.push(token.to_string());
        }

        log::debug!(
            "loaded vocabulary with {} tokens, bos={}, eos={}",
            tokenizer.len(),
            tokenizer.bos_id,
            tokenizer.eos_id
        );
        tokenizer
    }

    pub fn len(&self) -> usize {
        self.id_to_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_token.is_empty()
    }

    pub fn token_id(&self, token: &str) -> Option<i32> {
        self.token_to_id.get(token).copied()
    }

    fn is_special(&self, id: i32) -> bool {
        id == self.bos_id || id == self.eos_id || id == self.pad_id
    }

    fn token_text(&self, id: i32) -> &str {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.id_to_token.get(index))
            .map_or(self.unk_token.as_str(), String::as_str)
    }
}

impl PromptTokenizer for VocabTokenizer {
    /// Whitespace-separated words, each looked up as `▁word`, ` word` and
    /// `word`, falling back to one id per character (unknown characters map to
    /// the unk id).
    fn encode(&self, text: &str) -> Result<Vec<i32>> {
        let mut ids = Vec::new();
        if self.add_bos {
            ids.push(self.bos_id);
        }
        for word in text.split_whitespace() {
            let found = [format!("{SPACE_MARKER}{word}"), format!(" {word}")]
                .iter()
                .find_map(|candidate| self.token_id(candidate))
                .or_else(|| self.token_id(word));
            match found {
                Some(id) => ids.push(id),
                None => {
                    let mut buf = [0u8; 4];
                    ids.extend(
                        word.chars()
                            .map(|c| self.token_id(c.encode_utf8(&mut buf)).unwrap_or(self.unk_id)),
                    );
                }
            }
        }
        Ok(ids)
    }

    fn decode(&self, ids: &[i32]) -> Result<String> {
        let text: String = ids
            .iter()
            .filter(|&&id| !self.is_special(id))
            .map(|&id| self.token_text(id))
            .collect();
        Ok(text.replace(SPACE_MARKER, " ").trim().to_string())
    }

    fn decode_token(&self, id: i32) -> Result<String> {
        if self.is_special(id) {
            return Ok(String::new());
        }
        Ok(self.token_text(id).replace(SPACE_MARKER, " "))
    }

    fn is_eos(&self, id: i32) -> bool {
        id == self.eos_id
    }
}

/// A `tokenizer.json` tokenizer.
pub struct HfTokenizer {
    tokenizer: Tokenizer,
    eos_ids: Vec<i32>,
}

impl HfTokenizer {
    /// Load `tokenizer.json`. End of sequence is whichever of the usual EOS
    /// spellings the vocabulary contains.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path.as_ref())
            .map_err(|e| InferError::Tokenizer(format!("failed to load tokenizer: {e}")))?;
        let eos_ids = ["</s>", "<eos>", "<|endoftext|>", "<|end_of_text|>", "<|im_end|>", "<|eot_id|>"]
            .iter()
            .filter_map(|token| tokenizer.token_to_id(token))
            .map(|id| id as i32)
            .collect();
        Ok(Self::new(tokenizer, eos_ids))
    }

    pub fn new(tokenizer: Tokenizer, eos_ids: Vec<i32>) -> Self {
        Self { tokenizer, eos_ids }
    }
}

impl PromptTokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<i32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| InferError::Tokenizer(format!("encode failed: {e}")))?;
        Ok(encoding.get_ids().iter().map(|&id| id as i32).collect())
    }

    fn decode(&self, ids: &[i32]) -> Result<String> {
        let ids: Vec<u32> = ids.iter().filter(|&&id| id >= 0).map(|&id| id as u32).collect();
        self.tokenizer
            .decode(&ids, true)
            .map_err(|e| InferError::Tokenizer(format!("decode failed: {e}")))
    }

    /// Raw vocabulary spelling with word-boundary markers turned into spaces.
    /// Special tokens decode to nothing.
    fn decode_token(&self, id: i32) -> Result<String> {
        if id < 0 || self.is_eos(id) {
            return Ok(String::new());
        }
        let Some(token) = self.tokenizer.id_to_token(id as u32) else {
            return Ok(String::new());
        };
        if self.tokenizer.get_added_vocabulary().is_special_token(&token) {
            return Ok(String::new());
        }
        Ok(token.replace([SPACE_MARKER, '\u{0120}'], " "))
    }

    fn is_eos(&self, id: i32) -> bool {
        self.eos_ids.contains(&id)
    }
}
