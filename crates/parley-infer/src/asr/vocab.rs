use super::config::{SpecialTokens, WhisperVariant};
use crate::{InferError, Result};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;
use tokenizers::Tokenizer;

/// Magic number opening a combined filters-and-vocabulary asset ("NESU").
pub const VOCAB_MAGIC: u32 = 0x5553454e;

/// Token id to text lookup for transcription output.
pub trait Vocabulary {
    fn word_for_token(&self, id: i32) -> Option<Cow<'_, str>>;

    fn eot(&self) -> i32;
    fn transcribe(&self) -> i32;
    fn translate(&self) -> i32;

    /// Ids above end-of-text are markers (language, task, timestamps) and
    /// never produce text.
    fn is_control(&self, id: i32) -> bool {
        id > self.eot()
    }
}

/// In-memory id to word table.
#[derive(Debug, Clone)]
pub struct VocabTable {
    words: HashMap<i32, String>,
    special: SpecialTokens,
}

impl VocabTable {
    pub fn new(variant: WhisperVariant) -> Self {
        Self::with_special(variant.special_tokens())
    }

    pub fn with_special(special: SpecialTokens) -> Self {
        Self {
            words: HashMap::new(),
            special,
        }
    }

    pub fn with_words<S: Into<String>>(
        mut self,
        words: impl IntoIterator<Item = (i32, S)>,
    ) -> Self {
        self.words
            .extend(words.into_iter().map(|(id, word)| (id, word.into())));
        self
    }

    pub fn insert(&mut self, id: i32, word: impl Into<String>) {
        self.words.insert(id, word.into());
    }

    pub fn special(&self) -> &SpecialTokens {
        &self.special
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Vocabulary for VocabTable {
    fn word_for_token(&self, id: i32) -> Option<Cow<'_, str>> {
        self.words.get(&id).map(|word| Cow::Borrowed(word.as_str()))
    }

    fn eot(&self) -> i32 {
        self.special.eot
    }

    fn transcribe(&self) -> i32 {
        self.special.transcribe
    }

    fn translate(&self) -> i32 {
        self.special.translate
    }
}

/// Mel filter bank, `n_mel` rows of `n_fft` frequency-bin weights.
#[derive(Debug, Clone, PartialEq)]
pub struct MelFilters {
    pub n_mel: usize,
    pub n_fft: usize,
    pub data: Vec<f32>,
}

/// Read a combined filters-and-vocabulary asset.
pub fn load_filters_and_vocab(
    path: impl AsRef<Path>,
    variant: WhisperVariant,
) -> Result<(MelFilters, VocabTable)> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        InferError::Io(format!("failed to read vocabulary {}: {}", path.display(), e))
    })?;
    parse_filters_and_vocab(&bytes, variant)
}

/// Parse the asset layout, all integers little-endian:
///
/// ```text
/// u32 magic, i32 n_mel, i32 n_fft, f32 filters[n_mel * n_fft],
/// i32 n_vocab, n_vocab * (i32 len, u8 word[len])
/// ```
///
/// Ids from `n_vocab` up to the variant's vocabulary size get bracketed
/// placeholder names.
pub fn parse_filters_and_vocab(
    bytes: &[u8],
    variant: WhisperVariant,
) -> Result<(MelFilters, VocabTable)> {
    let mut reader = Reader { bytes, pos: 0 };

    let magic = reader.u32()?;
    if magic != VOCAB_MAGIC {
        return Err(InferError::Tokenizer(format!(
            "bad vocabulary magic {magic:#010x}, expected {VOCAB_MAGIC:#010x}"
        )));
    }

    let n_mel = reader.count()?;
    let n_fft = reader.count()?;
    let n_bytes = n_mel
        .checked_mul(n_fft)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| InferError::Tokenizer("filter dimensions overflow".to_string()))?;
    let data = reader
        .take(n_bytes)?
        .chunks_exact(4)
        .map(|word| f32::from_le_bytes([word[0], word[1], word[2], word[3]]))
        .collect();
    let filters = MelFilters { n_mel, n_fft, data };

    let n_vocab = reader.count()?;
    let mut table = VocabTable::new(variant);
    for id in 0..n_vocab {
        let len = reader.count()?;
        let word = reader.take(len)?;
        table.insert(id as i32, String::from_utf8_lossy(word));
    }

    let special = *table.special();
    for id in n_vocab..special.vocab_size {
        table.insert(id as i32, placeholder_word(id as i32, &special));
    }

    log::debug!(
        "loaded {n_mel}x{n_fft} mel filters and {} vocabulary entries",
        table.len()
    );
    Ok((filters, table))
}

fn placeholder_word(id: i32, special: &SpecialTokens) -> String {
    if id > special.beg {
        format!("[_TT_{}]", id - special.beg)
    } else if id == special.eot {
        "[_EOT_]".to_string()
    } else if id == special.sot {
        "[_SOT_]".to_string()
    } else if id == special.prev {
        "[_PREV_]".to_string()
    } else if id == special.not {
        "[_NOT_]".to_string()
    } else if id == special.beg {
        "[_BEG_]".to_string()
    } else {
        format!("[_extra_token_{id}]")
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                InferError::Tokenizer(format!("vocabulary truncated at byte {}", self.pos))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let mut word = [0u8; 4];
        word.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(word))
    }

    /// A non-negative i32 size field.
    fn count(&mut self) -> Result<usize> {
        let value = self.u32()? as i32;
        usize::try_from(value)
            .map_err(|_| InferError::Tokenizer(format!("negative size {value} in vocabulary")))
    }
}

/// Vocabulary backed by a `tokenizer.json`.
pub struct TokenizerVocabulary {
    tokenizer: Tokenizer,
    special: SpecialTokens,
}

impl TokenizerVocabulary {
    /// Special ids are read from the tokenizer when it names them, and taken
    /// from `variant` otherwise.
    pub fn new(tokenizer: Tokenizer, variant: WhisperVariant) -> Self {
        let mut special = variant.special_tokens();
        let lookup = |token: &str, fallback: i32| {
            tokenizer
                .token_to_id(token)
                .map_or(fallback, |id| id as i32)
        };
        special.eot = lookup("<|endoftext|>", special.eot);
        special.sot = lookup("<|startoftranscript|>", special.sot);
        special.translate = lookup("<|translate|>", special.translate);
        special.transcribe = lookup("<|transcribe|>", special.transcribe);
        special.not = lookup("<|notimestamps|>", special.not);
        Self { tokenizer, special }
    }

    pub fn from_file(path: impl AsRef<Path>, variant: WhisperVariant) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(path.as_ref())
            .map_err(|e| InferError::Tokenizer(format!("failed to load tokenizer: {e}")))?;
        Ok(Self::new(tokenizer, variant))
    }
}

impl Vocabulary for TokenizerVocabulary {
    fn word_for_token(&self, id: i32) -> Option<Cow<'_, str>> {
        let id = u32::try_from(id).ok()?;
        self.tokenizer.decode(&[id], false).ok().map(Cow::Owned)
    }

    fn eot(&self) -> i32 {
        self.special.eot
    }

    fn transcribe(&self) -> i32 {
        self.special.transcribe
    }

    fn translate(&self) -> i32 {
        self.special.translate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_names() {
        let special = WhisperVariant::English.special_tokens();
        assert_eq!(placeholder_word(special.eot, &special), "[_EOT_]");
        assert_eq!(placeholder_word(special.sot, &special), "[_SOT_]");
        assert_eq!(placeholder_word(special.prev, &special), "[_PREV_]");
        assert_eq!(placeholder_word(special.not, &special), "[_NOT_]");
        assert_eq!(placeholder_word(special.beg, &special), "[_BEG_]");
        assert_eq!(placeholder_word(special.beg + 3, &special), "[_TT_3]");
        assert_eq!(
            placeholder_word(special.translate, &special),
            format!("[_extra_token_{}]", special.translate)
        );
    }

    #[test]
    fn test_reader_rejects_truncation() {
        let mut reader = Reader {
            bytes: &[1, 2, 3],
            pos: 0,
        };
        assert!(reader.u32().is_err());
    }
}
