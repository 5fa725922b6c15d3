pub mod audio;
pub mod config;
pub mod token_decoder;
pub mod transcriber;
pub mod vocab;

pub use audio::{pad_or_truncate, read_wav, FeatureExtractor, LogMelSpectrogram};
pub use config::{SpecialTokens, WhisperVariant};
pub use token_decoder::{tokens_to_text, DecodeState, TextAssembler};
pub use transcriber::Transcriber;
pub use vocab::{load_filters_and_vocab, MelFilters, TokenizerVocabulary, VocabTable, Vocabulary};
