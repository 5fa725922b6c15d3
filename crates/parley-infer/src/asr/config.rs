// Audio processing constants
pub const SAMPLE_RATE: usize = 16000;
pub const N_FFT: usize = 400;
pub const HOP_LENGTH: usize = 160;
pub const N_MEL: usize = 80;
pub const CHUNK_LENGTH: usize = 30; // seconds
pub const N_SAMPLES: usize = CHUNK_LENGTH * SAMPLE_RATE; // 480000
pub const N_FRAMES: usize = N_SAMPLES / HOP_LENGTH; // 3000

/// Token ids with a fixed meaning in a Whisper vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub eot: i32,
    pub sot: i32,
    pub translate: i32,
    pub transcribe: i32,
    pub prev: i32,
    pub solm: i32,
    pub not: i32,
    pub beg: i32,
    /// Total number of ids, text and special.
    pub vocab_size: usize,
}

/// English-only and multilingual models number their special tokens one
/// apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhisperVariant {
    #[default]
    English,
    Multilingual,
}

impl WhisperVariant {
    pub fn special_tokens(self) -> SpecialTokens {
        let shift = match self {
            WhisperVariant::English => 0,
            WhisperVariant::Multilingual => 1,
        };
        SpecialTokens {
            eot: 50256 + shift,
            sot: 50257 + shift,
            translate: 50357 + shift,
            transcribe: 50358 + shift,
            prev: 50360 + shift,
            solm: 50361 + shift,
            not: 50362 + shift,
            beg: 50363 + shift,
            vocab_size: 51864 + shift as usize,
        }
    }
}
