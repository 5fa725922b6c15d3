use super::vocab::Vocabulary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    Emitting,
    Stopped,
}

/// Maps output tokens to text until end-of-text.
///
/// Text tokens append their word, control tokens are consumed silently and
/// the first end-of-text token stops the assembler for good.
pub struct TextAssembler<'v, V: Vocabulary + ?Sized> {
    vocab: &'v V,
    state: DecodeState,
    text: String,
}

impl<'v, V: Vocabulary + ?Sized> TextAssembler<'v, V> {
    pub fn new(vocab: &'v V) -> Self {
        Self {
            vocab,
            state: DecodeState::Emitting,
            text: String::new(),
        }
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn push(&mut self, id: i32) -> DecodeState {
        if self.state == DecodeState::Stopped {
            return self.state;
        }

        if id == self.vocab.eot() {
            self.state = DecodeState::Stopped;
        } else if self.vocab.is_control(id) {
            if id == self.vocab.transcribe() {
                log::debug!("transcription marker");
            } else if id == self.vocab.translate() {
                log::debug!("translation marker");
            }
            log::debug!(
                "skipping token {id} ({})",
                self.vocab.word_for_token(id).as_deref().unwrap_or("?")
            );
        } else {
            match self.vocab.word_for_token(id) {
                Some(word) => self.text.push_str(&word),
                None => log::debug!("no word for token {id}"),
            }
        }
        self.state
    }

    pub fn finish(self) -> String {
        self.text
    }
}

/// Text for a token stream. Tokens after the first end-of-text are not read.
pub fn tokens_to_text<V: Vocabulary + ?Sized>(
    tokens: impl IntoIterator<Item = i32>,
    vocab: &V,
) -> String {
    let mut assembler = TextAssembler::new(vocab);
    for id in tokens {
        if assembler.push(id) == DecodeState::Stopped {
            break;
        }
    }
    assembler.finish()
}
