mod engine;
pub use engine::*;

mod generate;
pub use generate::*;

mod tokenizer;
pub use tokenizer::*;
