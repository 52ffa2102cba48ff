/// Text → token ids. Only used for statistics; output documents never depend on it.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;

    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// Cheap stand-in: one token per whitespace-separated word, ids are word byte lengths.
#[derive(Clone, Copy, Debug, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.split_whitespace().map(|w| w.len() as u32).collect()
    }

    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}
