//! Token count estimation for answer metrics.

/// Estimates how many model tokens a text occupies.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// Counts whitespace-separated words, never less than one.
///
/// A rough proxy rather than a tokenizer; swap in a real one through
/// [`TokenEstimator`] when exact counts matter.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordCountEstimator;

impl TokenEstimator for WordCountEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.split_whitespace().count().max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count() {
        assert_eq!(WordCountEstimator.estimate("one two  three\nfour"), 4);
    }

    #[test]
    fn test_minimum_of_one() {
        assert_eq!(WordCountEstimator.estimate(""), 1);
        assert_eq!(WordCountEstimator.estimate("   \n\t"), 1);
    }
}
