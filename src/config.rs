use crate::error::{Error, Result};
use crate::splitter::{LineTokenSplitter, RecursiveCharacterSplitter, TextSplitter};
use crate::token::TokenizerKind;
use std::sync::Arc;

const DEFAULT_CHUNK_SIZE: usize = 4_000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Separators tried in order by the recursive splitter.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// How raw text is cut into documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitStrategy {
    /// Recursive split on a separator hierarchy, merged up to the chunk size
    #[default]
    Recursive,
    /// Line-aligned chunks budgeted in estimated tokens
    LineTokens,
}

/// Configuration for splitting raw text before combination.
///
/// Use [`SplitterConfig::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SplitterConfig {
    /// Splitting strategy
    pub strategy: SplitStrategy,

    /// Maximum chunk length (characters, or tokens when a tokenizer is set)
    pub chunk_size: usize,

    /// Length carried over from the end of one chunk into the next
    pub chunk_overlap: usize,

    /// Separator hierarchy for the recursive strategy
    pub separators: Vec<String>,

    /// Keep each separator at the start of the piece that follows it
    pub keep_separator: bool,

    /// Trim whitespace from both ends of every chunk
    pub strip_whitespace: bool,

    /// Record each chunk's byte offset as `start_index` metadata
    pub add_start_index: bool,

    /// Measure lengths in estimated tokens instead of characters
    pub tokenizer: Option<TokenizerKind>,
}

impl SplitterConfig {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use stuff_docs::SplitterConfig;
    ///
    /// let config = SplitterConfig::builder()
    ///     .chunk_size(1_000)
    ///     .chunk_overlap(100)
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> SplitterConfigBuilder {
        SplitterConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `chunk_size` is zero
    /// - `chunk_overlap` is not smaller than `chunk_size`
    /// - the recursive strategy has no separators
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size must be greater than 0"));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }

        if self.strategy == SplitStrategy::Recursive && self.separators.is_empty() {
            return Err(Error::config(
                "the recursive strategy needs at least one separator",
            ));
        }

        Ok(())
    }

    /// Creates the splitter this configuration describes.
    #[must_use]
    pub fn build_splitter(&self) -> Arc<dyn TextSplitter> {
        match self.strategy {
            SplitStrategy::Recursive => Arc::new(RecursiveCharacterSplitter::new(self)),
            SplitStrategy::LineTokens => Arc::new(LineTokenSplitter::new(self)),
        }
    }
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            strategy: SplitStrategy::Recursive,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(ToString::to_string).collect(),
            keep_separator: true,
            strip_whitespace: true,
            add_start_index: false,
            tokenizer: None,
        }
    }
}

/// Builder for creating a [`SplitterConfig`].
#[derive(Debug, Default)]
pub struct SplitterConfigBuilder {
    strategy: Option<SplitStrategy>,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
    separators: Option<Vec<String>>,
    keep_separator: Option<bool>,
    strip_whitespace: Option<bool>,
    add_start_index: bool,
    tokenizer: Option<TokenizerKind>,
}

impl SplitterConfigBuilder {
    /// Sets the splitting strategy.
    #[must_use]
    pub fn strategy(mut self, strategy: SplitStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Sets the maximum chunk length.
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size);
        self
    }

    /// Sets the overlap between consecutive chunks.
    #[must_use]
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.chunk_overlap = Some(overlap);
        self
    }

    /// Sets the separator hierarchy, most preferred first.
    #[must_use]
    pub fn separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = Some(separators.into_iter().map(Into::into).collect());
        self
    }

    /// Keeps separators attached to the following piece.
    #[must_use]
    pub fn keep_separator(mut self, enabled: bool) -> Self {
        self.keep_separator = Some(enabled);
        self
    }

    /// Enables or disables trimming of chunk whitespace.
    #[must_use]
    pub fn strip_whitespace(mut self, enabled: bool) -> Self {
        self.strip_whitespace = Some(enabled);
        self
    }

    /// Records chunk offsets as `start_index` metadata.
    #[must_use]
    pub fn add_start_index(mut self, enabled: bool) -> Self {
        self.add_start_index = enabled;
        self
    }

    /// Measures lengths with the given token estimator.
    #[must_use]
    pub fn tokenizer(mut self, kind: TokenizerKind) -> Self {
        self.tokenizer = Some(kind);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<SplitterConfig> {
        let defaults = SplitterConfig::default();
        let config = SplitterConfig {
            strategy: self.strategy.unwrap_or(defaults.strategy),
            chunk_size: self.chunk_size.unwrap_or(defaults.chunk_size),
            chunk_overlap: self.chunk_overlap.unwrap_or(defaults.chunk_overlap),
            separators: self.separators.unwrap_or(defaults.separators),
            keep_separator: self.keep_separator.unwrap_or(defaults.keep_separator),
            strip_whitespace: self.strip_whitespace.unwrap_or(defaults.strip_whitespace),
            add_start_index: self.add_start_index,
            tokenizer: self.tokenizer,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SplitterConfig::builder().build().unwrap();

        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.chunk_overlap, DEFAULT_CHUNK_OVERLAP);
        assert_eq!(config.strategy, SplitStrategy::Recursive);
        assert_eq!(config.separators, vec!["\n\n", "\n", " ", ""]);
        assert!(config.keep_separator);
        assert!(config.strip_whitespace);
        assert!(!config.add_start_index);
    }

    #[test]
    fn test_zero_chunk_size() {
        let result = SplitterConfig::builder().chunk_size(0).build();
        assert!(result.unwrap_err().is_invalid_configuration());
    }

    #[test]
    fn test_overlap_not_smaller_than_size() {
        let result = SplitterConfig::builder()
            .chunk_size(100)
            .chunk_overlap(100)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_recursive_needs_separators() {
        let empty: Vec<String> = Vec::new();
        let result = SplitterConfig::builder().separators(empty).build();
        assert!(result.is_err());

        let empty: Vec<String> = Vec::new();
        let lines = SplitterConfig::builder()
            .strategy(SplitStrategy::LineTokens)
            .separators(empty)
            .build();
        assert!(lines.is_ok());
    }

    #[test]
    fn test_build_splitter_per_strategy() {
        let text = "alpha beta";
        for strategy in [SplitStrategy::Recursive, SplitStrategy::LineTokens] {
            let config = SplitterConfig::builder()
                .strategy(strategy)
                .chunk_size(100)
                .chunk_overlap(10)
                .build()
                .unwrap();
            let chunks = config.build_splitter().split_text(text).unwrap();
            assert_eq!(chunks, vec!["alpha beta"]);
        }
    }
}
