use crate::{
    config::SplitterConfig,
    document::{Document, Metadata},
    error::{Error, Result},
    token::{TokenEstimator, TokenizerKind},
};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Metadata key holding a chunk's byte offset in its source text.
pub const START_INDEX_KEY: &str = "start_index";

/// Splits raw text into ordered, possibly overlapping chunks.
pub trait TextSplitter: Send + Sync {
    /// Splits one text into chunks.
    ///
    /// # Errors
    ///
    /// Implementations report failures with [`Error::Splitter`].
    fn split_text(&self, text: &str) -> Result<Vec<String>>;

    /// Whether produced documents carry `start_index` metadata.
    fn add_start_index(&self) -> bool {
        false
    }

    /// Most characters a chunk may share with the one before it.
    ///
    /// Bounds where the next chunk can start when computing `start_index`.
    fn chunk_overlap(&self) -> usize {
        0
    }

    /// Splits several texts into documents.
    ///
    /// Every chunk of `texts[i]` receives a copy of `metadatas[i]`.
    ///
    /// # Errors
    ///
    /// Returns an error if `metadatas` and `texts` differ in length, or if
    /// splitting fails.
    fn create_documents(
        &self,
        texts: &[&str],
        metadatas: Option<&[Metadata]>,
    ) -> Result<Vec<Document>> {
        if let Some(metadatas) = metadatas {
            if metadatas.len() != texts.len() {
                return Err(Error::splitter(format!(
                    "got {} metadata entries for {} texts",
                    metadatas.len(),
                    texts.len()
                )));
            }
        }

        let mut documents = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let base = metadatas.map(|m| m[i].clone()).unwrap_or_default();
            // (start of the previous chunk, earliest start of the next one)
            let mut previous: Option<(usize, usize)> = None;

            for chunk in self.split_text(text)? {
                let mut metadata = base.clone();
                if self.add_start_index() {
                    let from = previous.map_or(0, |(_, next)| next);
                    let found = find_from(text, &chunk, from).or_else(|| {
                        previous.and_then(|(start, _)| find_from(text, &chunk, start + 1))
                    });

                    match found {
                        Some(index) => {
                            metadata.insert(START_INDEX_KEY.to_string(), Value::from(index));
                            previous =
                                Some((index, index + overlap_start(&chunk, self.chunk_overlap())));
                        }
                        None => trace!("Chunk not found verbatim in source, no start index"),
                    }
                }
                documents.push(Document::new(chunk).with_metadata(metadata));
            }
        }

        Ok(documents)
    }

    /// Re-splits existing documents, keeping their metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if splitting fails.
    fn split_documents(&self, docs: &[Document]) -> Result<Vec<Document>> {
        let texts: Vec<&str> = docs.iter().map(Document::page_content).collect();
        let metadatas: Vec<Metadata> = docs.iter().map(|d| d.metadata().clone()).collect();
        self.create_documents(&texts, Some(&metadatas))
    }

    /// Splits one raw text into documents.
    ///
    /// # Errors
    ///
    /// Returns an error if splitting fails.
    fn split(&self, raw: &str) -> Result<Vec<Document>> {
        self.create_documents(&[raw], None)
    }
}

/// Byte offset of `needle` in `haystack`, searching from `from` onward.
fn find_from(haystack: &str, needle: &str, mut from: usize) -> Option<usize> {
    while from < haystack.len() && !haystack.is_char_boundary(from) {
        from += 1;
    }
    haystack.get(from..)?.find(needle).map(|i| i + from)
}

/// Byte offset in `chunk` where its last `overlap` characters begin.
fn overlap_start(chunk: &str, overlap: usize) -> usize {
    if overlap == 0 {
        return chunk.len();
    }
    chunk
        .char_indices()
        .rev()
        .nth(overlap - 1)
        .map_or(0, |(i, _)| i)
}

/// How chunk lengths are measured.
#[derive(Clone, Default)]
pub enum LengthFunction {
    /// Unicode scalar values
    #[default]
    Chars,
    /// Estimated tokens
    Tokens(Arc<dyn TokenEstimator>),
}

impl LengthFunction {
    fn measure(&self, text: &str) -> usize {
        match self {
            Self::Chars => text.chars().count(),
            Self::Tokens(estimator) => estimator.estimate(text),
        }
    }
}

impl fmt::Debug for LengthFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chars => f.write_str("Chars"),
            Self::Tokens(_) => f.write_str("Tokens"),
        }
    }
}

impl From<Option<TokenizerKind>> for LengthFunction {
    fn from(kind: Option<TokenizerKind>) -> Self {
        kind.map_or(Self::Chars, |k| Self::Tokens(k.create()))
    }
}

/// Splits on a hierarchy of separators, then merges pieces up to the chunk
/// size with overlap.
///
/// The first separator present in the text is used; pieces still longer
/// than the chunk size are split again with the remaining separators.
#[derive(Debug, Clone)]
pub struct RecursiveCharacterSplitter {
    separators: Vec<String>,
    chunk_size: usize,
    chunk_overlap: usize,
    keep_separator: bool,
    strip_whitespace: bool,
    add_start_index: bool,
    length: LengthFunction,
}

impl Default for RecursiveCharacterSplitter {
    fn default() -> Self {
        Self::new(&SplitterConfig::default())
    }
}

impl RecursiveCharacterSplitter {
    /// Creates a splitter from configuration.
    #[must_use]
    pub fn new(config: &SplitterConfig) -> Self {
        Self {
            separators: config.separators.clone(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            keep_separator: config.keep_separator,
            strip_whitespace: config.strip_whitespace,
            add_start_index: config.add_start_index,
            length: config.tokenizer.into(),
        }
    }

    /// Replaces the length function.
    #[must_use]
    pub fn with_length_function(mut self, length: LengthFunction) -> Self {
        self.length = length;
        self
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map_or("", String::as_str);
        let mut remaining: &[String] = &[];

        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate.as_str();
                remaining = &separators[i + 1..];
                break;
            }
        }

        let pieces = split_on(text, separator, self.keep_separator);
        let merge_separator = if self.keep_separator { "" } else { separator };

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in pieces {
            if self.length.measure(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge_pieces(&fitting, merge_separator));
                fitting.clear();
            }

            if remaining.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge_pieces(&fitting, merge_separator));
        }

        chunks
    }

    fn merge_pieces(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let separator_len = self.length.measure(separator);
        let joiner = |current: &VecDeque<&str>| {
            if current.is_empty() { 0 } else { separator_len }
        };

        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = self.length.measure(piece);

            if total + len + joiner(&current) > self.chunk_size {
                if total > self.chunk_size {
                    warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total, self.chunk_size
                    );
                }

                if !current.is_empty() {
                    if let Some(chunk) = self.join_pieces(&current, separator) {
                        chunks.push(chunk);
                    }

                    // Drop from the front until only the overlap remains and
                    // the next piece fits.
                    while total > self.chunk_overlap
                        || (total + len + joiner(&current) > self.chunk_size && total > 0)
                    {
                        let Some(first) = current.pop_front() else {
                            break;
                        };
                        total = total
                            .saturating_sub(self.length.measure(first) + joiner(&current));
                    }
                }
            }

            current.push_back(piece);
            total += len + if current.len() > 1 { separator_len } else { 0 };
        }

        if let Some(chunk) = self.join_pieces(&current, separator) {
            chunks.push(chunk);
        }

        chunks
    }

    fn join_pieces(&self, pieces: &VecDeque<&str>, separator: &str) -> Option<String> {
        let joined = pieces.iter().copied().collect::<Vec<_>>().join(separator);
        let text = if self.strip_whitespace {
            joined.trim().to_string()
        } else {
            joined
        };

        (!text.is_empty()).then_some(text)
    }
}

impl TextSplitter for RecursiveCharacterSplitter {
    fn chunk_overlap(&self) -> usize {
        match self.length {
            LengthFunction::Chars => self.chunk_overlap,
            LengthFunction::Tokens(_) => 0,
        }
    }

    fn split_text(&self, text: &str) -> Result<Vec<String>> {
        let chunks = self.split_recursive(text, &self.separators);
        debug!(
            "Split {} bytes into {} chunks (chunk_size {}, overlap {})",
            text.len(),
            chunks.len(),
            self.chunk_size,
            self.chunk_overlap
        );
        Ok(chunks)
    }

    fn add_start_index(&self) -> bool {
        self.add_start_index
    }
}

/// Splits `text` on `separator`, dropping empty pieces.
///
/// With `keep` the separator stays at the start of the following piece. An
/// empty separator splits into characters.
fn split_on<'a>(text: &'a str, separator: &str, keep: bool) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    if !keep {
        return text.split(separator).filter(|p| !p.is_empty()).collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (index, _) in text.match_indices(separator) {
        pieces.push(&text[start..index]);
        start = index;
    }
    pieces.push(&text[start..]);
    pieces.retain(|p| !p.is_empty());
    pieces
}

/// Line-aligned splitter budgeted in estimated tokens.
///
/// Texts within the budget are returned whole. Longer texts are cut every
/// N lines, where N comes from the average tokens per line of a leading
/// sample; consecutive chunks share a proportional number of lines.
pub struct LineTokenSplitter {
    max_chunk_tokens: usize,
    overlap_tokens: usize,
    add_start_index: bool,
    tokenizer: Arc<dyn TokenEstimator>,
}

impl fmt::Debug for LineTokenSplitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineTokenSplitter")
            .field("max_chunk_tokens", &self.max_chunk_tokens)
            .field("overlap_tokens", &self.overlap_tokens)
            .field("add_start_index", &self.add_start_index)
            .finish_non_exhaustive()
    }
}

impl LineTokenSplitter {
    /// Creates a splitter from configuration.
    ///
    /// `chunk_size` and `chunk_overlap` are read as token counts; the
    /// tokenizer defaults to [`TokenizerKind::Simple`].
    #[must_use]
    pub fn new(config: &SplitterConfig) -> Self {
        Self {
            max_chunk_tokens: config.chunk_size,
            overlap_tokens: config.chunk_overlap,
            add_start_index: config.add_start_index,
            tokenizer: config.tokenizer.unwrap_or_default().create(),
        }
    }

    /// Replaces the token estimator.
    #[must_use]
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn TokenEstimator>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn calculate_split_parameters(&self, lines: &[&str]) -> SplitParameters {
        let sample_size = lines.len().min(100);
        let sample = lines[..sample_size].join("\n");
        let sample_tokens = self.tokenizer.estimate(&sample);

        let avg_tokens_per_line = if sample_size > 0 {
            (sample_tokens as f64 / sample_size as f64).max(1.0)
        } else {
            1.0
        };

        let lines_per_chunk = ((self.max_chunk_tokens as f64 / avg_tokens_per_line) as usize).max(1);
        let overlap_lines =
            ((self.overlap_tokens as f64 / avg_tokens_per_line) as usize).min(lines_per_chunk / 2);

        SplitParameters {
            lines_per_chunk,
            overlap_lines,
        }
    }
}

/// Parameters for splitting a long text.
#[derive(Debug)]
struct SplitParameters {
    lines_per_chunk: usize,
    overlap_lines: usize,
}

impl TextSplitter for LineTokenSplitter {
    fn split_text(&self, text: &str) -> Result<Vec<String>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        if self.tokenizer.estimate(text) <= self.max_chunk_tokens {
            return Ok(vec![text.to_string()]);
        }

        let lines: Vec<&str> = text.lines().collect();
        let params = self.calculate_split_parameters(&lines);
        trace!("Line split parameters: {:?}", params);

        let mut chunks = Vec::new();
        let mut start_line = 0;

        while start_line < lines.len() {
            let end_line = (start_line + params.lines_per_chunk).min(lines.len());
            let chunk = lines[start_line..end_line].join("\n");

            let tokens = self.tokenizer.estimate(&chunk);
            if tokens > self.max_chunk_tokens {
                warn!(
                    "Chunk {} has {} tokens (exceeds limit of {})",
                    chunks.len() + 1,
                    tokens,
                    self.max_chunk_tokens
                );
            }

            if !chunk.trim().is_empty() {
                chunks.push(chunk);
            }

            if end_line >= lines.len() {
                break;
            }
            start_line = end_line.saturating_sub(params.overlap_lines);
        }

        debug!(
            "Split {} lines into {} chunks ({} lines each, {} overlapping)",
            lines.len(),
            chunks.len(),
            params.lines_per_chunk,
            params.overlap_lines
        );

        Ok(chunks)
    }

    fn add_start_index(&self) -> bool {
        self.add_start_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::SimpleTokenizer;
    use serde_json::json;

    fn recursive(chunk_size: usize, overlap: usize) -> RecursiveCharacterSplitter {
        let config = SplitterConfig::builder()
            .chunk_size(chunk_size)
            .chunk_overlap(overlap)
            .build()
            .unwrap();
        RecursiveCharacterSplitter::new(&config)
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = recursive(100, 10).split_text("Hello world.").unwrap();
        assert_eq!(chunks, vec!["Hello world."]);
    }

    #[test]
    fn test_empty_text() {
        assert!(recursive(100, 10).split_text("").unwrap().is_empty());
        assert!(recursive(100, 10).split("   ").unwrap().is_empty());
    }

    #[test]
    fn test_words_merged_up_to_chunk_size() {
        let chunks = recursive(9, 0).split_text("aaaa bbbb cccc").unwrap();
        assert_eq!(chunks, vec!["aaaa bbbb", "cccc"]);
    }

    #[test]
    fn test_overlap_carries_pieces() {
        let config = SplitterConfig::builder()
            .chunk_size(5)
            .chunk_overlap(2)
            .separators([" "])
            .keep_separator(false)
            .build()
            .unwrap();
        let splitter = RecursiveCharacterSplitter::new(&config);

        let chunks = splitter.split_text("a b c d e f").unwrap();
        assert_eq!(chunks, vec!["a b c", "c d e", "e f"]);
    }

    #[test]
    fn test_paragraphs_preferred_over_lines() {
        let text = "first paragraph line one\nline two\n\nsecond paragraph";
        let chunks = recursive(30, 0).split_text(text).unwrap();
        assert_eq!(
            chunks,
            vec!["first paragraph line one", "line two", "second paragraph"]
        );
    }

    #[test]
    fn test_falls_back_to_characters() {
        let chunks = recursive(4, 0).split_text("abcdefghij").unwrap();
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_chunks_respect_size() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(50);
        let chunks = recursive(100, 20).split_text(&text).unwrap();

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100, "chunk too long: {chunk:?}");
        }
    }

    #[test]
    fn test_token_length_function() {
        let splitter = recursive(3, 0)
            .with_length_function(LengthFunction::Tokens(Arc::new(SimpleTokenizer)));

        // Each 4-char word is one token; "aaaa bbbb" is 9 chars -> 3 tokens.
        let chunks = splitter.split_text("aaaa bbbb cccc dddd").unwrap();
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(SimpleTokenizer.estimate(chunk) <= 3);
        }
    }

    #[test]
    fn test_split_on_keep_separator() {
        assert_eq!(split_on("a\nb\nc", "\n", true), vec!["a", "\nb", "\nc"]);
        assert_eq!(split_on("a\nb\nc", "\n", false), vec!["a", "b", "c"]);
        assert_eq!(split_on("\na", "\n", true), vec!["\na"]);
        assert_eq!(split_on("né", "", true), vec!["n", "é"]);
    }

    #[test]
    fn test_start_index_metadata() {
        let config = SplitterConfig::builder()
            .chunk_size(9)
            .chunk_overlap(0)
            .add_start_index(true)
            .build()
            .unwrap();
        let splitter = RecursiveCharacterSplitter::new(&config);

        let docs = splitter.split("aaaa bbbb cccc").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].get(START_INDEX_KEY), Some(&json!(0)));
        assert_eq!(docs[1].get(START_INDEX_KEY), Some(&json!(10)));
    }

    #[test]
    fn test_start_index_on_repeated_text() {
        let config = SplitterConfig::builder()
            .chunk_size(9)
            .chunk_overlap(0)
            .add_start_index(true)
            .build()
            .unwrap();
        let splitter = RecursiveCharacterSplitter::new(&config);

        let docs = splitter.split("aaaa aaaa aaaa").unwrap();
        let starts: Vec<_> = docs.iter().map(|d| d.get(START_INDEX_KEY).cloned()).collect();
        assert_eq!(starts, vec![Some(json!(0)), Some(json!(10))]);
    }

    #[test]
    fn test_start_index_with_overlap() {
        let config = SplitterConfig::builder()
            .chunk_size(5)
            .chunk_overlap(2)
            .separators([" "])
            .keep_separator(false)
            .add_start_index(true)
            .build()
            .unwrap();
        let splitter = RecursiveCharacterSplitter::new(&config);

        let docs = splitter.split("a b a b a b").unwrap();
        let chunks: Vec<&str> = docs.iter().map(Document::page_content).collect();
        assert_eq!(chunks, vec!["a b a", "a b a", "a b"]);

        let starts: Vec<_> = docs.iter().map(|d| d.get(START_INDEX_KEY).cloned()).collect();
        assert_eq!(starts, vec![Some(json!(0)), Some(json!(4)), Some(json!(8))]);
    }

    #[test]
    fn test_overlap_start() {
        assert_eq!(overlap_start("abcd", 0), 4);
        assert_eq!(overlap_start("abcd", 2), 2);
        assert_eq!(overlap_start("abcé", 1), 3);
        assert_eq!(overlap_start("ab", 5), 0);
    }

    #[test]
    fn test_create_documents_propagates_metadata() {
        let splitter = recursive(9, 0);
        let metadatas = vec![
            Metadata::from([("source".to_string(), json!("a"))]),
            Metadata::from([("source".to_string(), json!("b"))]),
        ];

        let docs = splitter
            .create_documents(&["aaaa bbbb cccc", "dddd"], Some(&metadatas))
            .unwrap();

        let sources: Vec<&Value> = docs.iter().filter_map(|d| d.get("source")).collect();
        assert_eq!(sources, vec![&json!("a"), &json!("a"), &json!("b")]);
    }

    #[test]
    fn test_create_documents_metadata_mismatch() {
        let result = recursive(9, 0).create_documents(&["a", "b"], Some(&[Metadata::new()]));
        assert!(matches!(result, Err(Error::Splitter { .. })));
    }

    #[test]
    fn test_split_documents_keeps_metadata() {
        let docs = vec![Document::new("aaaa bbbb cccc").with_meta("page", 1)];
        let split = recursive(9, 0).split_documents(&docs).unwrap();

        assert_eq!(split.len(), 2);
        assert!(split.iter().all(|d| d.get("page") == Some(&json!(1))));
    }

    #[test]
    fn test_find_from_respects_char_boundaries() {
        assert_eq!(find_from("éa éa", "éa", 1), Some(4));
        assert_eq!(find_from("abc", "c", 10), None);
    }

    fn line_splitter(max_tokens: usize, overlap: usize) -> LineTokenSplitter {
        let config = SplitterConfig::builder()
            .strategy(crate::config::SplitStrategy::LineTokens)
            .chunk_size(max_tokens)
            .chunk_overlap(overlap)
            .build()
            .unwrap();
        LineTokenSplitter::new(&config)
    }

    #[test]
    fn test_line_splitter_small_text() {
        let chunks = line_splitter(3000, 100).split_text("fn main() {}").unwrap();
        assert_eq!(chunks, vec!["fn main() {}"]);
    }

    #[test]
    fn test_line_splitter_large_text() {
        let text = (0..100)
            .map(|i| format!("line {i:02} here"))
            .collect::<Vec<_>>()
            .join("\n");

        let chunks = line_splitter(50, 10).split_text(&text).unwrap();
        assert!(chunks.len() > 1, "large text should be split");

        for chunk in &chunks {
            assert!(SimpleTokenizer.estimate(chunk) <= 50);
        }

        // Consecutive chunks share lines.
        let first_line_of_second = chunks[1].lines().next().unwrap();
        assert!(chunks[0].contains(first_line_of_second));

        // Every source line survives.
        for i in 0..100 {
            let line = format!("line {i:02} here");
            assert!(chunks.iter().any(|c| c.contains(&line)), "{line} missing");
        }
    }

    #[test]
    fn test_line_splitter_empty() {
        assert!(line_splitter(50, 10).split_text("\n\n").unwrap().is_empty());
    }
}
