//! Split-then-combine pipeline for a single long text.

use crate::{
    chain::{CombineDocuments, CombineOutput, Inputs, Outputs, documents_value},
    config::SplitterConfig,
    error::{Error, Result},
    splitter::TextSplitter,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Default key under which the raw text arrives.
pub const DEFAULT_ANALYZE_INPUT_KEY: &str = "input_document";

/// Splits one raw text into documents and hands them to a combination
/// strategy.
///
/// # Examples
///
/// ```
/// use stuff_docs::{AnalyzeDocument, EchoGenerator, Inputs, PromptTemplate, StuffDocuments};
/// use std::sync::Arc;
///
/// let prompt = PromptTemplate::from_template("{context}")?;
/// let combine = StuffDocuments::builder(prompt, Arc::new(EchoGenerator)).build()?;
/// let pipeline = AnalyzeDocument::new(Arc::new(combine));
///
/// let output = pipeline.analyze("short text", &Inputs::new())?;
/// assert_eq!(output.text, "short text");
/// # Ok::<(), stuff_docs::Error>(())
/// ```
pub struct AnalyzeDocument {
    splitter: Arc<dyn TextSplitter>,
    combine: Arc<dyn CombineDocuments>,
    input_key: String,
}

impl fmt::Debug for AnalyzeDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzeDocument")
            .field("input_key", &self.input_key)
            .field("combine_input_key", &self.combine.input_key())
            .finish_non_exhaustive()
    }
}

impl AnalyzeDocument {
    /// Creates a pipeline with the default recursive splitter.
    #[must_use]
    pub fn new(combine: Arc<dyn CombineDocuments>) -> Self {
        Self::with_splitter(SplitterConfig::default().build_splitter(), combine)
    }

    /// Creates a pipeline with an explicit splitter.
    #[must_use]
    pub fn with_splitter(
        splitter: Arc<dyn TextSplitter>,
        combine: Arc<dyn CombineDocuments>,
    ) -> Self {
        Self {
            splitter,
            combine,
            input_key: DEFAULT_ANALYZE_INPUT_KEY.to_string(),
        }
    }

    /// Sets the key the raw text is read from in [`AnalyzeDocument::call`].
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty.
    pub fn input_key(mut self, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::config("input_key must not be empty"));
        }
        self.input_key = key;
        Ok(self)
    }

    /// Key the raw text is read from.
    #[must_use]
    pub fn raw_input_key(&self) -> &str {
        &self.input_key
    }

    /// Keys read from the input map.
    #[must_use]
    pub fn input_keys(&self) -> Vec<String> {
        vec![self.input_key.clone()]
    }

    /// Keys written to the output map.
    #[must_use]
    pub fn output_keys(&self) -> Vec<String> {
        self.combine.output_keys()
    }

    /// Splits `raw` and combines the pieces, blocking on the generator.
    ///
    /// # Errors
    ///
    /// Splitter and combination errors are returned unchanged.
    #[instrument(skip_all, fields(bytes = raw.len()))]
    pub fn analyze(&self, raw: &str, extra: &Inputs) -> Result<CombineOutput> {
        let docs = self.splitter.split(raw)?;
        debug!("Analyzing {} documents", docs.len());
        self.combine.combine_docs(&docs, extra)
    }

    /// Async twin of [`AnalyzeDocument::analyze`].
    ///
    /// # Errors
    ///
    /// Same as [`AnalyzeDocument::analyze`].
    #[instrument(skip_all, fields(bytes = raw.len()))]
    pub async fn aanalyze(&self, raw: &str, extra: &Inputs) -> Result<CombineOutput> {
        let docs = self.splitter.split(raw)?;
        debug!("Analyzing {} documents", docs.len());
        self.combine.acombine_docs(&docs, extra).await
    }

    /// Map-shaped entry point.
    ///
    /// Reads the raw text from `inputs[input_key]`, replaces it with the
    /// split documents under the delegate's input key, and delegates.
    ///
    /// # Errors
    ///
    /// [`Error::MissingInput`] if the raw text is absent or not a string,
    /// otherwise whatever the splitter or delegate returns.
    pub fn call(&self, inputs: Inputs) -> Result<Outputs> {
        let inputs = self.prepare(inputs)?;
        self.combine.call(inputs)
    }

    /// Async twin of [`AnalyzeDocument::call`].
    ///
    /// # Errors
    ///
    /// Same as [`AnalyzeDocument::call`].
    pub async fn acall(&self, inputs: Inputs) -> Result<Outputs> {
        let inputs = self.prepare(inputs)?;
        self.combine.acall(inputs).await
    }

    fn prepare(&self, mut inputs: Inputs) -> Result<Inputs> {
        let raw = match inputs.remove(&self.input_key) {
            Some(Value::String(raw)) => raw,
            _ => return Err(Error::missing_input(&self.input_key)),
        };

        let docs = self.splitter.split(&raw)?;
        inputs.insert(self.combine.input_key().to_string(), documents_value(&docs)?);
        Ok(inputs)
    }
}
