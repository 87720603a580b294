use crate::{
    chain::{
        CombineDocuments, CombineOutput, DEFAULT_DOCUMENT_SEPARATOR, DEFAULT_INPUT_KEY,
        DEFAULT_OUTPUT_KEY, Inputs,
    },
    document::Document,
    error::{Error, Result},
    formatter::DocumentFormatter,
    generator::Generator,
    template::PromptTemplate,
    token::TokenEstimator,
};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Combines documents by stuffing all of them into a single prompt.
///
/// Each document is rendered with the document prompt, the results are
/// joined with the separator, and the joined text becomes the
/// `document_variable_name` input of the downstream prompt. The rendered
/// prompt is sent to the generator once.
///
/// Use [`StuffDocuments::builder`] to construct one.
///
/// # Examples
///
/// ```
/// use stuff_docs::{CombineDocuments, Document, EchoGenerator, Inputs, PromptTemplate, StuffDocuments};
/// use std::sync::Arc;
///
/// let prompt = PromptTemplate::from_template("Summarize:\n\n{context}")?;
/// let chain = StuffDocuments::builder(prompt, Arc::new(EchoGenerator)).build()?;
///
/// let docs = [Document::new("A"), Document::new("B")];
/// let output = chain.combine_docs(&docs, &Inputs::new())?;
/// assert_eq!(output.text, "Summarize:\n\nA\n\nB");
/// # Ok::<(), stuff_docs::Error>(())
/// ```
pub struct StuffDocuments {
    prompt: PromptTemplate,
    generator: Arc<dyn Generator>,
    document_formatter: DocumentFormatter,
    document_variable_name: String,
    document_separator: String,
    tokenizer: Option<Arc<dyn TokenEstimator>>,
    input_key: String,
    output_key: String,
}

impl fmt::Debug for StuffDocuments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StuffDocuments")
            .field("prompt", &self.prompt.source())
            .field("generator", &self.generator.name())
            .field("document_variable_name", &self.document_variable_name)
            .field("document_separator", &self.document_separator)
            .field("has_tokenizer", &self.tokenizer.is_some())
            .field("input_key", &self.input_key)
            .field("output_key", &self.output_key)
            .finish_non_exhaustive()
    }
}

impl StuffDocuments {
    /// Starts building a chain around a downstream prompt and generator.
    #[must_use]
    pub fn builder(prompt: PromptTemplate, generator: Arc<dyn Generator>) -> StuffDocumentsBuilder {
        StuffDocumentsBuilder::new(prompt, generator)
    }

    /// Downstream prompt variable that receives the joined documents.
    #[must_use]
    pub fn document_variable_name(&self) -> &str {
        &self.document_variable_name
    }

    /// String placed between formatted documents.
    #[must_use]
    pub fn document_separator(&self) -> &str {
        &self.document_separator
    }

    /// The downstream prompt.
    #[must_use]
    pub const fn prompt(&self) -> &PromptTemplate {
        &self.prompt
    }

    /// The per-document formatter.
    #[must_use]
    pub const fn document_formatter(&self) -> &DocumentFormatter {
        &self.document_formatter
    }

    /// Formats every document in order and joins them with the separator.
    ///
    /// # Errors
    ///
    /// Returns the first formatting error.
    pub fn join_documents(&self, docs: &[Document]) -> Result<String> {
        let formatted = self.document_formatter.format_all(docs)?;
        Ok(formatted.join(&self.document_separator))
    }

    /// Builds the downstream prompt inputs.
    ///
    /// Only the extra inputs the prompt declares are kept; the joined
    /// documents are set under the document variable.
    ///
    /// # Errors
    ///
    /// Returns the first formatting error.
    pub fn get_inputs(&self, docs: &[Document], extra: &Inputs) -> Result<Inputs> {
        let joined = self.join_documents(docs)?;

        let mut inputs = Inputs::new();
        let mut dropped = Vec::new();
        for (key, value) in extra {
            if key == &self.document_variable_name {
                continue;
            }
            if self.prompt.accepts(key) {
                inputs.insert(key.clone(), value.clone());
            } else {
                dropped.push(key.as_str());
            }
        }

        if !dropped.is_empty() {
            debug!("Dropping inputs not declared by the prompt: {:?}", dropped);
        }

        inputs.insert(self.document_variable_name.clone(), Value::String(joined));
        Ok(inputs)
    }

    /// Renders the downstream prompt that would be sent to the generator.
    ///
    /// # Errors
    ///
    /// Returns formatting errors or [`Error::MissingInput`] when the prompt
    /// needs an extra input the caller did not provide.
    pub fn render_prompt(&self, docs: &[Document], extra: &Inputs) -> Result<String> {
        let inputs = self.get_inputs(docs, extra)?;
        let rendered = self.prompt.render(&inputs)?;
        trace!(
            "Rendered prompt from {} documents ({} bytes)",
            docs.len(),
            rendered.len()
        );
        Ok(rendered)
    }
}

#[async_trait]
impl CombineDocuments for StuffDocuments {
    fn input_key(&self) -> &str {
        &self.input_key
    }

    fn output_key(&self) -> &str {
        &self.output_key
    }

    fn input_keys(&self) -> Vec<String> {
        let mut keys = vec![self.input_key.clone()];
        keys.extend(
            self.prompt
                .input_variables()
                .iter()
                .filter(|v| **v != self.document_variable_name)
                .cloned(),
        );
        keys
    }

    fn prompt_length(&self, docs: &[Document], extra: &Inputs) -> Result<Option<usize>> {
        let Some(tokenizer) = &self.tokenizer else {
            return Ok(None);
        };

        let rendered = self.render_prompt(docs, extra)?;
        tokenizer.try_estimate(&rendered).map(Some)
    }

    #[instrument(skip_all, fields(documents = docs.len(), generator = self.generator.name()))]
    fn combine_docs(&self, docs: &[Document], extra: &Inputs) -> Result<CombineOutput> {
        let rendered = self.render_prompt(docs, extra)?;
        let text = self.generator.generate(&rendered)?;
        Ok(CombineOutput::new(text))
    }

    #[instrument(skip_all, fields(documents = docs.len(), generator = self.generator.name()))]
    async fn acombine_docs(&self, docs: &[Document], extra: &Inputs) -> Result<CombineOutput> {
        let rendered = self.render_prompt(docs, extra)?;
        let text = self.generator.agenerate(&rendered).await?;
        Ok(CombineOutput::new(text))
    }
}

/// Builder for creating a [`StuffDocuments`].
pub struct StuffDocumentsBuilder {
    prompt: PromptTemplate,
    generator: Arc<dyn Generator>,
    document_prompt: Option<PromptTemplate>,
    document_variable_name: Option<String>,
    document_separator: Option<String>,
    tokenizer: Option<Arc<dyn TokenEstimator>>,
    input_key: Option<String>,
    output_key: Option<String>,
}

impl StuffDocumentsBuilder {
    fn new(prompt: PromptTemplate, generator: Arc<dyn Generator>) -> Self {
        Self {
            prompt,
            generator,
            document_prompt: None,
            document_variable_name: None,
            document_separator: None,
            tokenizer: None,
            input_key: None,
            output_key: None,
        }
    }

    /// Sets the prompt used to render each document.
    ///
    /// Defaults to the document body alone.
    #[must_use]
    pub fn document_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.document_prompt = Some(prompt);
        self
    }

    /// Sets the downstream prompt variable that receives the documents.
    ///
    /// May be omitted when the prompt declares exactly one variable.
    #[must_use]
    pub fn document_variable_name(mut self, name: impl Into<String>) -> Self {
        self.document_variable_name = Some(name.into());
        self
    }

    /// Sets the separator placed between formatted documents.
    ///
    /// Default: `"\n\n"`
    #[must_use]
    pub fn document_separator(mut self, separator: impl Into<String>) -> Self {
        self.document_separator = Some(separator.into());
        self
    }

    /// Injects a token estimator, enabling [`CombineDocuments::prompt_length`].
    #[must_use]
    pub fn tokenizer(mut self, tokenizer: Arc<dyn TokenEstimator>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Sets the key under which documents arrive in [`CombineDocuments::call`].
    ///
    /// Default: `"input_documents"`
    #[must_use]
    pub fn input_key(mut self, key: impl Into<String>) -> Self {
        self.input_key = Some(key.into());
        self
    }

    /// Sets the key under which the text is returned from [`CombineDocuments::call`].
    ///
    /// Default: `"output_text"`
    #[must_use]
    pub fn output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    /// Builds the chain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if:
    /// - the document variable is not declared by the downstream prompt
    /// - no document variable was given and the prompt declares several
    /// - the input or output key is empty, or both are equal
    pub fn build(self) -> Result<StuffDocuments> {
        let declared = self.prompt.input_variables();

        let document_variable_name = match self.document_variable_name {
            Some(name) => {
                if !self.prompt.accepts(&name) {
                    return Err(Error::config(format!(
                        "document_variable_name '{name}' was not found in prompt input variables: {declared:?}"
                    )));
                }
                name
            }
            None => match declared {
                [only] => only.clone(),
                _ => {
                    return Err(Error::config(format!(
                        "document_variable_name must be provided when the prompt has {} input variables: {declared:?}",
                        declared.len()
                    )));
                }
            },
        };

        let input_key = self
            .input_key
            .unwrap_or_else(|| DEFAULT_INPUT_KEY.to_string());
        let output_key = self
            .output_key
            .unwrap_or_else(|| DEFAULT_OUTPUT_KEY.to_string());

        if input_key.is_empty() || output_key.is_empty() {
            return Err(Error::config("input_key and output_key must not be empty"));
        }
        if input_key == output_key {
            return Err(Error::config(format!(
                "input_key and output_key must differ (both '{input_key}')"
            )));
        }

        let document_formatter = self
            .document_prompt
            .map(DocumentFormatter::new)
            .unwrap_or_default();

        debug!(
            "Built stuff chain: variable '{}', document prompt requires metadata {:?}",
            document_variable_name,
            document_formatter.required_metadata_keys()
        );

        Ok(StuffDocuments {
            prompt: self.prompt,
            generator: self.generator,
            document_formatter,
            document_variable_name,
            document_separator: self
                .document_separator
                .unwrap_or_else(|| DEFAULT_DOCUMENT_SEPARATOR.to_string()),
            tokenizer: self.tokenizer,
            input_key,
            output_key,
        })
    }
}
