//! Base contract shared by every document combination strategy.

use crate::{
    document::Document,
    error::{Error, Result},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Named values handed to a template or chain, ordered by key.
pub type Inputs = BTreeMap<String, Value>;

/// Named values returned by a chain, ordered by key.
pub type Outputs = BTreeMap<String, Value>;

/// Default key under which a chain receives its documents.
pub const DEFAULT_INPUT_KEY: &str = "input_documents";

/// Default key under which a chain returns its text.
pub const DEFAULT_OUTPUT_KEY: &str = "output_text";

/// Default string placed between formatted documents.
pub const DEFAULT_DOCUMENT_SEPARATOR: &str = "\n\n";

/// Conventional prompt variable receiving the combined documents.
pub const DEFAULT_DOCUMENT_VARIABLE: &str = "context";

/// Result of combining documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombineOutput {
    /// Generated text
    pub text: String,

    /// Additional fields a strategy chooses to return
    pub extras: Inputs,
}

impl CombineOutput {
    /// Creates an output with no extras.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            extras: Inputs::new(),
        }
    }

    /// Flattens into a chain output map with the text under `output_key`.
    #[must_use]
    pub fn into_outputs(self, output_key: &str) -> Outputs {
        let mut outputs = self.extras;
        outputs.insert(output_key.to_string(), Value::String(self.text));
        outputs
    }
}

/// A strategy that combines an ordered list of documents into one text.
///
/// Implementations are stateless between calls. The blocking and async
/// forms must produce identical results; they differ only in how the
/// generator collaborator is awaited.
#[async_trait]
pub trait CombineDocuments: Send + Sync {
    /// Key under which [`CombineDocuments::call`] expects the documents.
    fn input_key(&self) -> &str {
        DEFAULT_INPUT_KEY
    }

    /// Key under which [`CombineDocuments::call`] returns the text.
    fn output_key(&self) -> &str {
        DEFAULT_OUTPUT_KEY
    }

    /// All keys the chain reads from its input map.
    fn input_keys(&self) -> Vec<String> {
        vec![self.input_key().to_string()]
    }

    /// All keys the chain writes to its output map.
    fn output_keys(&self) -> Vec<String> {
        vec![self.output_key().to_string()]
    }

    /// Estimated size in tokens of the prompt these documents would produce.
    ///
    /// `Ok(None)` means the strategy cannot bound the size; callers must not
    /// read it as zero.
    ///
    /// # Errors
    ///
    /// Returns formatting or tokenizer errors.
    fn prompt_length(&self, _docs: &[Document], _extra: &Inputs) -> Result<Option<usize>> {
        Ok(None)
    }

    /// Combines documents, blocking on the generator.
    ///
    /// # Errors
    ///
    /// Returns formatting errors and propagates generator errors unchanged.
    fn combine_docs(&self, docs: &[Document], extra: &Inputs) -> Result<CombineOutput>;

    /// Combines documents, awaiting the generator.
    ///
    /// # Errors
    ///
    /// Same as [`CombineDocuments::combine_docs`].
    async fn acombine_docs(&self, docs: &[Document], extra: &Inputs) -> Result<CombineOutput>;

    /// Map-shaped entry point for wiring into larger pipelines.
    ///
    /// Reads the documents from `inputs[input_key]`, forwards every other
    /// entry as extra inputs, and returns the extras plus `output_key`.
    ///
    /// # Errors
    ///
    /// [`Error::MissingInput`] if the documents key is absent,
    /// [`Error::Serialization`] if it does not hold a document list, plus
    /// anything [`CombineDocuments::combine_docs`] returns.
    fn call(&self, inputs: Inputs) -> Result<Outputs> {
        let (docs, extra) = take_documents(self.input_key(), inputs)?;
        let output = self.combine_docs(&docs, &extra)?;
        Ok(output.into_outputs(self.output_key()))
    }

    /// Async twin of [`CombineDocuments::call`].
    ///
    /// # Errors
    ///
    /// Same as [`CombineDocuments::call`].
    async fn acall(&self, inputs: Inputs) -> Result<Outputs> {
        let (docs, extra) = take_documents(self.input_key(), inputs)?;
        let output = self.acombine_docs(&docs, &extra).await?;
        Ok(output.into_outputs(self.output_key()))
    }
}

/// Encodes documents for a map-shaped chain input.
///
/// # Errors
///
/// Returns a serialization error if a metadata value cannot be encoded.
pub fn documents_value(docs: &[Document]) -> Result<Value> {
    Ok(serde_json::to_value(docs)?)
}

fn take_documents(key: &str, mut inputs: Inputs) -> Result<(Vec<Document>, Inputs)> {
    let value = inputs.remove(key).ok_or_else(|| Error::missing_input(key))?;
    let docs: Vec<Document> = serde_json::from_value(value)?;
    Ok((docs, inputs))
}

/// Runs [`CombineDocuments::acombine_docs`] under a deadline.
///
/// On expiry the in-flight call, including the generator request, is
/// dropped and [`Error::Timeout`] is returned; no partial text escapes.
///
/// # Errors
///
/// [`Error::Timeout`] on expiry, otherwise whatever the strategy returns.
#[cfg(feature = "async")]
pub async fn acombine_with_timeout(
    chain: &dyn CombineDocuments,
    docs: &[Document],
    extra: &Inputs,
    timeout: std::time::Duration,
) -> Result<CombineOutput> {
    match tokio::time::timeout(timeout, chain.acombine_docs(docs, extra)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                "Combining {} documents timed out after {:?}",
                docs.len(),
                timeout
            );
            Err(Error::timeout(timeout))
        }
    }
}
