//! Rendering of a single document through a document prompt.

use crate::{
    chain::Inputs,
    document::Document,
    error::{Error, Result},
    template::PromptTemplate,
};
use once_cell::sync::Lazy;
use serde_json::Value;

/// Placeholder name that resolves to the document body.
pub const PAGE_CONTENT_KEY: &str = "page_content";

/// Document prompt used when none is configured: the body, verbatim.
pub static DEFAULT_DOCUMENT_PROMPT: Lazy<PromptTemplate> =
    Lazy::new(|| PromptTemplate::single_variable(PAGE_CONTENT_KEY));

/// Formats documents with a document prompt.
///
/// The set of metadata keys the prompt needs is computed once here; each
/// call only checks that a given document carries them.
#[derive(Debug, Clone)]
pub struct DocumentFormatter {
    template: PromptTemplate,
    required_metadata: Vec<String>,
}

impl Default for DocumentFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_DOCUMENT_PROMPT.clone())
    }
}

impl DocumentFormatter {
    /// Creates a formatter for the given document prompt.
    #[must_use]
    pub fn new(template: PromptTemplate) -> Self {
        let required_metadata = template
            .input_variables()
            .iter()
            .filter(|v| v.as_str() != PAGE_CONTENT_KEY)
            .cloned()
            .collect();

        Self {
            template,
            required_metadata,
        }
    }

    /// Metadata keys every formatted document must carry.
    #[must_use]
    pub fn required_metadata_keys(&self) -> &[String] {
        &self.required_metadata
    }

    /// Returns the document prompt.
    #[must_use]
    pub const fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Renders one document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingMetadataKey`] listing every required key the
    /// document lacks, or a template error from rendering.
    pub fn format(&self, doc: &Document) -> Result<String> {
        let missing: Vec<String> = self
            .required_metadata
            .iter()
            .filter(|key| doc.get(key).is_none())
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(Error::MissingMetadataKey {
                missing,
                required: self.required_metadata.clone(),
            });
        }

        let mut inputs = Inputs::new();
        if self.template.accepts(PAGE_CONTENT_KEY) {
            inputs.insert(
                PAGE_CONTENT_KEY.to_string(),
                Value::String(doc.page_content().to_string()),
            );
        }
        for key in &self.required_metadata {
            if let Some(value) = doc.get(key) {
                inputs.insert(key.clone(), value.clone());
            }
        }

        self.template.render(&inputs)
    }

    /// Renders every document in order, failing on the first error.
    ///
    /// # Errors
    ///
    /// Propagates the first formatting error; nothing is returned for the
    /// documents formatted before it.
    pub fn format_all(&self, docs: &[Document]) -> Result<Vec<String>> {
        docs.iter().map(|doc| self.format(doc)).collect()
    }
}

/// Renders one document through `template`.
///
/// # Errors
///
/// See [`DocumentFormatter::format`].
pub fn format_document(doc: &Document, template: &PromptTemplate) -> Result<String> {
    DocumentFormatter::new(template.clone()).format(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompt_is_identity() {
        let formatter = DocumentFormatter::default();
        assert!(formatter.required_metadata_keys().is_empty());
        assert_eq!(formatter.format(&Document::new("A\n")).unwrap(), "A\n");
    }

    #[test]
    fn test_metadata_placeholders() {
        let template = PromptTemplate::from_template("[{source}:{page}] {page_content}").unwrap();
        let formatter = DocumentFormatter::new(template);
        assert_eq!(formatter.required_metadata_keys(), ["source", "page"]);

        let doc = Document::new("text").with_meta("source", "a.md").with_meta("page", 2);
        assert_eq!(formatter.format(&doc).unwrap(), "[a.md:2] text");
    }

    #[test]
    fn test_missing_metadata_key() {
        let template = PromptTemplate::from_template("{source}: {page_content}").unwrap();
        let err = format_document(&Document::new("X"), &template).unwrap_err();

        match err {
            Error::MissingMetadataKey { missing, required } => {
                assert_eq!(missing, vec!["source"]);
                assert_eq!(required, vec!["source"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_metadata_only_prompt() {
        let template = PromptTemplate::from_template("title={title}").unwrap();
        let doc = Document::new("ignored body").with_meta("title", "Intro");
        assert_eq!(format_document(&doc, &template).unwrap(), "title=Intro");
    }

    #[test]
    fn test_format_all_aborts_without_partial_output() {
        let template = PromptTemplate::from_template("{source}").unwrap();
        let formatter = DocumentFormatter::new(template);
        let docs = vec![
            Document::new("a").with_meta("source", "one"),
            Document::new("b"),
            Document::new("c").with_meta("source", "three"),
        ];

        let result = formatter.format_all(&docs);
        assert!(result.unwrap_err().is_missing_metadata());
    }
}
