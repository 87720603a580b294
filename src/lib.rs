//! # stuff-docs
//!
//! Combine many documents into a single prompt for one generation call.
//!
//! ## Features
//!
//! - Per-document prompts with metadata placeholders
//! - "Stuff" combination: format, join, render, generate once
//! - Prompt size estimation before generating
//! - Blocking and async entry points with identical results
//! - Split-then-combine pipeline for long raw texts
//!
//! ## Quick Start
//!
//! ```
//! use stuff_docs::{CombineDocuments, Document, EchoGenerator, Inputs, PromptTemplate, StuffDocuments};
//! use std::sync::Arc;
//!
//! # fn main() -> stuff_docs::Result<()> {
//! let prompt = PromptTemplate::from_template("Context:\n{context}\n\nQ: {question}")?;
//! let chain = StuffDocuments::builder(prompt, Arc::new(EchoGenerator))
//!     .document_variable_name("context")
//!     .build()?;
//!
//! let docs = [Document::new("Paris is in France.")];
//! let mut extra = Inputs::new();
//! extra.insert("question".into(), "Where is Paris?".into());
//!
//! let output = chain.combine_docs(&docs, &extra)?;
//! assert_eq!(output.text, "Context:\nParis is in France.\n\nQ: Where is Paris?");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! 1. **Formatter**: renders each [`Document`] with a document prompt
//! 2. **Combiner**: joins the rendered documents into the downstream prompt
//! 3. **Generator**: turns the rendered prompt into text
//! 4. **Splitter**: cuts raw text into documents for [`AnalyzeDocument`]

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod analyze;
mod chain;
mod config;
mod document;
mod error;
mod formatter;
mod generator;
mod splitter;
mod stuff;
mod template;
mod template_validator;
mod token;

pub mod preset;

pub use analyze::{AnalyzeDocument, DEFAULT_ANALYZE_INPUT_KEY};
#[cfg(feature = "async")]
pub use chain::acombine_with_timeout;
pub use chain::{
    CombineDocuments, CombineOutput, DEFAULT_DOCUMENT_SEPARATOR, DEFAULT_DOCUMENT_VARIABLE,
    DEFAULT_INPUT_KEY, DEFAULT_OUTPUT_KEY, Inputs, Outputs, documents_value,
};
pub use config::{DEFAULT_SEPARATORS, SplitStrategy, SplitterConfig, SplitterConfigBuilder};
pub use document::{Document, Metadata};
pub use error::{Error, Result};
pub use formatter::{DEFAULT_DOCUMENT_PROMPT, DocumentFormatter, PAGE_CONTENT_KEY, format_document};
pub use generator::{EchoGenerator, Generator};
pub use preset::{PresetKind, PromptPreset};
pub use splitter::{
    LengthFunction, LineTokenSplitter, RecursiveCharacterSplitter, START_INDEX_KEY, TextSplitter,
};
pub use stuff::{StuffDocuments, StuffDocumentsBuilder};
pub use template::{PromptTemplate, TemplateFormat};
pub use token::{EnhancedTokenizer, SimpleTokenizer, TokenEstimator, TokenizerKind};

/// Stuffs `docs` into `prompt` and returns the rendered prompt text.
///
/// Shorthand for a [`StuffDocuments`] chain with an [`EchoGenerator`], the
/// default document prompt, and the single variable of `prompt` as the
/// document variable.
///
/// # Errors
///
/// Returns an error if `prompt` does not have exactly one input variable,
/// or if formatting fails.
///
/// # Examples
///
/// ```
/// use stuff_docs::{Document, PromptTemplate, stuff};
///
/// # fn main() -> stuff_docs::Result<()> {
/// let prompt = PromptTemplate::from_template("Docs:\n{context}")?;
/// let text = stuff(prompt, &[Document::new("a"), Document::new("b")])?;
/// assert_eq!(text, "Docs:\na\n\nb");
/// # Ok(())
/// # }
/// ```
pub fn stuff(prompt: PromptTemplate, docs: &[Document]) -> Result<String> {
    let chain = StuffDocuments::builder(prompt, std::sync::Arc::new(EchoGenerator)).build()?;
    Ok(chain.combine_docs(docs, &Inputs::new())?.text)
}
