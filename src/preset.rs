//! Prompt presets for common document combination tasks.
//!
//! Each preset pairs a downstream prompt, which receives the stuffed
//! documents as `{context}`, with the document prompt used to render each
//! document.

use crate::{
    chain::DEFAULT_DOCUMENT_VARIABLE,
    error::Result,
    formatter::PAGE_CONTENT_KEY,
    template::PromptTemplate,
};
use serde::{Deserialize, Serialize};

/// Type of preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresetKind {
    /// Concise summary of all documents
    Summarize,
    /// Answer a `{question}` from the documents
    QuestionAnswer,
    /// Bullet list of the main points
    KeyPoints,
    /// Answer a `{question}` citing each document's `source`
    CitedAnswer,
}

impl PresetKind {
    /// Returns the ID string for this preset.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::QuestionAnswer => "question-answer",
            Self::KeyPoints => "key-points",
            Self::CitedAnswer => "cited-answer",
        }
    }

    /// Returns all available preset kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Summarize,
            Self::QuestionAnswer,
            Self::KeyPoints,
            Self::CitedAnswer,
        ]
    }

    /// Parse preset kind from string ID.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::all().iter().copied().find(|kind| kind.id() == id)
    }
}

/// Prompt pair for one preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptPreset {
    /// Unique preset identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Description of the preset
    pub description: String,
    /// Downstream prompt source, f-string syntax
    pub prompt: String,
    /// Per-document prompt source, f-string syntax
    pub document_prompt: String,
}

impl PromptPreset {
    /// Creates a preset for the given kind.
    #[must_use]
    pub fn for_kind(kind: PresetKind) -> Self {
        match kind {
            PresetKind::Summarize => Self::summarize(),
            PresetKind::QuestionAnswer => Self::question_answer(),
            PresetKind::KeyPoints => Self::key_points(),
            PresetKind::CitedAnswer => Self::cited_answer(),
        }
    }

    /// Compiles the downstream prompt.
    ///
    /// # Errors
    ///
    /// Returns a template error if the source does not parse.
    pub fn prompt_template(&self) -> Result<PromptTemplate> {
        PromptTemplate::from_template(self.prompt.as_str())
    }

    /// Compiles the document prompt.
    ///
    /// # Errors
    ///
    /// Returns a template error if the source does not parse.
    pub fn document_prompt_template(&self) -> Result<PromptTemplate> {
        PromptTemplate::from_template(self.document_prompt.as_str())
    }

    /// Prompt variables the caller must supply besides the documents.
    #[must_use]
    pub fn extra_variables(&self) -> Vec<String> {
        self.prompt_template()
            .map(|t| {
                t.input_variables()
                    .iter()
                    .filter(|v| *v != DEFAULT_DOCUMENT_VARIABLE)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn plain_document_prompt() -> String {
        format!("{{{PAGE_CONTENT_KEY}}}")
    }

    fn summarize() -> Self {
        Self {
            id: "summarize".to_string(),
            name: "Summarize".to_string(),
            description: "Concise summary of the combined documents".to_string(),
            prompt: r#"Write a concise summary of the following:


"{context}"


CONCISE SUMMARY:"#
                .to_string(),
            document_prompt: Self::plain_document_prompt(),
        }
    }

    fn question_answer() -> Self {
        Self {
            id: "question-answer".to_string(),
            name: "Question Answering".to_string(),
            description: "Answer a question using only the combined documents".to_string(),
            prompt: r"Use the following pieces of context to answer the question at the end. If you don't know the answer, just say that you don't know, don't try to make up an answer.

{context}

Question: {question}
Helpful Answer:"
                .to_string(),
            document_prompt: Self::plain_document_prompt(),
        }
    }

    fn key_points() -> Self {
        Self {
            id: "key-points".to_string(),
            name: "Key Points".to_string(),
            description: "Bullet list of the main points across the documents".to_string(),
            prompt: r"Read the following text and list its key points.

{context}

Reply with one bullet per point, most important first. Do not add facts that are not in the text.

KEY POINTS:"
                .to_string(),
            document_prompt: Self::plain_document_prompt(),
        }
    }

    fn cited_answer() -> Self {
        Self {
            id: "cited-answer".to_string(),
            name: "Cited Answer".to_string(),
            description: "Answer a question and cite the source of each claim".to_string(),
            prompt: r"Given the following extracted parts of a long document and a question, create a final answer with references (SOURCES).
If you don't know the answer, just say that you don't know. Don't try to make up an answer.
ALWAYS return a SOURCES part in your answer.

QUESTION: {question}
=========
{context}
=========
FINAL ANSWER:"
                .to_string(),
            document_prompt: "Content: {page_content}\nSource: {source}".to_string(),
        }
    }
}
