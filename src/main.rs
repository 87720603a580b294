use anyhow::{Context, bail};
use clap::Parser;
use serde_json::{Value, json};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stuff_docs::{
    CombineDocuments, DEFAULT_DOCUMENT_VARIABLE, EchoGenerator, Inputs, Metadata, PresetKind,
    PromptPreset, PromptTemplate, SplitStrategy, SplitterConfig, StuffDocuments, TokenizerKind,
};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "stuff-docs",
    version,
    author,
    about = "Stuff a long text into a single LLM prompt",
    long_about = "Split a text into documents and stuff them into one prompt.\n\n\
    The input is cut into chunks, each chunk is rendered with a document prompt, \
    and the rendered chunks are joined into the context variable of a preset or \
    custom prompt. The resulting prompt is printed, ready to send to a model.\n\n\
    USAGE EXAMPLES:\n  \
      # Summarize a file\n  \
      stuff-docs notes.txt\n\n  \
      # Ask a question about stdin\n  \
      cat report.md | stuff-docs - --preset question-answer --var question=\"What changed?\"\n\n  \
      # Custom prompt, only print the estimated size\n  \
      stuff-docs book.txt --prompt \"Themes of:\\n{context}\" --estimate --tokenizer enhanced"
)]
struct Cli {
    /// Text file to read, or '-' for stdin
    #[arg(value_name = "PATH")]
    input: PathBuf,

    /// Built-in prompt preset
    #[arg(short, long, value_enum, default_value = "summarize")]
    preset: CliPreset,

    /// Custom downstream prompt, f-string syntax (overrides --preset)
    #[arg(long, value_name = "TEMPLATE", conflicts_with = "prompt_file")]
    prompt: Option<String>,

    /// Custom downstream prompt file (.tera/.j2 files use Tera syntax)
    #[arg(long, value_name = "FILE")]
    prompt_file: Option<PathBuf>,

    /// Per-document prompt, f-string syntax
    #[arg(long, value_name = "TEMPLATE")]
    document_prompt: Option<String>,

    /// Prompt variable that receives the joined documents
    #[arg(long, value_name = "NAME")]
    document_variable: Option<String>,

    /// Separator placed between documents (\n, \t and \\ are unescaped)
    #[arg(long, default_value = "\\n\\n")]
    separator: String,

    /// Extra prompt variable in key=value format (can be used multiple times)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    vars: Vec<String>,

    /// Max chunk length
    #[arg(long, default_value_t = 4_000)]
    chunk_size: usize,

    /// Overlap between chunks
    #[arg(long, default_value_t = 200)]
    overlap: usize,

    /// Splitting strategy
    #[arg(long, value_enum, default_value = "recursive")]
    strategy: CliStrategy,

    /// Tokenizer used for estimates and token-budgeted splitting
    #[arg(long, value_enum, default_value = "simple")]
    tokenizer: CliTokenizer,

    /// Print the estimated prompt size in tokens instead of the prompt
    #[arg(long)]
    estimate: bool,

    /// Print JSON instead of plain text
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliTokenizer {
    Simple,
    Enhanced,
}

impl From<CliTokenizer> for TokenizerKind {
    fn from(t: CliTokenizer) -> Self {
        match t {
            CliTokenizer::Simple => Self::Simple,
            CliTokenizer::Enhanced => Self::Enhanced,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliStrategy {
    /// Separator hierarchy, lengths in characters
    Recursive,
    /// Whole lines, lengths in tokens
    LineTokens,
}

impl From<CliStrategy> for SplitStrategy {
    fn from(s: CliStrategy) -> Self {
        match s {
            CliStrategy::Recursive => Self::Recursive,
            CliStrategy::LineTokens => Self::LineTokens,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliPreset {
    /// Concise summary
    Summarize,
    /// Answer --var question=...
    QuestionAnswer,
    /// Bullet list of key points
    KeyPoints,
    /// Answer --var question=... citing each document's source
    CitedAnswer,
}

impl From<CliPreset> for PresetKind {
    fn from(p: CliPreset) -> Self {
        match p {
            CliPreset::Summarize => Self::Summarize,
            CliPreset::QuestionAnswer => Self::QuestionAnswer,
            CliPreset::KeyPoints => Self::KeyPoints,
            CliPreset::CitedAnswer => Self::CitedAnswer,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    let raw = read_input(&cli.input)?;
    let extra = parse_vars(&cli.vars)?;
    let preset = PromptPreset::for_kind(cli.preset.into());

    let prompt = match (&cli.prompt, &cli.prompt_file) {
        (Some(source), _) => PromptTemplate::from_template(source.as_str())
            .context("Failed to parse --prompt")?,
        (None, Some(path)) => PromptTemplate::from_file(path)
            .with_context(|| format!("Failed to load prompt file {}", path.display()))?,
        (None, None) => preset
            .prompt_template()
            .with_context(|| format!("Failed to load preset '{}'", preset.id))?,
    };

    let document_prompt = match &cli.document_prompt {
        Some(source) => PromptTemplate::from_template(source.as_str())
            .context("Failed to parse --document-prompt")?,
        None if cli.prompt.is_some() || cli.prompt_file.is_some() => {
            (*stuff_docs::DEFAULT_DOCUMENT_PROMPT).clone()
        }
        None => preset
            .document_prompt_template()
            .context("Failed to load preset document prompt")?,
    };

    let tokenizer: TokenizerKind = cli.tokenizer.into();
    let mut builder = StuffDocuments::builder(prompt.clone(), Arc::new(EchoGenerator))
        .document_prompt(document_prompt)
        .document_separator(unescape(&cli.separator))
        .tokenizer(tokenizer.create());

    if let Some(name) = cli.document_variable.as_deref() {
        builder = builder.document_variable_name(name);
    } else if prompt.accepts(DEFAULT_DOCUMENT_VARIABLE) {
        builder = builder.document_variable_name(DEFAULT_DOCUMENT_VARIABLE);
    }

    let chain = builder.build().context("Failed to build combine chain")?;

    let strategy: SplitStrategy = cli.strategy.into();
    let mut splitter_config = SplitterConfig::builder()
        .strategy(strategy)
        .chunk_size(cli.chunk_size)
        .chunk_overlap(cli.overlap);
    if strategy == SplitStrategy::LineTokens {
        splitter_config = splitter_config.tokenizer(tokenizer);
    }
    let splitter = splitter_config
        .build()
        .context("Failed to build splitter configuration")?
        .build_splitter();

    let source = Metadata::from([(
        "source".to_string(),
        Value::String(cli.input.display().to_string()),
    )]);
    let docs = splitter
        .create_documents(&[raw.as_str()], Some(&[source]))
        .context("Failed to split input")?;
    debug!("Input split into {} documents", docs.len());

    let estimated_tokens = chain
        .prompt_length(&docs, &extra)
        .context("Failed to estimate prompt length")?;

    if cli.estimate {
        let tokens = estimated_tokens.unwrap_or_default();
        if cli.json {
            println!(
                "{}",
                json!({ "documents": docs.len(), "estimated_tokens": tokens })
            );
        } else {
            println!("{tokens}");
        }
        return Ok(());
    }

    let output = chain
        .combine_docs(&docs, &extra)
        .context("Failed to combine documents")?;

    if cli.json {
        let mut body = serde_json::Map::new();
        body.insert(chain.output_key().to_string(), Value::String(output.text));
        body.insert("documents".to_string(), json!(docs.len()));
        body.insert("estimated_tokens".to_string(), json!(estimated_tokens));
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("{}", output.text);
    }

    Ok(())
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read stdin")?;
        return Ok(raw);
    }

    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn parse_vars(vars: &[String]) -> anyhow::Result<Inputs> {
    let mut inputs = Inputs::new();
    for item in vars {
        let Some((key, value)) = item.split_once('=') else {
            bail!("Invalid --var '{item}', expected KEY=VALUE");
        };
        inputs.insert(key.to_string(), Value::String(value.to_string()));
    }
    Ok(inputs)
}

/// Expands `\n`, `\t` and `\\`; other backslashes are kept.
fn unescape(separator: &str) -> String {
    let mut out = String::with_capacity(separator.len());
    let mut chars = separator.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("stuff_docs=info"),
        1 => EnvFilter::new("stuff_docs=debug"),
        _ => EnvFilter::new("stuff_docs=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("\\n\\n"), "\n\n");
        assert_eq!(unescape("a\\tb"), "a\tb");
        assert_eq!(unescape(" | "), " | ");
    }

    #[test]
    fn test_unescape_literal_backslash() {
        assert_eq!(unescape("\\\\n"), "\\n");
        assert_eq!(unescape("\\\\"), "\\");
        assert_eq!(unescape("\\x"), "\\x");
        assert_eq!(unescape("end\\"), "end\\");
    }

    #[test]
    fn test_parse_vars() {
        let inputs = parse_vars(&["question=a=b".to_string()]).unwrap();
        assert_eq!(inputs["question"], Value::String("a=b".to_string()));
        assert!(parse_vars(&["novalue".to_string()]).is_err());
    }
}
