use crate::{
    chain::Inputs,
    error::{Error, Result},
    template_validator::TemplateValidator,
};
use serde_json::Value;
use std::path::Path;
use tera::{Context, Tera};

/// Name under which Tera sources are registered internally.
const TERA_TEMPLATE_NAME: &str = "prompt";

/// Syntax of a prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemplateFormat {
    /// `{name}` placeholders with `{{` / `}}` escapes
    #[default]
    FString,
    /// Full Tera syntax (`{{ name }}`, `{% if %}`, filters)
    Tera,
}

impl TemplateFormat {
    /// Picks a format from a template file extension.
    ///
    /// `.tera` and `.j2` select Tera; everything else is f-string.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("tera" | "j2" | "jinja" | "jinja2") => Self::Tera,
            _ => Self::FString,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

#[derive(Debug, Clone)]
enum Engine {
    FString(Vec<Segment>),
    Tera(Box<Tera>),
}

/// A prompt template with a declared set of input variables.
///
/// Used both for the downstream prompt that receives the combined text and
/// for the per-document prompt that renders each document.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    name: String,
    source: String,
    format: TemplateFormat,
    engine: Engine,
    input_variables: Vec<String>,
    partial_variables: Inputs,
}

impl PromptTemplate {
    /// Parses an f-string template, inferring its input variables.
    ///
    /// Variables are listed in order of first appearance.
    ///
    /// # Errors
    ///
    /// Returns an error if a brace is unbalanced or a placeholder name is
    /// not an identifier.
    ///
    /// # Examples
    ///
    /// ```
    /// use stuff_docs::PromptTemplate;
    ///
    /// let prompt = PromptTemplate::from_template("Summarize:\n\n{context}")?;
    /// assert_eq!(prompt.input_variables(), ["context"]);
    /// # Ok::<(), stuff_docs::Error>(())
    /// ```
    pub fn from_template(source: impl Into<String>) -> Result<Self> {
        Self::named("inline", source)
    }

    fn named(name: impl Into<String>, source: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let source = source.into();
        let segments = parse_fstring(&name, &source)?;

        let mut input_variables: Vec<String> = Vec::new();
        for segment in &segments {
            if let Segment::Variable(var) = segment {
                if !input_variables.contains(var) {
                    input_variables.push(var.clone());
                }
            }
        }

        Ok(Self {
            name,
            source,
            format: TemplateFormat::FString,
            engine: Engine::FString(segments),
            input_variables,
            partial_variables: Inputs::new(),
        })
    }

    /// Template consisting of exactly one placeholder.
    pub(crate) fn single_variable(variable: &str) -> Self {
        Self {
            name: "inline".to_string(),
            source: format!("{{{variable}}}"),
            format: TemplateFormat::FString,
            engine: Engine::FString(vec![Segment::Variable(variable.to_string())]),
            input_variables: vec![variable.to_string()],
            partial_variables: Inputs::new(),
        }
    }

    /// Compiles a Tera template with explicitly declared input variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the source does not compile.
    pub fn tera<I, S>(source: impl Into<String>, input_variables: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::tera_named("inline", source.into(), input_variables)
    }

    fn tera_named<I, S>(name: impl Into<String>, source: String, input_variables: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let tera = compile_tera(&name, &source)?;
        Ok(Self::from_compiled(name, source, tera, input_variables))
    }

    fn from_compiled<I, S>(name: String, source: String, tera: Tera, input_variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut declared: Vec<String> = Vec::new();
        for var in input_variables {
            let var = var.into();
            if !declared.contains(&var) {
                declared.push(var);
            }
        }

        Self {
            name,
            source,
            format: TemplateFormat::Tera,
            engine: Engine::Tera(Box::new(tera)),
            input_variables: declared,
            partial_variables: Inputs::new(),
        }
    }

    /// Loads a template from disk.
    ///
    /// The file is validated first (size, emptiness). Tera files are
    /// compiled and their input variables inferred from the free
    /// identifiers of the parsed template.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, fails validation, or
    /// does not compile.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = TemplateValidator::read_template(path)?;
        let name = path.display().to_string();

        match TemplateFormat::from_path(path) {
            TemplateFormat::FString => Self::named(name, content),
            TemplateFormat::Tera => {
                let tera = compile_tera(&name, &content)?;
                let template = tera
                    .get_template(TERA_TEMPLATE_NAME)
                    .map_err(|e| Error::template(&name, &e))?;
                let variables = TemplateValidator::infer_tera_variables(template);
                tracing::debug!("Inferred variables {:?} for template '{}'", variables, name);
                Ok(Self::from_compiled(name, content, tera, variables))
            }
        }
    }

    /// Pre-fills a variable so callers no longer need to supply it.
    #[must_use]
    pub fn partial(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        self.input_variables.retain(|v| v != &name);
        self.partial_variables.insert(name, value.into());
        self
    }

    /// Returns the variables a caller must supply to render.
    #[must_use]
    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    /// Returns true if `name` is a declared input variable.
    #[must_use]
    pub fn accepts(&self, name: &str) -> bool {
        self.input_variables.iter().any(|v| v == name)
    }

    /// Returns the pre-filled variables.
    #[must_use]
    pub const fn partial_variables(&self) -> &Inputs {
        &self.partial_variables
    }

    /// Returns the template syntax.
    #[must_use]
    pub const fn format(&self) -> TemplateFormat {
        self.format
    }

    /// Returns the raw template source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Renders the template.
    ///
    /// Inputs that the template does not reference are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingInput`] if a declared variable is absent from
    /// both `inputs` and the partial variables, or a template error if Tera
    /// rendering fails.
    pub fn render(&self, inputs: &Inputs) -> Result<String> {
        for var in &self.input_variables {
            if !inputs.contains_key(var) && !self.partial_variables.contains_key(var) {
                return Err(Error::missing_input(var));
            }
        }

        match &self.engine {
            Engine::FString(segments) => {
                let mut out = String::with_capacity(self.source.len());
                for segment in segments {
                    match segment {
                        Segment::Literal(text) => out.push_str(text),
                        Segment::Variable(var) => {
                            let value = inputs
                                .get(var)
                                .or_else(|| self.partial_variables.get(var))
                                .ok_or_else(|| Error::missing_input(var))?;
                            push_value(&mut out, value);
                        }
                    }
                }
                Ok(out)
            }
            Engine::Tera(tera) => {
                let mut context = Context::new();
                for (key, value) in self.partial_variables.iter().chain(inputs) {
                    context.insert(key.as_str(), value);
                }
                tera.render(TERA_TEMPLATE_NAME, &context)
                    .map_err(|e| Error::template(&self.name, &e))
            }
        }
    }
}

fn compile_tera(name: &str, source: &str) -> Result<Tera> {
    let mut tera = Tera::default();
    tera.autoescape_on(Vec::new());
    tera.add_raw_template(TERA_TEMPLATE_NAME, source)
        .map_err(|e| Error::template(name, &e))?;
    Ok(tera)
}

/// Appends a value the way a prompt expects it: strings bare, null empty,
/// everything else as compact JSON.
pub(crate) fn push_value(out: &mut String, value: &Value) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Null => {}
        other => out.push_str(&other.to_string()),
    }
}

fn parse_fstring(name: &str, source: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = source.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    literal.push('{');
                    continue;
                }

                let mut var = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    match inner {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => {
                            return Err(Error::template_syntax(
                                name,
                                format!("nested '{{' inside placeholder at byte {pos}"),
                            ));
                        }
                        _ => var.push(inner),
                    }
                }

                if !closed {
                    return Err(Error::template_syntax(
                        name,
                        format!("unclosed placeholder starting at byte {pos}"),
                    ));
                }
                if !is_identifier(&var) {
                    return Err(Error::template_syntax(
                        name,
                        format!("invalid placeholder name '{var}' at byte {pos}"),
                    ));
                }

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Variable(var));
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    literal.push('}');
                    continue;
                }
                return Err(Error::template_syntax(
                    name,
                    format!("single '}}' encountered at byte {pos}"),
                ));
            }
            _ => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    Ok(segments)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' => {
            chars.all(|c| c.is_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use serde_json::json;

    fn inputs(pairs: &[(&str, Value)]) -> Inputs {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_fstring_variables_in_order() {
        let prompt =
            PromptTemplate::from_template("{question}\n{context}\n{question}").unwrap();
        assert_eq!(prompt.input_variables(), ["question", "context"]);
        assert!(prompt.accepts("context"));
        assert!(!prompt.accepts("other"));
    }

    #[test]
    fn test_fstring_render() {
        let prompt = PromptTemplate::from_template("Q: {question}\nN: {n}").unwrap();
        let rendered = prompt
            .render(&inputs(&[("question", json!("why?")), ("n", json!(3))]))
            .unwrap();
        assert_eq!(rendered, "Q: why?\nN: 3");
    }

    #[test]
    fn test_fstring_escapes() {
        let prompt = PromptTemplate::from_template("{{literal}} {value}").unwrap();
        assert_eq!(prompt.input_variables(), ["value"]);

        let rendered = prompt.render(&inputs(&[("value", json!("x"))])).unwrap();
        assert_eq!(rendered, "{literal} x");
    }

    #[test]
    fn test_fstring_syntax_errors() {
        assert!(PromptTemplate::from_template("{unclosed").is_err());
        assert!(PromptTemplate::from_template("stray }").is_err());
        assert!(PromptTemplate::from_template("{}").is_err());
        assert!(PromptTemplate::from_template("{0}").is_err());
        assert!(PromptTemplate::from_template("{a b}").is_err());
    }

    #[test]
    fn test_render_missing_input() {
        let prompt = PromptTemplate::from_template("{context} {question}").unwrap();
        let err = prompt
            .render(&inputs(&[("context", json!("c"))]))
            .unwrap_err();
        assert!(err.is_missing_input());
        assert!(err.to_string().contains("question"));
    }

    #[test]
    fn test_render_ignores_extra_inputs() {
        let prompt = PromptTemplate::from_template("{context}").unwrap();
        let rendered = prompt
            .render(&inputs(&[("context", json!("c")), ("unused", json!(1))]))
            .unwrap();
        assert_eq!(rendered, "c");
    }

    #[test]
    fn test_partial_variables() {
        let prompt = PromptTemplate::from_template("{language}: {context}")
            .unwrap()
            .partial("language", "French");

        assert_eq!(prompt.input_variables(), ["context"]);
        let rendered = prompt.render(&inputs(&[("context", json!("bonjour"))])).unwrap();
        assert_eq!(rendered, "French: bonjour");
    }

    #[test]
    fn test_null_renders_empty() {
        let prompt = PromptTemplate::from_template("[{v}]").unwrap();
        let rendered = prompt.render(&inputs(&[("v", Value::Null)])).unwrap();
        assert_eq!(rendered, "[]");
    }

    #[test]
    fn test_tera_render() {
        let prompt = PromptTemplate::tera(
            "{% if question %}Q: {{ question }}\n{% endif %}{{ context }}",
            ["context", "question"],
        )
        .unwrap();
        assert_eq!(prompt.format(), TemplateFormat::Tera);

        let rendered = prompt
            .render(&inputs(&[("context", json!("<b>")), ("question", json!("q"))]))
            .unwrap();
        assert_eq!(rendered, "Q: q\n<b>");
    }

    #[test]
    fn test_tera_syntax_error() {
        let result = PromptTemplate::tera("{% if %}", ["context"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_tera_missing_declared_input() {
        let prompt = PromptTemplate::tera("{{ context }}", ["context"]).unwrap();
        let err = prompt.render(&Inputs::new()).unwrap_err();
        assert!(err.is_missing_input());
    }

    #[test]
    fn test_from_file_fstring() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("summary.txt");
        file.write_str("Summarize:\n{context}").unwrap();

        let prompt = PromptTemplate::from_file(file.path()).unwrap();
        assert_eq!(prompt.format(), TemplateFormat::FString);
        assert_eq!(prompt.input_variables(), ["context"]);
    }

    #[test]
    fn test_from_file_tera_infers_variables() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("qa.tera");
        file.write_str(
            "{% for line in notes %}- {{ line | upper }}\n{% endfor %}{{ context }}\nQ: {{ question }}",
        )
        .unwrap();

        let prompt = PromptTemplate::from_file(file.path()).unwrap();
        assert_eq!(prompt.format(), TemplateFormat::Tera);
        assert_eq!(prompt.input_variables(), ["notes", "context", "question"]);
    }

    #[test]
    fn test_from_file_tera_whitespace_control_loop() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("notes.tera");
        file.write_str("{%- for note in notes -%}{{ note }};{%- endfor %}{{ context }}")
            .unwrap();

        let prompt = PromptTemplate::from_file(file.path()).unwrap();
        assert_eq!(prompt.input_variables(), ["notes", "context"]);

        let rendered = prompt
            .render(&inputs(&[("notes", json!(["a", "b"])), ("context", json!("c"))]))
            .unwrap();
        assert_eq!(rendered, "a;b;c");
    }

    #[test]
    fn test_from_file_tera_syntax_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("broken.tera");
        file.write_str("{% for x in %}{{ x }}").unwrap();

        let result = PromptTemplate::from_file(file.path());
        assert!(matches!(result, Err(Error::Template { .. })));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(TemplateFormat::from_path(Path::new("a.tera")), TemplateFormat::Tera);
        assert_eq!(TemplateFormat::from_path(Path::new("a.j2")), TemplateFormat::Tera);
        assert_eq!(TemplateFormat::from_path(Path::new("a.txt")), TemplateFormat::FString);
        assert_eq!(TemplateFormat::from_path(Path::new("prompt")), TemplateFormat::FString);
    }
}
