use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tera::Template;
use tera::ast::{Expr, ExprVal, FunctionCall, Node};

/// Maximum template file size (1MB)
const MAX_TEMPLATE_SIZE: u64 = 1024 * 1024;

/// Names Tera provides to every template.
const TERA_BUILTINS: &[&str] = &["__tera_context"];

/// Validates external prompt templates
pub(crate) struct TemplateValidator;

impl TemplateValidator {
    /// Reads and validates an external template file
    ///
    /// Performs the following checks:
    /// 1. File exists and is a regular file
    /// 2. File size is within limits
    /// 3. Content is not blank
    ///
    /// # Errors
    ///
    /// Returns an error if any check fails.
    pub(crate) fn read_template(path: &Path) -> Result<String> {
        if !path.exists() {
            return Err(Error::io(
                path,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "Template file not found"),
            ));
        }

        if !path.is_file() {
            return Err(Error::template_validation(
                path.to_string_lossy(),
                "Path is not a file",
            ));
        }

        let metadata = fs::metadata(path).map_err(|e| Error::io(path, &e))?;
        if metadata.len() > MAX_TEMPLATE_SIZE {
            return Err(Error::template_validation(
                path.to_string_lossy(),
                format!(
                    "Template file too large: {} bytes (max: {} bytes)",
                    metadata.len(),
                    MAX_TEMPLATE_SIZE
                ),
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| Error::io(path, &e))?;

        if content.trim().is_empty() {
            return Err(Error::template_validation(
                path.to_string_lossy(),
                "Template file is empty",
            ));
        }

        Ok(content)
    }

    /// Infers the caller-supplied variables of a compiled Tera template
    ///
    /// Walks the parsed template and collects the root of every identifier
    /// that is not bound by an enclosing `for` or a preceding `set`, in
    /// order of first use.
    pub(crate) fn infer_tera_variables(template: &Template) -> Vec<String> {
        let mut scan = FreeVariables::new();
        scan.nodes(&template.ast);
        scan.found
    }
}

/// Free-variable collector over a Tera AST.
///
/// Scopes mirror Tera's frames: the template body and each `for` body.
struct FreeVariables {
    found: Vec<String>,
    scopes: Vec<HashSet<String>>,
}

impl FreeVariables {
    fn new() -> Self {
        Self {
            found: Vec::new(),
            scopes: vec![HashSet::new()],
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn bind(&mut self, name: &str, global: bool) {
        let scope = if global {
            self.scopes.first_mut()
        } else {
            self.scopes.last_mut()
        };
        if let Some(scope) = scope {
            scope.insert(name.to_string());
        }
    }

    fn reference(&mut self, ident: &str) {
        let root = ident.split(['.', '[']).next().unwrap_or(ident).trim();
        if root.is_empty() || TERA_BUILTINS.contains(&root) || self.is_bound(root) {
            return;
        }
        if !self.found.iter().any(|name| name == root) {
            self.found.push(root.to_string());
        }
    }

    fn nodes(&mut self, nodes: &[Node]) {
        for node in nodes {
            self.node(node);
        }
    }

    fn node(&mut self, node: &Node) {
        match node {
            Node::VariableBlock(_, expr) => self.expr(expr),
            Node::Set(_, set) => {
                self.expr(&set.value);
                self.bind(&set.key, set.global);
            }
            Node::Forloop(_, forloop, _) => {
                self.expr(&forloop.container);

                let mut scope = HashSet::from([forloop.value.clone(), "loop".to_string()]);
                if let Some(key) = &forloop.key {
                    scope.insert(key.clone());
                }
                self.scopes.push(scope);
                self.nodes(&forloop.body);
                self.scopes.pop();

                if let Some(empty) = &forloop.empty_body {
                    self.nodes(empty);
                }
            }
            Node::If(branches, _) => {
                for (_, condition, body) in &branches.conditions {
                    self.expr(condition);
                    self.nodes(body);
                }
                if let Some((_, body)) = &branches.otherwise {
                    self.nodes(body);
                }
            }
            Node::Block(_, block, _) => self.nodes(&block.body),
            Node::FilterSection(_, section, _) => {
                self.call(&section.filter);
                self.nodes(&section.body);
            }
            // Macro bodies only see their arguments; includes and imports
            // name other templates.
            _ => {}
        }
    }

    fn expr(&mut self, expr: &Expr) {
        self.value(&expr.val);
        for filter in &expr.filters {
            self.call(filter);
        }
    }

    fn call(&mut self, call: &FunctionCall) {
        self.args(&call.args);
    }

    /// Keyword arguments, visited in name order for a stable result.
    fn args(&mut self, args: &HashMap<String, Expr>) {
        let mut sorted: Vec<_> = args.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        for (_, arg) in sorted {
            self.expr(arg);
        }
    }

    fn value(&mut self, value: &ExprVal) {
        match value {
            ExprVal::Ident(ident) => self.reference(ident),
            ExprVal::Math(math) => {
                self.expr(&math.lhs);
                self.expr(&math.rhs);
            }
            ExprVal::Logic(logic) => {
                self.expr(&logic.lhs);
                self.expr(&logic.rhs);
            }
            ExprVal::In(within) => {
                self.expr(&within.lhs);
                self.expr(&within.rhs);
            }
            ExprVal::Test(test) => {
                self.reference(&test.ident);
                for arg in &test.args {
                    self.expr(arg);
                }
            }
            ExprVal::FunctionCall(call) => self.call(call),
            ExprVal::MacroCall(call) => self.args(&call.args),
            ExprVal::Array(items) => {
                for item in items {
                    self.expr(item);
                }
            }
            ExprVal::StringConcat(concat) => {
                for part in &concat.values {
                    self.value(part);
                }
            }
            ExprVal::String(_) | ExprVal::Int(_) | ExprVal::Float(_) | ExprVal::Bool(_) => {}
        }
    }
}
