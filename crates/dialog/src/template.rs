//! Condition and parameter templates
//!
//! Dialog conditions and action parameters may embed `{{ ... }}` expressions
//! over the session context: `.Event`, `.Variables.<name>`, `.Result.<name>`,
//! `.Session.ID`, `.Session.CurrentState`, `.Session.DialogName`, plus `eq`
//! and `ne` comparisons of those with quoted literals. Missing lookups render
//! as `<no value>`. Templates are parsed once and cached by source string.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use thiserror::Error;

/// Rendered output beyond this size fails the render.
const MAX_OUTPUT: usize = 64 * 1024;

const NO_VALUE: &str = "<no value>";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template parse: {0}")]
    Parse(String),
    #[error("template output exceeds 65536 bytes")]
    OutputTooLarge,
}

/// Data available to template expressions.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub session_id: String,
    pub dialog_name: String,
    pub current_state: String,
    pub event: String,
    pub variables: HashMap<String, String>,
    pub result: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
enum Expr {
    /// Field path, e.g. [".Variables", "name"] stored as segments.
    Path(Vec<String>),
    Literal(String),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone)]
enum Piece {
    Text(String),
    Expr(Expr),
}

#[derive(Debug)]
struct Template {
    pieces: Vec<Piece>,
}

static TEMPLATE_CACHE: Lazy<RwLock<HashMap<String, Arc<Template>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Evaluate a condition template. An empty condition is always true;
/// otherwise the trimmed output must be non-empty and neither `false` nor
/// `<no value>`.
pub fn eval_condition(condition: &str, ctx: &TemplateContext) -> Result<bool, TemplateError> {
    if condition.is_empty() {
        return Ok(true);
    }
    let rendered = render(condition, ctx)?;
    let trimmed = rendered.trim();
    Ok(!trimmed.is_empty() && trimmed != "false" && trimmed != NO_VALUE)
}

/// Render a parameter value. Plain strings pass through untouched.
pub fn render_param(value: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
    if !value.contains("{{") {
        return Ok(value.to_string());
    }
    render(value, ctx)
}

fn render(source: &str, ctx: &TemplateContext) -> Result<String, TemplateError> {
    let template = cached(source)?;
    let mut out = String::new();
    for piece in &template.pieces {
        let chunk = match piece {
            Piece::Text(text) => text.clone(),
            Piece::Expr(expr) => eval(expr, ctx),
        };
        if out.len() + chunk.len() > MAX_OUTPUT {
            return Err(TemplateError::OutputTooLarge);
        }
        out.push_str(&chunk);
    }
    Ok(out)
}

fn cached(source: &str) -> Result<Arc<Template>, TemplateError> {
    if let Some(template) = TEMPLATE_CACHE.read().get(source) {
        return Ok(Arc::clone(template));
    }
    let template = Arc::new(parse(source)?);
    TEMPLATE_CACHE
        .write()
        .insert(source.to_string(), Arc::clone(&template));
    Ok(template)
}

fn parse(source: &str) -> Result<Template, TemplateError> {
    let mut pieces = Vec::new();
    let mut rest = source;
    while let Some(start) = rest.find("{{") {
        if start > 0 {
            pieces.push(Piece::Text(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| TemplateError::Parse("unclosed {{".into()))?;
        pieces.push(Piece::Expr(parse_expr(after[..end].trim())?));
        rest = &after[end + 2..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Text(rest.to_string()));
    }
    Ok(Template { pieces })
}

fn parse_expr(raw: &str) -> Result<Expr, TemplateError> {
    let tokens = tokenize(raw)?;
    match tokens.as_slice() {
        [one] => parse_arg(one),
        [op, a, b] if op == "eq" || op == "ne" => {
            let lhs = Box::new(parse_arg(a)?);
            let rhs = Box::new(parse_arg(b)?);
            Ok(if op == "eq" {
                Expr::Eq(lhs, rhs)
            } else {
                Expr::Ne(lhs, rhs)
            })
        }
        [] => Err(TemplateError::Parse("empty expression".into())),
        _ => Err(TemplateError::Parse(format!("unsupported expression {raw:?}"))),
    }
}

fn parse_arg(token: &str) -> Result<Expr, TemplateError> {
    if let Some(stripped) = token.strip_prefix('"') {
        let inner = stripped
            .strip_suffix('"')
            .ok_or_else(|| TemplateError::Parse(format!("unterminated string {token:?}")))?;
        return Ok(Expr::Literal(inner.to_string()));
    }
    if let Some(path) = token.strip_prefix('.') {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(TemplateError::Parse(format!("bad field path {token:?}")));
        }
        return Ok(Expr::Path(segments));
    }
    Err(TemplateError::Parse(format!("unsupported token {token:?}")))
}

fn tokenize(raw: &str) -> Result<Vec<String>, TemplateError> {
    let mut tokens = Vec::new();
    let mut chars = raw.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            let mut token = String::from('"');
            chars.next();
            loop {
                match chars.next() {
                    Some('"') => {
                        token.push('"');
                        break;
                    }
                    Some(ch) => token.push(ch),
                    None => return Err(TemplateError::Parse("unterminated string".into())),
                }
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                token.push(ch);
                chars.next();
            }
            tokens.push(token);
        }
    }
    Ok(tokens)
}

fn eval(expr: &Expr, ctx: &TemplateContext) -> String {
    match expr {
        Expr::Literal(s) => s.clone(),
        Expr::Path(segments) => lookup(segments, ctx),
        Expr::Eq(a, b) => {
            if eval(a, ctx) == eval(b, ctx) {
                "true".into()
            } else {
                "false".into()
            }
        }
        Expr::Ne(a, b) => {
            if eval(a, ctx) != eval(b, ctx) {
                "true".into()
            } else {
                "false".into()
            }
        }
    }
}

fn lookup(segments: &[String], ctx: &TemplateContext) -> String {
    match segments.first().map(String::as_str) {
        Some("Event") if segments.len() == 1 => ctx.event.clone(),
        Some("Variables") if segments.len() == 2 => ctx
            .variables
            .get(&segments[1])
            .cloned()
            .unwrap_or_else(|| NO_VALUE.into()),
        Some("Result") if segments.len() == 2 => match ctx.result.get(&segments[1]) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(value) => value.to_string(),
            None => NO_VALUE.into(),
        },
        Some("Session") if segments.len() == 2 => match segments[1].as_str() {
            "ID" => ctx.session_id.clone(),
            "CurrentState" => ctx.current_state.clone(),
            "DialogName" => ctx.dialog_name.clone(),
            _ => NO_VALUE.into(),
        },
        _ => NO_VALUE.into(),
    }
}
