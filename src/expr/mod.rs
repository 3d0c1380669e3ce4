//! Condition and template evaluation against device state.
//!
//! Widget definitions carry small expressions ("power == true") and templates
//! ("${value}°C") that are evaluated against a device's state record. State
//! keys are substituted textually with their literal values, then the result
//! is run through a restricted parser. Controller-supplied strings never
//! reach anything that can execute code.

mod parser;

pub use parser::{evaluate, truthy, EvalError};

use crate::path;
use serde_json::{Map, Value};
use tracing::warn;

/// State keys under this namespace fall back to `0` when unresolved, so color
/// arithmetic degrades to black instead of leaking template text into the UI.
const COLOR_NAMESPACE: &str = "colorComponents.";

/// Evaluate a widget condition against a device state record.
///
/// Every state key appearing as a whole-word token is replaced with its
/// literal value (strings quoted, numbers/bools/null verbatim; object and
/// array values are skipped). Two guards force `false`: an empty state
/// record, and an expression left unchanged by substitution. Both indicate
/// the condition would otherwise run against stale or default text.
pub fn evaluate_condition(state: &Map<String, Value>, condition: &str) -> bool {
    if state.is_empty() {
        warn!(condition = %condition, "Cannot evaluate condition against empty state");
        return false;
    }

    let mut expr = condition.to_string();
    let mut changed = false;
    for (key, value) in state {
        if let Some(literal) = scalar_literal(value) {
            let replaced = replace_word(&expr, key, &literal);
            if replaced != expr {
                expr = replaced;
                changed = true;
            }
        }
        // Object/array values are skipped, never stringified
    }

    if !changed {
        warn!(
            condition = %condition,
            "No state keys matched condition, treating as false"
        );
        return false;
    }

    match parser::evaluate(&expr) {
        Ok(value) => parser::truthy(&value),
        Err(e) => {
            warn!(condition = %condition, substituted = %expr, error = %e, "Condition evaluation failed");
            false
        }
    }
}

/// Interpolate `${...}` spans in a template against a device state record.
///
/// A span containing an operator is treated as arithmetic: every dotted-path
/// token is substituted (longest path first, so `colorComponents.red` is
/// never clobbered by a shorter prefix) and the span is evaluated. A plain
/// span is a single dotted property path. Unresolved paths yield `0` under
/// the color-component namespace and keep the original `${...}` text
/// everywhere else, so a broken template stays visible instead of rendering
/// as silent garbage.
pub fn interpolate(template: &str, state: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let span = &rest[start..start + 2 + end + 1];
                let inner = after[..end].trim();
                out.push_str(&render_span(span, inner, state));
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated span, emit verbatim
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Render one `${...}` span. `span` is the full original text including the
/// delimiters, used as the fail-open fallback.
fn render_span(span: &str, inner: &str, state: &Map<String, Value>) -> String {
    if contains_operator(inner) {
        render_arithmetic_span(span, inner, state)
    } else {
        match resolve_state(state, inner).and_then(display_scalar) {
            Some(text) => text,
            None if inner.starts_with(COLOR_NAMESPACE) => "0".to_string(),
            None => span.to_string(),
        }
    }
}

fn render_arithmetic_span(span: &str, inner: &str, state: &Map<String, Value>) -> String {
    let mut tokens = collect_path_tokens(inner);
    // Longest first, so a path is never partially replaced through a prefix
    tokens.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut expr = inner.to_string();
    for token in &tokens {
        let replacement = match resolve_state(state, token).and_then(|v| scalar_literal(&v)) {
            Some(literal) => literal,
            None if token.starts_with(COLOR_NAMESPACE) => "0".to_string(),
            None => continue, // leave the token; evaluation will flag it
        };
        expr = replace_word(&expr, token, &replacement);
    }

    match parser::evaluate(&expr) {
        Ok(value) => display_scalar(value).unwrap_or_else(|| span.to_string()),
        Err(e) => {
            warn!(span = %span, substituted = %expr, error = %e, "Template span evaluation failed");
            span.to_string()
        }
    }
}

/// Resolve a dotted path where the first segment is a state key.
fn resolve_state(state: &Map<String, Value>, dotted: &str) -> Option<Value> {
    let (head, tail) = match dotted.split_once('.') {
        Some((h, t)) => (h, Some(t)),
        None => (dotted, None),
    };
    let root = state.get(head)?;
    match tail {
        Some(rest) => path::resolve(root, rest).cloned(),
        None => Some(root.clone()),
    }
}

/// Literal source text for a scalar value, suitable for substitution into an
/// expression. `None` for objects and arrays.
fn scalar_literal(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some("null".to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Display form of a scalar for template output. Integral floats render
/// without a fractional part so `${value * 1.8 + 32}` gives "32", not "32.0".
fn display_scalar(value: Value) -> Option<String> {
    match value {
        Value::Null => Some("null".to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    return Some(format!("{}", f as i64));
                }
            }
            Some(n.to_string())
        }
        Value::String(s) => Some(s),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Replace whole-word occurrences of `word` outside string literals.
fn replace_word(text: &str, word: &str, replacement: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let word_chars: Vec<char> = word.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' {
            // Copy the quoted literal untouched
            out.push(c);
            i += 1;
            while i < chars.len() {
                out.push(chars[i]);
                if chars[i] == '\\' && i + 1 < chars.len() {
                    out.push(chars[i + 1]);
                    i += 2;
                    continue;
                }
                if chars[i] == c {
                    i += 1;
                    break;
                }
                i += 1;
            }
            continue;
        }

        let boundary_before = i == 0 || !is_word_char(chars[i - 1]);
        if boundary_before
            && chars[i..].starts_with(&word_chars[..])
            && chars
                .get(i + word_chars.len())
                .map_or(true, |&next| !is_word_char(next))
        {
            out.push_str(replacement);
            i += word_chars.len();
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

fn contains_operator(inner: &str) -> bool {
    let mut in_quote: Option<char> = None;
    for c in inner.chars() {
        match in_quote {
            Some(q) => {
                if c == q {
                    in_quote = None;
                }
            }
            None => match c {
                '"' | '\'' => in_quote = Some(c),
                '+' | '-' | '*' | '/' | '%' | '<' | '>' | '=' | '!' | '&' | '|' => return true,
                _ => {}
            },
        }
    }
    false
}

/// Collect dotted-path tokens from an expression span, skipping quoted text
/// and keyword literals.
fn collect_path_tokens(inner: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = inner.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' {
            i += 1;
            while i < chars.len() && chars[i] != c {
                i += 1;
            }
            i += 1;
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && is_word_char(chars[i]) {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            match word.as_str() {
                "true" | "false" | "null" | "undefined" => {}
                _ => {
                    if !tokens.contains(&word) {
                        tokens.push(word);
                    }
                }
            }
        } else {
            i += 1;
        }
    }
    tokens
}

#[cfg(test)]
mod tests;
