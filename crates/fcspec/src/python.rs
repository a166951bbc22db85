//! Thin layer over tree-sitter-python.
//!
//! Gives the rest of the crate the handful of `ast`-module operations it needs:
//! parsing (lenient and strict), docstring lookup with `inspect.cleandoc`
//! semantics, source segments, and `literal_eval` over literal expressions.

use serde_json::{Value, json};
use tree_sitter::{Node, Parser, Tree};

use crate::error::{Result, SchemaError};

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse Python source. Never fails on bad syntax; the tree carries ERROR nodes instead.
pub fn parse(source: &str) -> Result<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| SchemaError::ParseError(format!("failed to set language: {e}")))?;
    parser
        .parse(source, None)
        .ok_or_else(|| SchemaError::ParseError("tree-sitter parse returned None".into()))
}

/// Parse Python source, rejecting any tree with ERROR or MISSING nodes
/// (the equivalent of `ast.parse` raising `SyntaxError`).
pub fn parse_strict(source: &str) -> Result<Tree> {
    let tree = parse(source)?;
    let root = tree.root_node();
    if root.has_error() {
        let at = first_error(root).unwrap_or(root).start_position();
        return Err(SchemaError::SyntaxError {
            line: at.row + 1,
            column: at.column,
        });
    }
    Ok(tree)
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error()
            && let Some(found) = first_error(child)
        {
            return Some(found);
        }
    }
    None
}

pub fn node_text<'a>(node: &Node, src: &'a [u8]) -> &'a str {
    node.utf8_text(src).unwrap_or("")
}

/// Statements of a `module` or `block` node, skipping comments.
pub fn statements<'a>(body: &Node<'a>) -> Vec<Node<'a>> {
    let mut cursor = body.walk();
    body.named_children(&mut cursor)
        .filter(|n| n.kind() != "comment")
        .collect()
}

/// `@decorator def f(): ...` → the `function_definition` / `class_definition` inside.
pub fn unwrap_decorated<'a>(node: Node<'a>) -> Node<'a> {
    if node.kind() == "decorated_definition"
        && let Some(def) = node.child_by_field_name("definition")
    {
        return def;
    }
    node
}

pub fn definition_name<'a>(node: &Node, src: &'a [u8]) -> Option<&'a str> {
    node.child_by_field_name("name").map(|n| node_text(&n, src))
}

/// Body block of a function/class definition; a module is its own body.
pub fn body_of<'a>(node: &Node<'a>) -> Option<Node<'a>> {
    if node.kind() == "module" {
        Some(*node)
    } else {
        node.child_by_field_name("body")
    }
}

/// Source text covered by a node. For a decorated function this starts at
/// `def` (or `async`), as the decorator belongs to the wrapping node.
pub fn source_segment<'a>(node: &Node, source: &'a str) -> &'a str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

// ---------------------------------------------------------------------------
// Docstrings
// ---------------------------------------------------------------------------

/// The first statement of a body, if it is a bare `str` literal expression.
pub fn docstring_node<'a>(def: &Node<'a>, src: &[u8]) -> Option<Node<'a>> {
    let body = body_of(def)?;
    let first = *statements(&body).first()?;
    if first.kind() != "expression_statement" || first.named_child_count() != 1 {
        return None;
    }
    let expr = first.named_child(0)?;
    match literal_eval(&expr, src) {
        Some(LiteralValue::Str(_)) if is_string_node(&expr) => Some(first),
        _ => None,
    }
}

/// Raw (uncleaned) docstring value of a module/class/function.
pub fn raw_docstring(def: &Node, src: &[u8]) -> Option<String> {
    let stmt = docstring_node(def, src)?;
    match literal_eval(&stmt.named_child(0)?, src)? {
        LiteralValue::Str(s) => Some(s),
        _ => None,
    }
}

/// `ast.get_docstring(node)`: the docstring, cleaned with `inspect.cleandoc` rules.
pub fn docstring(def: &Node, src: &[u8]) -> Option<String> {
    raw_docstring(def, src).map(|s| cleandoc(&s))
}

/// Is this expression a bare string literal statement (`"..."` / `"a" "b"`)?
pub fn is_bare_string_statement(stmt: &Node, src: &[u8]) -> bool {
    if stmt.kind() != "expression_statement" || stmt.named_child_count() != 1 {
        return false;
    }
    match stmt.named_child(0) {
        Some(expr) if is_string_node(&expr) => {
            matches!(literal_eval(&expr, src), Some(LiteralValue::Str(_)))
        }
        _ => false,
    }
}

fn is_string_node(node: &Node) -> bool {
    matches!(node.kind(), "string" | "concatenated_string")
}

/// `inspect.cleandoc`: expand tabs, strip the first line, remove the common
/// indentation of the remaining lines, drop leading and trailing blank lines.
pub fn cleandoc(doc: &str) -> String {
    let mut lines: Vec<String> = doc.split('\n').map(|l| expand_tabs(l, 8)).collect();

    let margin = lines
        .iter()
        .skip(1)
        .filter_map(|line| {
            let indent = leading_whitespace(line);
            (indent < line.chars().count()).then_some(indent)
        })
        .min();

    if let Some(first) = lines.first_mut() {
        *first = first.trim_start().to_string();
    }
    if let Some(margin) = margin {
        for line in lines.iter_mut().skip(1) {
            *line = line.chars().skip(margin).collect();
        }
    }

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    let leading = lines.iter().take_while(|l| l.is_empty()).count();
    lines.drain(..leading);

    lines.join("\n")
}

fn leading_whitespace(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

fn expand_tabs(line: &str, tab_size: usize) -> String {
    if !line.contains('\t') {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len());
    let mut column = 0;
    for c in line.chars() {
        match c {
            '\t' => {
                let pad = tab_size - column % tab_size;
                out.extend(std::iter::repeat_n(' ', pad));
                column += pad;
            }
            '\r' => {
                out.push(c);
                column = 0;
            }
            _ => {
                out.push(c);
                column += 1;
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Literal evaluation  (the `ast.literal_eval` subset we need)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    None,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<LiteralValue>),
    Tuple(Vec<LiteralValue>),
    Set(Vec<LiteralValue>),
    Dict(Vec<(LiteralValue, LiteralValue)>),
}

impl LiteralValue {
    /// Convert to a `serde_json::Value` for embedding in a schema.
    pub fn to_json(&self) -> Value {
        match self {
            Self::None => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Integer(n) => json!(n),
            Self::Float(f) => json!(f),
            Self::Str(s) => Value::String(s.clone()),
            Self::Bytes(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
            Self::List(items) | Self::Tuple(items) | Self::Set(items) => {
                Value::Array(items.iter().map(|v| v.to_json()).collect())
            }
            Self::Dict(pairs) => {
                let mut map = serde_json::Map::new();
                for (k, v) in pairs {
                    // JSON keys must be strings
                    let key = match k {
                        Self::Str(s) => s.clone(),
                        other => other.to_json().to_string(),
                    };
                    map.insert(key, v.to_json());
                }
                Value::Object(map)
            }
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Evaluate a literal expression node. Returns `None` as soon as any
/// sub-expression is not a literal, mirroring `ast.literal_eval` raising.
pub fn literal_eval(node: &Node, src: &[u8]) -> Option<LiteralValue> {
    match node.kind() {
        "none" => Some(LiteralValue::None),
        "true" => Some(LiteralValue::Bool(true)),
        "false" => Some(LiteralValue::Bool(false)),
        "integer" => parse_int(node_text(node, src)).map(LiteralValue::Integer),
        "float" => parse_float(node_text(node, src)).map(LiteralValue::Float),
        "string" => decode_string_literal(node_text(node, src)),
        "concatenated_string" => {
            let mut parts = Vec::new();
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                if child.kind() == "comment" {
                    continue;
                }
                parts.push(decode_string_literal(node_text(&child, src))?);
            }
            concat_strings(parts)
        }
        "list" => sequence(node, src).map(LiteralValue::List),
        "tuple" | "expression_list" => sequence(node, src).map(LiteralValue::Tuple),
        "set" => sequence(node, src).map(LiteralValue::Set),
        "dictionary" => {
            let mut pairs = Vec::new();
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                match child.kind() {
                    "comment" => continue,
                    "pair" => {
                        let key = literal_eval(&child.child_by_field_name("key")?, src)?;
                        let value = literal_eval(&child.child_by_field_name("value")?, src)?;
                        pairs.push((key, value));
                    }
                    _ => return None,
                }
            }
            Some(LiteralValue::Dict(pairs))
        }
        "parenthesized_expression" => {
            let inner = statements(node);
            match inner.as_slice() {
                [only] => literal_eval(only, src),
                _ => None,
            }
        }
        "unary_operator" => {
            let op = node_text(&node.child_by_field_name("operator")?, src);
            let arg = literal_eval(&node.child_by_field_name("argument")?, src)?;
            match (op, arg) {
                ("-", LiteralValue::Integer(n)) => n.checked_neg().map(LiteralValue::Integer),
                ("-", LiteralValue::Float(f)) => Some(LiteralValue::Float(-f)),
                ("+", v @ (LiteralValue::Integer(_) | LiteralValue::Float(_))) => Some(v),
                _ => None,
            }
        }
        _ => None,
    }
}

fn sequence(node: &Node, src: &[u8]) -> Option<Vec<LiteralValue>> {
    statements(node)
        .iter()
        .map(|child| literal_eval(child, src))
        .collect()
}

fn concat_strings(parts: Vec<LiteralValue>) -> Option<LiteralValue> {
    let mut text: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;
    for part in parts {
        match part {
            LiteralValue::Str(s) if bytes.is_none() => text.get_or_insert_with(String::new).push_str(&s),
            LiteralValue::Bytes(b) if text.is_none() => bytes.get_or_insert_with(Vec::new).extend(b),
            _ => return None,
        }
    }
    text.map(LiteralValue::Str)
        .or_else(|| bytes.map(LiteralValue::Bytes))
}

pub fn parse_int(text: &str) -> Option<i64> {
    let clean: String = text.chars().filter(|c| *c != '_').collect();
    let lower = clean.to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = lower.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()
    } else {
        lower.parse::<i64>().ok()
    }
}

pub fn parse_float(text: &str) -> Option<f64> {
    let clean: String = text.chars().filter(|c| *c != '_').collect();
    // Imaginary literals (`1j`) are not floats.
    if clean.ends_with(['j', 'J']) {
        return None;
    }
    clean.parse::<f64>().ok()
}

/// Decode one string literal token, prefix and quotes included.
/// f-strings are not constants and yield `None`.
pub fn decode_string_literal(text: &str) -> Option<LiteralValue> {
    let quote_at = text.find(['"', '\''])?;
    let prefix = text[..quote_at].to_ascii_lowercase();
    if prefix.contains('f') || prefix.contains('t') {
        return None;
    }
    let body = &text[quote_at..];
    let quote_len = if body.starts_with("\"\"\"") || body.starts_with("'''") {
        3
    } else {
        1
    };
    if body.len() < quote_len * 2 {
        return None;
    }
    let content = &body[quote_len..body.len() - quote_len];
    let raw = prefix.contains('r');

    if prefix.contains('b') {
        let decoded = if raw {
            content.to_string()
        } else {
            unescape(content, false)
        };
        Some(LiteralValue::Bytes(decoded.into_bytes()))
    } else if raw {
        Some(LiteralValue::Str(content.to_string()))
    } else {
        Some(LiteralValue::Str(unescape(content, true)))
    }
}

fn unescape(content: &str, unicode: bool) -> String {
    let chars: Vec<char> = content.chars().collect();
    let mut out = String::with_capacity(content.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(&next) = chars.get(i) else {
            out.push('\\');
            break;
        };
        i += 1;
        match next {
            '\n' => {}
            '\r' => {
                if chars.get(i) == Some(&'\n') {
                    i += 1;
                }
            }
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\x0b'),
            '0'..='7' => {
                let mut value = next.to_digit(8).unwrap_or(0);
                let mut taken = 1;
                while taken < 3 {
                    match chars.get(i).and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            i += 1;
                            taken += 1;
                        }
                        None => break,
                    }
                }
                out.extend(char::from_u32(value));
            }
            'x' | 'u' | 'U' if next == 'x' || unicode => {
                let width = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = chars.iter().skip(i).take(width).collect();
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if digits.len() == width => {
                        out.push(decoded);
                        i += width;
                    }
                    _ => {
                        out.push('\\');
                        out.push(next);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}
