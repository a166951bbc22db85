//! Python type-hint text → JSON-Schema fragment.
//!
//! Hints come from docstrings, so they are plain text rather than live types.
//! The text is parsed with the Python grammar into a small [`TypeExpr`] tree
//! (names, subscripted generics, `|` unions) and the mapping rules match on
//! that structure. Mapping never fails: anything unrecognised degrades to a
//! permissive schema carrying an explanatory description.
//!
//! Because hints are parsed rather than prefix-matched, PEP 604 unions
//! (`str | None`) and `typing.`-qualified generics (`typing.Optional[str]`)
//! map like their `Union[...]` / bare forms and are therefore nullable.
//! Text that does not parse falls back to bracket-prefix matching.

use serde_json::Value;
use tree_sitter::Node;

use crate::python::{self, LiteralValue, node_text};
use crate::types::{JsonType, TypeSchema};

const DEFAULTED_ITEM_DESCRIPTION: &str = "Defaulted item type as original was invalid or empty.";

// ---------------------------------------------------------------------------
// Type expression tree
// ---------------------------------------------------------------------------

/// A parsed type hint. Every node keeps the hint text it was parsed from,
/// which is what descriptions quote back to the reader.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub text: String,
    pub kind: TypeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    /// `None` / `NoneType`
    NoneType,
    /// `str`, `MyModel`, `datetime.datetime`
    Name(String),
    /// `List[int]`, `Dict[str, Any]`; `inner` is the raw text between the brackets.
    Generic {
        base: String,
        args: Vec<TypeExpr>,
        inner: String,
    },
    /// PEP 604 `X | Y | None`
    Union(Vec<TypeExpr>),
    /// `...`
    Ellipsis,
    /// A literal value inside a subscript, e.g. the members of `Literal[...]`.
    Constant(LiteralValue),
    /// Anything else, including text that does not parse as an expression.
    Opaque,
}

impl TypeExpr {
    /// Parse hint text. Unparseable text becomes [`TypeKind::Opaque`].
    pub fn parse(hint: &str) -> Self {
        let text = hint.trim();
        let opaque = || TypeExpr {
            text: text.to_string(),
            kind: TypeKind::Opaque,
        };

        let Ok(tree) = python::parse_strict(text) else {
            return opaque();
        };
        let root = tree.root_node();
        let statements = python::statements(&root);
        let [stmt] = statements.as_slice() else {
            return opaque();
        };
        if stmt.kind() != "expression_statement" || stmt.named_child_count() != 1 {
            return opaque();
        }
        match stmt.named_child(0) {
            Some(expr) => Self::from_node(&expr, text.as_bytes()),
            None => opaque(),
        }
    }

    fn from_node(node: &Node, src: &[u8]) -> Self {
        let text = node_text(node, src).trim().to_string();
        let kind = match node.kind() {
            "none" => TypeKind::NoneType,
            "identifier" | "attribute" if is_none_name(&text) => TypeKind::NoneType,
            "identifier" | "attribute" => TypeKind::Name(text.clone()),
            "ellipsis" => TypeKind::Ellipsis,
            "subscript" => Self::generic_kind(node, src),
            "binary_operator" => Self::union_kind(node, src),
            "parenthesized_expression" => match python::statements(node).as_slice() {
                [inner] => return Self::from_node(inner, src),
                _ => TypeKind::Opaque,
            },
            _ => match python::literal_eval(node, src) {
                Some(value) => TypeKind::Constant(value),
                None => TypeKind::Opaque,
            },
        };
        TypeExpr { text, kind }
    }

    fn generic_kind(node: &Node, src: &[u8]) -> TypeKind {
        let Some(value) = node.child_by_field_name("value") else {
            return TypeKind::Opaque;
        };
        let base = node_text(&value, src);
        let base = base
            .strip_prefix("typing.")
            .or_else(|| base.strip_prefix("typing_extensions."))
            .unwrap_or(base)
            .to_string();

        let mut cursor = node.walk();
        let args: Vec<TypeExpr> = node
            .children_by_field_name("subscript", &mut cursor)
            .map(|arg| Self::from_node(&arg, src))
            .collect();

        // Raw text between the outer brackets, for rules that work on it directly.
        let full = node_text(node, src);
        let after_base = value.end_byte().saturating_sub(node.start_byte());
        let inner = match (full[after_base..].find('['), full.rfind(']')) {
            (Some(open), Some(close)) if after_base + open < close => {
                full[after_base + open + 1..close].trim().to_string()
            }
            _ => String::new(),
        };

        TypeKind::Generic { base, args, inner }
    }

    fn union_kind(node: &Node, src: &[u8]) -> TypeKind {
        let operator = node
            .child_by_field_name("operator")
            .map(|op| node_text(&op, src))
            .unwrap_or("");
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return TypeKind::Opaque;
        };
        if operator != "|" {
            return TypeKind::Opaque;
        }

        // Flatten nested unions: (A | B) | C → [A, B, C]
        let mut members = Vec::new();
        for side in [left, right] {
            let member = Self::from_node(&side, src);
            match member.kind {
                TypeKind::Union(inner) => members.extend(inner),
                _ => members.push(member),
            }
        }
        TypeKind::Union(members)
    }
}

fn is_none_name(text: &str) -> bool {
    text.eq_ignore_ascii_case("none") || text.eq_ignore_ascii_case("nonetype")
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Map a Python type-hint string to a JSON-Schema fragment. Never panics.
pub fn map_type(type_hint: &str) -> TypeSchema {
    let hint = type_hint.trim();

    if hint.is_empty() {
        return TypeSchema::of(JsonType::Object)
            .with_description("Represents any type; schema defaulted to 'object'.");
    }
    if is_none_name(hint) {
        return null_sentinel();
    }
    if hint == "{}" {
        return TypeSchema::of(JsonType::Object)
            .with_description("Represents any type (from '{}' hint); schema defaulted to 'object'.");
    }

    map_expr(&TypeExpr::parse(hint))
}

/// The schema for a value that must literally be `null`.
pub fn null_sentinel() -> TypeSchema {
    TypeSchema {
        json_type: Some(JsonType::String),
        nullable: Some(true),
        enum_values: Some(vec![Value::Null]),
        ..TypeSchema::default()
    }
}

/// True iff the schema is marked nullable or is exactly the null sentinel.
pub fn schema_is_nullable(schema: &TypeSchema) -> bool {
    schema.nullable == Some(true)
        || (schema.json_type == Some(JsonType::String)
            && schema.enum_values.as_deref() == Some(&[Value::Null][..]))
}

fn map_expr(expr: &TypeExpr) -> TypeSchema {
    match &expr.kind {
        TypeKind::NoneType => null_sentinel(),
        TypeKind::Generic { base, args, inner } => match base.as_str() {
            "Optional" => map_optional(args, inner),
            "Union" => map_union(args),
            "Literal" => map_literal(args),
            "List" | "list" => map_list(args, inner),
            "Tuple" | "tuple" => map_tuple(args, inner),
            "Dict" | "dict" => map_dict(args),
            _ => map_name(&expr.text),
        },
        TypeKind::Union(members) => map_union(members),
        _ if expr.text.is_empty() => map_type(""),
        _ if expr.text == "{}" => map_type("{}"),
        TypeKind::Opaque => map_unparsed(&expr.text),
        _ => map_name(&expr.text),
    }
}

/// Hints that do not parse, typically with unbalanced brackets, still get the
/// generic rules when they look like `Prefix[...]`. Arguments are split on
/// top-level commas and mapped one by one.
fn map_unparsed(text: &str) -> TypeSchema {
    let Some((base, inner)) = text
        .strip_suffix(']')
        .and_then(|rest| rest.split_once('['))
    else {
        return map_name(text);
    };
    let base = base
        .strip_prefix("typing.")
        .or_else(|| base.strip_prefix("typing_extensions."))
        .unwrap_or(base);
    let inner = inner.trim();
    let inner_or_any = if inner.is_empty() { "Any" } else { inner };
    let args = || -> Vec<TypeExpr> {
        split_top_level(inner)
            .into_iter()
            .map(TypeExpr::parse)
            .collect()
    };

    match base {
        "Optional" => {
            let schema = map_type(inner_or_any);
            if schema.nullable == Some(true) {
                return schema;
            }
            schema.with_nullable()
        }
        "Union" => map_union(&args()),
        "Literal" => map_literal(&args()),
        "List" | "list" => TypeSchema::array_of(ensure_item_type(map_type(inner_or_any))),
        "Tuple" | "tuple" => map_tuple(&args(), inner),
        "Dict" | "dict" => map_dict(&args()),
        _ => map_name(text),
    }
}

/// `"int, Dict[str, int], str"` → `["int", "Dict[str, int]", "str"]`.
/// Empty pieces are dropped.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Map a single argument, or the raw bracket text when the arity is unexpected.
fn map_single_arg(args: &[TypeExpr], inner: &str) -> TypeSchema {
    match args {
        [only] => map_expr(only),
        [] => map_name("Any"),
        _ => map_type(inner),
    }
}

fn map_optional(args: &[TypeExpr], inner: &str) -> TypeSchema {
    let base = map_single_arg(args, inner);
    // Optional[None] is already the null sentinel; don't double-wrap.
    if base.nullable == Some(true) {
        return base;
    }
    base.with_nullable()
}

fn map_union(members: &[TypeExpr]) -> TypeSchema {
    if members.is_empty() {
        return map_name("Any");
    }

    let member_texts: Vec<&str> = members.iter().map(|m| m.text.as_str()).collect();
    let full_hint = format!("Union[{}]", member_texts.join(", "));

    let non_null: Vec<&TypeExpr> = members
        .iter()
        .filter(|m| m.kind != TypeKind::NoneType)
        .collect();
    let nullable = non_null.len() < members.len();

    let mut schema = match non_null.as_slice() {
        [] => return null_sentinel(),
        [only] => map_expr(only),
        [first, ..] => {
            let first_schema = map_expr(first);
            let names: Vec<&str> = non_null.iter().map(|m| m.text.as_str()).collect();
            let note = format!(
                "Value can be one of several Python types: {}. Schema represents the first type ('{}') or a generic base due to schema constraints. Original hint: {full_hint}.",
                names.join(", "),
                first.text,
            );
            // Lossy on purpose: the first member's outer type plus a note, not `oneOf`.
            TypeSchema::of(first_schema.json_type.unwrap_or(JsonType::Object))
                .with_description(note)
        }
    };

    if !nullable {
        return schema;
    }
    if schema.nullable == Some(true) {
        return schema;
    }
    let current = schema.description.take().unwrap_or_default();
    if !current.to_lowercase().contains("can be null") && !full_hint.contains("Optional") {
        schema.description = Some(
            format!("{current} The value can also be null (originally part of {full_hint}).")
                .trim()
                .to_string(),
        );
    } else if !current.is_empty() {
        schema.description = Some(current);
    }
    schema.with_nullable()
}

fn map_literal(args: &[TypeExpr]) -> TypeSchema {
    let values: Vec<Value> = args
        .iter()
        .map(|arg| match &arg.kind {
            TypeKind::Constant(value) => value.to_json(),
            TypeKind::NoneType => Value::Null,
            _ => Value::String(arg.text.clone()),
        })
        .collect();

    let enum_type = match values.first() {
        Some(Value::Bool(_)) => JsonType::Boolean,
        Some(Value::Number(n)) if n.is_f64() => JsonType::Number,
        Some(Value::Number(_)) => JsonType::Integer,
        _ => JsonType::String,
    };

    TypeSchema {
        enum_values: Some(values),
        ..TypeSchema::of(enum_type)
    }
}

fn map_list(args: &[TypeExpr], inner: &str) -> TypeSchema {
    TypeSchema::array_of(ensure_item_type(map_single_arg(args, inner)))
}

fn map_tuple(args: &[TypeExpr], inner: &str) -> TypeSchema {
    let any_items = || TypeSchema::array_of(ensure_item_type(map_name("Any")));

    match args {
        [] => any_items(),
        [only] if only.kind == TypeKind::Ellipsis => any_items(),
        // Variadic: Tuple[X, ...]
        [head @ .., last] if last.kind == TypeKind::Ellipsis => {
            let item = match head {
                [only] => map_expr(only),
                _ => {
                    let head_text = inner.rsplit_once(',').map_or(inner, |(h, _)| h);
                    map_type(head_text)
                }
            };
            TypeSchema::array_of(ensure_item_type(item))
        }
        // Fixed arity: Tuple[X, Y, Z]
        _ => TypeSchema {
            prefix_items: Some(
                args.iter()
                    .map(|arg| ensure_item_type(map_expr(arg)))
                    .collect(),
            ),
            ..TypeSchema::of(JsonType::Array)
        },
    }
}

fn map_dict(args: &[TypeExpr]) -> TypeSchema {
    let (key, value) = match args {
        [value] => ("string", value.text.as_str()),
        [key, value] => (key.text.as_str(), value.text.as_str()),
        _ => ("string", "any"),
    };

    let mut description = format!(
        "An object/dictionary. Python type hint indicates keys of type '{key}' and values of type '{value}'."
    );
    if !matches!(key.to_lowercase().as_str(), "str" | "string" | "any") {
        description.push_str(
            " Note: JSON object keys are strings; non-string Python dict keys may require special handling (e.g., stringification).",
        );
    }
    TypeSchema::open_object().with_description(description)
}

/// Bare names and anything without structure: builtins, the name table,
/// then the capitalised-class heuristic, then "unresolved".
fn map_name(name: &str) -> TypeSchema {
    let lower = name.to_lowercase();
    match lower.as_str() {
        "dict" => {
            return TypeSchema::open_object().with_description(
                "A dictionary object with arbitrary key-value pairs (specific key/value types not detailed in this part of the hint).",
            );
        }
        "object" => return TypeSchema::open_object().with_description("A generic Python object."),
        "list" | "tuple" => return TypeSchema::array_of(ensure_item_type(TypeSchema::any())),
        _ => {}
    }

    if name == "Any" {
        return TypeSchema::any();
    }
    if let Some(json_type) = JsonType::from_python_name(name).or_else(|| JsonType::from_python_name(&lower)) {
        return TypeSchema::of(json_type);
    }

    if name.chars().next().is_some_and(char::is_uppercase) {
        return TypeSchema::open_object()
            .with_description(format!("Represents an object of type '{name}'."));
    }
    TypeSchema::of(JsonType::String).with_description(format!("Unresolved type: {name}"))
}

/// Array items must carry a `type`; an "any" item becomes an object.
fn ensure_item_type(schema: TypeSchema) -> TypeSchema {
    if schema.is_any() {
        return TypeSchema::of(JsonType::Object).with_description(DEFAULTED_ITEM_DESCRIPTION);
    }
    if schema.json_type.is_some() {
        return schema;
    }
    TypeSchema {
        json_type: Some(JsonType::Object),
        ..schema
    }
}
