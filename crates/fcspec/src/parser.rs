//! Source walker: documented functions and methods of one Python file.
//!
//! Every `def` / `async def` with a non-empty docstring becomes a
//! [`FunctionSchema`] keyed by its in-file name (`func`, `Class.method`,
//! `Outer.Inner.method`). Function bodies are not descended into.

use std::collections::BTreeSet;
use std::path::Path;

use indexmap::IndexMap;
use tree_sitter::Node;

use crate::error::{Result, SchemaError};
use crate::python::{self, node_text};
use crate::schema::docstring_to_json_schema;
use crate::types::FunctionSchema;

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

/// One parameter of a `def`, as far as requiredness is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParam {
    pub name: String,
    pub has_default: bool,
}

/// Named parameters of a function definition, in declaration order. `*args`,
/// `**kwargs` and the bare `*` / `/` separators are not listed.
pub fn signature_params(func: &Node, src: &[u8]) -> Vec<SignatureParam> {
    let Some(parameters) = func.child_by_field_name("parameters") else {
        return Vec::new();
    };

    let mut params = Vec::new();
    let mut cursor = parameters.walk();
    for param in parameters.named_children(&mut cursor) {
        let (name_node, has_default) = match param.kind() {
            "identifier" => (Some(param), false),
            "typed_parameter" => match param.named_child(0) {
                Some(inner) if inner.kind() == "identifier" => (Some(inner), false),
                _ => continue,
            },
            "default_parameter" | "typed_default_parameter" => {
                (param.child_by_field_name("name"), true)
            }
            _ => continue,
        };
        if let Some(name_node) = name_node {
            params.push(SignatureParam {
                name: node_text(&name_node, src).to_string(),
                has_default,
            });
        }
    }
    params
}

/// Names of the parameters that have a default in the signature itself.
pub fn params_with_signature_defaults(func: &Node, src: &[u8]) -> BTreeSet<String> {
    signature_params(func, src)
        .into_iter()
        .filter(|p| p.has_default)
        .map(|p| p.name)
        .collect()
}

// ---------------------------------------------------------------------------
// Walker
// ---------------------------------------------------------------------------

/// Collects function schemas while tracking the enclosing class path.
struct SchemaExtractor<'s> {
    src: &'s [u8],
    class_path: Option<String>,
    schemas: IndexMap<String, FunctionSchema>,
}

impl<'s> SchemaExtractor<'s> {
    fn new(src: &'s [u8]) -> Self {
        Self {
            src,
            class_path: None,
            schemas: IndexMap::new(),
        }
    }

    fn visit(&mut self, node: Node) {
        match node.kind() {
            "function_definition" => self.visit_function(&node),
            "class_definition" => self.visit_class(&node),
            _ => self.visit_children(&node),
        }
    }

    fn visit_children(&mut self, node: &Node) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child);
        }
    }

    fn visit_class(&mut self, node: &Node) {
        let Some(name) = python::definition_name(node, self.src) else {
            return;
        };
        let outer = self.class_path.clone();
        self.class_path = Some(match &outer {
            Some(outer) => format!("{outer}.{name}"),
            None => name.to_string(),
        });
        self.visit_children(node);
        self.class_path = outer;
    }

    fn visit_function(&mut self, node: &Node) {
        let Some(docstring) = python::docstring(node, self.src).filter(|d| !d.is_empty()) else {
            return;
        };
        let Some(name) = python::definition_name(node, self.src) else {
            return;
        };
        let qualified = match &self.class_path {
            Some(class) => format!("{class}.{name}"),
            None => name.to_string(),
        };

        let defaults = params_with_signature_defaults(node, self.src);
        let schema = docstring_to_json_schema(&docstring, &qualified, &defaults);
        self.schemas.insert(qualified, schema);
    }
}

/// Schemas for every documented function in `source`, keyed by in-file name.
pub fn extract_schemas(source: &str) -> Result<IndexMap<String, FunctionSchema>> {
    let tree = python::parse_strict(source)?;
    let mut extractor = SchemaExtractor::new(source.as_bytes());
    extractor.visit(tree.root_node());
    Ok(extractor.schemas)
}

/// [`extract_schemas`] over a file. Unreadable or unparseable files yield an
/// empty map.
pub fn extract_schemas_from_file(path: &Path) -> IndexMap<String, FunctionSchema> {
    let result = std::fs::read_to_string(path)
        .map_err(|e| SchemaError::io("read", path, e))
        .and_then(|source| extract_schemas(source.strip_prefix('\u{feff}').unwrap_or(&source)));

    match result {
        Ok(schemas) => schemas,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Skipping file");
            IndexMap::new()
        }
    }
}
