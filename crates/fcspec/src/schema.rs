//! Docstring → function-calling schema.

use std::collections::BTreeSet;

use crate::docstring::safe_parse_docstring;
use crate::type_map::{map_type, schema_is_nullable};
use crate::types::{FunctionSchema, ParametersSchema};

/// Build the schema for one function from its docstring.
///
/// `signature_defaults` holds the parameter names that have a default in the
/// real function signature. Those parameters are never required, whatever
/// the docstring says.
pub fn docstring_to_json_schema(
    docstring: &str,
    name: &str,
    signature_defaults: &BTreeSet<String>,
) -> FunctionSchema {
    let parsed = safe_parse_docstring(docstring);

    let description = [&parsed.short_description, &parsed.long_description]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n\n")
        .trim()
        .to_string();

    let mut parameters = ParametersSchema::default();
    let mut required = BTreeSet::new();

    for param in &parsed.params {
        let mut schema = map_type(param.type_name.as_deref().unwrap_or(""));

        let from_doc = param.description.trim();
        let from_type = schema.description.take().unwrap_or_default();
        let merged = match (from_doc.is_empty(), from_type.is_empty()) {
            (false, false) => format!("{from_doc} [{from_type}]"),
            (true, false) => from_type,
            _ => from_doc.to_string(),
        };
        schema.description = Some(merged.trim().to_string());

        let optional = param.is_optional == Some(true)
            || schema_is_nullable(&schema)
            || param.default.is_some()
            || signature_defaults.contains(&param.arg_name);
        if !optional {
            required.insert(param.arg_name.clone());
        }

        parameters.properties.insert(param.arg_name.clone(), schema);
    }

    // `required` is omitted, never emitted empty.
    if !required.is_empty() {
        parameters.required = Some(required.into_iter().collect());
    }

    FunctionSchema {
        name: name.to_string(),
        description,
        parameters,
    }
}
