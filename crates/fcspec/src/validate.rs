//! Structural checks for generated schema files.
//!
//! Works on plain JSON rather than [`FunctionSchema`](crate::types::FunctionSchema)
//! so hand-edited or foreign files can be checked too. Every check reports
//! problems as human-readable strings; an empty list means the file is valid.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{Result, SchemaError};

const VALID_TYPES: [&str; 7] = [
    "string", "integer", "number", "boolean", "object", "array", "null",
];

/// Keys whose values are schema containers rather than schemas themselves.
const STRUCTURE_KEYWORDS: [&str; 7] = [
    "properties",
    "items",
    "required",
    "description",
    "enum",
    "default",
    "examples",
];

const UNNAMED: &str = "Unnamed Function";

// ---------------------------------------------------------------------------
// Per-declaration checks
// ---------------------------------------------------------------------------

fn name_of(declaration: &Map<String, Value>) -> &str {
    declaration
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(UNNAMED)
}

/// `None`, `null`, `false`, `0`, `""`, `[]` and `{}` all count as missing.
fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

fn type_of(schema: &Value) -> Option<&str> {
    schema.get("type").and_then(Value::as_str)
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Name, description and parameters are present; `parameters` is an object
/// or array schema with `properties` / non-empty `items` as appropriate.
pub fn check_declaration_structure(declaration: &Map<String, Value>, service: &str) -> Vec<String> {
    let name = name_of(declaration);
    let prefix = format!("{service}-{name}");
    let mut errors = Vec::new();

    if !is_present(declaration.get("name")) {
        errors.push(format!("{prefix}: Missing 'name' field"));
    }
    if !is_present(declaration.get("description")) {
        errors.push(format!("{prefix}: Missing 'description' field"));
    }

    let params = declaration.get("parameters");
    if !is_present(params) {
        errors.push(format!("{prefix}: Missing 'parameters' field"));
        return errors;
    }
    let Some(params) = params.and_then(Value::as_object) else {
        errors.push(format!("{prefix}: 'parameters' must be an object"));
        return errors;
    };

    match params.get("type").and_then(Value::as_str) {
        Some("array") => {
            if !params.get("items").is_some_and(|items| is_present(Some(items)) && items.is_object()) {
                errors.push(format!(
                    "{prefix}: Array parameters must have non-empty 'items' object"
                ));
            }
        }
        Some("object") => {
            if !params.get("properties").is_some_and(Value::is_object) {
                errors.push(format!(
                    "{prefix}: Object parameters must have 'properties' object"
                ));
            }
        }
        other => {
            let got = other.map_or_else(|| "None".to_string(), str::to_string);
            errors.push(format!(
                "{prefix}: 'parameters.type' must be 'object' or 'array', got '{got}'"
            ));
        }
    }
    errors
}

/// Top-level `parameters` and each direct property: arrays need an `items`
/// object, objects need a `properties` object.
pub fn check_parameter_containers(declaration: &Map<String, Value>) -> Vec<String> {
    let name = name_of(declaration);
    let mut errors = Vec::new();
    let Some(params) = declaration.get("parameters") else {
        return errors;
    };

    for (label, schema) in std::iter::once(("Main parameters".to_string(), params)).chain(
        params
            .get("properties")
            .and_then(Value::as_object)
            .into_iter()
            .flatten()
            .map(|(param, schema)| (format!("Parameter '{param}'"), schema)),
    ) {
        match type_of(schema) {
            Some("array") if !schema.get("items").is_some_and(Value::is_object) => {
                errors.push(format!(
                    "{name}: {label} is type 'array' but missing valid 'items' dictionary"
                ));
            }
            Some("object") if !schema.get("properties").is_some_and(Value::is_object) => {
                errors.push(format!(
                    "{name}: {label} is type 'object' but missing valid 'properties' dictionary"
                ));
            }
            _ => {}
        }
    }
    errors
}

/// Walks every nested schema. Arrays must carry an `items` object and
/// objects a `properties` object, at any depth.
pub fn check_nested_containers(value: &Value, path: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(object) = value.as_object() else {
        return errors;
    };

    for (key, child) in object {
        if !child.is_object() {
            continue;
        }
        let child_path = join_path(path, key);
        match type_of(child) {
            Some("array") => match child.get("items") {
                Some(items) if items.is_object() => {
                    errors.extend(check_nested_containers(items, &child_path));
                }
                _ => errors.push(format!(
                    "Array at '{child_path}' missing valid 'items' dictionary"
                )),
            },
            Some("object") => match child.get("properties") {
                Some(properties) if properties.is_object() => {
                    errors.extend(check_nested_containers(properties, &child_path));
                }
                _ => errors.push(format!(
                    "Object at '{child_path}' missing valid 'properties' dictionary"
                )),
            },
            _ => errors.extend(check_nested_containers(child, &child_path)),
        }
    }
    errors
}

/// Every `type` keyword, in objects and in lists of schemas, must name a
/// JSON-Schema type (or be a list of them).
pub fn check_type_values(value: &Value, path: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(object) = value.as_object() else {
        return errors;
    };

    for (key, child) in object {
        let child_path = join_path(path, key);
        match child {
            Value::Object(_) => {
                if !STRUCTURE_KEYWORDS.contains(&key.as_str())
                    && let Some(type_value) = child.get("type")
                {
                    errors.extend(check_type_value(type_value, &child_path));
                }
                errors.extend(check_type_values(child, &child_path));
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if !item.is_object() {
                        continue;
                    }
                    let item_path = format!("{child_path}[{i}]");
                    if let Some(type_value) = item.get("type") {
                        errors.extend(check_type_value(type_value, &item_path));
                    }
                    errors.extend(check_type_values(item, &item_path));
                }
            }
            _ => {}
        }
    }
    errors
}

fn check_type_value(type_value: &Value, path: &str) -> Vec<String> {
    let allowed = VALID_TYPES.join(", ");
    match type_value {
        Value::String(t) if VALID_TYPES.contains(&t.as_str()) => Vec::new(),
        Value::String(t) => vec![format!(
            "Invalid type '{t}' at '{path}' - must be one of {allowed}"
        )],
        Value::Array(types) => types
            .iter()
            .filter(|t| !t.as_str().is_some_and(|t| VALID_TYPES.contains(&t)))
            .map(|t| {
                let shown = t.as_str().map_or_else(|| t.to_string(), str::to_string);
                format!("Invalid type '{shown}' in union at '{path}' - must be one of {allowed}")
            })
            .collect(),
        other => vec![format!(
            "Type value at '{path}' must be string or array, got {}",
            kind_name(other)
        )],
    }
}

fn join_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// All checks over one file's declarations, in check order.
pub fn validate_declarations(declarations: &[Value], service: &str) -> Vec<String> {
    let mut errors: Vec<String> = declarations
        .iter()
        .enumerate()
        .filter(|(_, d)| !d.is_object())
        .map(|(i, d)| {
            format!(
                "{service}: entry {i} is not a function declaration object (got {})",
                kind_name(d)
            )
        })
        .collect();

    let objects: Vec<&Map<String, Value>> =
        declarations.iter().filter_map(Value::as_object).collect();
    for declaration in &objects {
        errors.extend(check_declaration_structure(declaration, service));
    }
    for declaration in &objects {
        errors.extend(check_parameter_containers(declaration));
    }

    let mut nested = Vec::new();
    let mut types = Vec::new();
    for root in declarations.iter().filter(|d| d.is_object()) {
        let name = root
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("unnamed_function");
        nested.extend(check_nested_containers(root, name));
        types.extend(check_type_values(root, name));
    }
    errors.extend(nested);
    errors.extend(types);
    errors
}

/// Validate one schema file. A file that is not valid JSON, or not a JSON
/// array, is reported as a single error.
pub fn validate_schema_file(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).map_err(|e| SchemaError::io("read", path, e))?;
    let service = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let data: Value = match serde_json::from_str(&text) {
        Ok(data) => data,
        Err(e) => return Ok(vec![format!("JSON decode error: {e}")]),
    };
    match data.as_array() {
        Some(declarations) => Ok(validate_declarations(declarations, &service)),
        None => Ok(vec!["Schema is not a list of function declarations".to_string()]),
    }
}

/// Validate every `*.json` file directly inside `dir`, in name order.
/// Returns only the files with problems, keyed by file stem.
pub fn validate_all(dir: &Path) -> Result<IndexMap<String, Vec<String>>> {
    if !dir.is_dir() {
        return Err(SchemaError::SchemaDirNotFound(dir.to_path_buf()));
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| SchemaError::io("read", dir, e))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    info!(count = files.len(), dir = %dir.display(), "Validating schema files");

    let mut invalid = IndexMap::new();
    for file in files {
        let service = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let errors = match validate_schema_file(&file) {
            Ok(errors) => errors,
            Err(e) => vec![format!("Unexpected error: {e}")],
        };
        if errors.is_empty() {
            info!(service = %service, "Valid");
        } else {
            warn!(service = %service, errors = errors.len(), "Invalid schema file");
            invalid.insert(service, errors);
        }
    }
    Ok(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn declaration(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_generated_shape_is_valid() {
        let declarations = vec![json!({
            "name": "get_user",
            "description": "Fetch a user.",
            "parameters": {
                "type": "object",
                "properties": {
                    "user_id": {"type": "string"},
                    "fields": {"type": "array", "items": {"type": "string"}},
                    "profile": {"type": "object", "properties": {}, "description": "A profile."}
                },
                "required": ["user_id"]
            }
        })];
        assert_eq!(validate_declarations(&declarations, "gmail"), Vec::<String>::new());
    }

    #[test]
    fn test_missing_fields() {
        let errors = check_declaration_structure(&declaration(json!({"description": ""})), "gmail");
        assert_eq!(
            errors,
            vec![
                "gmail-Unnamed Function: Missing 'name' field",
                "gmail-Unnamed Function: Missing 'description' field",
                "gmail-Unnamed Function: Missing 'parameters' field",
            ]
        );
    }

    #[test]
    fn test_parameters_type_must_be_container() {
        let errors = check_declaration_structure(
            &declaration(json!({"name": "f", "description": "d", "parameters": {"type": "string"}})),
            "svc",
        );
        assert_eq!(
            errors,
            vec!["svc-f: 'parameters.type' must be 'object' or 'array', got 'string'"]
        );

        let errors = check_declaration_structure(
            &declaration(json!({"name": "f", "description": "d", "parameters": {"type": "array", "items": {}}})),
            "svc",
        );
        assert_eq!(errors, vec!["svc-f: Array parameters must have non-empty 'items' object"]);
    }

    #[test]
    fn test_parameter_containers() {
        let errors = check_parameter_containers(&declaration(json!({
            "name": "f",
            "parameters": {
                "type": "object",
                "properties": {
                    "tags": {"type": "array"},
                    "meta": {"type": "object", "description": "no properties"},
                    "ok": {"type": "array", "items": {"type": "string"}}
                }
            }
        })));
        assert_eq!(
            errors,
            vec![
                "f: Parameter 'meta' is type 'object' but missing valid 'properties' dictionary",
                "f: Parameter 'tags' is type 'array' but missing valid 'items' dictionary",
            ]
        );
    }

    #[test]
    fn test_nested_containers_report_paths() {
        let value = json!({
            "name": "f",
            "parameters": {
                "type": "object",
                "properties": {
                    "rows": {"type": "array", "items": {"type": "array", "items": {"type": "object"}}}
                }
            }
        });
        assert_eq!(
            check_nested_containers(&value, "f"),
            vec!["Object at 'f.parameters.rows.items' missing valid 'properties' dictionary"]
        );
    }

    #[test]
    fn test_type_values() {
        let value = json!({
            "parameters": {
                "type": "object",
                "properties": {
                    "a": {"type": "str"},
                    "b": {"type": ["string", "decimal"]},
                    "c": {"type": 3},
                    "d": {"anyOf": [{"type": "integer"}, {"type": "long"}]}
                }
            }
        });
        let errors = check_type_values(&value, "f");
        assert_eq!(errors.len(), 4, "{errors:#?}");
        assert!(errors[0].starts_with("Invalid type 'str' at 'f.parameters.properties.a'"));
        assert!(errors[1].starts_with("Invalid type 'decimal' in union at 'f.parameters.properties.b'"));
        assert_eq!(
            errors[2],
            "Type value at 'f.parameters.properties.c' must be string or array, got number"
        );
        assert!(errors[3].contains("'f.parameters.properties.d.anyOf[1]'"));
    }

    #[test]
    fn test_files_and_directories() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path();
        fs::write(
            dir.join("good.json"),
            r#"[{"name": "f", "description": "d", "parameters": {"type": "object", "properties": {}}}]"#,
        )
        .unwrap();
        fs::write(dir.join("broken.json"), "[{").unwrap();
        fs::write(dir.join("scalar.json"), "{}").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let invalid = validate_all(dir).unwrap();
        let names: Vec<&str> = invalid.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["broken", "scalar"]);
        assert!(invalid["broken"][0].starts_with("JSON decode error"));
        assert_eq!(invalid["scalar"], vec!["Schema is not a list of function declarations"]);

        assert!(matches!(
            validate_all(&dir.join("missing")),
            Err(SchemaError::SchemaDirNotFound(_))
        ));
    }
}
