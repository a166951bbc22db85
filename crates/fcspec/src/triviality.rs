//! Stub detection.
//!
//! A function is trivial when, once comments and docstrings are gone, its
//! body does nothing: it is empty, a lone `pass`, or a lone `return` of
//! nothing / `None` / `False` / zero / an empty literal. Functions are
//! located from their fully-qualified names against a source root, so the
//! check works on source text alone and never imports anything.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tree_sitter::Node;

use crate::error::{Result, SchemaError};
use crate::python::{self, LiteralValue};

// ---------------------------------------------------------------------------
// Locating a function's source
// ---------------------------------------------------------------------------

/// `pkg.mod.func` → `<root>/pkg/mod.py`, or `<root>/pkg/mod/__init__.py`.
pub fn resolve_function_source_path(fqn: &str, source_root: &Path) -> Result<PathBuf> {
    let parts: Vec<&str> = fqn.split('.').collect();
    let module_parts = &parts[..parts.len().saturating_sub(1)];
    let base = module_parts
        .iter()
        .fold(source_root.to_path_buf(), |path, part| path.join(part));

    let mut module_file = base.clone().into_os_string();
    module_file.push(".py");
    let module_file = PathBuf::from(module_file);
    if module_file.is_file() {
        return Ok(module_file);
    }
    let init_file = base.join("__init__.py");
    if base.is_dir() && init_file.is_file() {
        return Ok(init_file);
    }
    Err(SchemaError::SourceNotFound {
        fqn: fqn.to_string(),
        module_file,
        init_file,
    })
}

/// The part of `fqn` that names the function inside `file`: `func` or
/// `Class.method`.
///
/// The module's own name (the directory name for `__init__.py`) is matched
/// against the dotted segments from the right. When it cannot be found the
/// last segment is used and a warning is logged.
pub fn function_path_in_module(fqn: &str, file: &Path) -> String {
    let parts: Vec<&str> = fqn.split('.').collect();
    let last = parts.last().copied().unwrap_or_default();

    let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let module_name = if stem == "__init__" {
        file.parent()
            .and_then(|dir| dir.file_name())
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    } else {
        stem
    };

    match parts.iter().rposition(|part| *part == module_name) {
        Some(i) if i + 1 < parts.len() => parts[i + 1..].join("."),
        Some(_) => last.to_string(),
        None => {
            tracing::warn!(
                fqn,
                module = module_name,
                fallback = last,
                "Could not determine function path within module, using last component"
            );
            last.to_string()
        }
    }
}

/// Source text of a top-level function, or of a method of a top-level class
/// when `func_path` is `Class.method`.
pub fn extract_function_source<'a>(source: &'a str, func_path: &str) -> Result<&'a str> {
    let tree = python::parse_strict(source)?;
    let src = source.as_bytes();
    let root = tree.root_node();
    let not_found = || SchemaError::FunctionNotFound(func_path.to_string());

    let (scope, name) = match func_path.split('.').collect::<Vec<_>>().as_slice() {
        [name] => (root, *name),
        [class_name, method_name] => {
            let class = python::statements(&root)
                .into_iter()
                .map(python::unwrap_decorated)
                .find(|n| {
                    n.kind() == "class_definition"
                        && python::definition_name(n, src) == Some(*class_name)
                })
                .ok_or_else(not_found)?;
            (python::body_of(&class).ok_or_else(not_found)?, *method_name)
        }
        _ => return Err(not_found()),
    };

    python::statements(&scope)
        .into_iter()
        .map(python::unwrap_decorated)
        .find(|n| {
            n.kind() == "function_definition" && python::definition_name(n, src) == Some(name)
        })
        .map(|func| python::source_segment(&func, source))
        .ok_or_else(not_found)
}

/// Resolve, read and cut out the source of one function.
pub fn load_function_source(fqn: &str, source_root: &Path) -> Result<String> {
    let file = resolve_function_source_path(fqn, source_root)?;
    let func_path = function_path_in_module(fqn, &file);
    let source = std::fs::read_to_string(&file).map_err(|e| SchemaError::io("read", &file, e))?;
    let source = source.strip_prefix('\u{feff}').unwrap_or(&source);
    extract_function_source(source, &func_path).map(str::to_string)
}

// ---------------------------------------------------------------------------
// Stripping
// ---------------------------------------------------------------------------

/// Drop everything from the first `#` on each line, then drop blank lines.
/// String literals are not special-cased, so a `#` inside a string also cuts.
pub fn strip_comments(source: &str) -> String {
    source
        .lines()
        .map(|line| line.split_once('#').map_or(line, |(code, _)| code))
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove the docstring lines of the module and of every class and function
/// in it, then [`strip_comments`]. Unparseable input only loses comments.
pub fn strip_comments_and_docstrings(source: &str) -> String {
    let Ok(tree) = python::parse_strict(source) else {
        return strip_comments(source);
    };

    let mut excluded = BTreeSet::new();
    collect_docstring_rows(tree.root_node(), source.as_bytes(), &mut excluded);

    let kept: Vec<&str> = source
        .lines()
        .enumerate()
        .filter(|(row, _)| !excluded.contains(row))
        .map(|(_, line)| line)
        .collect();
    strip_comments(&kept.join("\n"))
}

fn collect_docstring_rows(node: Node, src: &[u8], rows: &mut BTreeSet<usize>) {
    if matches!(
        node.kind(),
        "module" | "class_definition" | "function_definition"
    ) && let Some(doc) = python::docstring_node(&node, src)
    {
        rows.extend(doc.start_position().row..=doc.end_position().row);
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_docstring_rows(child, src, rows);
    }
}

// ---------------------------------------------------------------------------
// Triviality
// ---------------------------------------------------------------------------

fn first_function<'t>(root: &Node<'t>) -> Option<Node<'t>> {
    python::statements(root)
        .into_iter()
        .map(python::unwrap_decorated)
        .find(|n| n.kind() == "function_definition")
}

/// `return`, `return None`, `return 0`, `return ""`, `return []`, ...
fn is_trivial_return(stmt: &Node, src: &[u8]) -> bool {
    if stmt.kind() != "return_statement" {
        return false;
    }
    let Some(mut value) = stmt.named_child(0) else {
        return true;
    };
    while value.kind() == "parenthesized_expression" {
        match python::statements(&value).as_slice() {
            [inner] => value = *inner,
            _ => return false,
        }
    }

    match value.kind() {
        "none" | "false" => true,
        "integer" | "float" => match python::literal_eval(&value, src) {
            Some(LiteralValue::Integer(n)) => n == 0,
            Some(LiteralValue::Float(f)) => f == 0.0,
            _ => false,
        },
        "string" | "concatenated_string" => match python::literal_eval(&value, src) {
            Some(LiteralValue::Str(s)) => s.is_empty(),
            Some(LiteralValue::Bytes(b)) => b.is_empty(),
            _ => false,
        },
        "list" | "tuple" | "set" | "dictionary" => value.named_child_count() == 0,
        _ => false,
    }
}

/// Decide whether an extracted function's body is a no-op.
///
/// A function whose only statement is its docstring is not trivial: once
/// the docstring is stripped the remaining `def` line no longer parses.
pub fn is_function_body_trivial(func_source: &str) -> bool {
    let stripped = strip_comments_and_docstrings(func_source);
    if stripped.trim().is_empty() {
        return true;
    }

    let Ok(tree) = python::parse_strict(&stripped) else {
        return false;
    };
    let src = stripped.as_bytes();
    let Some(body) = first_function(&tree.root_node()).and_then(|f| python::body_of(&f)) else {
        return false;
    };

    let effective: Vec<Node> = python::statements(&body)
        .into_iter()
        .filter(|stmt| !python::is_bare_string_statement(stmt, src))
        .collect();

    match effective.as_slice() {
        [] => true,
        [stmt] => stmt.kind() == "pass_statement" || is_trivial_return(stmt, src),
        _ => false,
    }
}

/// The subset of `fqns` whose bodies are trivial. Names that cannot be
/// resolved or extracted are logged and treated as non-trivial.
pub fn find_trivial_functions(fqns: &[String], source_root: &Path) -> Vec<String> {
    fqns.iter()
        .filter(|fqn| match load_function_source(fqn, source_root) {
            Ok(source) => is_function_body_trivial(&source),
            Err(e) => {
                tracing::warn!(fqn = %fqn, error = %e, "Skipping triviality check");
                false
            }
        })
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Cleaned bodies
// ---------------------------------------------------------------------------

/// Body statements of one function with comments and docstrings removed and
/// the `def` line dropped, de-indented to the first statement's column.
/// Trailing whitespace is trimmed from every line.
pub fn clean_function_body(func_source: &str) -> String {
    let stripped = strip_comments_and_docstrings(func_source);
    let Ok(tree) = python::parse_strict(&stripped) else {
        tracing::warn!("Stripped function source no longer parses, keeping it whole");
        return stripped;
    };

    let Some(body) = first_function(&tree.root_node()).and_then(|f| python::body_of(&f)) else {
        return String::new();
    };
    let statements = python::statements(&body);
    let (Some(first), Some(last)) = (statements.first(), statements.last()) else {
        return String::new();
    };

    let start = first.start_position().row;
    let end = last.end_position().row;
    let indent = first.start_position().column;

    stripped
        .lines()
        .enumerate()
        .filter(|(row, _)| (start..=end).contains(row))
        .map(|(_, line)| match line.get(..indent) {
            Some(prefix) if line.len() > indent && prefix.trim().is_empty() => &line[indent..],
            _ => line,
        })
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// `fqn → cleaned body` for every name that can be located.
pub fn cleaned_function_bodies(fqns: &[String], source_root: &Path) -> IndexMap<String, String> {
    let mut bodies = IndexMap::new();
    for fqn in fqns {
        match load_function_source(fqn, source_root) {
            Ok(source) => {
                bodies.insert(fqn.clone(), clean_function_body(&source));
            }
            Err(e) => tracing::warn!(fqn = %fqn, error = %e, "Skipping body cleaning"),
        }
    }
    bodies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trivial_bodies() {
        let cases = [
            "def f():\n    pass\n",
            "def f():\n    return\n",
            "def f():\n    return None\n",
            "def f():\n    return False\n",
            "def f():\n    return 0\n",
            "def f():\n    return 0.0\n",
            "def f():\n    return ''\n",
            "def f():\n    return b''\n",
            "def f():\n    return []\n",
            "def f():\n    return ()\n",
            "def f():\n    return {}\n",
            "def f():\n    return (None)\n",
            "def f(x):\n    \"\"\"Doc.\"\"\"\n    # just a comment\n    pass\n",
            "def f(x):\n    \"\"\"Doc.\"\"\"\n    'stray string'\n    return []\n",
            "async def f():\n    pass\n",
        ];
        for source in cases {
            assert!(is_function_body_trivial(source), "expected trivial: {source:?}");
        }
    }

    #[test]
    fn test_non_trivial_bodies() {
        let cases = [
            "def f(x):\n    if x:\n        return 1\n    return 0\n",
            "def f():\n    return 1\n",
            "def f():\n    return True\n",
            "def f():\n    return 'x'\n",
            "def f():\n    return f''\n",
            "def f():\n    return [1]\n",
            "def f():\n    return set()\n",
            "def f():\n    x = 1\n    return x\n",
            "def f():\n    raise NotImplementedError\n",
            // Nothing but a docstring leaves an unparseable `def` line.
            "def f():\n    \"\"\"Only a docstring.\"\"\"\n",
        ];
        for source in cases {
            assert!(!is_function_body_trivial(source), "expected non-trivial: {source:?}");
        }
    }

    #[test]
    fn test_strip_comments_is_naive_about_strings() {
        let stripped = strip_comments("x = 1  # set x\n# only comment\n\ny = '#not a comment'\n");
        assert_eq!(stripped, "x = 1  \ny = '");
    }

    #[test]
    fn test_strip_docstrings_keeps_other_strings() {
        let source = r#"def f():
    """Doc
    spanning lines."""
    x = """not a docstring"""
    return x
"#;
        assert_eq!(
            strip_comments_and_docstrings(source),
            "def f():\n    x = \"\"\"not a docstring\"\"\"\n    return x"
        );
    }

    #[test]
    fn test_extract_function_and_method_source() {
        let source = r#"
import os

def helper():
    return 1

class Client:
    @property
    def name(self):
        return "client"

    async def fetch(self, url):
        return url
"#;
        assert_eq!(
            extract_function_source(source, "helper").unwrap(),
            "def helper():\n    return 1"
        );
        assert_eq!(
            extract_function_source(source, "Client.name").unwrap(),
            "def name(self):\n        return \"client\""
        );
        assert!(
            extract_function_source(source, "Client.fetch")
                .unwrap()
                .starts_with("async def fetch")
        );
        assert!(matches!(
            extract_function_source(source, "missing"),
            Err(SchemaError::FunctionNotFound(_))
        ));
        assert!(matches!(
            extract_function_source(source, "a.b.c"),
            Err(SchemaError::FunctionNotFound(_))
        ));
    }

    #[test]
    fn test_function_path_in_module() {
        assert_eq!(
            function_path_in_module("pkg.users.Client.get", Path::new("/src/pkg/users.py")),
            "Client.get"
        );
        assert_eq!(
            function_path_in_module("pkg.users.get", Path::new("/src/pkg/users.py")),
            "get"
        );
        assert_eq!(
            function_path_in_module("pkg.sub.get", Path::new("/src/pkg/sub/__init__.py")),
            "get"
        );
        assert_eq!(
            function_path_in_module("pkg.other.get", Path::new("/src/pkg/users.py")),
            "get"
        );
    }

    #[test]
    fn test_clean_function_body() {
        let source = r#"def send(self, to, body):
        """Send a message.

        Args:
            to (str): Recipient.
        """
        # validate first
        if not to:
            raise ValueError("to")  # no recipient
        return {"to": to, "body": body}"#;
        assert_eq!(
            clean_function_body(source),
            "if not to:\n    raise ValueError(\"to\")\nreturn {\"to\": to, \"body\": body}"
        );
    }

    #[test]
    fn test_clean_body_trims_trailing_comment_whitespace() {
        let source = "def f(items):\n    for item in items:\n        total = item  # running\n    return total    # done\n";
        assert_eq!(
            clean_function_body(source),
            "for item in items:\n    total = item\nreturn total"
        );
    }

    #[test]
    fn test_clean_body_of_docstring_only_function_falls_back() {
        assert_eq!(
            clean_function_body("def f():\n    \"\"\"Doc.\"\"\"\n"),
            "def f():"
        );
    }
}
