//! Package-level schema generation.
//!
//! A package is a directory whose `__init__.py` declares
//! `_function_map = {"public_name": "pkg.module.function", ...}`. Only the
//! functions named there are considered, stubs are dropped, and each
//! surviving schema is renamed to its public name. `mutations/<name>/`
//! sub-packages are generated independently into their own output folders.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::error::{Result, SchemaError};
use crate::parser::extract_schemas_from_file;
use crate::python::{self, LiteralValue};
use crate::triviality::find_trivial_functions;
use crate::types::{FunctionMap, FunctionSchema};

/// Directory names never scanned.
const DEFAULT_EXCLUSIONS: &[&str] = &[
    "venv",
    ".venv",
    "__pycache__",
    ".git",
    ".hg",
    "docs",
    "tests",
    "test",
    "Test",
];

/// Exclusions used when the caller supplies none.
const DEFAULT_USER_EXCLUSIONS: &[&str] = &["SimulationEngine", "Unit Tests"];

const FUNCTION_MAP_NAME: &str = "_function_map";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How a single package is scanned.
#[derive(Debug, Clone, Default)]
pub struct PackageOptions {
    /// Extra directory names to skip. `None` or empty selects
    /// `SimulationEngine` and `Unit Tests`.
    pub exclude_folders: Option<Vec<String>>,
    /// Dotted import name of the package. Defaults to the directory name.
    pub import_prefix: Option<String>,
    /// Directory the import name is resolved against. Defaults to the
    /// package directory's parent.
    pub source_root: Option<PathBuf>,
}

/// Where a package's schema file goes, plus how the package is scanned.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Output file name. Defaults to `<package_name>.json`.
    pub output_file: Option<String>,
    /// Output directory, created if missing. Defaults to the working directory.
    pub output_folder: Option<PathBuf>,
    pub package: PackageOptions,
}

fn effective_exclusions(user: Option<&[String]>) -> BTreeSet<String> {
    let mut excluded: BTreeSet<String> = DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect();
    match user {
        Some(user) if !user.is_empty() => excluded.extend(user.iter().cloned()),
        _ => excluded.extend(DEFAULT_USER_EXCLUSIONS.iter().map(|s| s.to_string())),
    }
    excluded
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn parent_dir(package_dir: &Path) -> PathBuf {
    absolute(package_dir)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

/// Last component of the package path (`APIs/gmail/` → `gmail`).
pub fn package_name(package_dir: &Path) -> String {
    absolute(package_dir)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Function map
// ---------------------------------------------------------------------------

/// `pkg.sub` under `root` → `<root>/pkg/sub/__init__.py`.
pub fn resolve_package_init(source_root: &Path, import_name: &str) -> Result<PathBuf> {
    let package_dir = import_name
        .split('.')
        .fold(source_root.to_path_buf(), |path, part| path.join(part));
    let init = package_dir.join("__init__.py");
    if init.is_file() {
        Ok(init)
    } else {
        Err(SchemaError::PackageNotFound(package_dir))
    }
}

/// Read `_function_map` from a package init file without executing it.
///
/// The first top-level `_function_map = {...}` assignment wins (chained
/// assignments count, annotated ones do not). A file without one yields an
/// empty map. Entries whose key or value is not a string are skipped.
pub fn load_function_map(init_path: &Path) -> Result<FunctionMap> {
    let source =
        fs::read_to_string(init_path).map_err(|e| SchemaError::io("read", init_path, e))?;
    let source = source.strip_prefix('\u{feff}').unwrap_or(&source);
    let tree = python::parse_strict(source)?;
    let src = source.as_bytes();
    let root = tree.root_node();

    for stmt in python::statements(&root) {
        if stmt.kind() != "expression_statement" {
            continue;
        }
        let Some(mut assignment) = stmt.named_child(0).filter(|n| n.kind() == "assignment") else {
            continue;
        };
        if assignment.child_by_field_name("type").is_some() {
            continue;
        }

        // a = b = value: walk the chain of targets down to the value.
        let mut targets_map = false;
        let value = loop {
            if let Some(left) = assignment.child_by_field_name("left")
                && left.kind() == "identifier"
                && python::node_text(&left, src) == FUNCTION_MAP_NAME
            {
                targets_map = true;
            }
            match assignment.child_by_field_name("right") {
                Some(right) if right.kind() == "assignment" => assignment = right,
                right => break right,
            }
        };
        if !targets_map {
            continue;
        }

        let Some(LiteralValue::Dict(pairs)) = value.and_then(|v| python::literal_eval(&v, src))
        else {
            return Err(SchemaError::InvalidFunctionMap(init_path.to_path_buf()));
        };

        let mut map = FunctionMap::new();
        for (key, value) in pairs {
            match (key.as_str(), value.as_str()) {
                (Some(k), Some(v)) => {
                    map.insert(k.to_string(), v.to_string());
                }
                _ => warn!(path = %init_path.display(), ?key, ?value, "Skipping non-string _function_map entry"),
            }
        }
        return Ok(map);
    }

    Ok(FunctionMap::new())
}

// ---------------------------------------------------------------------------
// Package iteration
// ---------------------------------------------------------------------------

/// Schemas of the package's non-trivial mapped functions, keyed by public name.
///
/// A package without a usable `_function_map` yields an empty map; that is
/// logged, not an error.
pub fn iterate_package(package_dir: &Path, opts: &PackageOptions) -> IndexMap<String, FunctionSchema> {
    let excluded = effective_exclusions(opts.exclude_folders.as_deref());
    let import_name = opts
        .import_prefix
        .clone()
        .unwrap_or_else(|| package_name(package_dir));
    let source_root = opts
        .source_root
        .clone()
        .unwrap_or_else(|| parent_dir(package_dir));

    let function_map = match resolve_package_init(&source_root, &import_name)
        .and_then(|init| load_function_map(&init))
    {
        Ok(map) => map,
        Err(e) => {
            warn!(package = %import_name, error = %e, "Could not load _function_map");
            FunctionMap::new()
        }
    };
    if function_map.is_empty() {
        warn!(package = %import_name, "No functions will be included");
        return IndexMap::new();
    }

    // Fully-qualified source name → public name.
    let public_names: IndexMap<&str, &str> = function_map
        .iter()
        .map(|(public, fqn)| (fqn.as_str(), public.as_str()))
        .collect();

    let mut files = Vec::new();
    collect_python_files(package_dir, &excluded, &mut files);

    let mut candidates: IndexMap<String, FunctionSchema> = IndexMap::new();
    for file in files {
        let module_prefix = module_prefix(&import_name, package_dir, &file);
        debug!(path = %file.display(), module = %module_prefix, "Scanning file");
        for (name_in_file, schema) in extract_schemas_from_file(&file) {
            let fqn = format!("{module_prefix}.{name_in_file}");
            if public_names.contains_key(fqn.as_str()) {
                candidates.insert(fqn, schema);
            }
        }
    }

    let fqns: Vec<String> = candidates.keys().cloned().collect();
    let trivial: BTreeSet<String> = find_trivial_functions(&fqns, &source_root)
        .into_iter()
        .collect();

    let mut schemas = IndexMap::new();
    for (fqn, mut schema) in candidates {
        if trivial.contains(&fqn) {
            debug!(fqn = %fqn, "Dropping trivial function");
            continue;
        }
        if let Some(public) = public_names.get(fqn.as_str()) {
            schema.name = public.to_string();
            schemas.insert(public.to_string(), schema);
        }
    }

    if schemas.is_empty() {
        warn!(package = %import_name, "No non-trivial functions from the _function_map were found");
    }
    schemas
}

/// `.py` files under `dir` in sorted order, each directory's files before its
/// subdirectories. Excluded and dot-prefixed directories are pruned, and
/// symlinked directories are listed but never descended into.
fn collect_python_files(dir: &Path, excluded: &BTreeSet<String>, out: &mut Vec<PathBuf>) {
    let mut entries: Vec<(PathBuf, bool)> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| {
                let is_symlink = e.file_type().is_ok_and(|t| t.is_symlink());
                (e.path(), is_symlink)
            })
            .collect(),
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Could not read directory");
            return;
        }
    };
    entries.sort();

    let (dirs, files): (Vec<_>, Vec<_>) = entries.into_iter().partition(|(p, _)| p.is_dir());
    out.extend(
        files
            .into_iter()
            .map(|(p, _)| p)
            .filter(|p| p.extension().is_some_and(|ext| ext == "py")),
    );
    for (sub, is_symlink) in dirs {
        let name = sub
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if is_symlink {
            debug!(path = %sub.display(), "Not following symlinked directory");
            continue;
        }
        if name.starts_with('.') || excluded.contains(&name) {
            continue;
        }
        collect_python_files(&sub, excluded, out);
    }
}

/// `pkg` + `sub/mod.py` → `pkg.sub.mod`; `sub/__init__.py` → `pkg.sub`.
fn module_prefix(import_name: &str, package_dir: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(package_dir).unwrap_or(file);
    let mut parts: Vec<String> = relative
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.last().is_some_and(|last| last == "__init__") {
        parts.pop();
    }

    if parts.is_empty() {
        import_name.to_string()
    } else {
        format!("{import_name}.{}", parts.join("."))
    }
}

// ---------------------------------------------------------------------------
// Schema files
// ---------------------------------------------------------------------------

/// Write the package's schema file and those of its mutations. Returns the
/// path of the package's own file.
pub fn generate_package_schema(package_dir: &Path, opts: &GenerateOptions) -> Result<PathBuf> {
    if !package_dir.is_dir() {
        return Err(SchemaError::PackageNotFound(package_dir.to_path_buf()));
    }

    let name = package_name(package_dir);
    let file_name = opts
        .output_file
        .clone()
        .unwrap_or_else(|| format!("{name}.json"));
    let output_base = match &opts.output_folder {
        Some(folder) => {
            fs::create_dir_all(folder).map_err(|e| SchemaError::io("create", folder, e))?;
            folder.clone()
        }
        None => std::env::current_dir().map_err(|e| SchemaError::io("resolve", ".", e))?,
    };
    let output_path = output_base.join(&file_name);

    let mut schemas: Vec<FunctionSchema> = iterate_package(package_dir, &opts.package)
        .into_values()
        .collect();
    schemas.sort_by(|a, b| a.name.cmp(&b.name));

    let json = serde_json::to_string_pretty(&schemas)?;
    fs::write(&output_path, json).map_err(|e| SchemaError::io("write", &output_path, e))?;
    info!(
        package = %opts.package.import_prefix.as_deref().unwrap_or(&name),
        path = %output_path.display(),
        functions = schemas.len(),
        "Schema generated"
    );

    for mutation in mutation_names(package_dir) {
        let import_prefix = format!("{name}.mutations.{mutation}");
        info!(mutation = %import_prefix, "Processing mutation");
        let mutation_opts = GenerateOptions {
            output_file: Some(format!("{name}.json")),
            output_folder: Some(output_base.join("mutations").join(&mutation)),
            package: PackageOptions {
                exclude_folders: None,
                import_prefix: Some(import_prefix),
                source_root: Some(
                    opts.package
                        .source_root
                        .clone()
                        .unwrap_or_else(|| parent_dir(package_dir)),
                ),
            },
        };
        generate_package_schema(
            &package_dir.join("mutations").join(&mutation),
            &mutation_opts,
        )?;
    }

    Ok(output_path)
}

/// Non-hidden subdirectories of `<package>/mutations`, sorted.
fn mutation_names(package_dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(package_dir.join("mutations")) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| !name.starts_with('.') && name != "__pycache__")
        .collect();
    names.sort();
    names
}

/// Generate schemas for every package directly under `source_root` into
/// `output_folder`. `only`, when non-empty, restricts the run to those
/// package names. A failing package is logged and the rest still run.
pub fn generate_all(
    source_root: &Path,
    output_folder: &Path,
    exclude_folders: &[String],
    only: &[String],
) -> Result<Vec<PathBuf>> {
    if !source_root.is_dir() {
        return Err(SchemaError::PackageNotFound(source_root.to_path_buf()));
    }
    let source_root = absolute(source_root);
    fs::create_dir_all(output_folder).map_err(|e| SchemaError::io("create", output_folder, e))?;
    let output_folder = absolute(output_folder);

    let mut packages: Vec<PathBuf> = fs::read_dir(&source_root)
        .map_err(|e| SchemaError::io("read", &source_root, e))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    packages.sort();

    let mut written = Vec::new();
    for package in packages {
        let name = package_name(&package);
        if name.starts_with('.') || name == "__pycache__" {
            continue;
        }
        if !only.is_empty() && !only.contains(&name) {
            continue;
        }

        let opts = GenerateOptions {
            output_file: None,
            output_folder: Some(output_folder.clone()),
            package: PackageOptions {
                exclude_folders: Some(exclude_folders.to_vec()),
                import_prefix: None,
                source_root: Some(source_root.clone()),
            },
        };
        match generate_package_schema(&package, &opts) {
            Ok(path) => written.push(path),
            Err(e) => warn!(package = %name, error = %e, "Schema generation failed"),
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_exclusions() {
        let defaults = effective_exclusions(None);
        assert!(defaults.contains("SimulationEngine"));
        assert!(defaults.contains("Unit Tests"));
        assert!(defaults.contains("__pycache__"));

        let empty = effective_exclusions(Some(&[][..]));
        assert_eq!(empty, defaults);

        let custom = effective_exclusions(Some(&["fixtures".to_string()][..]));
        assert!(custom.contains("fixtures"));
        assert!(custom.contains("tests"));
        assert!(!custom.contains("SimulationEngine"));
    }

    #[test]
    fn test_module_prefix() {
        let root = Path::new("/src/gmail");
        assert_eq!(
            module_prefix("gmail", root, Path::new("/src/gmail/__init__.py")),
            "gmail"
        );
        assert_eq!(
            module_prefix("gmail", root, Path::new("/src/gmail/users.py")),
            "gmail.users"
        );
        assert_eq!(
            module_prefix("gmail", root, Path::new("/src/gmail/Users/messages/__init__.py")),
            "gmail.Users.messages"
        );
        assert_eq!(
            module_prefix("gmail.mutations.m1", Path::new("/src/gmail/mutations/m1"), Path::new("/src/gmail/mutations/m1/api.py")),
            "gmail.mutations.m1.api"
        );
    }

    #[test]
    fn test_resolve_package_init_without_init_file() {
        let err = resolve_package_init(Path::new("/nonexistent-root"), "pkg.sub").unwrap_err();
        assert!(matches!(err, SchemaError::PackageNotFound(path) if path.ends_with("pkg/sub")));
    }

    #[cfg(unix)]
    #[test]
    fn test_collect_python_files_skips_symlinked_directories() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pkg = tmp.path().join("pkg");
        let elsewhere = tmp.path().join("elsewhere");
        fs::create_dir_all(pkg.join("sub")).unwrap();
        fs::create_dir_all(&elsewhere).unwrap();
        fs::write(pkg.join("a.py"), "").unwrap();
        fs::write(pkg.join("sub/b.py"), "").unwrap();
        fs::write(elsewhere.join("c.py"), "").unwrap();
        std::os::unix::fs::symlink(&elsewhere, pkg.join("linked")).unwrap();

        let mut files = Vec::new();
        collect_python_files(&pkg, &BTreeSet::new(), &mut files);
        assert_eq!(files, vec![pkg.join("a.py"), pkg.join("sub/b.py")]);
    }
}
