use std::fs;
use std::path::Path;

use fcspec::{
    FunctionSchema, GenerateOptions, PackageOptions, SchemaError, cleaned_function_bodies,
    generate_all, generate_package_schema, iterate_package, load_function_map, validate_all,
};
use fcspec::parser::extract_schemas_from_file;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

const GMAIL_INIT: &str = r#"from .users import get_user

_function_map = {
    "get_user_profile": "gmail.users.get_user",
    "delete_user": "gmail.users.delete_user",
    "list_labels": "gmail.labels.Labels.list",
    "load_db": "gmail.SimulationEngine.db.load_state",
}
"#;

const GMAIL_USERS: &str = r#"DB = {}


def get_user(user_id: str, fields=None):
    """Fetch a user profile.

    Args:
        user_id (str): The user's id.
        fields (List[str]): Fields to include.

    Returns:
        Dict[str, Any]: The profile.
    """
    if user_id not in DB:
        raise KeyError(user_id)
    return DB[user_id]


def delete_user(user_id: str):
    """Delete a user.

    Args:
        user_id (str): The user's id.
    """
    # not implemented yet
    pass


def unmapped(x):
    """Not in the function map.

    Args:
        x (int): X.
    """
    return x
"#;

const GMAIL_LABELS: &str = r#"from typing import Optional

LABELS = ["INBOX", "SENT"]


class Labels:
    def list(self, max_results: int = 10, label_type: Optional[str] = None):
        """List labels.

        Args:
            max_results (int): Maximum labels to return.
            label_type (Optional[str]): Filter by type.
        """
        return sorted(LABELS)[:max_results]
"#;

const SIMULATION_DB: &str = r#"def load_state(path):
    """Load the simulated database.

    Args:
        path (str): File to read.
    """
    return open(path).read()
"#;

/// `<root>/gmail` with mapped, unmapped, trivial and excluded functions.
fn gmail_package(root: &Path) {
    write(root, "gmail/__init__.py", GMAIL_INIT);
    write(root, "gmail/users.py", GMAIL_USERS);
    write(root, "gmail/labels.py", GMAIL_LABELS);
    write(root, "gmail/broken.py", "def oops(:\n    pass\n");
    write(root, "gmail/SimulationEngine/db.py", SIMULATION_DB);
}

fn sorted_schemas(dir: &Path, opts: &PackageOptions) -> Vec<FunctionSchema> {
    let mut schemas: Vec<FunctionSchema> = iterate_package(dir, opts).into_values().collect();
    schemas.sort_by(|a, b| a.name.cmp(&b.name));
    schemas
}

#[test]
fn package_schemas_are_filtered_and_renamed() {
    let tmp = TempDir::new().unwrap();
    gmail_package(tmp.path());

    let schemas = sorted_schemas(&tmp.path().join("gmail"), &PackageOptions::default());

    insta::assert_json_snapshot!(schemas, @r#"
    [
      {
        "name": "get_user_profile",
        "description": "Fetch a user profile.",
        "parameters": {
          "type": "object",
          "properties": {
            "user_id": {
              "type": "string",
              "description": "The user's id."
            },
            "fields": {
              "type": "array",
              "items": {
                "type": "string"
              },
              "description": "Fields to include."
            }
          },
          "required": [
            "user_id"
          ]
        }
      },
      {
        "name": "list_labels",
        "description": "List labels.",
        "parameters": {
          "type": "object",
          "properties": {
            "max_results": {
              "type": "integer",
              "description": "Maximum labels to return."
            },
            "label_type": {
              "type": "string",
              "nullable": true,
              "description": "Filter by type."
            }
          }
        }
      }
    ]
    "#);
}

#[test]
fn trivial_function_is_excluded() {
    let tmp = TempDir::new().unwrap();
    gmail_package(tmp.path());

    let schemas = iterate_package(&tmp.path().join("gmail"), &PackageOptions::default());
    assert!(schemas.contains_key("get_user_profile"));
    assert!(!schemas.contains_key("delete_user"));
    assert!(!schemas.contains_key("load_db"));
}

#[test]
fn user_exclusions_replace_the_default_ones() {
    let tmp = TempDir::new().unwrap();
    gmail_package(tmp.path());

    let opts = PackageOptions {
        exclude_folders: Some(vec!["fixtures".to_string()]),
        ..PackageOptions::default()
    };
    let schemas = iterate_package(&tmp.path().join("gmail"), &opts);
    assert!(schemas.contains_key("load_db"));
    assert_eq!(schemas["load_db"].parameters.required, Some(vec!["path".to_string()]));
}

#[test]
fn package_without_function_map_is_empty() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "plain/__init__.py", "VERSION = '1.0'\n");
    write(tmp.path(), "plain/api.py", GMAIL_USERS);

    let schemas = iterate_package(&tmp.path().join("plain"), &PackageOptions::default());
    assert!(schemas.is_empty());
}

#[test]
fn package_without_init_is_empty() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "loose/api.py", GMAIL_USERS);

    let schemas = iterate_package(&tmp.path().join("loose"), &PackageOptions::default());
    assert!(schemas.is_empty());
}

#[test]
fn args_none_docstring_has_no_parameters() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "clock/__init__.py",
        "_function_map = {\"now\": \"clock.api.now\"}\n",
    );
    write(
        tmp.path(),
        "clock/api.py",
        "import time\n\n\ndef now():\n    \"\"\"Current time.\n\n    Args:\n    None\n\n    Returns:\n        float: Seconds since the epoch.\n    \"\"\"\n    return time.time()\n",
    );

    let schemas = iterate_package(&tmp.path().join("clock"), &PackageOptions::default());
    let now = &schemas["now"];
    assert_eq!(now.description, "Current time.");
    assert!(now.parameters.properties.is_empty());
    let value = serde_json::to_value(now).unwrap();
    assert!(value["parameters"].get("required").is_none());
}

#[test]
fn generate_writes_sorted_file_and_mutations() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("src");
    let out = tmp.path().join("out");
    gmail_package(&src);
    write(
        &src,
        "gmail/mutations/compact/__init__.py",
        "_function_map = {\"fetch_user\": \"gmail.mutations.compact.users.get_user\"}\n",
    );
    write(&src, "gmail/mutations/compact/users.py", GMAIL_USERS);
    write(&src, "gmail/mutations/.hidden/__init__.py", "");

    let opts = GenerateOptions {
        output_folder: Some(out.clone()),
        ..GenerateOptions::default()
    };
    let written = generate_package_schema(&src.join("gmail"), &opts).unwrap();
    assert_eq!(written, out.join("gmail.json"));

    let main: Vec<FunctionSchema> =
        serde_json::from_str(&fs::read_to_string(&written).unwrap()).unwrap();
    let names: Vec<&str> = main.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["get_user_profile", "list_labels"]);

    let mutation_file = out.join("mutations").join("compact").join("gmail.json");
    let mutation: Vec<FunctionSchema> =
        serde_json::from_str(&fs::read_to_string(mutation_file).unwrap()).unwrap();
    assert_eq!(mutation.len(), 1);
    assert_eq!(mutation[0].name, "fetch_user");
    assert!(!out.join("mutations").join(".hidden").exists());
}

#[test]
fn generate_honours_output_file_name() {
    let tmp = TempDir::new().unwrap();
    gmail_package(tmp.path());

    let opts = GenerateOptions {
        output_file: Some("custom.json".to_string()),
        output_folder: Some(tmp.path().join("schemas")),
        ..GenerateOptions::default()
    };
    let written = generate_package_schema(&tmp.path().join("gmail"), &opts).unwrap();
    assert!(written.ends_with("schemas/custom.json"));
    assert!(written.is_file());
}

#[test]
fn generate_fails_for_missing_package() {
    let tmp = TempDir::new().unwrap();
    let err = generate_package_schema(&tmp.path().join("nope"), &GenerateOptions::default())
        .unwrap_err();
    assert!(matches!(err, SchemaError::PackageNotFound(_)));
    assert!(err.to_string().contains("nope"));
}

#[test]
fn generate_all_scans_every_package() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("APIs");
    let out = tmp.path().join("Schemas");
    gmail_package(&src);
    write(&src, "plain/__init__.py", "");
    write(&src, "__pycache__/junk.py", "");

    let written = generate_all(&src, &out, &[], &[]).unwrap();
    let names: Vec<String> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["gmail.json", "plain.json"]);
    assert_eq!(fs::read_to_string(out.join("plain.json")).unwrap(), "[]");

    let only = generate_all(&src, &tmp.path().join("only"), &[], &["plain".to_string()]).unwrap();
    assert_eq!(only.len(), 1);
}

#[test]
fn function_map_loading() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "chained/__init__.py",
        "_function_map: dict = {\"ignored\": \"x.y\"}\nMAP = _function_map = {\"a\": \"pkg.m.a\", 1: \"pkg.m.b\", \"c\": None}\n",
    );
    let map = load_function_map(&tmp.path().join("chained/__init__.py")).unwrap();
    assert_eq!(map.len(), 1);
    assert_eq!(map["a"], "pkg.m.a");

    write(
        tmp.path(),
        "computed/__init__.py",
        "_function_map = dict(a=\"pkg.m.a\")\n",
    );
    assert!(matches!(
        load_function_map(&tmp.path().join("computed/__init__.py")),
        Err(SchemaError::InvalidFunctionMap(_))
    ));
}

#[test]
fn cleaned_bodies_skip_unresolvable_names() {
    let tmp = TempDir::new().unwrap();
    gmail_package(tmp.path());

    let bodies = cleaned_function_bodies(
        &[
            "gmail.users.get_user".to_string(),
            "gmail.users.delete_user".to_string(),
            "gmail.missing.nothing".to_string(),
        ],
        tmp.path(),
    );
    assert_eq!(bodies.len(), 2);
    assert_eq!(
        bodies["gmail.users.get_user"],
        "if user_id not in DB:\n    raise KeyError(user_id)\nreturn DB[user_id]"
    );
    assert_eq!(bodies["gmail.users.delete_user"], "pass");
}

#[test]
fn byte_order_mark_is_ignored() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "bom.py",
        "\u{feff}def greet(name):\n    \"\"\"Say hello.\n\n    Args:\n        name (str): Who.\n    \"\"\"\n    return name\n",
    );

    let schemas = extract_schemas_from_file(&tmp.path().join("bom.py"));
    assert_eq!(schemas.len(), 1);
    assert_eq!(schemas["greet"].parameters.required, Some(vec!["name".to_string()]));
}

#[test]
fn decorated_method_signature_defaults_are_optional() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "drive.py",
        r#"import functools


class Files:
    @functools.lru_cache(maxsize=None)
    def search(self, query: str, page_size: int = 50, *, include_trashed=False):
        """Search files.

        Args:
            query (str): Search expression.
            page_size (int): Results per page.
            include_trashed (bool): Also search the trash.
        """
        return []
"#,
    );

    let schemas = extract_schemas_from_file(&tmp.path().join("drive.py"));
    let search = &schemas["Files.search"];
    assert_eq!(search.parameters.properties.len(), 3);
    assert_eq!(search.parameters.required, Some(vec!["query".to_string()]));
}

#[test]
fn pep604_optional_parameters_are_not_required() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "calendar.py",
        r#"def create_event(title, location, attendees):
    """Create an event.

    Args:
        title (str): Event title.
        location (str | None): Where it happens.
        attendees (list[str] | None): Invitees.
    """
    return title
"#,
    );

    let schemas = extract_schemas_from_file(&tmp.path().join("calendar.py"));
    let event = &schemas["create_event"];
    assert_eq!(event.parameters.required, Some(vec!["title".to_string()]));
    assert_eq!(event.parameters.properties["location"].nullable, Some(true));
    assert_eq!(event.parameters.properties["attendees"].nullable, Some(true));
}

#[test]
fn generated_schemas_pass_validation() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("APIs");
    let out = tmp.path().join("Schemas");
    gmail_package(&src);

    generate_all(&src, &out, &[], &[]).unwrap();
    assert!(validate_all(&out).unwrap().is_empty());

    fs::write(
        out.join("bad.json"),
        r#"[{"name": "f", "parameters": {"type": "object", "properties": {"ids": {"type": "array"}}}}]"#,
    )
    .unwrap();
    let invalid = validate_all(&out).unwrap();
    assert_eq!(invalid.len(), 1);
    assert!(invalid["bad"].contains(&"bad-f: Missing 'description' field".to_string()));
    assert!(invalid["bad"].contains(
        &"f: Parameter 'ids' is type 'array' but missing valid 'items' dictionary".to_string()
    ));
}
