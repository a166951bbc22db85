pub mod docstring;
pub mod error;
pub mod package;
pub mod parser;
pub mod python;
pub mod schema;
pub mod triviality;
pub mod type_map;
pub mod types;
pub mod validate;

pub use crate::error::{Result, SchemaError};
pub use crate::package::{
    GenerateOptions, PackageOptions, generate_all, generate_package_schema, iterate_package,
    load_function_map, resolve_package_init,
};
pub use crate::schema::docstring_to_json_schema;
pub use crate::triviality::{cleaned_function_bodies, find_trivial_functions};
pub use crate::type_map::{map_type, schema_is_nullable};
pub use crate::types::{FunctionMap, FunctionSchema, JsonType, ParametersSchema, TypeSchema};
pub use crate::validate::{validate_all, validate_schema_file};
