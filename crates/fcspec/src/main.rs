use std::path::PathBuf;
use std::process;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use fcspec::error::SchemaError;

const USAGE: &str = "\
Usage: fcspec [--src <dir>] [--out <dir>] [--exclude <name>]... [--package <name>]...
       fcspec bodies [--src <dir>] <fqn>...
       fcspec validate [--schemas <dir>]

Commands:
  (default)          Generate one schema file per package under --src
  bodies             Print the cleaned bodies of the given functions as JSON
  validate           Check every schema file in --schemas for structural errors

Options:
  --src <dir>        Source directory holding the packages [default: ./APIs]
  --out <dir>        Output directory for schema files [default: ./Schemas]
  --exclude <name>   Extra directory name to skip inside packages (repeatable)
  --package <name>   Only generate the named package (repeatable)
  --schemas <dir>    Schema directory to validate [default: ./Schemas]
  -h, --help         Print this help

Environment:
  FCSPEC_LOG         debug | info | warn | error [default: info]
  LOG_FORMAT=json    Emit logs as JSON lines
  RUST_LOG           Full tracing filter; overrides FCSPEC_LOG";

#[derive(Debug, PartialEq)]
enum Command {
    Generate {
        src: PathBuf,
        out: PathBuf,
        exclude: Vec<String>,
        packages: Vec<String>,
    },
    Bodies {
        src: PathBuf,
        fqns: Vec<String>,
    },
    Validate {
        schemas: PathBuf,
    },
}

fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let command = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("{USAGE}");
            process::exit(2);
        }
    };

    if let Err(e) = run(command) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("FCSPEC_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("fcspec={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let mut rest = args.get(1..).unwrap_or_default();
    if rest.first().is_some_and(|a| a == "validate") {
        return parse_validate_args(&rest[1..]);
    }
    let bodies = rest.first().is_some_and(|a| a == "bodies");
    if bodies {
        rest = &rest[1..];
    }

    let mut src = PathBuf::from("./APIs");
    let mut out = PathBuf::from("./Schemas");
    let mut exclude = Vec::new();
    let mut packages = Vec::new();
    let mut fqns = Vec::new();

    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "--src" => {
                i += 1;
                src = PathBuf::from(rest.get(i).ok_or("--src requires a value")?);
            }
            "--out" if !bodies => {
                i += 1;
                out = PathBuf::from(rest.get(i).ok_or("--out requires a value")?);
            }
            "--exclude" if !bodies => {
                i += 1;
                exclude.push(rest.get(i).ok_or("--exclude requires a value")?.clone());
            }
            "--package" if !bodies => {
                i += 1;
                packages.push(rest.get(i).ok_or("--package requires a value")?.clone());
            }
            "--help" | "-h" => return Err(String::new()),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            arg if bodies => fqns.push(arg.to_string()),
            arg => return Err(format!("unexpected argument: {arg}")),
        }
        i += 1;
    }

    if bodies {
        if fqns.is_empty() {
            return Err("missing required argument: <fqn>".to_string());
        }
        return Ok(Command::Bodies { src, fqns });
    }
    Ok(Command::Generate {
        src,
        out,
        exclude,
        packages,
    })
}

fn parse_validate_args(rest: &[String]) -> Result<Command, String> {
    let mut schemas = PathBuf::from("./Schemas");
    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "--schemas" => {
                i += 1;
                schemas = PathBuf::from(rest.get(i).ok_or("--schemas requires a value")?);
            }
            "--help" | "-h" => return Err(String::new()),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            arg => return Err(format!("unexpected argument: {arg}")),
        }
        i += 1;
    }
    Ok(Command::Validate { schemas })
}

fn run(command: Command) -> Result<(), SchemaError> {
    match command {
        Command::Generate {
            src,
            out,
            exclude,
            packages,
        } => {
            let written = fcspec::generate_all(&src, &out, &exclude, &packages)?;
            if !packages.is_empty() && written.len() < packages.len() {
                return Err(SchemaError::Other(format!(
                    "{} of {} requested packages were generated",
                    written.len(),
                    packages.len()
                )));
            }
            Ok(())
        }
        Command::Bodies { src, fqns } => {
            if !src.is_dir() {
                return Err(SchemaError::PackageNotFound(src));
            }
            let bodies = fcspec::cleaned_function_bodies(&fqns, &src);
            println!("{}", serde_json::to_string_pretty(&bodies)?);
            Ok(())
        }
        Command::Validate { schemas } => {
            let invalid = fcspec::validate_all(&schemas)?;
            if invalid.is_empty() {
                println!("All schemas are valid.");
                return Ok(());
            }
            for (service, errors) in &invalid {
                println!("{service}:");
                for error in errors {
                    println!("  - {error}");
                }
            }
            Err(SchemaError::Other(format!(
                "{} schema file(s) failed validation",
                invalid.len()
            )))
        }
    }
}
