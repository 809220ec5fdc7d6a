use anyhow::Context;
use clap::Parser;
use json_validator::{schema, validator};
use std::path::{Path, PathBuf};

/// jsonvalidator compiles a JSON Schema (draft 2019-09) document and
/// validates a JSON document against it.
#[derive(Debug, Parser)]
#[clap(rename_all = "kebab-case")]
struct Args {
    /// Path of the schema document.
    schema: PathBuf,
    /// Path of the JSON document to validate.
    instance: PathBuf,

    /// Print the compiled schema tree to stdout before validating.
    #[clap(long)]
    dump: bool,

    /// Log filter directive, e.g. "info" or "json_validator=debug".
    #[clap(long, default_value = "warn", env = "JSONVALIDATOR_LOG")]
    log: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs are written to stderr so that stdout carries only the verdict
    // (and the tree dump, when requested).
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(args.log.as_str())
        .init();

    let schema_doc = read_json(&args.schema)?;
    let instance = read_json(&args.instance)?;

    let compiled = schema::compile(&schema_doc);
    if !compiled.ok() {
        for error in &compiled.errors {
            tracing::error!(%error, schema = %args.schema.display(), "schema error");
        }
        anyhow::bail!(
            "schema {} failed to compile with {} error(s)",
            args.schema.display(),
            compiled.errors.len()
        );
    }
    tracing::debug!(schema = %args.schema.display(), "compiled schema");

    if args.dump {
        print!("{}", compiled.tree.dump());
    }

    let outcome = validator::validate(&compiled.tree, &instance);
    if outcome.valid {
        println!(
            "{} validates against {}",
            args.instance.display(),
            args.schema.display()
        );
        Ok(())
    } else {
        for error in &outcome.errors {
            eprintln!("{}", error);
        }
        anyhow::bail!(
            "{} does not validate against {}",
            args.instance.display(),
            args.schema.display()
        );
    }
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("failed to parse {} as JSON", path.display()))
}
