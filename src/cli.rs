use crate::config::catalog::RuleCatalog;
use crate::config::presets;
use crate::config::types::ArtifactKind;
use crate::config::validator::validate_catalog;
use crate::pipeline::{Gatekeeper, RawPackage};
use crate::verdict::sink::{JsonLinesSink, RegistryRecord, ReportSink, UploadStatusRecord};
use crate::verdict::Report;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// Exit status of `validate`
const EXIT_VALID: i32 = 0;
const EXIT_INVALID: i32 = 1;
const EXIT_FAILURE: i32 = 2;

#[derive(Parser)]
#[command(author, version, about = "Static validation gate for trading-model packages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate one package and print its report
    Validate(ValidateArgs),
    /// Inspect rule catalogs
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
}

#[derive(Args, Debug, Clone)]
struct ValidateArgs {
    /// Package file (.tar.gz source archive or .jar)
    package: PathBuf,
    /// Declare the artifact kind instead of sniffing it
    #[arg(long, value_enum)]
    kind: Option<KindArg>,
    /// Rule catalog JSON file
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// Append registry and upload-status records to this JSON-lines file
    #[arg(long)]
    registry: Option<PathBuf>,
    /// Storage key recorded for the package (defaults to the file name)
    #[arg(long)]
    key: Option<String>,
    /// Single-line JSON output
    #[arg(long)]
    compact: bool,
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Load a catalog and report validation errors and warnings
    Check {
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Print a built-in preset as JSON
    Dump {
        #[arg(long, default_value = presets::DEFAULT_PRESET)]
        preset: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Source,
    Bytecode,
}

impl From<KindArg> for ArtifactKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Source => ArtifactKind::SourceArchive,
            KindArg::Bytecode => ArtifactKind::BytecodeArchive,
        }
    }
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Validate(args) => {
            let code = match validate_file(&args) {
                Ok(report) => {
                    print_report(&report, args.compact)?;
                    if report.is_valid() {
                        EXIT_VALID
                    } else {
                        EXIT_INVALID
                    }
                }
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    EXIT_FAILURE
                }
            };
            std::process::exit(code);
        }
        Commands::Catalog { action } => match action {
            CatalogAction::Check { catalog } => {
                let catalog = load_catalog(catalog.as_deref())?;
                let result = validate_catalog(&catalog, false)?;
                for warning in &result.warnings {
                    eprintln!("warning: {}", warning);
                }
                for error in &result.errors {
                    eprintln!("error: {}", error);
                }
                if !result.is_valid() {
                    eprintln!(
                        "Catalog '{}' is invalid ({} error(s))",
                        catalog.id,
                        result.errors.len()
                    );
                    std::process::exit(EXIT_INVALID);
                }
                eprintln!(
                    "Catalog '{}' is valid ({} warning(s))",
                    catalog.id,
                    result.warnings.len()
                );
                Ok(())
            }
            CatalogAction::Dump { preset } => {
                let catalog = presets::get(&preset).ok_or_else(|| {
                    anyhow::anyhow!(
                        "unknown preset '{}', available: {}",
                        preset,
                        presets::list_presets().join(", ")
                    )
                })?;
                println!("{}", catalog.to_json_pretty()?);
                Ok(())
            }
        },
    }
}

fn load_catalog(path: Option<&Path>) -> Result<RuleCatalog> {
    match path {
        Some(path) => RuleCatalog::load_from_file(path)
            .with_context(|| format!("Failed to load catalog {}", path.display())),
        None => Ok(RuleCatalog::load_default()?),
    }
}

/// Read, validate and optionally record one package. Errors are system failures
/// only; a rejected package is an `Ok` report.
fn validate_file(args: &ValidateArgs) -> Result<Report> {
    let gate = Gatekeeper::new(load_catalog(args.catalog.as_deref())?)?;

    let bytes = std::fs::read(&args.package)
        .with_context(|| format!("Failed to read package {}", args.package.display()))?;
    let key = args.key.clone().unwrap_or_else(|| package_key(&args.package));

    let mut package = RawPackage::new(key, bytes);
    if let Some(kind) = args.kind {
        package = package.with_kind(kind.into());
    }

    let report = gate.validate(&package);

    if let Some(registry) = &args.registry {
        let mut sink = JsonLinesSink::beside(registry)?;
        let record = RegistryRecord::new(&report, &package.key, &package.bytes)?;
        sink.record(&record, &UploadStatusRecord::new(&report))?;
    }

    Ok(report)
}

fn package_key(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_report(report: &Report, compact: bool) -> Result<()> {
    let json = if compact {
        report.to_json_compact()?
    } else {
        report.to_json()?
    };
    println!("{}", json);
    Ok(())
}
