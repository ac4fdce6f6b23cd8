//! TPR report CLI - build the TPR detail and summary reports from an extract
//!
//! # Main Commands
//!
//! ```bash
//! tpr-report detail --extract tpr.csv --inventory qoh.csv --reference ref.json
//! tpr-report summary --extract tpr.csv --reference ref.json --output summary.json
//! ```
//!
//! # Configuration Commands
//!
//! ```bash
//! tpr-report config detail             # Print the built-in configuration
//! tpr-report check-config custom.json  # Validate a configuration file
//! tpr-report parse tpr.csv             # Print the normalized extract
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tpr_report::normalize::normalize;
use tpr_report::transform::dsl::IngestConfig;
use tpr_report::{
    parse_file_auto, run_report, ConfigError, ReferenceData, ReportConfig, ReportInputs, RunContext,
    Sheet,
};

#[derive(Parser)]
#[command(name = "tpr-report")]
#[command(about = "Build the TPR detail and summary reports from a planning extract", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the detailed TPR report
    Detail {
        /// Planning extract (CSV)
        #[arg(short, long)]
        extract: PathBuf,

        /// Quantity-on-hand extract (CSV)
        #[arg(short, long)]
        inventory: PathBuf,

        /// Reference data (JSON header rows and lookup tables)
        #[arg(short, long)]
        reference: PathBuf,

        /// Configuration file (default: built-in detail configuration)
        #[arg(short, long, env = "TPR_REPORT_CONFIG")]
        config: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build the TPR summary report
    Summary {
        /// Planning extract (CSV)
        #[arg(short, long)]
        extract: PathBuf,

        /// Reference data (JSON header rows and lookup tables)
        #[arg(short, long)]
        reference: PathBuf,

        /// Configuration file (default: built-in summary configuration)
        #[arg(short, long, env = "TPR_REPORT_CONFIG")]
        config: Option<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print a built-in configuration as JSON
    Config {
        report: ReportKind,
    },

    /// Validate a configuration file and list every problem
    CheckConfig {
        input: PathBuf,
    },

    /// Parse an extract and print the normalized sheet as JSON
    Parse {
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportKind {
    Detail,
    Summary,
}

impl ReportKind {
    fn builtin(self) -> Result<ReportConfig, ConfigError> {
        match self {
            ReportKind::Detail => ReportConfig::detail(),
            ReportKind::Summary => ReportConfig::summary(),
        }
    }
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Detail {
            extract,
            inventory,
            reference,
            config,
            output,
        } => cmd_report(
            ReportKind::Detail,
            &extract,
            Some(&inventory),
            &reference,
            config.as_deref(),
            output.as_deref(),
        ),

        Commands::Summary {
            extract,
            reference,
            config,
            output,
        } => cmd_report(
            ReportKind::Summary,
            &extract,
            None,
            &reference,
            config.as_deref(),
            output.as_deref(),
        ),

        Commands::Config { report } => cmd_config(report),

        Commands::CheckConfig { input } => cmd_check_config(&input),

        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_report(
    kind: ReportKind,
    extract: &Path,
    inventory: Option<&Path>,
    reference: &Path,
    config_path: Option<&Path>,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => {
            eprintln!("📄 Configuration: {}", path.display());
            ReportConfig::load(path)?
        }
        None => kind.builtin()?,
    };

    eprintln!("📄 Processing: {}", extract.display());
    let mut inputs = ReportInputs::new(parse_file_auto(extract)?)
        .with_reference(ReferenceData::load(reference)?);
    if let Some(path) = inventory {
        inputs = inputs.with_auxiliary("inventory", parse_file_auto(path)?);
    }
    for name in config.required_inputs() {
        if !inputs.auxiliary.contains_key(name) {
            eprintln!("   ⚠️  No '{}' extract supplied", name);
        }
    }

    let result = run_report(&config, &inputs, &RunContext::now())?;

    eprintln!("\n📊 {}", result.summary());
    for name in result.store.visible_names() {
        eprintln!("   {}", name);
    }
    for failure in &result.pivot_failures {
        eprintln!("   ❌ {}", failure);
    }

    let json = serde_json::to_string_pretty(&result.snapshot())?;
    write_output(&json, output)?;

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_config(kind: ReportKind) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", kind.builtin()?.to_json()?);
    Ok(())
}

fn cmd_check_config(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("🔍 Checking: {}", input.display());

    match ReportConfig::load(input) {
        Ok(config) => {
            eprintln!("✅ '{}' is valid ({} derived sheets, {} stages)", config.name, config.derived.len(), config.stages.len());
            Ok(())
        }
        Err(ConfigError::Schema { errors }) => {
            eprintln!("❌ {} problems:", errors.len());
            for err in &errors {
                eprintln!("   - {}", err);
            }
            Err(format!("{} schema violations", errors.len()).into())
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing extract: {}", input.display());

    let extract = parse_file_auto(input)?;
    eprintln!("   Encoding: {}", extract.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(extract.delimiter));
    eprintln!("   Columns: {}", extract.headers.join(", "));

    let outcome = normalize(&extract, &IngestConfig::default(), "Sheet1")?;
    for diagnostic in outcome.diagnostics.iter().take(5) {
        eprintln!("   ⚠️  {}", diagnostic);
    }
    eprintln!("✅ Parsed {} rows", outcome.value.height());

    let sheet = Sheet::new("Sheet1", outcome.value);
    let json = serde_json::to_string_pretty(&sheet.snapshot())?;
    write_output(&json, output)?;

    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => {
            fs::write(path, content)?;
            eprintln!("💾 Saved to: {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}
