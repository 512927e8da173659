use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use labelcraft_core::config::DEFAULT_CONFIG_FILE;
use labelcraft_core::writer::write_atomically;
use labelcraft_core::{
    DataRow, FieldMappingConfig, GenerateError, GenerateRequest, GeneratedWorkbook, Generator,
    GeneratorConfig, extract_mapped_values, read_workbook, stamp_label_qr_codes,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;

mod formatter;

#[derive(Parser)]
#[command(name = "labelcraft")]
#[command(about = "Generate QR label workbooks from XLSX templates", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human", global = true)]
    format: OutputFormat,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Clone the template sheet once per data row and fill in the mapped fields
    Generate {
        /// Template id in the template store
        #[arg(long, value_name = "ID")]
        template_id: String,

        /// JSON data rows: an array, or an object with a `rows` array
        #[arg(long, value_name = "FILE")]
        rows: PathBuf,

        /// Template workbook to use instead of the stored one
        #[arg(long, value_name = "XLSX")]
        template: Option<PathBuf>,

        /// Field mapping to use instead of the stored one
        #[arg(long, value_name = "JSON")]
        mapping: Option<PathBuf>,

        /// Output file (defaults to the configured output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Add label QR codes to a generated workbook after it was recalculated
    Stamp {
        /// Generated workbook, re-saved by a spreadsheet application
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Field mapping with the label systems
        #[arg(long, value_name = "JSON")]
        mapping: PathBuf,

        /// Number of generated sheets to process
        #[arg(long, value_name = "N")]
        row_count: usize,

        /// Output file (defaults to output-with-qr.xlsx next to FILE)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the values found in the mapped cells of the first sheet
    Extract {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, value_name = "JSON")]
        mapping: PathBuf,

        /// Template id echoed in the report
        #[arg(long, value_name = "ID")]
        template_id: Option<String>,
    },

    /// List sheets, merge regions and names of a workbook
    Inspect {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output for scripting
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let config = load_config(cli.config.as_deref())?;
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Command::Generate {
            template_id,
            rows,
            template,
            mapping,
            output,
        } => {
            let request = GenerateRequest {
                template_id,
                rows: read_rows(&rows)?,
            };
            let generated = match generate(&config, &request, template.as_deref(), mapping.as_deref()) {
                Ok(generated) => generated,
                Err(err) => exit_with(&err, cli.format),
            };

            let path = output.unwrap_or_else(|| config.storage.output_dir.join(&generated.file_name));
            write_output(&path, &generated.bytes)?;
            formatter::print_generated(&path, &generated, cli.format)
        }
        Command::Stamp {
            file,
            mapping,
            row_count,
            output,
        } => {
            let mapping = FieldMappingConfig::from_file(&mapping)?;
            let bytes = fs::read(&file).with_context(|| format!("Failed to open {}", file.display()))?;
            let stamped = match stamp_label_qr_codes(&bytes, &mapping, row_count, &config) {
                Ok(stamped) => stamped,
                Err(err) => exit_with(&err, cli.format),
            };

            let path = output.unwrap_or_else(|| file.with_file_name("output-with-qr.xlsx"));
            write_output(&path, &stamped)?;
            formatter::print_written(&path, stamped.len(), cli.format)
        }
        Command::Extract {
            file,
            mapping,
            template_id,
        } => {
            let mapping = FieldMappingConfig::from_file(&mapping)?;
            let bytes = fs::read(&file).with_context(|| format!("Failed to open {}", file.display()))?;
            let labels = extract_mapped_values(&bytes, &mapping)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            formatter::print_extracted(template_id.as_deref(), &labels, cli.format)
        }
        Command::Inspect { file } => {
            let workbook = read_workbook(&file)?;
            formatter::print_inspection(&file, &workbook, cli.format)
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::WARN,
        (false, 1) => Level::INFO,
        (false, _) => Level::DEBUG,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<GeneratorConfig> {
    if let Some(config_path) = path {
        return GeneratorConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()));
    }

    // Fall back to labelcraft.toml in the working directory
    let default_config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
    if default_config_path.exists() {
        GeneratorConfig::from_file(&default_config_path)
            .with_context(|| format!("Failed to load config from {}", default_config_path.display()))
    } else {
        Ok(GeneratorConfig::default())
    }
}

fn read_rows(path: &Path) -> Result<Vec<DataRow>> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut value: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()))?;

    let rows = if value.is_array() {
        value
    } else {
        value.get_mut("rows").map(serde_json::Value::take).unwrap_or_default()
    };
    serde_json::from_value(rows)
        .with_context(|| format!("{} must hold an array of rows or an object with `rows`", path.display()))
}

fn generate(
    config: &GeneratorConfig,
    request: &GenerateRequest,
    template: Option<&Path>,
    mapping: Option<&Path>,
) -> Result<GeneratedWorkbook, GenerateError> {
    let generator = Generator::new(config.clone()).map_err(GenerateError::Config)?;
    if template.is_none() && mapping.is_none() {
        return generator.generate(request);
    }

    request.validate()?;
    let id = request.template_id.as_str();
    let workbook = match template {
        Some(path) => read_workbook(path).map_err(GenerateError::Config)?,
        None => generator.store().load_template(id)?,
    };
    let mapping = match mapping {
        Some(path) => FieldMappingConfig::from_file(path).map_err(GenerateError::Config)?,
        None => generator.store().load_config_or_default(id)?,
    };
    generator.generate_from(id, workbook, &mapping, &request.rows)
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    write_atomically(path, bytes)
}

/// Report a generation failure and exit: 2 for malformed requests, 1 otherwise
fn exit_with(err: &GenerateError, format: OutputFormat) -> ! {
    formatter::print_failure(err, format);
    let code = if err.status_code() == 400 { 2 } else { 1 };
    std::process::exit(code);
}
