use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fiscal_extract::invoice::{extract_invoice_text, extract_invoice_xml};
use fiscal_extract::{build_resolver, default_loader, BatchProcessor, DocumentLoader, InputDocument, PipelineConfig};
use log::info;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "fiscal-extract")]
#[command(version, about = "Extract records from fiscal restriction reports and clearance certificates")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve organization names through the CNPJ lookup service
    #[arg(long, global = true)]
    lookup: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bucket restriction-report records by municipality
    Reports {
        /// Municipality to file documents under (repeatable, order matters)
        #[arg(short, long = "entity", required = true)]
        entities: Vec<String>,
        /// Report PDFs
        files: Vec<PathBuf>,
    },
    /// Read clearance certificates and their days until expiry
    Certificates {
        /// Certificate PDFs
        files: Vec<PathBuf>,
    },
    /// Read service-invoice fields from an NFS-e XML or PDF
    Invoice {
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    config.apply_env_overrides()?;
    if cli.lookup {
        config.lookup.enabled = true;
    }

    match cli.command {
        Commands::Reports { entities, files } => {
            let processor = build_processor(config)?;
            let documents = read_documents(&files)?;
            let report = processor.process_restriction_reports(&documents, &entities)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Certificates { files } => {
            let processor = build_processor(config)?;
            let documents = read_documents(&files)?;
            let today = chrono::Local::now().date_naive();
            let report = processor.process_certificates(&documents, today);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Invoice { file } => {
            let data = if has_extension(&file, "xml") {
                let xml = std::fs::read_to_string(&file)
                    .with_context(|| format!("reading {}", file.display()))?;
                extract_invoice_xml(&xml)?
            } else {
                let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
                let loaded = default_loader().load(&bytes)?;
                extract_invoice_text(&loaded.raw_text.join("\n"))
            };
            if data.is_empty() {
                info!("No invoice fields recognised in {}", file.display());
            }
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
    }

    Ok(())
}

fn build_processor(config: PipelineConfig) -> Result<BatchProcessor> {
    let resolver = build_resolver(&config.lookup)?;
    Ok(BatchProcessor::new(config, default_loader(), resolver))
}

fn read_documents(files: &[PathBuf]) -> Result<Vec<InputDocument>> {
    files
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown.pdf")
                .to_string();
            Ok(InputDocument::new(filename, bytes))
        })
        .collect()
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}
