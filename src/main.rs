//! ukaccounts CLI - extract account facts from UK statutory XBRL filings

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use ukaccounts::{
    default_catalogue, CsvSink, FilingDocument, JsonLinesSink, LogSink, RecordSink,
};

/// Extract account facts from UK statutory XBRL filings
#[derive(Parser)]
#[command(name = "ukaccounts")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the default account catalogue from one or more filings
    Extract {
        /// Input files (.html inline XBRL or .xml instance documents)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output as line-delimited JSON instead of CSV
        #[arg(short, long)]
        json: bool,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory receiving raw copies of documents that fail to parse
        #[arg(long)]
        dump_dir: Option<PathBuf>,
    },

    /// Parse a filing and show its unit, context, and fact tables
    Tables {
        /// Input file
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            inputs,
            json,
            output,
            dump_dir,
        } => {
            let writer: Box<dyn Write> = match &output {
                Some(path) => Box::new(
                    File::create(path)
                        .with_context(|| format!("Failed to create {}", path.display()))?,
                ),
                None => Box::new(std::io::stdout()),
            };
            let mut sink: Box<dyn RecordSink> = if json {
                Box::new(JsonLinesSink::new(writer))
            } else {
                Box::new(CsvSink::new(writer)?)
            };

            let catalogue = default_catalogue();
            let mut diag = LogSink;
            let mut failed = 0;

            for input in &inputs {
                let doc = parse_filing(input, dump_dir.as_deref(), &mut diag)?;
                if !doc.is_parsed() {
                    println!("{} {}", "✗".red().bold(), input.display());
                    failed += 1;
                    continue;
                }
                let emitted = doc.emit_records(&catalogue, sink.as_mut(), &mut diag)?;
                println!(
                    "{} {} - {} records",
                    "✓".green().bold(),
                    input.display(),
                    emitted
                );
            }

            if failed > 0 {
                std::process::exit(1);
            }
        }

        Commands::Tables { input } => {
            let mut diag = LogSink;
            let doc = parse_filing(&input, None, &mut diag)?;
            if !doc.is_parsed() {
                println!("{} {}", "✗".red().bold(), input.display());
                std::process::exit(1);
            }

            println!("{} {}", "✓".green().bold(), input.display());
            if let Some(number) = doc.company_number() {
                println!("  Company number: {}", number);
            }
            println!("  Units: {}", doc.units().len());
            println!("  Contexts: {}", doc.contexts().len());
            println!("  Facts: {}", doc.facts().len());
        }
    }

    Ok(())
}

fn parse_filing(
    input: &Path,
    dump_dir: Option<&Path>,
    diag: &mut dyn ukaccounts::DiagnosticSink,
) -> Result<FilingDocument> {
    let data = std::fs::read(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let mut doc = FilingDocument::new(input.to_string_lossy().into_owned());
    if let Some(dir) = dump_dir {
        doc = doc.with_dump_dir(dir);
    }
    doc.parse(&data, diag);
    Ok(doc)
}
