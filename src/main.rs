//! protogen - message schema compiler
//!
//! Validates a protocol schema and converts recordings between the binary
//! wire format and the text form.

mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use protogen_codec::{
    BinaryReader, BinaryWriter, Codec, RecordingError, RecordingWriter, TextReader, TextWriter,
};
use protogen_schema::Catalogue;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "protogen")]
#[command(about = "Message schema compiler with binary and text codecs")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "PROTOGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Protocol schema (overrides the configured path)
    #[arg(short, long)]
    schema: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the schema and print the message catalogue
    Check,

    /// Convert a binary recording to text
    Decode {
        /// Binary recording
        input: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert a text recording to binary
    Encode {
        /// Text recording
        input: PathBuf,

        /// Binary output file
        output: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(c) => {
            if let Some(path) = &cli.config {
                tracing::info!("Loaded config from {}", path.display());
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };
    if let Some(schema) = cli.schema {
        config.schema.path = schema;
    }

    let catalogue = match Catalogue::from_file(&config.schema.path) {
        Ok(catalogue) => catalogue,
        Err(e) => {
            eprintln!(
                "{}: {}: {}",
                "Error".red(),
                config.schema.path.display(),
                e
            );
            std::process::exit(1);
        }
    };
    let codec = Codec::new(&catalogue).with_options(config.text);

    match cli.command {
        Commands::Check => check(&catalogue, &config.schema.path),
        Commands::Decode { input, output } => decode(codec, &input, output.as_deref())?,
        Commands::Encode { input, output } => encode(codec, &input, &output)?,
    }

    Ok(())
}

fn check(catalogue: &Catalogue, path: &Path) {
    println!(
        "{} {} ({} messages)",
        "Valid".green(),
        path.display().to_string().cyan(),
        catalogue.len()
    );
    println!("  Version:  {}", catalogue.version().yellow());
    println!("  Checksum: {}", catalogue.checksum());
    println!();
    print!("{}", catalogue);
}

fn decode(codec: Codec<'_>, input: &Path, output: Option<&Path>) -> Result<(), RecordingError> {
    let reader = BinaryReader::open(codec, BufReader::new(File::open(input)?))?;

    let out: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };
    let mut writer = TextWriter::open(codec, out);
    writer.write_header(reader.metadata())?;

    let (mut written, mut skipped) = (0usize, 0usize);
    for msg in reader {
        match msg {
            Ok(msg) => {
                writer.write_message(&msg)?;
                written += 1;
            }
            Err(RecordingError::Codec(e)) => {
                tracing::warn!("Skipping message: {}", e);
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    writer.into_inner().flush()?;

    report(written, skipped);
    Ok(())
}

fn encode(codec: Codec<'_>, input: &Path, output: &Path) -> Result<(), RecordingError> {
    let reader = TextReader::open(codec, BufReader::new(File::open(input)?))?;

    let mut writer = BinaryWriter::open(codec, BufWriter::new(File::create(output)?));
    writer.write_header(reader.metadata())?;

    let (mut written, mut skipped) = (0usize, 0usize);
    for msg in reader {
        match msg {
            Ok(msg) => match writer.write_message(&msg) {
                Ok(()) => written += 1,
                Err(RecordingError::Codec(e)) => {
                    tracing::warn!("Skipping message: {}", e);
                    skipped += 1;
                }
                Err(e) => return Err(e),
            },
            Err(e @ RecordingError::Line { .. }) => {
                tracing::warn!("Skipping message: {}", e);
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    writer.into_inner().flush()?;

    report(written, skipped);
    Ok(())
}

fn report(written: usize, skipped: usize) {
    if skipped == 0 {
        eprintln!("{} {} messages", "Converted".green(), written);
    } else {
        eprintln!(
            "{} {} messages ({} skipped)",
            "Converted".yellow(),
            written,
            skipped
        );
    }
}
