//! Siphon CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::HeaderMap;
use siphon_compression::config::load_from_file;
use siphon_compression::{from_encoding, CompressionConfig, CompressionMiddleware};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "siphon")]
#[command(about = "Accept-Encoding negotiation and response compression", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "warn", env = "SIPHON_LOG")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a file or stdin with one encoding
    Compress {
        /// Encoding token (br, gzip, deflate, zstd, lz4, s2)
        #[arg(short, long, default_value = "gzip")]
        encoding: String,

        /// Compression level, 0 for the encoding's default
        #[arg(short = 'q', long, default_value_t = 0, allow_negative_numbers = true)]
        level: i32,

        /// Input file, stdin when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show which encoding a response would get
    Negotiate {
        /// Client Accept-Encoding value
        #[arg(short, long)]
        accept_encoding: String,

        /// Response body size in bytes
        #[arg(short, long)]
        size: usize,

        /// Response Content-Type
        #[arg(short = 't', long)]
        content_type: Option<String>,

        /// Configuration file, defaults when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long, default_value = "siphon.yaml")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    match cli.command {
        Commands::Compress {
            encoding,
            level,
            input,
            output,
        } => compress(&encoding, level, input, output),
        Commands::Negotiate {
            accept_encoding,
            size,
            content_type,
            config,
        } => negotiate(&accept_encoding, size, content_type.as_deref(), config),
        Commands::Validate { config } => validate(config),
    }
}

fn compress(
    encoding: &str,
    level: i32,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let Some(compressor) = from_encoding(encoding, level, 0) else {
        bail!("unknown encoding '{encoding}'");
    };

    let mut reader: Box<dyn Read> = match &input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };
    let mut writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    let copied = compressor
        .pipe(&mut reader, &mut writer, level)
        .with_context(|| format!("{encoding} stream failed"))?;
    writer.flush()?;

    tracing::info!(encoding, level, bytes = copied, "Stream compressed");
    Ok(())
}

fn negotiate(
    accept_encoding: &str,
    size: usize,
    content_type: Option<&str>,
    config: Option<PathBuf>,
) -> Result<()> {
    let config = match config {
        Some(path) => load_from_file(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => CompressionConfig::default(),
    };
    let middleware = CompressionMiddleware::from_config(&config)?;
    let negotiator = middleware.negotiator();

    let mut headers = HeaderMap::new();
    if let Some(content_type) = content_type {
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type)?);
    }

    if let Err(reason) = negotiator.eligibility(&headers, size) {
        println!("skip: {reason}");
        return Ok(());
    }
    match negotiator.select(accept_encoding, Some(size)) {
        Some((token, _)) => println!("{token}"),
        None => println!("skip: not_accepted"),
    }
    Ok(())
}

fn validate(path: PathBuf) -> Result<()> {
    tracing::info!("Validating configuration: {}", path.display());

    match load_from_file(&path).and_then(|config| CompressionMiddleware::from_config(&config)) {
        Ok(middleware) => {
            let negotiator = middleware.negotiator();
            let encodings: Vec<_> = negotiator
                .compressors()
                .iter()
                .map(|c| c.encoding())
                .collect();
            println!("Configuration is valid");
            println!("  Compressors: {}", encodings.join(", "));
            println!("  Min length: {}", negotiator.min_length());
            println!("  Checker: {}", negotiator.checker().as_str());
            println!("  Level: {}", negotiator.level());
            Ok(())
        }
        Err(e) => {
            tracing::error!("Configuration validation failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::WARN,
    };

    // stdout carries compressed output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_level(true),
        )
        .with(EnvFilter::from_default_env().add_directive(filter.into()))
        .init();

    Ok(())
}
