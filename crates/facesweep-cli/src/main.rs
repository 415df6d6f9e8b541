use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use facesweep_core::crop::{self, ThumbnailLimits};
use facesweep_core::eligibility::FaceThresholds;
use facesweep_core::{routines, Document, IndexedRecord, RelativeBox, Routine, Settings};

mod payload;

#[derive(Parser)]
#[command(name = "facesweep", version, about = "Face collection maintenance")]
struct Cli {
    /// Settings file (TOML); defaults to $FACESWEEP_CONFIG
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a maintenance routine against the live services
    Run {
        /// Routine name (see `facesweep routines`)
        routine: Routine,
        /// JSON payload, or @path to read it from a file
        #[arg(short, long, default_value = "{}")]
        payload: String,
    },
    /// Crop a face thumbnail out of a local image
    Crop {
        image: PathBuf,
        #[arg(long, allow_negative_numbers = true)]
        left: f64,
        #[arg(long, allow_negative_numbers = true)]
        top: f64,
        #[arg(long)]
        width: f64,
        #[arg(long)]
        height: f64,
        /// Padding in pixels around the box
        #[arg(long)]
        margin: Option<u32>,
        /// Output path (default: <image>_face.jpg)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check whether an indexed record (DynamoDB JSON) qualifies as a thumbnail
    Check { record: PathBuf },
    /// List available routines
    Routines,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { routine, payload } => {
            let settings = match &cli.config {
                Some(path) => Settings::load(Some(path.as_path())),
                None => Settings::from_env(),
            }
            .context("loading settings")?;
            let payload = payload::parse(&payload)?;

            let gateways = facesweep_aws::connect(&settings).await;
            let response = routines::run(routine, payload, &gateways, &settings).await;

            println!("{}", payload::pretty_body(&response.body));
            if !response.is_success() {
                bail!("{routine} finished with status {}", response.status_code);
            }
        }
        Commands::Crop {
            image,
            left,
            top,
            width,
            height,
            margin,
            output,
        } => {
            let bbox = RelativeBox {
                left,
                top,
                width,
                height,
            };
            let mut limits = ThumbnailLimits::default();
            if let Some(margin) = margin {
                limits.margin = margin;
            }
            let output = output.unwrap_or_else(|| default_crop_path(&image));

            let source = std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
            let thumbnail = crop::crop_face_with(&source, &bbox, &limits)?;
            std::fs::write(&output, &thumbnail).with_context(|| format!("writing {}", output.display()))?;
            println!("{} ({} bytes)", output.display(), thumbnail.len());
        }
        Commands::Check { record } => {
            let raw = std::fs::read_to_string(&record).with_context(|| format!("reading {}", record.display()))?;
            let record = parse_record(&raw)?;
            match FaceThresholds::default().assess(&record) {
                Ok(face) => {
                    println!("eligible");
                    println!("{}", serde_json::to_string_pretty(&face)?);
                }
                Err(reason) => println!("rejected: {reason}"),
            }
        }
        Commands::Routines => {
            for routine in Routine::ALL {
                println!("{:<24} {}", routine.name(), routine.description());
            }
        }
    }

    Ok(())
}

fn default_crop_path(image: &Path) -> PathBuf {
    let stem = image.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    image.with_file_name(format!("{stem}_face.jpg"))
}

/// Accepts a bare item or a `GetItem` response (`{"Item": {...}}`).
fn parse_record(raw: &str) -> Result<IndexedRecord> {
    let mut value: serde_json::Value = serde_json::from_str(raw).context("record is not JSON")?;
    if let Some(item) = value.get_mut("Item") {
        value = item.take();
    }
    let document: Document = serde_json::from_value(value).context("record is not DynamoDB JSON")?;
    Ok(IndexedRecord::new(document))
}
