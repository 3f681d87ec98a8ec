//! Imageforge CLI - batch image conversion from the command line
//!
//! Converts one or more input files through the imageforge pipeline:
//! bounded concurrency, retried workers, and a persistent
//! content-addressed conversion cache.

mod error;

use clap::{Parser, ValueEnum};
use error::CliError;
use imageforge::config::PipelineConfig;
use imageforge::convert::{CodecConverter, ConvertPipeline, ImageFormat, TargetFormat};
use imageforge::logging::init_logging;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    /// PNG (lossless)
    Png,
    /// JPEG (lossy, quality applies)
    Jpeg,
    /// WebP (lossless)
    Webp,
    /// GIF
    Gif,
    /// BMP
    Bmp,
}

impl From<FormatArg> for ImageFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Png => ImageFormat::Png,
            FormatArg::Jpeg => ImageFormat::Jpeg,
            FormatArg::Webp => ImageFormat::WebP,
            FormatArg::Gif => ImageFormat::Gif,
            FormatArg::Bmp => ImageFormat::Bmp,
        }
    }
}

#[derive(Parser)]
#[command(name = "imageforge")]
#[command(about = "Convert images with bounded concurrency and a persistent cache", long_about = None)]
#[command(version = imageforge::VERSION)]
struct Args {
    /// Input image files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Target format (defaults to each input's current format)
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Encoding quality (0-100)
    #[arg(long, default_value = "90")]
    quality: u8,

    /// Maximum concurrent conversions
    #[arg(long, default_value = "3")]
    concurrency: usize,

    /// Cache directory (defaults to the platform cache dir)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Output directory
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Log directory
    #[arg(long, default_value = "logs")]
    log_dir: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        e.exit();
    }
}

async fn run(args: Args) -> Result<(), CliError> {
    let _logging_guard = init_logging(&args.log_dir, "imageforge.log")
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

    let mut config = PipelineConfig::new().with_concurrency(args.concurrency);
    if let Some(cache_dir) = args.cache_dir.clone() {
        config = config.with_cache_root(cache_dir);
    }

    let pipeline = ConvertPipeline::new(CodecConverter::new, config).map_err(CliError::Config)?;
    let cancel = CancellationToken::new();

    // Import every input, resolving its format from the extension.
    let total = args.inputs.len();
    let mut ids = Vec::with_capacity(total);
    for path in &args.inputs {
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ImageFormat::from_extension)
            .ok_or_else(|| CliError::UnsupportedInput(path.clone()))?;

        let bytes = std::fs::read(path).map_err(|error| CliError::FileRead {
            path: path.clone(),
            error,
        })?;

        let display_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("image")
            .to_string();

        let image = pipeline
            .import_image(&display_name, format, bytes, &cancel)
            .await
            .map_err(|error| CliError::Import {
                path: path.clone(),
                error,
            })?;

        let registry = pipeline.registry();
        if let Some(format) = args.format {
            registry
                .set_target(&image.id, TargetFormat::Format(format.into()))
                .await
                .map_err(|error| CliError::Import {
                    path: path.clone(),
                    error,
                })?;
        }
        registry
            .set_quality(&image.id, args.quality)
            .await
            .map_err(|error| CliError::Import {
                path: path.clone(),
                error,
            })?;

        ids.push(image.id);
    }
    info!(count = ids.len(), "images imported");

    // Convert everything through the pool, reporting progress per item.
    let outcome = pipeline
        .convert_all(ids, &cancel, |done, total| {
            println!("[{}/{}] processed", done, total);
        })
        .await
        .map_err(CliError::Config)?;

    std::fs::create_dir_all(&args.output_dir).map_err(|error| CliError::FileWrite {
        path: args.output_dir.clone(),
        error,
    })?;

    for output in &outcome.succeeded {
        let path = args.output_dir.join(&output.name);
        std::fs::write(&path, &output.bytes).map_err(|error| CliError::FileWrite {
            path: path.clone(),
            error,
        })?;
        println!("wrote {}", path.display());
    }

    for failure in &outcome.failed {
        eprintln!("failed: {}", failure);
    }

    if !outcome.is_complete() {
        return Err(CliError::Convert {
            failed: outcome.failed.len(),
            total: outcome.total(),
        });
    }

    println!("{} images converted", outcome.succeeded.len());
    Ok(())
}
