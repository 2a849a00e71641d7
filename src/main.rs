//! PDF Shrinker CLI
//!
//! Command-line interface for recompressing oversized images in PDFs.

use anyhow::{bail, Context, Result};
use clap::Parser;
use shrink_pdf::{file_ops::compress_pdf_file, list_images, self_test, CompressOptions};
use std::path::PathBuf;

/// Shrink a PDF by recompressing its large embedded images
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input PDF file path
    #[arg(short, long, required_unless_present = "self_test")]
    input: Option<PathBuf>,

    /// Output PDF file path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JPEG quality for re-encoded images (1-100)
    #[arg(short, long, default_value_t = shrink_pdf::JPEG_QUALITY)]
    quality: u8,

    /// Images wider than this are downscaled to this width
    #[arg(long, default_value_t = shrink_pdf::MAX_WIDTH)]
    max_width: u32,

    /// Skip images whose sides are both below this many pixels
    #[arg(long, default_value_t = shrink_pdf::MIN_DIMENSION)]
    min_dimension: u32,

    /// Skip images whose encoded size is below this many bytes
    #[arg(long, default_value_t = shrink_pdf::MIN_IMAGE_BYTES)]
    min_bytes: usize,

    /// Compress PDF streams (reduces file size)
    #[arg(short, long, default_value_t = true, action = clap::ArgAction::Set)]
    compress_streams: bool,

    /// List the images on each page instead of compressing
    #[arg(short, long)]
    list: bool,

    /// Run the built-in health check and exit
    #[arg(long)]
    self_test: bool,

    /// Verbose output (-v for info, -vv for per-image decisions)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn options(&self) -> CompressOptions {
        CompressOptions {
            min_dimension: self.min_dimension,
            min_image_bytes: self.min_bytes,
            max_width: self.max_width,
            quality: self.quality,
            compress_streams: self.compress_streams,
        }
    }
}

/// Human-readable byte count
fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    if args.self_test {
        let outcome = self_test().context("Compression engine failed self-test")?;
        println!(
            "Compression engine is operational ({} -> {})",
            format_size(outcome.original_size),
            format_size(outcome.compressed_size)
        );
        return Ok(());
    }

    let input = args
        .input
        .as_ref()
        .context("An input file is required")?;
    let options = args.options();

    if args.list {
        let bytes = std::fs::read(input)
            .with_context(|| format!("Failed to read input file: {}", input.display()))?;
        let pages = list_images(&bytes, &options)?;
        for page in &pages {
            println!("Page {}:", page.page_number);
            for img in &page.images {
                println!(
                    "  {} {}: {}x{} {} {}bpc {} {}{}",
                    img.object_id.0,
                    img.object_id.1,
                    img.width,
                    img.height,
                    img.color_space,
                    img.bits_per_component,
                    img.filter,
                    format_size(img.size_bytes),
                    if img.eligible { " (candidate)" } else { "" }
                );
            }
        }
        return Ok(());
    }

    let Some(output) = args.output.as_ref() else {
        bail!("An output file is required unless --list or --self-test is given");
    };

    println!("PDF Shrinker");
    println!("============");

    let outcome = compress_pdf_file(input, output, &options)
        .with_context(|| format!("Failed to compress {}", input.display()))?;

    println!(
        "\nDone! Examined {} images: {} replaced, {} filtered, {} kept, {} failed",
        outcome.stats.examined,
        outcome.stats.replaced,
        outcome.stats.filtered,
        outcome.stats.kept,
        outcome.stats.failed
    );
    println!(
        "Original size: {}, compressed size: {} ({:.2}% saved)",
        format_size(outcome.original_size),
        format_size(outcome.compressed_size),
        outcome.ratio()
    );
    println!("Output saved to: {:?}", output);

    Ok(())
}
