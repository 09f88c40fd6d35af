// ============================================================================
// Gr8Paint CLI: headless project-file tooling via command-line arguments
// ============================================================================
//
// Usage examples:
//   gr8paint --input scene.gr8 --info
//   gr8paint -i "projects/*.gr8" --verify
//   gr8paint -i scene.gr8 --export flat.png
//   gr8paint -i "shots/*.gr8" --output-dir rendered/ --format jpeg --quality 85
//   gr8paint -i photo.png --import --output photo.gr8
//
// All processing runs synchronously; exit code 0 means every input
// succeeded.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::error::Result;
use crate::io::{self, ExportFormat};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Gr8Paint headless project tool.
///
/// Inspect, verify, export, and import `.gr8` project files without a GUI.
#[derive(Parser, Debug)]
#[command(
    name = "gr8paint",
    about = "Gr8Paint headless project-file tool",
    long_about = "Inspect, verify, export, and import Gr8Paint project files\n\
                  without opening the editor.\n\n\
                  Example:\n  \
                  gr8paint --input scene.gr8 --info\n  \
                  gr8paint -i \"projects/*.gr8\" --verify\n  \
                  gr8paint -i scene.gr8 --export flat.png\n  \
                  gr8paint -i photo.png --import --output photo.gr8"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.gr8", "shots/*.gr8").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Print header and per-layer information for each project file.
    /// This is the default when no other mode is given.
    #[arg(long)]
    pub info: bool,

    /// Check frame, checksum, and snapshot decode for each project file.
    #[arg(long)]
    pub verify: bool,

    /// Flatten the project and write it as a raster image to this path.
    /// Only valid for single-file input; use --output-dir for batches.
    #[arg(short, long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Wrap each raster input image as a single-layer project file.
    #[arg(long)]
    pub import: bool,

    /// Destination file for --import with a single input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch export or import.
    /// Files are written with the input stem and the target extension.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Export format: png or jpeg.
    /// When omitted, inferred from the output extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1-100, default 90).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// Print per-file detail and timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

/// What the invocation asks for, after flag resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Info,
    Verify,
    Export,
    Import,
}

fn resolve_mode(args: &CliArgs) -> std::result::Result<Mode, String> {
    let picked = [
        args.info,
        args.verify,
        args.export.is_some(),
        args.import,
    ]
    .iter()
    .filter(|&&f| f)
    .count();
    if picked > 1 {
        return Err("choose one of --info, --verify, --export, --import".into());
    }
    if args.info {
        Ok(Mode::Info)
    } else if args.verify {
        Ok(Mode::Verify)
    } else if args.import {
        Ok(Mode::Import)
    } else if args.export.is_some() || args.output_dir.is_some() {
        Ok(Mode::Export)
    } else {
        Ok(Mode::Info)
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    // Resolve glob patterns / literal paths into concrete PathBufs
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    let mode = match resolve_mode(&args) {
        Ok(m) => m,
        Err(msg) => {
            eprintln!("error: {msg}");
            return ExitCode::FAILURE;
        }
    };

    // Multiple inputs cannot share one explicit output file
    if inputs.len() > 1 && args.output_dir.is_none() {
        let single_target = match mode {
            Mode::Export => args.export.is_some(),
            Mode::Import => args.output.is_some(),
            _ => false,
        };
        if single_target {
            eprintln!(
                "error: {} input files given but a single output path was specified.\n\
                 Use --output-dir to write batch results to a directory.",
                inputs.len()
            );
            return ExitCode::FAILURE;
        }
    }

    // Create output directory if specified
    if let Some(dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "error: could not create output directory '{}': {e}",
                dir.display()
            );
            return ExitCode::FAILURE;
        }
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let file_start = Instant::now();

        let outcome = match mode {
            Mode::Info => run_info(input_path),
            Mode::Verify => run_verify(input_path),
            Mode::Export => run_export(input_path, &args),
            Mode::Import => run_import(input_path, &args),
        };

        match outcome {
            Ok(()) => {
                if args.verbose {
                    println!(
                        "  done ({:.0}ms)",
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {e}");
                any_failure = true;
            }
        }
    }

    if any_failure {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

// ============================================================================
// Per-file operations
// ============================================================================

fn run_info(input: &Path) -> Result<()> {
    let raw = std::fs::read(input)?;
    let summary = io::summarize_project(&raw)?;

    println!("{}:", input.display());
    println!("  format version : {}", summary.version);
    println!("  payload size   : {} bytes", summary.payload_len);
    println!("  checksum       : {:#010x}", summary.checksum);
    println!("  active layer   : {}", summary.active_layer_index);
    println!("  layers         : {}", summary.layer_count());
    for (idx, layer) in summary.layers.iter().enumerate() {
        println!(
            "    [{idx}] '{}' {}x{}, {} bytes compressed{}",
            layer.name,
            layer.width,
            layer.height,
            layer.compressed_len,
            if layer.visible { "" } else { ", hidden" }
        );
    }
    Ok(())
}

fn run_verify(input: &Path) -> Result<()> {
    let raw = std::fs::read(input)?;
    let stack = io::read_project(&raw)?;
    let (w, h) = stack.dimensions();
    println!("  verified: {} layer(s), {w}x{h}", stack.len());
    Ok(())
}

fn run_export(input: &Path, args: &CliArgs) -> Result<()> {
    let stack = io::load_project(input)?;
    let format = parse_format(args.format.as_deref(), args.export.as_deref());
    let output = build_output_path(
        input,
        args.export.as_deref(),
        args.output_dir.as_deref(),
        format.extension(),
    )
    .ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("cannot determine output path for '{}'", input.display()),
        )
    })?;

    io::export_flattened(&output, &stack, format, args.quality)?;
    println!("  exported {}", output.display());
    Ok(())
}

fn run_import(input: &Path, args: &CliArgs) -> Result<()> {
    let stack = io::import_image(input)?;
    let output = build_output_path(
        input,
        args.output.as_deref(),
        args.output_dir.as_deref(),
        "gr8",
    )
    .ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("cannot determine output path for '{}'", input.display()),
        )
    })?;

    io::save_project(&output, &stack)?;
    println!("  imported to {}", output.display());
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            // Literal path, use directly
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        // Treat as glob pattern
        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{pattern}' matched no files.");
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{pattern}': {e}");
            }
        }
    }

    result
}

/// Choose the [`ExportFormat`] from the `--format` string or infer it from
/// the output file extension. Defaults to PNG when neither is known.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> ExportFormat {
    if let Some(f) = format_arg {
        return match f.to_lowercase().as_str() {
            "jpeg" | "jpg" => ExportFormat::Jpeg,
            _ => ExportFormat::Png,
        };
    }
    output
        .and_then(ExportFormat::from_path)
        .unwrap_or(ExportFormat::Png)
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. explicit output path (single-file input)
/// 2. output directory (batch, derives filename from input stem)
/// 3. fallback: same directory as input, same stem, new extension
///    (appends `_out` to the stem if it would collide with the input path)
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    ext: &str,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{stem}.{ext}")));
    }

    // Write next to the input file
    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{stem}.{ext}"));

    // Avoid silent overwrite of the input
    if candidate == input {
        Some(parent.join(format!("{stem}_out.{ext}")))
    } else {
        Some(candidate)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> CliArgs {
        CliArgs::parse_from(["gr8paint", "--input", "scene.gr8"])
    }

    #[test]
    fn default_mode_is_info() {
        let args = base_args();
        assert_eq!(resolve_mode(&args).unwrap(), Mode::Info);
    }

    #[test]
    fn output_dir_alone_selects_export() {
        let args = CliArgs::parse_from(["gr8paint", "-i", "a.gr8", "--output-dir", "out"]);
        assert_eq!(resolve_mode(&args).unwrap(), Mode::Export);
    }

    #[test]
    fn conflicting_modes_are_rejected() {
        let args = CliArgs::parse_from(["gr8paint", "-i", "a.gr8", "--info", "--verify"]);
        assert!(resolve_mode(&args).is_err());
    }

    #[test]
    fn format_flag_beats_extension() {
        let out = Path::new("flat.png");
        assert_eq!(parse_format(Some("jpeg"), Some(out)), ExportFormat::Jpeg);
        assert_eq!(parse_format(None, Some(out)), ExportFormat::Png);
        assert_eq!(
            parse_format(None, Some(Path::new("flat.JPG"))),
            ExportFormat::Jpeg
        );
        assert_eq!(parse_format(None, None), ExportFormat::Png);
    }

    #[test]
    fn output_path_prefers_explicit_then_dir_then_sibling() {
        let input = Path::new("art/scene.gr8");

        let explicit = build_output_path(input, Some(Path::new("x.png")), None, "png");
        assert_eq!(explicit, Some(PathBuf::from("x.png")));

        let in_dir = build_output_path(input, None, Some(Path::new("out")), "png");
        assert_eq!(in_dir, Some(PathBuf::from("out/scene.png")));

        let sibling = build_output_path(input, None, None, "png");
        assert_eq!(sibling, Some(PathBuf::from("art/scene.png")));
    }

    #[test]
    fn output_path_never_overwrites_input() {
        let input = Path::new("art/scene.gr8");
        let dodged = build_output_path(input, None, None, "gr8");
        assert_eq!(dodged, Some(PathBuf::from("art/scene_out.gr8")));
    }
}
