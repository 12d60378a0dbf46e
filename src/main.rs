mod cli;

use flavmux::config;
use flavmux_codec::{CodecRegistry, Frame};
use flavmux_media::{BoxTree, ComposeOptions, Composer, MediaKind, TracingSink};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "flavmux=trace,flavmux_media=debug".to_string()
        } else {
            "flavmux=info,flavmux_media=info".to_string()
        }
    });

    // stdout carries command output, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { file, json } => {
            let options = compose_options(cli.config.as_deref())?;
            inspect_file(&file, json, options)
        }
        Commands::Compose {
            input,
            output,
            kinds,
        } => {
            let options = compose_options(cli.config.as_deref())?;
            compose_file(&input, output.as_deref(), &kinds, options)
        }
        Commands::AddTrack {
            input,
            output,
            kind,
            codec,
            frames,
            dtype,
            fps,
        } => {
            let options = compose_options(cli.config.as_deref())?;
            let request = AddTrack {
                kind: parse_kind(&kind)?,
                codec,
                frames: read_frames(&frames, &dtype)?,
                fps,
            };
            add_track(&input, output.as_deref(), request, options)
        }
        Commands::Extract { file, kind } => {
            let options = compose_options(cli.config.as_deref())?;
            extract_track(&file, parse_kind(&kind)?, options)
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Codecs => {
            for name in CodecRegistry::with_defaults().names() {
                println!("{}", name);
            }
            Ok(())
        }
        Commands::Version => {
            println!("flavmux {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn compose_options(config_path: Option<&Path>) -> Result<ComposeOptions> {
    config::load_config_or_default(config_path)?.to_compose_options()
}

fn parse_kind(name: &str) -> Result<MediaKind> {
    name.parse()
        .with_context(|| format!("Invalid track kind: {:?}", name))
}

fn open_tree(file: &Path) -> Result<BoxTree> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }
    BoxTree::open(file, &TracingSink).with_context(|| format!("Failed to parse {:?}", file))
}

fn open_composer(file: &Path, options: ComposeOptions) -> Result<Composer> {
    let tree = open_tree(file)?;
    Composer::new(tree, options, Arc::new(TracingSink))
        .with_context(|| format!("Failed to read tracks of {:?}", file))
}

fn save_tree(composer: Composer, input: &Path, output: Option<&Path>) -> Result<PathBuf> {
    let target = output.unwrap_or(input).to_path_buf();
    composer
        .into_tree()
        .save(&target)
        .with_context(|| format!("Failed to write {:?}", target))?;
    Ok(target)
}

fn inspect_file(file: &Path, json: bool, options: ComposeOptions) -> Result<()> {
    let tree = open_tree(file)?;
    let boxes = tree.summary();
    let composer = Composer::new(tree, options, Arc::new(TracingSink))?;
    let tracks = composer.summary()?;

    if json {
        let value = serde_json::json!({ "boxes": boxes, "tracks": tracks });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("\nBoxes:");
    for entry in &boxes {
        println!(
            "  {:indent$}{} @{} ({} bytes, {})",
            "",
            entry.box_type,
            entry.offset,
            entry.size,
            entry.kind,
            indent = entry.depth * 2
        );
    }

    println!("\nTracks: {}", tracks.len());
    for track in &tracks {
        let codecs: Vec<String> = track.codecs.iter().map(|c| c.to_string()).collect();
        println!(
            "  [{}] {} #{} timescale {}: {} chunks, {} samples, {} bytes ({})",
            track.index,
            track.kind,
            track.track_id,
            track.timescale,
            track.chunks,
            track.samples,
            track.bytes,
            codecs.join(", ")
        );
    }

    Ok(())
}

fn compose_file(
    input: &Path,
    output: Option<&Path>,
    kinds: &[String],
    options: ComposeOptions,
) -> Result<()> {
    let mut composer = open_composer(input, options)?;

    let report = if kinds.is_empty() {
        composer.compose_all()?
    } else {
        let kinds = kinds
            .iter()
            .map(|k| parse_kind(k))
            .collect::<Result<Vec<_>>>()?;
        composer.compose(&kinds)?
    };

    match report.criteria {
        Some(kind) => println!("Criteria track: {}", kind),
        None => println!("No track has any chunks; mdat is now empty"),
    }
    println!(
        "Laid out {} chunks ({} bytes) at offset {}",
        report.order.len(),
        report.payload_len,
        report.mdat_offset
    );

    let target = save_tree(composer, input, output)?;
    println!("Wrote {}", target.display());
    Ok(())
}

struct AddTrack {
    kind: MediaKind,
    codec: String,
    frames: Vec<Frame>,
    fps: f64,
}

fn add_track(
    input: &Path,
    output: Option<&Path>,
    request: AddTrack,
    options: ComposeOptions,
) -> Result<()> {
    let registry = CodecRegistry::with_defaults();
    let mut composer = open_composer(input, options)?;

    let track = composer.add_track(
        request.kind,
        &request.codec,
        &request.frames,
        request.fps,
        &registry,
    )?;
    println!(
        "Added {} track with {} frames at moov[{}]",
        track.kind,
        request.frames.len(),
        track.index
    );

    // The new track only gets real chunk offsets from a compose pass.
    let report = composer.compose_all()?;
    println!(
        "Laid out {} chunks ({} bytes)",
        report.order.len(),
        report.payload_len
    );

    let target = save_tree(composer, input, output)?;
    println!("Wrote {}", target.display());
    Ok(())
}

/// Read a JSON array of frames, each an array of integers.
fn read_frames(path: &Path, dtype: &str) -> Result<Vec<Frame>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read frames file: {:?}", path))?;
    let rows: Vec<Vec<u64>> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse frames file: {:?}", path))?;

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            let frame = match dtype {
                "uint8" => row
                    .into_iter()
                    .map(u8::try_from)
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map(Frame::U8),
                _ => row
                    .into_iter()
                    .map(u16::try_from)
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map(Frame::U16),
            };
            frame.with_context(|| format!("Frame {} has a value out of range for {}", i, dtype))
        })
        .collect()
}

fn extract_track(file: &Path, kind: MediaKind, options: ComposeOptions) -> Result<()> {
    let composer = open_composer(file, options)?;
    if composer.track(kind).is_none() {
        anyhow::bail!("{:?} has no {} track", file, kind);
    }

    let frames = composer.decode_frames(kind, &CodecRegistry::with_defaults())?;
    let rows: Vec<Vec<u32>> = frames.iter().map(Frame::to_u32_vec).collect();
    println!("{}", serde_json::to_string(&rows)?);
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Priority: {}", config.compose.priority.join(", "));
    println!("  Streaming: {}", config.compose.streaming);
    println!("  Chunk samples: {}", config.ingest.chunk_samples);
    println!("  Handler name: {}", config.ingest.handler_name);

    Ok(())
}
