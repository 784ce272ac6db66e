//! Offline rendering to a WAV file.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use cadenza_graph::AudioGraph;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::SessionConfig;

#[derive(Args)]
pub struct RenderArgs {
    /// Input WAV file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Timeline position of the clip, in whole notes
    #[arg(long, default_value_t = 0.0)]
    at: f64,

    /// Session config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output bit depth (16, 24, or 32)
    #[arg(long)]
    bit_depth: Option<u16>,
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(depth) = args.bit_depth {
        config.bit_depth = depth;
    }

    let mut graph = AudioGraph::for_render(
        config.pipeline()?,
        &args.output,
        config.depth()?,
        &BTreeMap::new(),
    )?;

    println!("Loading {}...", args.input.display());
    graph.add_clip(&args.input, args.at)?;
    graph.start_render()?;

    let expected = graph.render_progress()?.frames_expected;
    println!("Rendering {expected} frames...");
    let bar = ProgressBar::new(expected);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("##-"),
    );

    loop {
        let progress = graph.render_progress()?;
        bar.set_position(progress.frames_rendered);
        if progress.failed {
            bar.abandon();
            let _ = graph.finish_render();
            anyhow::bail!("render failed: encoder write error");
        }
        if progress.complete {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    bar.finish();

    let frames = graph.finish_render()?;
    println!(
        "Wrote {} frames ({:.2}s) to {}",
        frames,
        frames as f64 / f64::from(graph.sample_rate()),
        args.output.display()
    );
    Ok(())
}
