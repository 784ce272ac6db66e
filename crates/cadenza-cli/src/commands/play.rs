//! File playback through the audio graph.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cadenza_graph::{AudioGraph, EngineEvent};
use clap::Args;

use crate::config::SessionConfig;

#[derive(Args)]
pub struct PlayArgs {
    /// WAV file to play
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Output device (index, exact name, or partial name)
    #[arg(short, long)]
    device: Option<String>,

    /// Session config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start position in whole notes
    #[arg(long)]
    seek: Option<f64>,
}

pub fn run(args: PlayArgs) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    let device = args.device.or_else(|| config.device.clone());

    let mut graph = AudioGraph::for_playback(config.pipeline()?, device.as_deref())?;

    println!("Loading {}...", args.file.display());
    graph.load_preview(&args.file)?;
    if let Some((_, total)) = graph.preview_progress() {
        println!(
            "  {} frames, {} Hz session, {:.1}s",
            total,
            graph.sample_rate(),
            total as f64 / f64::from(graph.sample_rate())
        );
    }

    if let Some(pos) = args.seek {
        graph.set_play_head(pos);
    }
    graph.play();

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::SeqCst);
    })?;

    println!("\nPlaying... Press Ctrl+C to stop.\n");
    while running.load(Ordering::SeqCst) {
        graph.flush_events();
        for event in graph.poll_engine_events() {
            match event {
                EngineEvent::DeviceLost => {
                    tracing::warn!("output device lost, recovering");
                    graph.recover_backend_disconnect()?;
                }
                EngineEvent::Underrun { missing_frames } => {
                    tracing::warn!(missing_frames, "underrun");
                }
                EngineEvent::StreamError(detail) => {
                    tracing::warn!(%detail, "stream error");
                }
            }
        }

        if let Some((done, total)) = graph.preview_progress() {
            let percent = if total == 0 { 100 } else { done * 100 / total };
            print!(
                "\r  {percent:>3}%  play head {:.3} whole notes",
                graph.play_head()
            );
            std::io::stdout().flush()?;
        }
        if graph.preview_exhausted() == Some(true) {
            // The source is padding silence; let the buffered tail drain.
            std::thread::sleep(graph.latency());
            println!("\nDone.");
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    graph.pause();
    Ok(())
}
