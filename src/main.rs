use std::io::BufRead;
use std::path::PathBuf;

use clap::Parser;
use moonrise_audio_lib::{CpalSlot, CrossfadePlayer, EngineConfig, EngineError, Variant};

/// Plays the variants of an album on the default output device and
/// crossfades between them on request.
#[derive(Parser, Debug)]
#[command(name = "moonrise-player")]
#[command(version)]
struct Args {
    /// JSON engine configuration (sources, initialVariant, fadeDurationMs, ...)
    #[arg(short, long)]
    config: PathBuf,

    /// Overrides the configured initial variant
    #[arg(short, long)]
    initial: Option<String>,
}

fn main() -> Result<(), String> {
    moonrise_audio_lib::init_logging();
    let args = Args::parse();

    let mut config = EngineConfig::from_file(&args.config).map_err(EngineError::from)?;
    if let Some(initial) = args.initial {
        config.initial_variant = Variant::from(initial);
    }
    let (player, engine_thread) = CrossfadePlayer::spawn_thread(config, CpalSlot::pair)?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| format!("Failed to build Tokio runtime: {}", e))?;
    rt.block_on(player.wait_ready())?;

    let names: Vec<String> = player.variants().iter().map(|v| v.to_string()).collect();
    println!(
        "Playing '{}'. Type a variant ({}), play, pause, status or quit.",
        player.current_variant(),
        names.join(", ")
    );

    for line in std::io::stdin().lock().lines() {
        let line = line.map_err(|e| format!("Failed to read stdin: {}", e))?;
        let result = match line.trim() {
            "" => Ok(()),
            "quit" | "exit" => break,
            "play" => player.play(),
            "pause" => player.pause(),
            "status" => {
                match serde_json::to_string_pretty(&player.status()) {
                    Ok(json) => println!("{}", json),
                    Err(e) => log::error!("Failed to serialize status: {}", e),
                }
                Ok(())
            }
            variant => player.set_variant(variant),
        };
        if let Err(e) = result {
            eprintln!("{}", e);
        }
    }

    rt.block_on(player.shutdown())?;
    if engine_thread.join().is_err() {
        log::error!("Engine thread panicked during shutdown.");
    }
    Ok(())
}
