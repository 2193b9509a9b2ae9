//! welcome-back: scheduled voice messages in a familiar voice.

mod audio;
mod config;
mod error;
mod generator;
mod schedule;
mod scheduler;
mod synthesis;

use chrono::Local;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use audio::player::AudioPlayer;
use audio::sink::SinkResolver;
use audio::Platform;
use generator::OpenAiMessageGenerator;
use scheduler::{Collaborators, Scheduler};
use synthesis::seed_vc::SeedVcSynthesizer;

#[derive(Parser, Debug)]
#[command(name = "welcome-back", about = "Scheduled voice messages in a familiar voice")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    /// Run one cycle right away and exit
    #[arg(long)]
    once: bool,

    /// Synthesize and play this text once, then exit
    #[arg(long, value_name = "TEXT")]
    say: Option<String>,

    /// Route playback to a Bluetooth sink when one is connected
    #[arg(long)]
    bluetooth: bool,

    /// Reference voice sample, overrides the configured one
    #[arg(long, value_name = "WAV")]
    reference: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug,reqwest=warn,hyper=warn,rodio=warn")
    } else {
        EnvFilter::new("info,reqwest=warn,hyper=warn,rodio=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("welcome-back starting");

    if let Err(e) = config::load_env_file(None) {
        warn!("{e}");
    }

    let mut config = config::Config::load(args.config.as_deref());
    if args.bluetooth {
        config.playback.bluetooth_output = true;
    }
    config.validate()?;

    let platform = Platform::current();
    info!(
        "Platform: {platform}, interval {}-{} hours, bluetooth output {}",
        config.schedule.min_interval_hours,
        config.schedule.max_interval_hours,
        if config.playback.bluetooth_output { "on" } else { "off" }
    );

    let collaborators = Collaborators {
        generator: Box::new(OpenAiMessageGenerator::new(&config.openai, &config.persona)?),
        synthesizer: Box::new(SeedVcSynthesizer::new(&config)?),
        resolver: SinkResolver::pactl(platform, config.playback.bluetooth_target_device.clone()),
        player: AudioPlayer::for_platform(platform, &config.playback),
    };

    let mut scheduler = Scheduler::new(
        &config.schedule,
        config.playback.bluetooth_output,
        collaborators,
        StdRng::from_entropy(),
        Local::now(),
    )
    .with_reference_voice(args.reference);

    if let Some(text) = args.say {
        let (artifact, _) = scheduler.speak(&text).await?;
        info!("Done: {}", artifact.path().display());
        return Ok(());
    }

    if args.once {
        let report = scheduler.run_cycle(Local::now()).await?;
        info!("Done: {} ({})", report.message, report.artifact.path().display());
        return Ok(());
    }

    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
            info!("Interrupted");
        })
        .await;

    Ok(())
}
