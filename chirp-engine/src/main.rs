//! Chirp probe (chirp-probe) - diagnostic entry point
//!
//! Exercises the sound engine without a host application: lists output
//! devices, decodes a file to report its PCM layout, or plays a registered
//! sound event through the headless backend while ticking the engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chirp_common::{ResourceLocation, SoundRegistry};
use chirp_engine::audio::{devices, StreamingDecoder};
use chirp_engine::backend::HeadlessBackend;
use chirp_engine::playback::SimpleSoundInstance;
use chirp_engine::resources::DirectoryProvider;
use chirp_engine::{EngineConfig, PlayResult, SoundEngine};

/// Command-line arguments for chirp-probe
#[derive(Parser, Debug)]
#[command(name = "chirp-probe")]
#[command(about = "Diagnostics for the chirp sound engine")]
#[command(version)]
struct Args {
    /// Configuration file (overrides CHIRP_CONFIG and the platform default)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List output devices
    Devices,

    /// Decode an audio file and report its format
    Decode {
        /// Compressed audio file
        file: PathBuf,
    },

    /// Play a sound event through the headless backend
    Play {
        /// Resource root containing `<namespace>/sounds.json`
        #[arg(env = "CHIRP_RESOURCES")]
        root: PathBuf,

        /// Sound event, e.g. `chirp:ui.click`
        event: String,

        /// Ticks to run after starting the sound
        #[arg(long, default_value = "100")]
        ticks: u64,

        /// Milliseconds per tick
        #[arg(long, default_value = "50")]
        tick_ms: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chirp_engine=debug,chirp_probe=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    match args.command {
        Command::Devices => list_devices(),
        Command::Decode { file } => decode(&file),
        Command::Play {
            root,
            event,
            ticks,
            tick_ms,
        } => {
            let config = EngineConfig::discover(args.config.as_deref())
                .context("Failed to load configuration")?;
            play(config, &root, &event, ticks, Duration::from_millis(tick_ms))
        }
    }
}

fn list_devices() -> Result<()> {
    let default = devices::default_output_device_name();
    for name in devices::list_output_devices().context("Failed to enumerate devices")? {
        let marker = if Some(&name) == default.as_ref() { "*" } else { " " };
        println!("{} {}", marker, name);
    }
    Ok(())
}

fn decode(file: &Path) -> Result<()> {
    let source = std::fs::File::open(file)
        .with_context(|| format!("Failed to open {}", file.display()))?;
    let extension = file.extension().and_then(|e| e.to_str());

    let started = Instant::now();
    let mut decoder = StreamingDecoder::new(Box::new(std::io::BufReader::new(source)), extension)
        .context("Failed to initialize decoder")?;
    let pcm = decoder.read_all().context("Failed to decode")?;

    println!(
        "{}: {} Hz, {} channel(s), {} bytes, {:.3}s (decoded in {:?})",
        file.display(),
        pcm.format.sample_rate,
        pcm.format.channels,
        pcm.bytes.len(),
        pcm.duration().as_secs_f64(),
        started.elapsed()
    );
    Ok(())
}

/// Load every `<root>/<namespace>/sounds.json` into a registry.
fn load_registry(root: &Path) -> Result<SoundRegistry> {
    let mut registry = SoundRegistry::new();
    let entries =
        std::fs::read_dir(root).with_context(|| format!("Failed to read {}", root.display()))?;

    for entry in entries {
        let entry = entry?;
        let document = entry.path().join("sounds.json");
        if !document.is_file() {
            continue;
        }
        let namespace = entry.file_name().to_string_lossy().to_string();
        let json = std::fs::read_to_string(&document)
            .with_context(|| format!("Failed to read {}", document.display()))?;
        let count = registry
            .register_document(&namespace, &json)
            .with_context(|| format!("Invalid sound registration in {}", document.display()))?;
        info!("Loaded {} sound events from namespace {}", count, namespace);
    }
    Ok(registry)
}

fn play(config: EngineConfig, root: &Path, event: &str, ticks: u64, tick: Duration) -> Result<()> {
    let event: ResourceLocation = event.parse().context("Invalid sound event name")?;
    let registry = load_registry(root)?;

    let mut engine = SoundEngine::new(
        config,
        Arc::new(HeadlessBackend::new()),
        Arc::new(DirectoryProvider::new(root)),
        registry,
    )
    .context("Failed to initialize sound engine")?;

    if !engine.is_loaded() {
        bail!("Sound engine could not open an output device");
    }

    let instance = SimpleSoundInstance::for_ui(event.clone(), 1.0, 1.0);
    let id = match engine.play(Arc::new(instance)) {
        PlayResult::NotStarted => bail!("Sound {} did not start", event),
        result => {
            info!("{:?}", result);
            result.id()
        }
    };

    for _ in 0..ticks {
        engine.tick(false);
        std::thread::sleep(tick);
        if let Some(id) = id {
            if !engine.is_active(id) {
                info!("Sound finished after {} ticks", engine.tick_count());
                break;
            }
        }
    }

    info!("{}", engine.debug_string());
    engine.destroy();
    Ok(())
}
