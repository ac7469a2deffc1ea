use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tokio::sync::{Semaphore, mpsc};
use tracing_subscriber::EnvFilter;

use camlink::api::MediaServer;
use camlink::audio::{
    AudioChunk, CpalMic, CpalSpeaker, DisabledAudio, MAX_PLAYBACK_SAMPLES, MicCapture, MicSource,
    SAMPLE_RATE, SpeakerPlayback, SpeakerSink, mono_to_stereo,
};
use camlink::camera::{Flash, LedDriver, LoggingLed, TestPatternCamera};
use camlink::context::{MediaContext, MediaSettings};
use camlink::Config;

/// camlink - camera snapshots, MJPEG stream and PCM audio over HTTP
#[derive(Parser)]
#[command(name = "camlink", version, about)]
struct Cli {
    /// Config file (default: ~/.config/camlink/config.toml)
    #[arg(short, long, env = "CAMLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Control port (/capture, /health, audio sockets)
    #[arg(long)]
    port: Option<u16>,

    /// Stream port (/stream)
    #[arg(long)]
    stream_port: Option<u16>,

    /// Disable audio devices (for hosts without audio hardware)
    #[arg(long)]
    no_audio: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input through the capture pipeline
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output with a tone
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,camlink=info",
        1 => "info,camlink=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(port) = cli.stream_port {
        config.server.stream_port = port;
    }
    if cli.no_audio {
        config.audio.enabled = false;
    }

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(&config, duration).await,
            Command::TestSpeaker => test_speaker().await,
        };
    }

    tracing::info!(
        port = config.server.port,
        stream_port = config.server.stream_port,
        camera = %config.camera.format,
        width = config.camera.width,
        height = config.camera.height,
        audio = config.audio.enabled,
        "starting camlink"
    );

    let camera = TestPatternCamera::new(config.camera.width, config.camera.height, config.camera.format)
        .with_fps(config.camera.fps)
        .with_buffers(config.camera.buffers)
        .with_quality(config.camera.jpeg_quality);

    let led = config
        .flash
        .pin
        .map(|pin| Arc::new(LoggingLed::new(pin)) as Arc<dyn LedDriver>);
    let flash = Flash::new(led, config.flash.intensity);

    let (mic, speaker): (Arc<dyn MicSource>, Arc<dyn SpeakerSink>) = if config.audio.enabled {
        (Arc::new(CpalMic), Arc::new(CpalSpeaker))
    } else {
        (Arc::new(DisabledAudio), Arc::new(DisabledAudio))
    };

    let ctx = Arc::new(
        MediaContext::builder(Arc::new(camera))
            .mic(mic)
            .flash(flash)
            .settings(MediaSettings::from(&config))
            .build(),
    );

    let playback = SpeakerPlayback::for_context(&ctx, speaker).spawn()?;

    let server = MediaServer::builder(ctx)
        .host(config.server.host.clone())
        .port(config.server.port)
        .stream_port(config.server.stream_port)
        .static_dir(config.server.static_dir.clone())
        .build();

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    playback.shutdown();
    Ok(())
}

/// Run the capture pipeline against the configured mic and print levels
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mic: Arc<dyn MicSource> = if config.audio.enabled {
        Arc::new(CpalMic)
    } else {
        Arc::new(DisabledAudio)
    };
    let owner = Arc::new(Semaphore::new(1));
    let permit = Arc::clone(&owner).try_acquire_owned()?;

    let (tx, mut rx) = mpsc::channel::<AudioChunk>(64);
    let capture = MicCapture::new(mic, config.audio.gain_shift, config.audio.block_samples);
    let handle = capture.spawn(permit, tx)?;

    println!("Sample rate: {SAMPLE_RATE} Hz, gain shift: {}", config.audio.gain_shift);
    println!("---");

    let deadline = Instant::now() + Duration::from_secs(duration);
    let mut second = 1;
    let mut window: Vec<i16> = Vec::new();
    let mut tick = Instant::now();
    while Instant::now() < deadline {
        let Ok(Some(chunk)) = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await else {
            break;
        };
        window.extend(chunk.samples());

        if tick.elapsed() >= Duration::from_secs(1) {
            let (rms, peak) = levels(&window);

            // Visual meter
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let meter_len = (rms * 100.0).min(50.0) as usize;
            let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);
            println!("[{second:2}s] RMS: {rms:.4} | Peak: {peak:.4} | [{meter}]");

            window.clear();
            tick = Instant::now();
            second += 1;
        }
    }

    drop(rx);
    let report = tokio::task::spawn_blocking(move || handle.join())
        .await?
        .map_err(|_| anyhow::anyhow!("capture thread panicked"))?;

    println!("\n---");
    println!("Capture ended: {:?} after {} blocks", report.exit, report.blocks);
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: arecord -l (to list devices)");
    println!("  3. Try a smaller gain_shift in the [audio] config section");

    Ok(())
}

/// RMS and peak of 16-bit samples, normalized to 0.0-1.0
#[allow(clippy::cast_precision_loss)]
fn levels(samples: &[i16]) -> (f32, f32) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let norm = |s: i16| f32::from(s) / 32768.0;
    let sum_squares: f32 = samples.iter().map(|&s| norm(s) * norm(s)).sum();
    let peak = samples.iter().map(|&s| norm(s).abs()).fold(0.0f32, f32::max);
    ((sum_squares / samples.len() as f32).sqrt(), peak)
}

/// Play a 440Hz tone through the same stereo path the speaker thread uses
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let played = tokio::task::spawn_blocking(|| -> camlink::Result<usize> {
        let mut output = CpalSpeaker.open()?;
        let tone = tone(440.0, 2 * SAMPLE_RATE as usize);
        let mut stereo = Vec::with_capacity(MAX_PLAYBACK_SAMPLES * 2);
        let mut chunks = 0;
        for block in tone.chunks(MAX_PLAYBACK_SAMPLES) {
            mono_to_stereo(&AudioChunk::from_pcm(block), &mut stereo);
            output.write(&stereo)?;
            chunks += 1;
        }
        // Let the device drain before the stream is dropped
        std::thread::sleep(Duration::from_millis(300));
        Ok(chunks)
    })
    .await??;

    println!("Played {played} chunks at {SAMPLE_RATE} Hz");
    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl list sinks short");
    println!("  2. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Sine tone at 30% volume
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn tone(frequency: f32, samples: usize) -> Vec<i16> {
    (0..samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            ((2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 * 32767.0) as i16
        })
        .collect()
}
