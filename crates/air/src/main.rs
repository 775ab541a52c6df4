use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use uuid::Uuid;

use air_core::control::ControlPlane;
use air_core::model::{Block, ProgramFormat};
use air_pipeline::session::PipelineSession;
use air_pipeline::sink::FileSink;

#[derive(Parser, Debug)]
#[command(name = "air", about = "Runtime playout engine")]
struct Cli {
    /// Path to a TOML config file. Missing fields fall back to defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to a newline-delimited JSON block queue, submitted on a timer.
    #[arg(short, long)]
    blocks: Option<PathBuf>,

    /// Where to write the MPEG-TS output. Omit to run with no sink attached.
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Program video width.
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Program video height.
    #[arg(long, default_value_t = 720)]
    height: u32,
}

/// Reference `ControlPlane` caller: reads a newline-delimited JSON block
/// queue file once, submitting each block in order. Demonstrates the
/// contract without implementing a wire protocol.
struct FileControlPlaneDriver {
    blocks: Vec<Block>,
}

impl FileControlPlaneDriver {
    fn load(path: &PathBuf) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("reading block queue {}", path.display()))?;
        let blocks = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str::<Block>(l).with_context(|| "parsing block queue line"))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { blocks })
    }

    fn drive(self, session: &dyn ControlPlane) -> Result<()> {
        for block in self.blocks {
            session.submit_block(block)?;
            std::thread::sleep(Duration::from_millis(50));
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
            air_core::config::EngineConfig::from_toml_str(&text)?
        }
        None => air_core::config::EngineConfig::default(),
    };

    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let format = ProgramFormat {
        video: air_core::model::VideoFormat {
            width: cli.width,
            height: cli.height,
            fps: air_core::model::RationalFps::NTSC_30,
        },
        audio: air_core::model::AudioFormat { sample_rate: 48_000, channels: 2 },
    };

    let pcr_interval_90k = config.pcr_interval_ms * air_core::clock::PTS_HZ / 1000;
    let session = PipelineSession::new(format, config.lookahead_depth, pcr_interval_90k);

    if let Some(out_path) = &cli.out {
        let sink_id = Uuid::new_v4();
        let sink = Arc::new(FileSink::create(out_path, config.sink_queue_bytes)?);
        session.register_sink(sink_id, sink);
        session.attach_sink(sink_id)?;
        tracing::info!(path = %out_path.display(), "attached file sink");
    }

    session.start_channel()?;

    if let Some(blocks_path) = &cli.blocks {
        FileControlPlaneDriver::load(blocks_path)?.drive(&session)?;
    }

    let snapshot = session.get_metrics();
    tracing::info!(?snapshot, "session running; press enter or send EOF to stop");

    let mut line = String::new();
    let _ = std::io::stdin().read_line(&mut line);

    session.stop_channel()?;
    let snapshot = session.get_metrics();
    tracing::info!(?snapshot, "session stopped");
    Ok(())
}
