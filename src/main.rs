use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use vidprobe::{BrowserDriver, Config, RecordingSession, SessionConfig};

/// Play a random search result on a video site while recording the screen
/// and system audio, then report the audio loudness over time.
#[derive(Debug, Parser)]
#[command(name = "vidprobe", version, about)]
struct Cli {
    /// Search text; all words are joined into one query.
    #[arg(required = true)]
    search: Vec<String>,

    /// Recording duration in seconds.
    #[arg(long, default_value_t = 120)]
    duration: u64,

    /// Config file stem (e.g. "config/vidprobe"); defaults are used when
    /// omitted.
    #[arg(long)]
    config: Option<String>,

    /// Directory artifacts are written to; overrides the config file.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Skip the final audio/video mux.
    #[arg(long)]
    no_mux: bool,

    /// Keep the intermediate audio/video files after a successful mux.
    #[arg(long)]
    keep_intermediates: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    // Missing search text is a usage error and exits non-zero via clap.
    let cli = Cli::parse();

    match run(cli).await {
        // Task-local failures still exit 0; the artifacts that could be
        // produced were, and the log names the failing task.
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Session aborted: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut cfg = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.output_dir {
        cfg.output.dir = dir;
    }
    if cli.no_mux {
        cfg.mux.enabled = false;
    }
    if cli.keep_intermediates {
        cfg.mux.keep_intermediates = true;
    }

    let query = cli.search.join(" ");
    let duration = Duration::from_secs(cli.duration);

    anyhow::ensure!(cli.duration > 0, "Duration must be positive");

    info!("vidprobe v{}", env!("CARGO_PKG_VERSION"));

    // A browser that cannot launch means nothing would play; treat it as a
    // fatal setup failure before any capture starts.
    let driver = Arc::new(BrowserDriver::launch(cfg.playback.clone()).await?);

    let session_config = SessionConfig::from_config(query, duration, &cfg);
    let session = RecordingSession::new(session_config, driver);

    // Ctrl-C sets the shared token; the session winds all tasks down and
    // still runs its post-processing over whatever was captured.
    let cancel = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received; stopping the session");
            cancel.cancel();
        }
    });

    let result = session.run().await?;

    info!(
        "Artifacts: audio={:?} video={:?} report={:?} muxed={:?}",
        result.audio_path, result.video_path, result.report_path, result.muxed_path
    );
    if !result.all_tasks_ok() {
        error!(
            "One or more tasks failed: playback={:?} audio={:?} screen={:?}",
            result.playback, result.audio, result.screen
        );
    }

    Ok(())
}
