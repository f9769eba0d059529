//! spinlist - transcript to playlist command line tool
//!
//! Reads a transcript file, extracts the music it recommends, resolves each
//! recommendation against MusicBrainz and prints the processing report as
//! JSON on stdout. Optionally writes the resolved tracks to a playlist.
//!
//! Exits non-zero when the run fails as a whole (malformed transcript,
//! systemic search failure, bad configuration).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use spinlist_common::config::{write_toml_config, TomlConfig};
use spinlist_common::logging::init_tracing;
use spinlist_resolver::sources::{
    FileTranscriptSource, JsonPlaylistSink, MusicBrainzSearch, PlaylistSink, TranscriptSource,
};
use spinlist_resolver::{Pipeline, ProcessingReport};

/// Command-line arguments for spinlist
#[derive(Parser, Debug)]
#[command(name = "spinlist")]
#[command(about = "Turn music mentioned in a transcript into a playlist")]
#[command(version)]
struct Args {
    /// Transcript file (plain text, or JSON with timed segments)
    #[arg(required_unless_present = "write_default_config")]
    transcript: Option<String>,

    /// Config file (overrides SPINLIST_CONFIG and the platform default)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop starting new catalog searches after this many seconds
    #[arg(long, env = "SPINLIST_DEADLINE_SECS")]
    deadline_secs: Option<u64>,

    /// Write resolved tracks as a JSON playlist into this directory
    #[arg(long)]
    playlist_dir: Option<PathBuf>,

    /// Playlist name (defaults to the transcript file name)
    #[arg(long)]
    playlist_name: Option<String>,

    /// Write a config file with every default value to this path and exit
    #[arg(long, value_name = "PATH")]
    write_default_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.write_default_config {
        write_toml_config(&TomlConfig::default(), path)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let mut config =
        TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(secs) = args.deadline_secs {
        config.resolver.deadline_secs = Some(secs);
    }

    init_tracing(&config.logging).context("Failed to initialize logging")?;

    info!("Starting spinlist {}", env!("CARGO_PKG_VERSION"));

    let transcript_id = args
        .transcript
        .as_deref()
        .context("A transcript path is required")?;

    let search =
        MusicBrainzSearch::new(&config.catalog).context("Failed to create catalog client")?;
    let pipeline =
        Pipeline::from_config(&config, Arc::new(search)).context("Invalid pattern configuration")?;

    let transcript = FileTranscriptSource::new()
        .get_transcript(transcript_id)
        .await
        .context("Failed to load transcript")?;

    let cancel_token = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel_token.clone()));

    let report = match pipeline.run_with_cancel(&transcript, cancel_token).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Run failed");
            return Err(e).context("Pipeline run failed");
        }
    };

    let summary = report.summary();
    info!(
        resolved = summary.resolved,
        no_match = summary.no_match,
        search_failed = summary.search_failed,
        "Run summary"
    );

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to encode report")?
    );

    if let Some(dir) = &args.playlist_dir {
        let name = args
            .playlist_name
            .clone()
            .unwrap_or_else(|| default_playlist_name(transcript_id));
        write_playlist(dir, &name, transcript_id, &report).await?;
    }

    Ok(())
}

fn default_playlist_name(transcript_id: &str) -> String {
    Path::new(transcript_id)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| transcript_id.to_string())
}

async fn write_playlist(
    dir: &Path,
    name: &str,
    transcript_id: &str,
    report: &ProcessingReport,
) -> Result<()> {
    let tracks: Vec<_> = report.resolved_tracks().into_iter().cloned().collect();
    if tracks.is_empty() {
        warn!("No resolved tracks, skipping playlist");
        return Ok(());
    }

    let sink = JsonPlaylistSink::new(dir);
    let description = format!("{} tracks recommended in {}", tracks.len(), transcript_id);
    let handle = sink
        .create_playlist(name, &description)
        .await
        .context("Failed to create playlist")?;
    sink.add_tracks(&handle, &tracks)
        .await
        .context("Failed to add tracks to playlist")?;

    info!(path = %sink.path_for(&handle).display(), tracks = tracks.len(), "Playlist written");
    Ok(())
}

/// Cancel the run on Ctrl+C; in-flight searches still finish
async fn cancel_on_ctrl_c(cancel_token: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("Received Ctrl+C, no new searches will start");
            cancel_token.cancel();
        }
        Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
    }
}
