// Quaver CLI host - scans the music library, optionally fetches a URL
// into it, and prints the resulting tree. The full TUI lives elsewhere;
// this binary exists to drive the engine end to end.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use quaver::{
    AssetId, AssetTree, Config, DownloadPipeline, DownloadTracker, FsQueue, Playback, Playlist,
    QueueTrack, TrackQueue,
};

#[derive(Parser)]
#[command(name = "quaver", version, about = "Playlist engine for a terminal music player")]
struct Cli {
    /// Music directory (overrides the config file)
    music_dir: Option<PathBuf>,

    /// Order siblings most recently modified first
    #[arg(long)]
    sort_by_mtime: bool,

    /// Fetch this URL into the music directory before printing
    #[arg(long, value_name = "URL")]
    fetch: Option<String>,
}

/// This host never plays audio; the engine still needs the boundary.
struct NoPlayback;

impl Playback for NoPlayback {
    fn current_song(&self) -> Option<QueueTrack> {
        None
    }
    fn skip(&mut self) {}
    fn is_running(&self) -> bool {
        false
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging()?;

    // Load config - falls back to defaults if missing
    let config = Config::load()?;
    let music_dir = cli.music_dir.unwrap_or_else(|| config.music_dir.clone());
    let sort_by_mtime = cli.sort_by_mtime || config.sort_by_mtime;

    let queue = FsQueue::new(config.queue_path.clone());
    let mut playlist = Playlist::new(&music_dir, sort_by_mtime, queue, NoPlayback)?;
    playlist.load_queue()?;
    info!(
        "scanned {} entries under {}",
        playlist.tree().len(),
        music_dir.display()
    );

    let playlist = Arc::new(Mutex::new(playlist));

    if let Some(url) = cli.fetch {
        let pipeline = DownloadPipeline::new(
            Arc::clone(&playlist),
            DownloadTracker::new(),
            config.downloader.clone(),
            config.history_path.clone(),
        );
        let outcome = pipeline.download(&url, &music_dir).await?;
        println!(
            "fetched {} ({} lyrics embedded)",
            outcome.audio_path.display(),
            outcome.lyrics_embedded
        );
    }

    let guard = playlist.lock().await;
    print_tree(guard.tree(), guard.tree().root(), 0);

    let songs = guard
        .tree()
        .walk()
        .filter(|&id| guard.tree().get(id).is_audio_file())
        .count();
    println!("{} songs, {} queued", songs, guard.queue.len());
    Ok(())
}

fn print_tree(tree: &AssetTree, id: AssetId, depth: usize) {
    let asset = tree.get(id);
    let indent = "  ".repeat(depth);
    if asset.is_audio_file() {
        println!("{}{}  [{}]", indent, asset.name, mmss(asset.length));
    } else {
        println!("{}{}/", indent, asset.name);
    }
    for &child in tree.children(id) {
        print_tree(tree, child, depth + 1);
    }
}

fn mmss(length: Duration) -> String {
    let secs = length.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Logs go to a file so stdout stays clean for the tree listing. The
/// guard must live until exit or buffered lines are dropped.
fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = dirs::cache_dir()
        .context("could not find cache directory")?
        .join("quaver");
    std::fs::create_dir_all(&log_dir)?;

    let appender = tracing_appender::rolling::never(log_dir, "quaver.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}
