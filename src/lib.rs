// Quaver - playlist/library engine for a terminal music player
// Owns the on-disk music tree and keeps it coherent with the playback
// queue and the download pipeline. Rendering and audio output live in
// the host application.

pub mod config;    // settings file (music dir, sort policy, downloader)
pub mod download;  // downloader subprocess pipeline + progress tracker
pub mod library;   // asset tree + directory scanner
pub mod lyric;     // LRC parsing and ID3 lyric embedding
pub mod playback;  // playback engine boundary
pub mod playlist;  // tree controller: all structural mutations
pub mod queue;     // playback queue boundary + persisted implementation

// Export the stuff host applications actually use
pub use config::Config;
pub use download::{DownloadPipeline, DownloadTracker};
pub use library::{Asset, AssetId, AssetKind, AssetTree};
pub use playback::Playback;
pub use playlist::Playlist;
pub use queue::{FsQueue, QueueTrack, TrackQueue};

/// Errors that carry a specific user-facing message. Everything else is
/// propagated as `anyhow::Error` with the originating operation attached.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no file has been yanked")]
    NothingYanked,
    #[error("cannot yank the root directory")]
    YankedRoot,
    #[error("no matching audio name")]
    NoMatchingAudio,
    #[error("{0} is not in your $PATH")]
    DownloaderMissing(String),
    #[error("unable to locate the downloaded file in the downloader output")]
    DownloadPathMissing,
}
