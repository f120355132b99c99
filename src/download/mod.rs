pub mod tracker;

pub use tracker::{DownloadTracker, DEFAULT_TITLE};

use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use regex::Regex;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::lyric::{embed_lyric, language_descriptor, Lyric};
use crate::playback::Playback;
use crate::playlist::Playlist;
use crate::queue::TrackQueue;
use crate::Error;

/// What a finished download hands back to the host for its notice.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub audio_path: PathBuf,
    pub lyrics_embedded: usize,
}

/// End-to-end import path from a source URL to a tagged, embedded local
/// asset inserted into the playlist tree.
///
/// Every request is one background unit: the downloader subprocess runs
/// to completion (no cancellation, no timeout), its output is captured,
/// the realized file is imported, and adjacent lyric sidecars are
/// embedded into the audio tag. The shared [`DownloadTracker`] is
/// reconciled on every path out.
pub struct DownloadPipeline<Q, P> {
    playlist: std::sync::Arc<Mutex<Playlist<Q, P>>>,
    tracker: DownloadTracker,
    downloader: String,
    history_path: PathBuf,
}

impl<Q, P> Clone for DownloadPipeline<Q, P> {
    fn clone(&self) -> Self {
        DownloadPipeline {
            playlist: std::sync::Arc::clone(&self.playlist),
            tracker: self.tracker.clone(),
            downloader: self.downloader.clone(),
            history_path: self.history_path.clone(),
        }
    }
}

impl<Q, P> DownloadPipeline<Q, P>
where
    Q: TrackQueue + Send + 'static,
    P: Playback + Send + 'static,
{
    pub fn new(
        playlist: std::sync::Arc<Mutex<Playlist<Q, P>>>,
        tracker: DownloadTracker,
        downloader: String,
        history_path: PathBuf,
    ) -> Self {
        DownloadPipeline {
            playlist,
            tracker,
            downloader,
            history_path,
        }
    }

    pub fn tracker(&self) -> &DownloadTracker {
        &self.tracker
    }

    /// Launches one download as an independent background unit.
    pub fn spawn(&self, url: String, dest_dir: PathBuf) -> tokio::task::JoinHandle<Result<DownloadOutcome>> {
        let pipeline = self.clone();
        tokio::spawn(async move {
            let result = pipeline.download(&url, &dest_dir).await;
            if let Err(err) = &result {
                tracing::error!("download of {} failed: {:#}", url, err);
            }
            result
        })
    }

    /// Runs one download to completion and imports the result into
    /// `dest_dir`'s container.
    ///
    /// A missing downloader binary fails before the in-flight counter is
    /// touched. Once counted, the matching completion signal is sent on
    /// every path out, so a failed download can never leave the spinner
    /// stuck.
    pub async fn download(&self, url: &str, dest_dir: &Path) -> Result<DownloadOutcome> {
        let program = lookup_path(&self.downloader)
            .ok_or_else(|| Error::DownloaderMissing(self.downloader.clone()))?;

        self.tracker.begin();
        let result = self.run(&program, url, dest_dir).await;
        self.tracker.finish();
        result
    }

    async fn run(&self, program: &Path, url: &str, dest_dir: &Path) -> Result<DownloadOutcome> {
        info!("downloading {} into {}", url, dest_dir.display());

        let output_template = format!("{}/%(title)s.%(ext)s", dest_dir.display());
        let output = Command::new(program)
            .args([
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--output",
                &output_template,
                "--add-metadata",
                "--embed-thumbnail",
                "--metadata-from-title",
                "%(artist)s - %(title)s",
                "--write-subs",
                "--sub-langs",
                "all",
                "--convert-subs",
                "lrc",
                url,
            ])
            .output()
            .await
            .with_context(|| format!("unable to launch {}", self.downloader))?;

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.downloader,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let audio_path = extract_destination(&stdout, dest_dir).ok_or(Error::DownloadPathMissing)?;

        // History is best-effort; a failed write never undoes an import.
        if let Err(err) = append_history(&self.history_path, url) {
            warn!("unable to append download history: {:#}", err);
        }

        {
            let mut playlist = self.playlist.lock().await;
            let container = playlist
                .tree()
                .find_by_path(dest_dir)
                .unwrap_or_else(|| playlist.tree().root());
            playlist.add_song_to_playlist(&audio_path, container)?;
        }

        let lyrics_embedded = embed_sidecar_lyrics(&audio_path)?;
        info!(
            "finished downloading {} ({} lyrics embedded)",
            audio_path.display(),
            lyrics_embedded
        );

        Ok(DownloadOutcome {
            audio_path,
            lyrics_embedded,
        })
    }
}

/// Resolves `program` the way a shell would: as-is when it carries a
/// path separator, otherwise against `$PATH`.
fn lookup_path(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let candidate = PathBuf::from(program);
        return candidate.is_file().then_some(candidate);
    }
    env::split_paths(&env::var_os("PATH")?)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Recovers the realized output file from captured downloader stdout:
/// the last `Destination:` line naming an mp3 under the target dir.
fn extract_destination(stdout: &str, dest_dir: &Path) -> Option<PathBuf> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?m)Destination:\s*(?P<path>.+\.mp3)\s*$").unwrap());

    re.captures_iter(stdout)
        .filter_map(|cap| cap.name("path"))
        .map(|m| PathBuf::from(m.as_str().trim()))
        .filter(|path| path.starts_with(dest_dir))
        .last()
}

fn append_history(history_path: &Path, url: &str) -> Result<()> {
    if let Some(parent) = history_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(history_path)
        .with_context(|| format!("unable to open {}", history_path.display()))?;
    writeln!(file, "{url}")?;
    Ok(())
}

/// Embeds every lyric sidecar adjacent to `audio_path` into its tag as
/// a synchronised lyric frame, deleting the sidecar afterwards. Returns
/// how many were embedded; a corrupt sidecar aborts the remaining ones.
fn embed_sidecar_lyrics(audio_path: &Path) -> Result<usize> {
    let dir = audio_path.parent().context("audio file has no parent directory")?;
    let mut embedded = 0;

    for entry in fs::read_dir(dir)
        .with_context(|| format!("unable to list {}", dir.display()))?
        .filter_map(std::result::Result::ok)
    {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("lrc") {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();

        let content = fs::read_to_string(&path)
            .with_context(|| format!("unable to read {}", path.display()))?;
        let mut lyric = Lyric::from_lrc(&content)
            .with_context(|| format!("unable to parse {}", path.display()))?;
        lyric.lang_ext = language_descriptor(&file_name);

        embed_lyric(audio_path, &lyric, true)?;
        fs::remove_file(&path)
            .with_context(|| format!("unable to remove {}", path.display()))?;
        embedded += 1;
    }

    Ok(embedded)
}
