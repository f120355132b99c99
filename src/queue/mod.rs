use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::library::{name_hash, AssetId, AssetTree};

/// Snapshot of one queued track. Identity is the sanitized name; the
/// path is the location it resolved to when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTrack {
    pub name: String,
    pub path: PathBuf,
}

impl QueueTrack {
    pub fn from_asset(tree: &AssetTree, id: AssetId) -> Self {
        let asset = tree.get(id);
        QueueTrack {
            name: asset.name.clone(),
            path: asset.path.clone(),
        }
    }
}

/// Contract the playlist controller consumes from the playback queue.
pub trait TrackQueue {
    fn enqueue(&mut self, track: QueueTrack);
    fn push_front(&mut self, track: QueueTrack);
    fn delete_item(&mut self, index: usize) -> Option<QueueTrack>;
    /// Ordered paths of all pending tracks.
    fn items(&self) -> Vec<PathBuf>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Rewrites every entry matching `old`'s identity to `new`.
    fn rename(&mut self, old: &QueueTrack, new: &QueueTrack) -> Result<()>;
    /// Persist the queue. `front` is prepended when the host wants the
    /// currently playing track to resume at the head on the next load.
    fn save(&mut self, front: Option<&QueueTrack>) -> Result<()>;
    fn clear(&mut self);
    /// Rebuilds the in-memory queue from its persisted form, resolving
    /// each entry against the live asset tree.
    fn load(&mut self, library: &AssetTree) -> Result<()>;
    fn is_loop(&self) -> bool;
    fn set_loop(&mut self, looped: bool);
}

/// File-persisted queue: one name-hash per line, resolved back through
/// the asset tree on load. Hashing the name instead of the path lets
/// persisted entries survive relocation of the surrounding directories.
pub struct FsQueue {
    items: Vec<QueueTrack>,
    path: PathBuf,
    looped: bool,
}

impl FsQueue {
    pub fn new(path: PathBuf) -> Self {
        FsQueue {
            items: Vec::new(),
            path,
            looped: false,
        }
    }

    pub fn tracks(&self) -> &[QueueTrack] {
        &self.items
    }
}

impl TrackQueue for FsQueue {
    fn enqueue(&mut self, track: QueueTrack) {
        self.items.push(track);
    }

    fn push_front(&mut self, track: QueueTrack) {
        self.items.insert(0, track);
    }

    fn delete_item(&mut self, index: usize) -> Option<QueueTrack> {
        if index < self.items.len() {
            Some(self.items.remove(index))
        } else {
            None
        }
    }

    fn items(&self) -> Vec<PathBuf> {
        self.items.iter().map(|t| t.path.clone()).collect()
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn rename(&mut self, old: &QueueTrack, new: &QueueTrack) -> Result<()> {
        for item in &mut self.items {
            if item.name == old.name {
                *item = new.clone();
            }
        }
        Ok(())
    }

    fn save(&mut self, front: Option<&QueueTrack>) -> Result<()> {
        let mut out = String::new();
        if let Some(track) = front {
            out.push_str(&format!("{:016x}\n", name_hash(&track.name)));
        }
        for item in &self.items {
            out.push_str(&format!("{:016x}\n", name_hash(&item.name)));
        }
        fs::write(&self.path, out)
            .with_context(|| format!("unable to save queue to {}", self.path.display()))?;
        info!("saved {} queue entries", self.items.len());
        Ok(())
    }

    fn clear(&mut self) {
        self.items.clear();
    }

    fn load(&mut self, library: &AssetTree) -> Result<()> {
        self.items.clear();
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            // First run: nothing persisted yet.
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("unable to load queue from {}", self.path.display()))
            }
        };

        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let Ok(hash) = u64::from_str_radix(line, 16) else {
                warn!("malformed queue entry {:?}; dropped", line);
                continue;
            };
            match library.find_by_name_hash(hash) {
                Some(id) if library.get(id).is_audio_file() => {
                    self.items.push(QueueTrack::from_asset(library, id));
                }
                _ => warn!("queue entry {} no longer resolves; dropped", line),
            }
        }
        Ok(())
    }

    fn is_loop(&self) -> bool {
        self.looped
    }

    fn set_loop(&mut self, looped: bool) {
        self.looped = looped;
    }
}
