use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use id3::TagLike;
use tracing::info;

use crate::library::{scan, stem_name, Asset, AssetId, AssetKind, AssetTree};
use crate::playback::Playback;
use crate::queue::{QueueTrack, TrackQueue};
use crate::Error;

/// Controller over the scanned asset tree. Owns the root, the current
/// highlight, the single-slot yank clipboard, and every structural
/// mutation together with its propagation into the queue and playback.
///
/// All mutations take `&mut self`, so ownership serialises them; the
/// download pipeline shares the controller behind a mutex and locks it
/// only for the final insert.
pub struct Playlist<Q, P> {
    tree: AssetTree,
    sort_by_mtime: bool,
    highlighted: AssetId,
    yanked: Option<Asset>,
    pub queue: Q,
    pub player: P,
}

impl<Q: TrackQueue, P: Playback> Playlist<Q, P> {
    /// Scans `root` and builds the controller. A failed first scan is the
    /// caller's problem; it is the only error meant to abort startup.
    pub fn new(root: &Path, sort_by_mtime: bool, queue: Q, player: P) -> Result<Self> {
        let tree = scan(root, sort_by_mtime)?;
        let highlighted = tree
            .children(tree.root())
            .first()
            .copied()
            .unwrap_or_else(|| tree.root());
        Ok(Playlist {
            tree,
            sort_by_mtime,
            highlighted,
            yanked: None,
            queue,
            player,
        })
    }

    pub fn tree(&self) -> &AssetTree {
        &self.tree
    }

    pub fn highlighted(&self) -> AssetId {
        self.highlighted
    }

    /// Navigation callback from the host: point the highlight at `id`.
    pub fn set_highlight(&mut self, id: AssetId) {
        self.highlighted = id;
    }

    /// Rescans from the root path, replacing the whole tree. The asset
    /// that occupied the previously highlighted path is re-highlighted if
    /// it still exists; otherwise the highlight falls back to the first
    /// child, so an unrelated mutation never loses navigational context.
    pub fn refresh(&mut self) -> Result<()> {
        let prev_path = self.tree.get(self.highlighted).path.clone();
        let root_path = self.tree.get(self.tree.root()).path.clone();

        self.tree = scan(&root_path, self.sort_by_mtime)?;
        self.highlighted = self
            .tree
            .find_by_path(&prev_path)
            .or_else(|| self.tree.children(self.tree.root()).first().copied())
            .unwrap_or_else(|| self.tree.root());
        Ok(())
    }

    /// Creates a directory next to the current selection (under the root
    /// itself when the root is selected). Name collisions surface as the
    /// underlying IO error.
    pub fn create_playlist(&mut self, name: &str) -> Result<()> {
        let sel = self.highlighted;
        let parent = self.tree.parent(sel).unwrap_or(sel);
        let dir = self.tree.get(parent).path.join(name);

        fs::create_dir(&dir)
            .with_context(|| format!("unable to create playlist {}", dir.display()))?;
        info!("created playlist {}", dir.display());
        self.refresh()
    }

    /// Removes one song from the filesystem. Confirmation is the host's
    /// job; by the time this runs the user has said yes.
    ///
    /// On success the tree is refreshed, playback skips if the deleted
    /// song is the one playing (before the queue is touched), and every
    /// queue entry referencing the song is dropped. On failure nothing
    /// changes.
    pub fn delete_song(&mut self, id: AssetId) -> Result<()> {
        let asset = self.tree.get(id).clone();
        fs::remove_file(&asset.path)
            .with_context(|| format!("unable to delete {}", asset.name))?;
        info!("deleted {}", asset.path.display());
        self.refresh()?;

        if let Some(current) = self.player.current_song() {
            if current.name == asset.name {
                self.player.skip();
            }
        }
        let items = self.queue.items();
        // Back to front so earlier indices stay valid.
        for (i, path) in items.iter().enumerate().rev() {
            if stem_name(path) == asset.name {
                self.queue.delete_item(i);
            }
        }
        Ok(())
    }

    /// Recursively removes a directory and everything in it.
    ///
    /// Queue entries referencing songs inside the subtree are NOT
    /// reconciled here; they go stale until the next queue reload. The
    /// original engine behaves the same way and product guidance is
    /// needed before changing it.
    pub fn delete_playlist(&mut self, id: AssetId) -> Result<()> {
        let asset = self.tree.get(id).clone();
        fs::remove_dir_all(&asset.path)
            .with_context(|| format!("unable to delete {}", asset.name))?;
        info!("deleted playlist {}", asset.path.display());
        self.refresh()
    }

    /// Enqueues every audio child of the selected container (the
    /// selection's siblings when a song is selected), in sibling order,
    /// skipping the currently playing track.
    pub fn add_all_to_queue(&mut self, id: AssetId) {
        let container = self.tree.container_of(id);
        let current = self.player.current_song();

        for &child in self.tree.children(container) {
            let asset = self.tree.get(child);
            if !asset.is_audio_file() {
                continue;
            }
            if current.as_ref().is_some_and(|c| c.name == asset.name) {
                continue;
            }
            self.queue.enqueue(QueueTrack {
                name: asset.name.clone(),
                path: asset.path.clone(),
            });
        }
    }

    /// Builds one asset from a known audio file and attaches it under
    /// `container`. Fails when the file cannot be opened or its tag
    /// cannot be read.
    pub fn add_song_to_playlist(&mut self, path: &Path, container: AssetId) -> Result<AssetId> {
        fs::File::open(path)
            .with_context(|| format!("unable to open {}", path.display()))?;
        let tag = id3::Tag::read_from_path(path)
            .with_context(|| format!("unable to read tag of {}", path.display()))?;
        let length = std::time::Duration::from_millis(u64::from(tag.duration().unwrap_or(0)));

        let asset = Asset {
            name: stem_name(path),
            path: path.to_path_buf(),
            kind: AssetKind::Song,
            length,
        };
        info!("added {} to {}", asset.name, self.tree.get(container).name);
        Ok(self.tree.attach(container, asset))
    }

    /// Renames the highlighted entry. Songs are normalized to the `.mp3`
    /// extension, directories keep none. The queue follows: entries are
    /// rewritten to the new identity, and when the renamed song is the
    /// one playing the queue is spliced so playback continues under the
    /// new name with the loop flag preserved. Directory renames reload
    /// the queue from its persisted form, which re-resolves every entry
    /// against the new paths.
    pub fn rename(&mut self, new_name: &str) -> Result<()> {
        let old = self.tree.get(self.highlighted).clone();
        let dir = old
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let new_path = if old.is_audio_file() {
            dir.join(format!("{new_name}.mp3"))
        } else {
            dir.join(new_name)
        };

        fs::rename(&old.path, &new_path)
            .with_context(|| format!("unable to rename {}", old.name))?;
        info!("renamed {} -> {}", old.path.display(), new_path.display());
        self.refresh()?;
        if let Some(id) = self.tree.find_by_path(&new_path) {
            self.highlighted = id;
        }

        if old.is_audio_file() {
            let old_track = QueueTrack {
                name: old.name.clone(),
                path: old.path.clone(),
            };
            let new_track = QueueTrack {
                name: stem_name(&new_path),
                path: new_path,
            };
            self.queue.rename(&old_track, &new_track)?;

            if !self.player.is_running() {
                return Ok(());
            }
            let playing_old = self
                .player
                .current_song()
                .is_some_and(|c| c.name == old.name);
            if playing_old {
                // Splice: the renamed song plays next, and the enqueue
                // that fed the splice is dropped again in loop mode.
                self.queue.enqueue(new_track.clone());
                self.queue.push_front(new_track);
                self.player.skip();
                if self.queue.is_loop() && !self.queue.is_empty() {
                    self.queue.delete_item(self.queue.len() - 1);
                }
            }
        } else {
            self.queue.save(None)?;
            self.queue.clear();
            self.queue.load(&self.tree)?;
        }
        Ok(())
    }

    /// Puts the highlighted asset into the single-slot clipboard. The
    /// root cannot be yanked.
    pub fn yank(&mut self) -> Result<()> {
        if self.highlighted == self.tree.root() {
            return Err(Error::YankedRoot.into());
        }
        let asset = self.tree.get(self.highlighted).clone();
        info!("yanked {}", asset.name);
        self.yanked = Some(asset);
        Ok(())
    }

    /// Moves the yanked asset into the container of the current
    /// selection. Pasting into the asset's own directory is a silent
    /// no-op (the clipboard is kept). A real move forces a full queue
    /// reload, because persisted entries would otherwise point at the
    /// old location, and advances playback.
    pub fn paste(&mut self) -> Result<()> {
        let yanked = self.yanked.clone().ok_or(Error::NothingYanked)?;
        let src_dir = yanked
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let dest = self.tree.container_of(self.highlighted);
        let dest_dir = self.tree.get(dest).path.clone();
        if src_dir == dest_dir {
            return Ok(());
        }

        let file_name = yanked
            .path
            .file_name()
            .context("yanked asset has no file name")?;
        let new_path = dest_dir.join(file_name);
        fs::rename(&yanked.path, &new_path)
            .with_context(|| format!("unable to paste {}", yanked.name))?;
        info!("pasted {} into {}", yanked.name, dest_dir.display());

        self.refresh()?;
        self.queue.save(None)?;
        self.queue.clear();
        self.queue.load(&self.tree)?;
        self.player.skip();
        self.yanked = None;
        Ok(())
    }

    /// Rebuilds the queue from its persisted form against the live tree.
    pub fn load_queue(&mut self) -> Result<()> {
        self.queue.load(&self.tree)
    }

    /// Resolves a persisted, hash-keyed reference back to a live asset.
    pub fn find_audio_file(&self, hash: u64) -> Result<AssetId, Error> {
        self.tree.find_by_name_hash(hash).ok_or(Error::NoMatchingAudio)
    }

    /// Every asset in the tree, depth-first. Handy for hosts rendering
    /// the panel or reconciling external state.
    pub fn audio_files(&self) -> Vec<AssetId> {
        self.tree.walk().collect()
    }
}
