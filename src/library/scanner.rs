use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use id3::TagLike;
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

use super::{stem_name, Asset, AssetId, AssetKind, AssetTree};

/// Recursively scans `root` into a fully materialized [`AssetTree`].
///
/// Entries are classified by byte content, not extension: regular files
/// that do not hold MPEG audio are skipped, as are entries whose symlink
/// cannot be resolved. With `sort_by_mtime` siblings are ordered most
/// recently modified first; otherwise alphabetically by file name.
///
/// Failure to read `root` itself is fatal to the call. Everything below
/// that is a silent classification skip.
pub fn scan(root: &Path, sort_by_mtime: bool) -> Result<AssetTree> {
    let root = fs::canonicalize(root)
        .with_context(|| format!("unable to find music directory {}", root.display()))?;
    fs::read_dir(&root)
        .with_context(|| format!("unable to read music directory {}", root.display()))?;

    let mut walker = WalkDir::new(&root).follow_links(true);
    if sort_by_mtime {
        walker = walker.sort_by(|a, b| modified(b).cmp(&modified(a)));
    } else {
        walker = walker.sort_by_file_name();
    }

    let mut tree = AssetTree::new(root);
    // parents[d] holds the container at depth d of the current branch.
    let mut parents: Vec<AssetId> = vec![tree.root()];

    for entry in walker.into_iter().filter_map(Result::ok) {
        let depth = entry.depth();
        if depth == 0 {
            continue;
        }
        parents.truncate(depth);
        let Some(&parent) = parents.get(depth - 1) else {
            // Container was skipped; its subtree is unreachable.
            continue;
        };

        let Ok(path) = fs::canonicalize(entry.path()) else {
            continue;
        };
        let name = stem_name(entry.path());

        if entry.file_type().is_dir() {
            let id = tree.attach(
                parent,
                Asset {
                    name,
                    path,
                    kind: AssetKind::Directory,
                    length: Duration::ZERO,
                },
            );
            parents.push(id);
        } else if entry.file_type().is_file() {
            if !is_mpeg_content(&path) {
                continue;
            }
            let length = tag_length(&path);
            tree.attach(
                parent,
                Asset {
                    name,
                    path,
                    kind: AssetKind::Song,
                    length,
                },
            );
        }
    }

    Ok(tree)
}

fn modified(entry: &DirEntry) -> SystemTime {
    entry
        .metadata()
        .ok()
        .and_then(|m| m.modified().ok())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Sniffs the leading bytes for an ID3 preamble or an MPEG frame sync.
fn is_mpeg_content(path: &Path) -> bool {
    let Ok(mut file) = fs::File::open(path) else {
        return false;
    };
    let mut magic = [0u8; 3];
    if file.read_exact(&mut magic).is_err() {
        return false;
    }
    &magic == b"ID3" || (magic[0] == 0xFF && magic[1] & 0xE0 == 0xE0)
}

/// Tag duration in milliseconds, zero when absent or unreadable.
fn tag_length(path: &Path) -> Duration {
    match id3::Tag::read_from_path(path) {
        Ok(tag) => Duration::from_millis(u64::from(tag.duration().unwrap_or(0))),
        Err(err) => {
            warn!("unable to read tag of {}: {}", path.display(), err);
            Duration::ZERO
        }
    }
}

/// Enough of an ID3v2 header to pass content sniffing in tests.
#[cfg(test)]
pub(crate) const FAKE_MP3: &[u8] = b"ID3\x04\x00\x00\x00\x00\x00\x00fake audio payload";

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn names(tree: &AssetTree) -> Vec<String> {
        tree.walk().map(|id| tree.get(id).name.clone()).collect()
    }

    #[test]
    fn scan_keeps_audio_and_skips_non_audio_content() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.mp3"), FAKE_MP3).unwrap();
        fs::write(dir.path().join("notes.txt"), b"plain text").unwrap();
        // Extension lies; content decides.
        fs::write(dir.path().join("fake.mp3"), b"not audio at all").unwrap();

        let tree = scan(dir.path(), false).unwrap();

        let songs: Vec<_> = tree
            .walk()
            .filter(|&id| tree.get(id).is_audio_file())
            .map(|id| tree.get(id).name.clone())
            .collect();
        assert_eq!(songs, ["a"]);
    }

    #[test]
    fn scan_builds_the_directory_hierarchy() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("album");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("track.mp3"), FAKE_MP3).unwrap();
        fs::write(dir.path().join("loose.mp3"), FAKE_MP3).unwrap();

        let tree = scan(dir.path(), false).unwrap();

        let album = tree.find_by_path(&fs::canonicalize(&sub).unwrap()).unwrap();
        assert!(!tree.get(album).is_audio_file());
        assert_eq!(tree.children(album).len(), 1);
        let track = tree.children(album)[0];
        assert!(tree.get(track).is_audio_file());
        assert_eq!(tree.parent(track), Some(album));
    }

    #[test]
    fn scan_is_idempotent_without_filesystem_change() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("album");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("one.mp3"), FAKE_MP3).unwrap();
        fs::write(dir.path().join("two.mp3"), FAKE_MP3).unwrap();

        let first = scan(dir.path(), false).unwrap();
        let second = scan(dir.path(), false).unwrap();

        assert_eq!(names(&first), names(&second));
        assert_eq!(first.len(), second.len());
    }

    #[test]
    fn audio_assets_are_songs_with_nonnegative_length() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.mp3"), FAKE_MP3).unwrap();

        let tree = scan(dir.path(), false).unwrap();
        for id in tree.walk() {
            let asset = tree.get(id);
            match asset.kind {
                AssetKind::Song => assert!(asset.length >= Duration::ZERO),
                AssetKind::Directory => assert_eq!(asset.length, Duration::ZERO),
            }
        }
    }

    #[test]
    fn sort_by_mtime_orders_most_recent_first() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("older.mp3"), FAKE_MP3).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        fs::write(dir.path().join("newer.mp3"), FAKE_MP3).unwrap();

        let tree = scan(dir.path(), true).unwrap();
        let children: Vec<_> = tree
            .children(tree.root())
            .iter()
            .map(|&id| tree.get(id).name.clone())
            .collect();
        assert_eq!(children, ["newer", "older"]);
    }

    #[test]
    fn default_sibling_order_is_alphabetical() {
        let dir = tempdir().unwrap();
        // Created out of order on purpose.
        fs::write(dir.path().join("zeta.mp3"), FAKE_MP3).unwrap();
        fs::write(dir.path().join("mid.mp3"), FAKE_MP3).unwrap();
        fs::write(dir.path().join("alpha.mp3"), FAKE_MP3).unwrap();

        let tree = scan(dir.path(), false).unwrap();
        let children: Vec<_> = tree
            .children(tree.root())
            .iter()
            .map(|&id| tree.get(id).name.clone())
            .collect();
        assert_eq!(children, ["alpha", "mid", "zeta"]);
    }

    #[test]
    fn tag_duration_is_read_into_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("timed.mp3");
        fs::write(&path, b"\xFF\xFBaudio frames").unwrap();
        let mut tag = id3::Tag::new();
        tag.set_duration(123_000);
        tag.write_to_path(&path, id3::Version::Id3v24).unwrap();

        let tree = scan(dir.path(), false).unwrap();
        let song = tree.children(tree.root())[0];
        assert_eq!(tree.get(song).length, Duration::from_millis(123_000));
    }

    #[test]
    fn scan_of_missing_root_is_fatal() {
        assert!(scan(Path::new("/nonexistent/quaver-music"), false).is_err());
    }

    #[test]
    fn broken_symlink_is_skipped_silently() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.mp3"), FAKE_MP3).unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("gone.mp3"),
            dir.path().join("dangling.mp3"),
        )
        .unwrap();

        let tree = scan(dir.path(), false).unwrap();
        assert_eq!(names(&tree)[1..], ["a".to_string()]);
    }
}
