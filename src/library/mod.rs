pub mod scanner;

pub use scanner::scan;

use std::path::{Path, PathBuf};
use std::time::Duration;

use xxhash_rust::xxh64::xxh64;

/// Stable handle into an [`AssetTree`]. UI layers hold ids and ask the
/// tree for data; no widget types leak into the domain model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Playable audio file. Always a leaf.
    Song,
    /// Directory that can hold child assets. Never enqueued directly.
    Directory,
}

/// One entry in the scanned music hierarchy.
#[derive(Debug, Clone)]
pub struct Asset {
    /// Display name: the file stem, without any extension.
    pub name: String,
    /// Absolute, symlink-resolved path. Resolvable at creation time;
    /// goes stale if the entry is removed behind our back.
    pub path: PathBuf,
    pub kind: AssetKind,
    /// Tag duration. Zero for directories and for unreadable tags.
    pub length: Duration,
}

impl Asset {
    pub fn is_audio_file(&self) -> bool {
        self.kind == AssetKind::Song
    }
}

struct AssetNode {
    asset: Asset,
    parent: Option<AssetId>,
    children: Vec<AssetId>,
}

/// Arena-backed tree of assets. Assets are created in bulk by a scan and
/// discarded in bulk when the tree is replaced; there is no individual
/// deletion path.
pub struct AssetTree {
    nodes: Vec<AssetNode>,
    root: AssetId,
}

impl AssetTree {
    /// Creates a tree holding only the root container.
    pub fn new(root_path: PathBuf) -> Self {
        let root = Asset {
            name: stem_name(&root_path),
            path: root_path,
            kind: AssetKind::Directory,
            length: Duration::ZERO,
        };
        AssetTree {
            nodes: vec![AssetNode {
                asset: root,
                parent: None,
                children: Vec::new(),
            }],
            root: AssetId(0),
        }
    }

    pub fn root(&self) -> AssetId {
        self.root
    }

    pub fn get(&self, id: AssetId) -> &Asset {
        &self.nodes[id.0].asset
    }

    /// Checked variant of [`get`](AssetTree::get). A refresh replaces the
    /// whole arena, so an id a host held across one may no longer exist;
    /// this is the lookup for such ids.
    pub fn try_get(&self, id: AssetId) -> Option<&Asset> {
        self.nodes.get(id.0).map(|node| &node.asset)
    }

    pub fn parent(&self, id: AssetId) -> Option<AssetId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: AssetId) -> &[AssetId] {
        &self.nodes[id.0].children
    }

    /// Attaches `asset` as the last child of `parent` and returns its id.
    pub fn attach(&mut self, parent: AssetId, asset: Asset) -> AssetId {
        let id = AssetId(self.nodes.len());
        self.nodes.push(AssetNode {
            asset,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// The directory an asset lives in: a song's parent, a directory
    /// itself. The root is its own container.
    pub fn container_of(&self, id: AssetId) -> AssetId {
        match self.get(id).kind {
            AssetKind::Directory => id,
            AssetKind::Song => self.parent(id).unwrap_or(self.root),
        }
    }

    /// Depth-first preorder walk over the whole tree, root included.
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            tree: self,
            stack: vec![self.root],
        }
    }

    pub fn find_by_path(&self, path: &Path) -> Option<AssetId> {
        self.walk().find(|&id| self.get(id).path == path)
    }

    /// First asset (depth-first) whose hashed name equals `hash`.
    /// Resolves externally-persisted references back to live assets; the
    /// hash is name-derived so persisted state survives directory moves.
    pub fn find_by_name_hash(&self, hash: u64) -> Option<AssetId> {
        self.walk().find(|&id| name_hash(&self.get(id).name) == hash)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

pub struct Walk<'a> {
    tree: &'a AssetTree,
    stack: Vec<AssetId>,
}

impl Iterator for Walk<'_> {
    type Item = AssetId;

    fn next(&mut self) -> Option<AssetId> {
        let id = self.stack.pop()?;
        // Push children reversed so the leftmost sibling pops first.
        self.stack
            .extend(self.tree.children(id).iter().rev().copied());
        Some(id)
    }
}

/// Sanitized display name of a filesystem entry: the stem, no extension.
pub fn stem_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Name-addressed digest used by persisted queue references.
pub fn name_hash(name: &str) -> u64 {
    xxh64(name.as_bytes(), 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(name: &str) -> Asset {
        Asset {
            name: name.to_string(),
            path: PathBuf::from(format!("/music/{name}.mp3")),
            kind: AssetKind::Song,
            length: Duration::from_secs(180),
        }
    }

    fn dir(name: &str) -> Asset {
        Asset {
            name: name.to_string(),
            path: PathBuf::from(format!("/music/{name}")),
            kind: AssetKind::Directory,
            length: Duration::ZERO,
        }
    }

    #[test]
    fn walk_is_depth_first_preorder() {
        let mut tree = AssetTree::new(PathBuf::from("/music"));
        let root = tree.root();
        let a = tree.attach(root, dir("a"));
        tree.attach(a, song("a1"));
        tree.attach(root, song("b"));

        let names: Vec<&str> = tree
            .walk()
            .map(|id| tree.get(id).name.as_str())
            .collect();
        assert_eq!(names, ["music", "a", "a1", "b"]);
    }

    #[test]
    fn container_of_song_is_its_parent() {
        let mut tree = AssetTree::new(PathBuf::from("/music"));
        let root = tree.root();
        let d = tree.attach(root, dir("a"));
        let s = tree.attach(d, song("a1"));

        assert_eq!(tree.container_of(s), d);
        assert_eq!(tree.container_of(d), d);
        assert_eq!(tree.container_of(root), root);
    }

    #[test]
    fn name_hash_lookup_finds_first_match() {
        let mut tree = AssetTree::new(PathBuf::from("/music"));
        let root = tree.root();
        let s = tree.attach(root, song("tune"));

        assert_eq!(tree.find_by_name_hash(name_hash("tune")), Some(s));
        assert_eq!(tree.find_by_name_hash(name_hash("absent")), None);
    }

    #[test]
    fn try_get_rejects_ids_from_a_previous_tree() {
        let mut big = AssetTree::new(PathBuf::from("/music"));
        let root = big.root();
        big.attach(root, song("a"));
        let stale = big.attach(root, song("b"));

        // The rescan found fewer entries; the retained id is now dangling.
        let small = AssetTree::new(PathBuf::from("/music"));
        assert!(small.try_get(stale).is_none());
        assert_eq!(small.try_get(small.root()).map(|a| a.name.as_str()), Some("music"));
        assert_eq!(big.try_get(stale).map(|a| a.name.as_str()), Some("b"));
    }

    #[test]
    fn stem_name_drops_extension() {
        assert_eq!(stem_name(Path::new("/a/b/song.mp3")), "song");
        assert_eq!(stem_name(Path::new("/a/b/dir")), "dir");
    }
}
