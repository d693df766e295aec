use std::sync::Arc;
use std::path::Path;
use std::{fs, fmt};

use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::util::{is_hidden, split_extension};

#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct EntryId(pub(crate) usize);

/// An in-memory snapshot of a directory tree.
///
/// Hidden entries (leading `.`) are skipped along with everything beneath
/// them. Siblings are ordered by file name, so every traversal is
/// deterministic.
#[derive(Debug)]
pub struct FsTree {
    entries: Vec<Entry>,
    map: FxHashMap<Arc<Path>, EntryId>,
}

#[derive(Debug)]
pub struct Entry {
    pub id: EntryId,
    pub path: Arc<Path>,
    pub metadata: fs::Metadata,
    pub file_name: String,
    pub parent: Option<EntryId>,
    pub children: Vec<EntryId>,
    pub depth: usize,
}

#[derive(Default, Debug)]
struct FsMetadata(Option<fs::Metadata>);

impl FsTree {
    fn new() -> Self {
        Self {
            map: FxHashMap::default(),
            entries: vec![],
        }
    }

    pub fn build<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::walk(root.as_ref(), false)
    }

    /// Like [`FsTree::build()`], but keeps hidden entries.
    pub fn build_with_hidden<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::walk(root.as_ref(), true)
    }

    fn walk(root: &Path, keep_hidden: bool) -> Result<Self> {
        use jwalk::{Parallelism, WalkDirGeneric};

        let mut walker = WalkDirGeneric::<FsMetadata>::new(root)
            .follow_links(true)
            .sort(true)
            .process_read_dir(move |depth, _, _, entries| {
                // The root itself is visited with no depth; only hide below it.
                if depth.is_some() && !keep_hidden {
                    entries.retain(|e| match e {
                        Ok(e) => !is_hidden(&e.file_name.to_string_lossy()),
                        Err(_) => true,
                    });
                }

                entries.iter_mut()
                    .filter_map(|e| e.as_mut().ok())
                    .for_each(|e| e.client_state = FsMetadata(e.metadata().ok()))
            });

        // jwalk waits on jobs it queues in the global pool, which deadlocks a
        // worker of that same pool when it has few threads.
        if rayon::current_thread_index().is_some() {
            walker = walker.parallelism(Parallelism::Serial);
        }

        let mut tree: FsTree = FsTree::new();
        for entry in walker {
            let entry = entry.map_err(|e| error! {
                "failed to walk directory",
                "root" => root.display(),
                "reason" => e,
            })?;

            if entry.depth == 0 || entry.client_state.0.is_some() {
                tree.insert(entry)?;
            }
        }

        Ok(tree)
    }

    pub fn root(&self) -> &Entry {
        &self[self.root_id()]
    }

    pub fn root_id(&self) -> EntryId {
        EntryId(0)
    }

    pub fn iter_depth_first(&self, root: EntryId) -> Dfs<'_> {
        Dfs {
            tree: self,
            stack: vec![root],
        }
    }

    fn insert(&mut self, entry: jwalk::DirEntry<FsMetadata>) -> Result<EntryId> {
        let path = entry.path();
        let metadata = match entry.client_state.0 {
            Some(metadata) => metadata,
            None => fs::metadata(&path)?,
        };

        let entry = Entry {
            id: EntryId(self.entries.len()),
            path: Arc::from(path.into_boxed_path()),
            metadata,
            file_name: entry.file_name.to_string_lossy().into_owned(),
            parent: self.map.get(&*entry.parent_path).cloned(),
            children: vec![],
            depth: entry.depth,
        };

        self.map.insert(entry.path.clone(), entry.id);
        if let Some(parent) = entry.parent {
            self.entries[parent.0].children.push(entry.id);
        }

        let id = entry.id;
        self.entries.push(entry);
        Ok(id)
    }
}

impl Entry {
    /// File name without the last extension.
    pub fn file_stem(&self) -> &str {
        split_extension(&self.file_name).0
    }

    /// The last extension, if any.
    pub fn file_ext(&self) -> Option<&str> {
        split_extension(&self.file_name).1
    }

    pub fn is_dir(&self) -> bool {
        self.metadata.is_dir()
    }

    pub fn is_file(&self) -> bool {
        self.metadata.is_file()
    }

    /// Path relative to the root tree of `self`.
    pub fn relative_path(&self) -> &Path {
        let mut components = self.path.components();
        for _ in 0..(self.path.components().count() - self.depth) {
            components.next();
        }

        components.as_path()
    }
}

/// Pre-order traversal. Children are yielded in file-name order.
pub struct Dfs<'a> {
    tree: &'a FsTree,
    stack: Vec<EntryId>,
}

impl<'a> Dfs<'a> {
    #[inline]
    pub fn files(self) -> impl Iterator<Item = &'a Entry> {
        let tree = self.tree;
        self.into_iter().map(move |id| &tree[id]).filter(|e| e.is_file())
    }
}

impl Iterator for Dfs<'_> {
    type Item = EntryId;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(self.tree[node].children.iter().rev());

        Some(node)
    }
}

impl jwalk::ClientState for FsMetadata {
    type ReadDirState = ();
    type DirEntryState = Self;
}

impl std::ops::Index<EntryId> for FsTree {
    type Output = Entry;

    fn index(&self, index: EntryId) -> &Self::Output {
        &self.entries[index.0]
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::FsTree;

    #[test]
    fn skips_hidden_and_orders_by_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/.git")).unwrap();
        fs::write(dir.path().join("b/.git/HEAD"), "ref").unwrap();
        fs::write(dir.path().join("c.txt"), "c").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join(".hidden"), "h").unwrap();
        fs::write(dir.path().join("b/z.txt"), "z").unwrap();

        let tree = FsTree::build(dir.path()).unwrap();
        let files: Vec<_> = tree.iter_depth_first(tree.root_id())
            .files()
            .map(|e| e.relative_path().to_path_buf())
            .collect();

        assert_eq!(files, vec![
            Path::new("a.txt").to_path_buf(),
            Path::new("b/z.txt").to_path_buf(),
            Path::new("c.txt").to_path_buf(),
        ]);
    }

    #[test]
    fn stems_and_extensions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("process.csv.lua"), "").unwrap();

        let tree = FsTree::build(dir.path()).unwrap();
        let entry = tree.iter_depth_first(tree.root_id()).files().next().unwrap();
        assert_eq!(entry.file_stem(), "process.csv");
        assert_eq!(entry.file_ext(), Some("lua"));
        assert_eq!(tree.root().children.len(), 1);
    }

    #[test]
    fn hidden_entries_can_be_kept() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".well-known")).unwrap();
        fs::write(dir.path().join(".well-known/security.txt"), "x").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();

        let tree = FsTree::build_with_hidden(dir.path()).unwrap();
        let files: Vec<_> = tree.iter_depth_first(tree.root_id())
            .files()
            .map(|e| e.relative_path().to_path_buf())
            .collect();

        assert_eq!(files, vec![
            Path::new(".well-known/security.txt").to_path_buf(),
            Path::new("a.txt").to_path_buf(),
        ]);
    }

    #[test]
    fn walks_from_inside_a_single_thread_pool() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/c.txt"), "c").unwrap();

        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let (left, right) = pool.install(|| rayon::join(
            || FsTree::build(dir.path()).map(|t| t.iter_depth_first(t.root_id()).files().count()),
            || FsTree::build(dir.path().join("a")).map(|t| t.root().children.len()),
        ));

        assert_eq!(left.unwrap(), 1);
        assert_eq!(right.unwrap(), 1);
    }
}
