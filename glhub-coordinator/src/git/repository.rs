//! In-memory bare repository
//!
//! Built once from a set of files: blobs, nested trees and a single
//! "Initial commit" referenced by `refs/heads/main`, with `HEAD` pointing
//! at that branch.

use std::collections::{BTreeMap, HashMap, HashSet};

use glhub_pipeline::FileSource;

use super::object::{Object, ObjectId, ObjectKind};

pub const DEFAULT_BRANCH: &str = "main";
pub const MAIN_REF: &str = "refs/heads/main";

const BLOB_MODE: &str = "100644";
const TREE_MODE: &str = "40000";
const AUTHOR: &str = "gitlabhub <ci@gitlabhub.local>";

#[derive(Debug, Clone)]
pub struct Repository {
    objects: HashMap<ObjectId, Object>,
    refs: BTreeMap<String, ObjectId>,
    /// Target of the symbolic `HEAD` ref
    head: String,
}

/// Entry of a decoded tree object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: String,
    pub name: String,
    pub id: ObjectId,
}

impl TreeEntry {
    pub fn is_tree(&self) -> bool {
        self.mode == TREE_MODE
    }
}

enum Node {
    File(Vec<u8>),
    Dir(BTreeMap<String, Node>),
}

impl Repository {
    /// Build a repository whose single commit contains `files`
    ///
    /// Paths containing `/` are stored in nested trees.
    pub fn from_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<str>,
        C: AsRef<[u8]>,
    {
        let mut root = BTreeMap::new();
        for (path, content) in files {
            insert_file(&mut root, path.as_ref(), content.as_ref().to_vec());
        }

        let mut repo = Repository {
            objects: HashMap::new(),
            refs: BTreeMap::new(),
            head: MAIN_REF.to_string(),
        };

        let tree = repo.write_tree(&root);
        let timestamp = chrono::Utc::now().timestamp();
        let commit = format!(
            "tree {tree}\nauthor {AUTHOR} {timestamp} +0000\ncommitter {AUTHOR} {timestamp} +0000\n\nInitial commit\n"
        );
        let commit_id = repo.insert(ObjectKind::Commit, commit.into_bytes());
        repo.refs.insert(MAIN_REF.to_string(), commit_id);
        repo
    }

    fn insert(&mut self, kind: ObjectKind, data: Vec<u8>) -> ObjectId {
        let id = ObjectId::hash(kind, &data);
        self.objects.entry(id).or_insert(Object { kind, data });
        id
    }

    fn write_tree(&mut self, dir: &BTreeMap<String, Node>) -> ObjectId {
        let mut entries: Vec<(Vec<u8>, &str, &str, ObjectId)> = Vec::with_capacity(dir.len());
        for (name, node) in dir {
            let (mode, id, sort_key) = match node {
                Node::File(content) => (
                    BLOB_MODE,
                    self.insert(ObjectKind::Blob, content.clone()),
                    name.as_bytes().to_vec(),
                ),
                Node::Dir(children) => (
                    TREE_MODE,
                    self.write_tree(children),
                    format!("{}/", name).into_bytes(),
                ),
            };
            entries.push((sort_key, mode, name.as_str(), id));
        }
        // Git orders directories as if their name ended with '/'
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut data = Vec::new();
        for (_, mode, name, id) in entries {
            data.extend_from_slice(mode.as_bytes());
            data.push(b' ');
            data.extend_from_slice(name.as_bytes());
            data.push(0);
            data.extend_from_slice(id.as_bytes());
        }
        self.insert(ObjectKind::Tree, data)
    }

    /// Commit `HEAD` resolves to
    pub fn head_commit(&self) -> Option<ObjectId> {
        self.refs.get(&self.head).copied()
    }

    /// Name of the ref `HEAD` points at
    pub fn head_target(&self) -> &str {
        &self.head
    }

    pub fn refs(&self) -> impl Iterator<Item = (&str, ObjectId)> {
        self.refs.iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn object(&self, id: &ObjectId) -> Option<&Object> {
        self.objects.get(id)
    }

    /// Tree id recorded in a commit
    pub fn commit_tree(&self, commit: &ObjectId) -> Option<ObjectId> {
        let object = self.objects.get(commit)?;
        if object.kind != ObjectKind::Commit {
            return None;
        }
        let text = std::str::from_utf8(&object.data).ok()?;
        let first = text.lines().next()?;
        ObjectId::from_hex(first.strip_prefix("tree ")?)
    }

    pub fn tree_entries(&self, tree: &ObjectId) -> Option<Vec<TreeEntry>> {
        let object = self.objects.get(tree)?;
        if object.kind != ObjectKind::Tree {
            return None;
        }
        parse_tree(&object.data)
    }

    /// Read a file from the `HEAD` commit
    ///
    /// Walks the tree one path segment at a time, then falls back to a root
    /// entry named after the whole path.
    pub fn read_file(&self, path: &str) -> Option<&[u8]> {
        let path = path.trim_start_matches('/');
        let root = self.commit_tree(&self.head_commit()?)?;

        self.walk(&root, path)
            .or_else(|| self.lookup_entry(&root, path))
            .and_then(|id| self.objects.get(&id))
            .filter(|object| object.kind == ObjectKind::Blob)
            .map(|object| object.data.as_slice())
    }

    fn walk(&self, root: &ObjectId, path: &str) -> Option<ObjectId> {
        let mut current = *root;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = self.lookup_entry(&current, segment)?;
        }
        Some(current)
    }

    fn lookup_entry(&self, tree: &ObjectId, name: &str) -> Option<ObjectId> {
        self.tree_entries(tree)?
            .into_iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.id)
    }

    /// Every object reachable from `tips`, commits first
    pub fn reachable(&self, tips: &[ObjectId]) -> Vec<ObjectId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for tip in tips {
            self.collect(*tip, &mut seen, &mut out);
        }
        out
    }

    fn collect(&self, id: ObjectId, seen: &mut HashSet<ObjectId>, out: &mut Vec<ObjectId>) {
        if !seen.insert(id) {
            return;
        }
        let Some(object) = self.objects.get(&id) else {
            return;
        };
        out.push(id);
        match object.kind {
            ObjectKind::Commit => {
                if let Some(tree) = self.commit_tree(&id) {
                    self.collect(tree, seen, out);
                }
            }
            ObjectKind::Tree => {
                for entry in parse_tree(&object.data).unwrap_or_default() {
                    self.collect(entry.id, seen, out);
                }
            }
            ObjectKind::Blob => {}
        }
    }
}

impl FileSource for Repository {
    fn read_file(&self, path: &str) -> Option<Vec<u8>> {
        Repository::read_file(self, path).map(<[u8]>::to_vec)
    }
}

fn insert_file(root: &mut BTreeMap<String, Node>, path: &str, content: Vec<u8>) {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let Some((file_name, dirs)) = segments.split_last() else {
        return;
    };

    let mut dir = root;
    for segment in dirs {
        let node = dir
            .entry(segment.to_string())
            .or_insert_with(|| Node::Dir(BTreeMap::new()));
        if let Node::File(_) = node {
            *node = Node::Dir(BTreeMap::new());
        }
        let Node::Dir(children) = node else {
            return;
        };
        dir = children;
    }
    dir.insert(file_name.to_string(), Node::File(content));
}

fn parse_tree(data: &[u8]) -> Option<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let space = rest.iter().position(|b| *b == b' ')?;
        let nul = rest.iter().position(|b| *b == 0)?;
        if nul < space || rest.len() < nul + 21 {
            return None;
        }
        entries.push(TreeEntry {
            mode: String::from_utf8(rest[..space].to_vec()).ok()?,
            name: String::from_utf8(rest[space + 1..nul].to_vec()).ok()?,
            id: ObjectId::from_slice(&rest[nul + 1..nul + 21])?,
        });
        rest = &rest[nul + 21..];
    }
    Some(entries)
}
