//! File tree materialization.
//!
//! Workspaces store files as flat, path-addressed records. [`materialize`]
//! rebuilds the hierarchical view, synthesizing a directory node for every
//! distinct ancestor path. Directory nodes have no backing record: they are
//! identified by their full path within one call, their fingerprint is derived
//! from that path, and their modification time is the latest of everything
//! beneath them.

use crate::error::Result;
use crate::lookup;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use time::OffsetDateTime;
use wsync_store::Repository;
use wsync_store::models::FileRecord;

const SEPARATOR: char = '/';

/// A node of the materialized tree. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileTreeNode {
    /// Last path segment.
    pub name: String,
    /// Absolute path within the workspace, with a leading separator.
    pub path: String,
    /// Zero for directories.
    pub size: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub modified: OffsetDateTime,
    /// The record's fingerprint for files, `dir-<path>` for directories.
    pub fingerprint: String,
    pub is_directory: bool,
    pub children: Vec<FileTreeNode>,
}
impl FileTreeNode {
    fn directory(name: &str, path: &str, modified: OffsetDateTime) -> Self {
        Self {
            name: name.to_string(),
            path: format!("{SEPARATOR}{path}"),
            size: 0,
            modified,
            fingerprint: format!("dir-{path}"),
            is_directory: true,
            children: Vec::new(),
        }
    }

    fn file(name: &str, path: &str, record: &FileRecord) -> Self {
        Self {
            name: name.to_string(),
            path: format!("{SEPARATOR}{path}"),
            size: record.size,
            modified: record.updated_at,
            fingerprint: record.fingerprint.clone(),
            is_directory: false,
            children: Vec::new(),
        }
    }

    /// Depth-first iterator over this node and all of its descendants.
    pub fn walk(&self) -> impl Iterator<Item = &FileTreeNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

/// Directories first, then by name; the path breaks ties between a file and
/// a directory sharing a name.
fn display_order(a: &FileTreeNode, b: &FileTreeNode) -> Ordering {
    b.is_directory.cmp(&a.is_directory).then_with(|| a.name.cmp(&b.name)).then_with(|| a.path.cmp(&b.path))
}

/// Arena of nodes under construction, children referenced by index.
#[derive(Default)]
struct Builder {
    nodes: Vec<(FileTreeNode, Vec<usize>)>,
    roots: Vec<usize>,
    directories: HashMap<String, usize>,
}
impl Builder {
    fn attach(&mut self, parent: Option<usize>, node: FileTreeNode) -> usize {
        let index = self.nodes.len();
        self.nodes.push((node, Vec::new()));
        match parent {
            Some(parent) => self.nodes[parent].1.push(index),
            None => self.roots.push(index),
        }
        index
    }

    fn insert(&mut self, record: &FileRecord) {
        let segments: Vec<&str> = record.path.split(SEPARATOR).filter(|s| !s.is_empty()).collect();
        let Some((file_name, ancestors)) = segments.split_last() else {
            // Nothing left after dropping empty segments: keep the record as a
            // root-level file named after whatever it was stored as.
            let node = FileTreeNode::file(&record.path, record.path.trim_start_matches(SEPARATOR), record);
            self.attach(None, node);
            return;
        };

        let mut parent = None;
        let mut current = String::new();
        for segment in ancestors {
            if !current.is_empty() {
                current.push(SEPARATOR);
            }
            current.push_str(segment);
            let index = match self.directories.get(&current) {
                Some(&index) => {
                    let modified = &mut self.nodes[index].0.modified;
                    *modified = (*modified).max(record.updated_at);
                    index
                },
                None => {
                    let index = self.attach(parent, FileTreeNode::directory(segment, &current, record.updated_at));
                    self.directories.insert(current.clone(), index);
                    index
                },
            };
            parent = Some(index);
        }

        let path = segments.join("/");
        self.attach(parent, FileTreeNode::file(file_name, &path, record));
    }

    fn build(mut self) -> Vec<FileTreeNode> {
        let roots = std::mem::take(&mut self.roots);
        let mut slots: Vec<Option<(FileTreeNode, Vec<usize>)>> = self.nodes.into_iter().map(Some).collect();
        let mut forest: Vec<FileTreeNode> = roots.into_iter().filter_map(|index| Self::take(&mut slots, index)).collect();
        forest.sort_by(display_order);
        forest
    }

    fn take(slots: &mut [Option<(FileTreeNode, Vec<usize>)>], index: usize) -> Option<FileTreeNode> {
        let (mut node, children) = slots.get_mut(index)?.take()?;
        node.children = children.into_iter().filter_map(|child| Self::take(slots, child)).collect();
        node.children.sort_by(display_order);
        Some(node)
    }
}

/// Rebuild the directory hierarchy of a flat set of file records.
///
/// Input order does not matter: the same records in any order produce the
/// same forest, down to child ordering. Paths are split on `/` with empty
/// segments dropped, so stray leading, trailing or doubled separators are
/// tolerated rather than rejected.
pub fn materialize<'a>(records: impl IntoIterator<Item = &'a FileRecord>) -> Vec<FileTreeNode> {
    let mut builder = Builder::default();
    for record in records {
        builder.insert(record);
    }
    builder.build()
}

/// Materialize the current file tree of a workspace.
///
/// Fails with [`NotFound`](crate::error::ErrorKind::NotFound) if the
/// workspace does not exist.
#[tracing::instrument(skip(repo))]
pub async fn get_file_tree(repo: &Repository, workspace_id: i64) -> Result<Vec<FileTreeNode>> {
    lookup(repo.get_workspace(workspace_id).await)?;
    let records = lookup(repo.list_records(workspace_id).await)?;
    tracing::debug!(records = records.len(), "materializing file tree");
    Ok(materialize(&records))
}
