//! Plain-text rendering of command results.

use std::fmt::Write;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use wsync_library::FileTreeNode;
use wsync_store::models::{RecordStatus, SyncTask, SyncTaskRecord, TaskPage};

fn timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc3339).unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Render a forest with box-drawing guides, one node per line.
pub fn tree(forest: &[FileTreeNode]) -> String {
    let mut out = String::new();
    for node in forest {
        branch(&mut out, node, "", None);
    }
    out
}

fn branch(out: &mut String, node: &FileTreeNode, prefix: &str, last: Option<bool>) {
    let (guide, indent) = match last {
        None => ("", ""),
        Some(true) => ("└── ", "    "),
        Some(false) => ("├── ", "│   "),
    };
    if node.is_directory {
        let _ = writeln!(out, "{prefix}{guide}{}/", node.name);
    } else {
        let _ = writeln!(out, "{prefix}{guide}{} ({} bytes)", node.name, node.size);
    }
    let prefix = format!("{prefix}{indent}");
    let count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        branch(out, child, &prefix, Some(i + 1 == count));
    }
}

pub fn outcome(record: &SyncTaskRecord) -> String {
    match (record.status, record.error_message.as_deref()) {
        (RecordStatus::Success, _) => format!("  ok      {}", record.path),
        (RecordStatus::Failed, reason) => {
            format!("  failed  {}: {}", record.path, reason.unwrap_or("unknown error"))
        },
    }
}

pub fn summary(task: &SyncTask) -> String {
    format!(
        "task {} {}: {} of {} files failed",
        task.id, task.status, task.failed_files, task.total_files
    )
}

pub fn tasks(page: &TaskPage) -> String {
    let mut out = String::new();
    for task in &page.items {
        let _ = writeln!(
            out,
            "{:>6}  {:<15}  {:<4}  {:>3}/{:<3}  workspace {}  {}",
            task.id,
            task.status.as_str(),
            task.environment.as_str(),
            task.failed_files,
            task.total_files,
            task.workspace_id,
            timestamp(task.created_at),
        );
    }
    let _ = writeln!(out, "{} of {} tasks", page.items.len(), page.total);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use wsync_store::models::{Environment, TaskStatus};

    fn node(name: &str, size: u64, children: Vec<FileTreeNode>) -> FileTreeNode {
        FileTreeNode {
            name: name.to_string(),
            path: format!("/{name}"),
            size,
            modified: OffsetDateTime::UNIX_EPOCH,
            fingerprint: String::new(),
            is_directory: !children.is_empty(),
            children,
        }
    }

    fn task(status: TaskStatus, failed: u64) -> SyncTask {
        SyncTask {
            id: 7,
            workspace_id: 1,
            creator_id: 1,
            environment: Environment::Prod,
            status,
            total_files: 3,
            failed_files: failed,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_tree() {
        let forest = vec![
            node("a", 0, vec![node("b", 0, vec![node("c.txt", 3, vec![])]), node("d.txt", 5, vec![])]),
            node("e.txt", 1, vec![]),
        ];
        let expected = "\
a/
├── b/
│   └── c.txt (3 bytes)
└── d.txt (5 bytes)
e.txt (1 bytes)
";
        assert_eq!(tree(&forest), expected);
    }

    #[test]
    fn test_empty_tree() {
        assert_eq!(tree(&[]), "");
    }

    #[rstest]
    #[case(RecordStatus::Success, None, "  ok      /a.txt")]
    #[case(RecordStatus::Failed, Some("denied"), "  failed  /a.txt: denied")]
    #[case(RecordStatus::Failed, None, "  failed  /a.txt: unknown error")]
    fn test_outcome(#[case] status: RecordStatus, #[case] error: Option<&str>, #[case] expected: &str) {
        let record = SyncTaskRecord {
            id: 1,
            task_id: 7,
            path: "/a.txt".to_string(),
            name: "a.txt".to_string(),
            size: 1,
            fingerprint: "fp".to_string(),
            last_modified: OffsetDateTime::UNIX_EPOCH,
            modifier_id: 1,
            status,
            error_message: error.map(str::to_string),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        };
        assert_eq!(outcome(&record), expected);
    }

    #[test]
    fn test_summary() {
        let summary = summary(&task(TaskStatus::PartialSuccess, 1));
        assert_eq!(summary, format!("task 7 {}: 1 of 3 files failed", TaskStatus::PartialSuccess));
    }

    #[test]
    fn test_tasks_footer() {
        let page = TaskPage { total: 12, items: vec![task(TaskStatus::Failed, 3)] };
        let out = tasks(&page);
        assert_eq!(out.lines().count(), 2);
        assert!(out.lines().next().unwrap().contains("1970-01-01T00:00:00Z"));
        assert!(out.ends_with("1 of 12 tasks\n"));
    }
}
