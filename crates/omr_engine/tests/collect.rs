use std::collections::VecDeque;
use std::fs;
use std::time::Duration;

use omr_core::FileEntry;
use omr_engine::{
    CollectError, CollectSettings, DirectoryReader, Entry, FsDirectory, TreeCollector,
};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

#[derive(Debug, Clone)]
enum Node {
    File(String),
    /// A child whose type could not be determined.
    Unreadable(String),
    Dir {
        name: String,
        children: Vec<Node>,
        behavior: Behavior,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Behavior {
    Normal,
    /// Returns one chunk, then fails.
    FailAfterFirstChunk,
    FailImmediately,
    /// Never resolves.
    Stall,
}

fn dir(name: &str, children: Vec<Node>) -> Node {
    Node::Dir {
        name: name.to_string(),
        children,
        behavior: Behavior::Normal,
    }
}

fn file(name: &str) -> Node {
    Node::File(name.to_string())
}

/// A directory whose reads follow a script: fixed chunk size, optional random
/// latency per read, optional failure or stall.
struct ScriptedDir {
    name: String,
    pending: VecDeque<Node>,
    chunk: usize,
    behavior: Behavior,
    reads: usize,
    rng: Option<StdRng>,
}

impl ScriptedDir {
    fn new(name: String, children: Vec<Node>, behavior: Behavior, chunk: usize) -> Self {
        Self {
            name,
            pending: children.into(),
            chunk,
            behavior,
            reads: 0,
            rng: None,
        }
    }

    fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Some(rng);
        self
    }

    fn into_entry(node: Node, chunk: usize, rng: Option<&mut StdRng>) -> Entry {
        match node {
            Node::File(name) => Entry::File(FileEntry::from_bytes(name, Vec::<u8>::new())),
            Node::Unreadable(name) => Entry::Failed(CollectError::Inspect {
                subtree: name,
                message: "permission denied".to_string(),
            }),
            Node::Dir {
                name,
                children,
                behavior,
            } => {
                let mut dir = ScriptedDir::new(name, children, behavior, chunk);
                if let Some(rng) = rng {
                    dir = dir.with_rng(StdRng::seed_from_u64(rng.random()));
                }
                Entry::Directory(Box::new(dir))
            }
        }
    }

    fn failure(&self) -> CollectError {
        CollectError::Read {
            subtree: self.name.clone(),
            message: "device not ready".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl DirectoryReader for ScriptedDir {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_entries(&mut self) -> Result<Vec<Entry>, CollectError> {
        if let Some(rng) = self.rng.as_mut() {
            let delay = rng.random_range(0..50);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.reads += 1;
        match self.behavior {
            Behavior::Stall => std::future::pending::<()>().await,
            Behavior::FailImmediately => return Err(self.failure()),
            Behavior::FailAfterFirstChunk if self.reads > 1 => return Err(self.failure()),
            _ => {}
        }
        let take = self.chunk.min(self.pending.len());
        let nodes: Vec<Node> = self.pending.drain(..take).collect();
        let chunk = self.chunk;
        let mut rng = self.rng.as_mut();
        Ok(nodes
            .into_iter()
            .map(|node| ScriptedDir::into_entry(node, chunk, rng.as_deref_mut()))
            .collect())
    }
}

fn roots(nodes: Vec<Node>, chunk: usize) -> Vec<Entry> {
    nodes
        .into_iter()
        .map(|node| ScriptedDir::into_entry(node, chunk, None))
        .collect()
}

fn random_roots(nodes: Vec<Node>, chunk: usize, rng: &mut StdRng) -> Vec<Entry> {
    nodes
        .into_iter()
        .map(|node| ScriptedDir::into_entry(node, chunk, Some(&mut *rng)))
        .collect()
}

fn sorted_names(files: &[FileEntry]) -> Vec<String> {
    let mut names: Vec<String> = files.iter().map(|f| f.name().to_string()).collect();
    names.sort();
    names
}

/// Builds a random tree, pushing every leaf name it creates onto `leaves`.
fn random_tree(
    rng: &mut StdRng,
    depth: usize,
    prefix: &str,
    leaves: &mut Vec<String>,
) -> Vec<Node> {
    let count = rng.random_range(0..5);
    let mut nodes = Vec::with_capacity(count);
    for i in 0..count {
        let name = format!("{prefix}{i}");
        if depth > 0 && rng.random_bool(0.4) {
            let children = random_tree(rng, depth - 1, &format!("{name}/"), leaves);
            nodes.push(dir(&name, children));
        } else {
            let leaf = format!("{name}.png");
            leaves.push(leaf.clone());
            nodes.push(Node::File(leaf));
        }
    }
    nodes
}

#[tokio::test]
async fn zero_roots_complete_immediately() {
    let outcome = TreeCollector::default().collect(Vec::new()).await;
    assert!(outcome.files.is_empty());
    assert!(!outcome.is_partial());
}

#[tokio::test]
async fn flattens_nested_directories() {
    let tree = vec![
        file("a.png"),
        dir(
            "scans",
            vec![file("b.png"), dir("inner", vec![file("c.png")]), file("d.png")],
        ),
    ];
    let outcome = TreeCollector::default().collect(roots(tree, 64)).await;
    assert_eq!(sorted_names(&outcome.files), vec!["a.png", "b.png", "c.png", "d.png"]);
    assert!(!outcome.is_partial());
}

#[tokio::test]
async fn empty_directories_count_as_resolved() {
    let tree = vec![
        dir("empty", Vec::new()),
        dir(
            "outer",
            vec![
                dir("also_empty", Vec::new()),
                dir("deep", vec![dir("deeper", Vec::new())]),
            ],
        ),
    ];
    let outcome = TreeCollector::default().collect(roots(tree, 64)).await;
    assert!(outcome.files.is_empty());
    assert!(!outcome.is_partial());
}

#[tokio::test]
async fn directory_is_reread_until_an_empty_chunk() {
    let children: Vec<Node> = (0..7).map(|i| file(&format!("sheet{i}.jpg"))).collect();
    let outcome = TreeCollector::default()
        .collect(roots(vec![dir("big", children)], 2))
        .await;
    assert_eq!(outcome.files.len(), 7);
}

#[tokio::test]
async fn failed_subtree_is_abandoned_and_the_rest_completes() {
    let tree = vec![
        file("ok.png"),
        Node::Dir {
            name: "broken".to_string(),
            children: vec![file("lost.png")],
            behavior: Behavior::FailImmediately,
        },
        dir("fine", vec![file("kept.png")]),
    ];
    let outcome = TreeCollector::default().collect(roots(tree, 64)).await;
    assert_eq!(sorted_names(&outcome.files), vec!["kept.png", "ok.png"]);
    assert!(outcome.is_partial());
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].subtree(), "broken");
}

#[tokio::test]
async fn children_read_before_a_failure_are_kept() {
    let tree = vec![Node::Dir {
        name: "flaky".to_string(),
        children: vec![file("one.png"), file("two.png"), file("three.png")],
        behavior: Behavior::FailAfterFirstChunk,
    }];
    let outcome = TreeCollector::default().collect(roots(tree, 2)).await;
    assert_eq!(sorted_names(&outcome.files), vec!["one.png", "two.png"]);
    assert_eq!(outcome.failures.len(), 1);
}

#[tokio::test]
async fn uninspectable_child_fails_alone() {
    let tree = vec![dir(
        "scans",
        vec![
            file("a.png"),
            Node::Unreadable("scans/locked".to_string()),
            file("b.png"),
            dir("inner", vec![file("c.png")]),
        ],
    )];
    let outcome = TreeCollector::default().collect(roots(tree, 2)).await;
    assert_eq!(sorted_names(&outcome.files), vec!["a.png", "b.png", "c.png"]);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].subtree(), "scans/locked");
}

#[tokio::test(start_paused = true)]
async fn stalled_read_never_completes_the_traversal() {
    let tree = vec![
        file("a.png"),
        Node::Dir {
            name: "stuck".to_string(),
            children: Vec::new(),
            behavior: Behavior::Stall,
        },
    ];
    let collector = TreeCollector::default();
    let result =
        tokio::time::timeout(Duration::from_secs(3600), collector.collect(roots(tree, 64))).await;
    assert!(result.is_err(), "traversal completed while a read was outstanding");
}

#[tokio::test(start_paused = true)]
async fn random_trees_with_random_latency_are_collected_completely() {
    omr_logging::initialize_for_tests();
    for seed in 0..40u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut expected = Vec::new();
        let tree = random_tree(&mut rng, 4, &format!("s{seed}-"), &mut expected);
        let chunk = rng.random_range(1..4);
        let entries = random_roots(tree, chunk, &mut rng);

        let outcome = TreeCollector::default().collect(entries).await;

        expected.sort();
        assert_eq!(sorted_names(&outcome.files), expected, "seed {seed}");
        assert!(!outcome.is_partial());
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_traversals_are_independent() {
    let mut rng = StdRng::seed_from_u64(7);
    let first = random_roots(
        vec![dir("x", vec![file("x1.png"), dir("y", vec![file("x2.png")])])],
        1,
        &mut rng,
    );
    let second = random_roots(vec![file("z1.png"), dir("w", vec![file("z2.png")])], 1, &mut rng);

    let collector = TreeCollector::default();
    let (a, b) = tokio::join!(collector.collect(first), collector.collect(second));
    assert_eq!(sorted_names(&a.files), vec!["x1.png", "x2.png"]);
    assert_eq!(sorted_names(&b.files), vec!["z1.png", "z2.png"]);
}

#[tokio::test]
async fn collects_from_the_filesystem_in_small_chunks() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("exam");
    fs::create_dir_all(root.join("room1/row2")).unwrap();
    fs::create_dir_all(root.join("empty")).unwrap();
    fs::write(root.join("cover.pdf"), b"%PDF").unwrap();
    fs::write(root.join("room1/a.jpg"), b"a").unwrap();
    fs::write(root.join("room1/b.jpg"), b"b").unwrap();
    fs::write(root.join("room1/row2/c.png"), b"c").unwrap();
    let loose = temp.path().join("loose.png");
    fs::write(&loose, b"l").unwrap();

    let collector = TreeCollector::new(CollectSettings { read_chunk: 2 });
    let outcome = collector.collect_paths(&[root, loose.clone()]).await;

    assert_eq!(
        sorted_names(&outcome.files),
        vec!["a.jpg", "b.jpg", "c.png", "cover.pdf", "loose.png"]
    );
    assert!(!outcome.is_partial());
    let loose_entry = outcome.files.iter().find(|f| f.name() == "loose.png").unwrap();
    assert_eq!(loose_entry.path(), Some(loose.as_path()));
    assert!(loose_entry.is_image());
}

#[tokio::test]
async fn missing_path_is_reported_as_failed_subtree() {
    let temp = TempDir::new().unwrap();
    let present = temp.path().join("present.png");
    fs::write(&present, b"p").unwrap();
    let missing = temp.path().join("missing");

    let outcome = TreeCollector::default()
        .collect_paths(&[missing.clone(), present])
        .await;

    assert_eq!(sorted_names(&outcome.files), vec!["present.png"]);
    assert_eq!(outcome.failures.len(), 1);
    assert!(matches!(outcome.failures[0], CollectError::Inspect { .. }));
    assert_eq!(outcome.failures[0].subtree(), missing.display().to_string());
}

#[tokio::test]
async fn fs_directory_reports_exhaustion_with_empty_chunks() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("only.png"), b"x").unwrap();

    let mut reader = FsDirectory::new(temp.path()).with_read_chunk(8);
    let first = reader.read_entries().await.unwrap();
    assert_eq!(first.len(), 1);
    assert!(reader.read_entries().await.unwrap().is_empty());
    assert!(reader.read_entries().await.unwrap().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_directories_inside_a_drop_are_followed() {
    use std::os::unix::fs::symlink;

    let temp = TempDir::new().unwrap();
    let real = temp.path().join("real");
    fs::create_dir_all(&real).unwrap();
    fs::write(real.join("a.png"), b"a").unwrap();
    fs::write(real.join("b.png"), b"b").unwrap();
    let drop_dir = temp.path().join("drop");
    fs::create_dir_all(&drop_dir).unwrap();
    fs::write(drop_dir.join("top.png"), b"t").unwrap();
    symlink(&real, drop_dir.join("linked")).unwrap();
    symlink(real.join("a.png"), drop_dir.join("alias.png")).unwrap();

    let outcome = TreeCollector::default().collect_paths(&[drop_dir]).await;

    assert_eq!(
        sorted_names(&outcome.files),
        vec!["a.png", "alias.png", "b.png", "top.png"]
    );
    assert!(!outcome.is_partial());
}

#[cfg(unix)]
#[tokio::test]
async fn dangling_symlink_is_reported_and_siblings_are_kept() {
    use std::os::unix::fs::symlink;

    let temp = TempDir::new().unwrap();
    let drop_dir = temp.path().join("drop");
    fs::create_dir_all(&drop_dir).unwrap();
    fs::write(drop_dir.join("kept.png"), b"k").unwrap();
    let dangling = drop_dir.join("gone");
    symlink(temp.path().join("nowhere"), &dangling).unwrap();

    let outcome = TreeCollector::new(CollectSettings { read_chunk: 1 })
        .collect_paths(&[drop_dir])
        .await;

    assert_eq!(sorted_names(&outcome.files), vec!["kept.png"]);
    assert_eq!(outcome.failures.len(), 1);
    assert!(matches!(outcome.failures[0], CollectError::Inspect { .. }));
    assert_eq!(outcome.failures[0].subtree(), dangling.display().to_string());
}
