//! Clone and pull against a local upstream.

use sdtrainer_git::{clone_repo, head_commit, is_repo, pull, CloneOpts, GitError, PullOutcome};
use std::path::Path;
use tempfile::TempDir;

fn commit_file(repo: &git2::Repository, name: &str, content: &str, message: &str) -> git2::Oid {
    let workdir = repo.workdir().unwrap();
    std::fs::write(workdir.join(name), content).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = git2::Signature::now("Test User", "test@example.com").unwrap();
    let parents: Vec<git2::Commit> = repo
        .head()
        .ok()
        .and_then(|h| h.peel_to_commit().ok())
        .into_iter()
        .collect();
    let parents: Vec<&git2::Commit> = parents.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents).unwrap()
}

fn setup_upstream() -> (TempDir, git2::Repository) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let repo = git2::Repository::init(dir.path().join("upstream")).expect("Failed to init upstream");
    commit_file(&repo, "setup.sh", "echo setup\n", "Initial commit");
    (dir, repo)
}

fn url(repo: &git2::Repository) -> String {
    repo.workdir().unwrap().display().to_string()
}

#[test]
fn test_clone_replaces_existing_target() {
    let (dir, upstream) = setup_upstream();
    let target = dir.path().join("install").join("repo-train");
    std::fs::create_dir_all(&target).unwrap();
    std::fs::write(target.join("stale.txt"), "old").unwrap();

    let path = clone_repo(&CloneOpts::new(url(&upstream), &target), |_| {}).unwrap();

    assert_eq!(path, target);
    assert!(is_repo(&target));
    assert!(target.join("setup.sh").is_file());
    assert!(!target.join("stale.txt").exists());
    assert_eq!(
        head_commit(&target).unwrap(),
        upstream.head().unwrap().peel_to_commit().unwrap().id().to_string()
    );
}

#[test]
fn test_pull_fast_forwards() {
    let (dir, upstream) = setup_upstream();
    let target = dir.path().join("repo-train");
    clone_repo(&CloneOpts::new(url(&upstream), &target), |_| {}).unwrap();

    assert_eq!(pull(&target, None, |_| {}).unwrap(), PullOutcome::UpToDate);

    let new_head = commit_file(&upstream, "train_network.py", "print('hi')\n", "Add trainer");
    match pull(&target, None, |_| {}).unwrap() {
        PullOutcome::FastForwarded { to, .. } => assert_eq!(to, new_head.to_string()),
        other => panic!("expected fast-forward, got {other:?}"),
    }
    assert!(target.join("train_network.py").is_file());
}

#[test]
fn test_pull_refuses_diverged_history() {
    let (dir, upstream) = setup_upstream();
    let target = dir.path().join("repo-train");
    clone_repo(&CloneOpts::new(url(&upstream), &target), |_| {}).unwrap();

    commit_file(&upstream, "a.txt", "upstream", "Upstream change");
    let local = git2::Repository::open(&target).unwrap();
    commit_file(&local, "b.txt", "local", "Local change");

    assert!(matches!(pull(&target, None, |_| {}), Err(GitError::Diverged { .. })));
}

#[test]
fn test_pull_outside_repo() {
    let dir = TempDir::new().unwrap();
    assert!(!is_repo(dir.path()));
    assert!(matches!(pull(dir.path(), None, |_| {}), Err(GitError::NotARepo { .. })));
}
