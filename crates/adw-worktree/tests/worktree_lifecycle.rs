//! Worktree lifecycle against a real repository

use std::path::Path;
use std::process::Command;

use adw_core::{Error, PortPair};
use adw_worktree::WorktreeManager;

fn git(repo: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(repo)
        .status()
        .expect("git runs");
    assert!(status.success(), "git {args:?} failed");
}

/// Initialize a repo with one commit on `main`.
fn init_repo(repo: &Path) {
    git(repo, &["init", "-b", "main"]);
    git(repo, &["config", "user.email", "adw@example.invalid"]);
    git(repo, &["config", "user.name", "adw"]);
    std::fs::write(repo.join("README.md"), "seed\n").unwrap();
    std::fs::write(repo.join(".env"), "APP_SECRET=dev\n").unwrap();
    git(repo, &["add", "-A"]);
    git(repo, &["commit", "-m", "seed"]);
}

fn ports() -> PortPair {
    PortPair {
        index: 3,
        ws: 8503,
        fe: 9203,
    }
}

#[tokio::test]
async fn test_create_validate_remove_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("repo");
    std::fs::create_dir(&repo).unwrap();
    init_repo(&repo);

    let manager = WorktreeManager::new(&repo, dir.path().join("trees"));
    let path = manager
        .create("a1b2c3d4", "feat-issue-456-run-a1b2c3d4-csv", &ports())
        .await
        .unwrap();

    assert!(path.is_absolute());
    assert!(path.join("README.md").is_file());

    // Env files landed.
    let ports_env = std::fs::read_to_string(path.join(".ports.env")).unwrap();
    assert!(ports_env.contains("WS_PORT=8503"));
    assert!(ports_env.contains("FE_PORT=9203"));
    assert!(ports_env.contains("BACKEND_URL=http://localhost:8503"));
    let env = std::fs::read_to_string(path.join(".env")).unwrap();
    assert!(env.contains("APP_SECRET=dev"));

    manager.validate("a1b2c3d4", &path).await.unwrap();

    manager.remove("a1b2c3d4").await.unwrap();
    assert!(!path.exists());
    // Removal is idempotent.
    manager.remove("a1b2c3d4").await.unwrap();
}

#[tokio::test]
async fn test_validate_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("repo");
    std::fs::create_dir(&repo).unwrap();
    init_repo(&repo);

    let manager = WorktreeManager::new(&repo, dir.path().join("trees"));
    let err = manager
        .validate("a1b2c3d4", &dir.path().join("trees").join("a1b2c3d4"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WorktreeMissing(_)));
}

#[tokio::test]
async fn test_validate_unregistered_directory_is_inconsistent() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("repo");
    std::fs::create_dir(&repo).unwrap();
    init_repo(&repo);

    // A directory that exists but git knows nothing about.
    let rogue = dir.path().join("trees").join("a1b2c3d4");
    std::fs::create_dir_all(&rogue).unwrap();

    let manager = WorktreeManager::new(&repo, dir.path().join("trees"));
    let err = manager.validate("a1b2c3d4", &rogue).await.unwrap_err();
    assert!(matches!(err, Error::WorktreeInconsistent { .. }));
}

#[tokio::test]
async fn test_create_twice_fails_without_touching_state() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("repo");
    std::fs::create_dir(&repo).unwrap();
    init_repo(&repo);

    let manager = WorktreeManager::new(&repo, dir.path().join("trees"));
    manager
        .create("a1b2c3d4", "feat-run-a1b2c3d4", &ports())
        .await
        .unwrap();
    let err = manager
        .create("a1b2c3d4", "feat-run-a1b2c3d4-again", &ports())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WorktreeCreateFailed(_)));
}
