//! Rollback against real merges made by the git merge worker.

use chorus::adapters::{GitMergeWorker, MemoryTaskLog, ShellCommandRunner};
use chorus::domain::models::MergeItem;
use chorus::domain::ports::{CommandRunner, MergeResult, MergeWorker, TaskLog};
use chorus::services::{AuditTrail, TaskGraph, TaskRollback};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

async fn sh(runner: &ShellCommandRunner, dir: &Path, command: &str) -> String {
    let out = runner.run(command, dir).await.unwrap();
    assert!(out.success, "`{command}` failed: {}", out.output);
    out.output
}

async fn init_repo(runner: &ShellCommandRunner) -> TempDir {
    let dir = TempDir::new().unwrap();
    let path = dir.path();
    sh(runner, path, "git init -q").await;
    sh(runner, path, "git symbolic-ref HEAD refs/heads/main").await;
    sh(runner, path, "git config user.email dev@example.com").await;
    sh(runner, path, "git config user.name Dev").await;
    sh(runner, path, "git config commit.gpgsign false").await;
    sh(runner, path, "echo base > base.txt && git add . && git commit -q -m base").await;
    dir
}

/// Commit one file on `task/<id>` and merge it with the merge worker.
async fn merge_task(runner: &ShellCommandRunner, worker: &GitMergeWorker, dir: &Path, id: &str) {
    sh(
        runner,
        dir,
        &format!(
            "git checkout -q -b task/{id} main && echo {id} > {id}.txt && git add . && git commit -q -m 'work on {id}' && git checkout -q main"
        ),
    )
    .await;
    let result = worker
        .merge(&MergeItem::new(id, format!("task/{id}"), dir))
        .await
        .unwrap();
    assert!(matches!(result, MergeResult::Merged { .. }), "{result:?}");
}

fn rollback_for(dir: &Path) -> (TaskRollback, AuditTrail) {
    let audit = AuditTrail::new(Arc::new(MemoryTaskLog::new()) as Arc<dyn TaskLog>);
    let rollback = TaskRollback::new(
        Arc::new(ShellCommandRunner::new()) as Arc<dyn CommandRunner>,
        audit.clone(),
        dir,
    );
    (rollback, audit)
}

#[tokio::test]
async fn test_rollback_reverts_merge_commit() {
    let runner = ShellCommandRunner::new();
    let dir = init_repo(&runner).await;
    let path = dir.path();
    let worker = GitMergeWorker::new(Arc::new(ShellCommandRunner::new()), path);
    merge_task(&runner, &worker, path, "ch-1").await;
    assert!(path.join("ch-1.txt").exists());

    let (rollback, audit) = rollback_for(path);
    let report = rollback.rollback(&"ch-1".into()).await.unwrap();

    assert_eq!(report.commits.len(), 1);
    assert!(!path.join("ch-1.txt").exists());
    assert!(path.join("base.txt").exists());
    let status = sh(&runner, path, "git status --porcelain").await;
    assert!(status.contains("D  ch-1.txt"), "{status}");
    assert_eq!(audit.history(&"ch-1".into())[0].action, "reverted");
}

#[tokio::test]
async fn test_rollback_with_dependents_reverts_both_merges() {
    let runner = ShellCommandRunner::new();
    let dir = init_repo(&runner).await;
    let path = dir.path();
    let worker = GitMergeWorker::new(Arc::new(ShellCommandRunner::new()), path);

    let mut graph = TaskGraph::new(Arc::new(MemoryTaskLog::new()) as Arc<dyn TaskLog>, "ch");
    let base = graph.create("base", vec![], vec![]).unwrap();
    graph.create("on top", vec![base.clone()], vec![]).unwrap();
    merge_task(&runner, &worker, path, "ch-1").await;
    merge_task(&runner, &worker, path, "ch-2").await;

    let (rollback, _audit) = rollback_for(path);
    let reports = rollback.rollback_with_dependents(&graph, &base).await.unwrap();

    let order: Vec<String> = reports.iter().map(|r| r.task_id.to_string()).collect();
    assert_eq!(order, ["ch-2", "ch-1"]);
    assert!(!path.join("ch-1.txt").exists());
    assert!(!path.join("ch-2.txt").exists());
}
