//! Recording a release and certifying its hostname through a git remote.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use rget_core::wellknown::PUBLIC_SERVICE_HOST;
use rget_core::{
    ContentAddressableCache, DynamicCertPolicy, GitAuditLog, GitAuditOptions, HostPolicy, Recorder,
    RgetError,
};

const RGET_V006_SUMS: &str = "\
d4cb7fc206cbd147b3397c1e1b88513831c9780fc9675bebc300112365979465  rget-v0.0.6-linux-arm.tar.gz
7239591ab580c911738130cc62d8a5cd9c6c05c79fa7abfdf32bad0d68a70844  rget-v0.0.6-windows-amd64.tar.gz
18908181de67376c12b7e34de7c3e4aeaddc24cebab8c7d8115cf31dfbe236f2  rget-v0.0.6-linux-amd64.tar.gz
38c6ee23c7f5fbdc7ef207dda25d8e030c8300fa94d71b6b4adc878af9343ba8  rget-v0.0.6-linux-arm64.tar.gz
5b64ee638b847ca72dc1d029437d69e987d439ff420135241687975c6ca2484a  rget-v0.0.6-darwin-amd64.tar.gz
";

const SUFFIX: &str = "v0-0-6.rget.merklecounty.github.com";
const RECORD: &str =
    "cd83cf8f413393d30d53626c5f17f9ae.af90c0ab70bffa127b54cdb82d3c1499.v0-0-6.rget.merklecounty.github.com";

fn git(args: &[&str]) -> String {
    let out = Command::new("git").args(args).output().unwrap();
    assert!(out.status.success(), "git {args:?}: {}", String::from_utf8_lossy(&out.stderr));
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn init_remote(root: &Path) -> PathBuf {
    let remote = root.join("audit.git");
    git(&["init", "--bare", "--quiet", remote.to_str().unwrap()]);
    remote
}

fn open_cache(dir: PathBuf, remote: &Path) -> Arc<ContentAddressableCache<GitAuditLog>> {
    let log = GitAuditLog::open(GitAuditOptions {
        dir,
        remote: Some(remote.display().to_string()),
        author_name: "Merkle County Recorder".into(),
        author_email: "security@merklecounty.com".into(),
    })
    .unwrap();
    Arc::new(ContentAddressableCache::new(log).unwrap())
}

#[test]
fn test_record_then_certify() {
    let tmp = tempfile::tempdir().unwrap();
    let remote = init_remote(tmp.path());
    let cache = open_cache(tmp.path().join("recorder"), &remote);
    let recorder = Recorder::new(Arc::clone(&cache), Duration::from_secs(5));

    let submission = recorder.submit(RGET_V006_SUMS.as_bytes(), Some(SUFFIX)).unwrap();
    assert_eq!(submission.name, RECORD);
    assert!(!submission.cache_hit);

    let policy = DynamicCertPolicy::new(Arc::clone(&cache), PUBLIC_SERVICE_HOST);
    let granted = policy
        .policy_for(&format!("{RECORD}.{PUBLIC_SERVICE_HOST}"))
        .unwrap();
    assert_eq!(
        granted.common_name,
        "cd83cf8f413393d30d53626c5f17f9ae.recorder.merklecounty.com"
    );
    assert_eq!(granted.dns_names.len(), 2);

    let subjects = git(&["--git-dir", remote.to_str().unwrap(), "log", "--format=%s"]);
    assert_eq!(subjects.lines().collect::<Vec<_>>(), [format!("put: {RECORD}")]);
}

#[test]
fn test_resubmission_is_not_recommitted() {
    let tmp = tempfile::tempdir().unwrap();
    let remote = init_remote(tmp.path());
    let cache = open_cache(tmp.path().join("recorder"), &remote);
    let recorder = Recorder::new(cache, Duration::from_secs(5));

    recorder.submit(RGET_V006_SUMS.as_bytes(), Some(SUFFIX)).unwrap();
    let again = recorder.submit(RGET_V006_SUMS.as_bytes(), Some(SUFFIX)).unwrap();
    assert!(again.cache_hit);

    let subjects = git(&["--git-dir", remote.to_str().unwrap(), "log", "--format=%s"]);
    assert_eq!(subjects.lines().count(), 1);
}

#[test]
fn test_copied_sums_do_not_block_issuance() {
    let tmp = tempfile::tempdir().unwrap();
    let remote = init_remote(tmp.path());
    let cache = open_cache(tmp.path().join("recorder"), &remote);
    let recorder = Recorder::new(Arc::clone(&cache), Duration::from_secs(5));

    recorder.submit(RGET_V006_SUMS.as_bytes(), Some(SUFFIX)).unwrap();
    let copy = recorder
        .submit(RGET_V006_SUMS.as_bytes(), Some("v1.mallory.evil.github.com"))
        .unwrap();
    assert!(copy.cache_hit);
    assert_eq!(copy.name, RECORD);

    let policy = DynamicCertPolicy::new(cache, PUBLIC_SERVICE_HOST);
    assert!(policy
        .policy_for("cd83cf8f413393d30d53626c5f17f9ae.recorder.merklecounty.com")
        .is_ok());

    let subjects = git(&["--git-dir", remote.to_str().unwrap(), "log", "--format=%s"]);
    assert_eq!(subjects.lines().collect::<Vec<_>>(), [format!("put: {RECORD}")]);
}

#[test]
fn test_record_visible_to_fresh_clone() {
    let tmp = tempfile::tempdir().unwrap();
    let remote = init_remote(tmp.path());
    {
        let cache = open_cache(tmp.path().join("writer"), &remote);
        Recorder::new(cache, Duration::from_secs(5))
            .submit(RGET_V006_SUMS.as_bytes(), Some(SUFFIX))
            .unwrap();
    }

    let reader = open_cache(tmp.path().join("reader"), &remote);
    assert_eq!(reader.prefix_search("cd83cf8f").unwrap(), [RECORD]);

    let policy = DynamicCertPolicy::new(reader, PUBLIC_SERVICE_HOST);
    assert!(policy
        .policy_for("cd83cf8f413393d30d53626c5f17f9ae.recorder.merklecounty.com")
        .is_ok());
}

#[test]
fn test_unrecorded_host_denied() {
    let tmp = tempfile::tempdir().unwrap();
    let remote = init_remote(tmp.path());
    let cache = open_cache(tmp.path().join("recorder"), &remote);
    let policy = DynamicCertPolicy::new(cache, PUBLIC_SERVICE_HOST);

    let err = policy
        .policy_for("cd83cf8f413393d30d53626c5f17f9ae.recorder.merklecounty.com")
        .unwrap_err();
    assert!(matches!(err, RgetError::PolicyDenied { .. }));
    assert!(err.is_fatal_to_request());
}
