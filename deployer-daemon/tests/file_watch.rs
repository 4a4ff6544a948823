use std::fs;
use std::time::Duration;

use deployer_daemon::{FileWatch, WatchEvent};
use tempfile::TempDir;
use tokio::time::timeout;

#[tokio::test]
async fn rapid_writes_coalesce_into_one_change() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("config.yaml");
    fs::write(&path, "v: 0\n").expect("seed");
    let mut watch = FileWatch::new(&path).expect("watch");

    for i in 1..=5 {
        fs::write(&path, format!("v: {i}\n")).expect("write");
    }

    let event = timeout(Duration::from_secs(5), watch.next())
        .await
        .expect("change within five seconds");
    assert!(matches!(event, Some(WatchEvent::Changed { .. })), "got {event:?}");
    assert!(
        timeout(Duration::from_millis(400), watch.next()).await.is_err(),
        "burst produced more than one change"
    );
}

#[tokio::test]
async fn atomic_replace_is_a_change() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(".env");
    fs::write(&path, "LOG_LEVEL=info\n").expect("seed");
    let mut watch = FileWatch::new(&path).expect("watch");

    let staging = dir.path().join(".env.tmp");
    fs::write(&staging, "LOG_LEVEL=debug\n").expect("stage");
    fs::rename(&staging, &path).expect("rename into place");

    let event = timeout(Duration::from_secs(5), watch.next())
        .await
        .expect("change within five seconds");
    assert!(matches!(event, Some(WatchEvent::Changed { .. })), "got {event:?}");
}

#[tokio::test]
async fn removed_file_is_lost_and_ends_the_stream() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("config.yaml");
    fs::write(&path, "v: 0\n").expect("seed");
    let mut watch = FileWatch::new(&path).expect("watch");

    fs::remove_file(&path).expect("remove");

    let event = timeout(Duration::from_secs(5), watch.next())
        .await
        .expect("event within five seconds");
    assert_eq!(event, Some(WatchEvent::Lost));
    assert_eq!(watch.next().await, None);
}

#[tokio::test]
async fn unrelated_files_are_ignored() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("config.yaml");
    fs::write(&path, "v: 0\n").expect("seed");
    let mut watch = FileWatch::new(&path).expect("watch");

    fs::write(dir.path().join("other.yaml"), "x").expect("write sibling");
    assert!(timeout(Duration::from_millis(400), watch.next()).await.is_err());
}

#[test]
fn missing_file_cannot_be_watched() {
    let dir = TempDir::new().expect("tempdir");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let _entered = runtime.enter();
    assert!(FileWatch::new(&dir.path().join("absent.yaml")).is_err());
}
