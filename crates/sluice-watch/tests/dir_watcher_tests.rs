//! Directory watcher behaviour driven through the mock backend.
//!
//! Each test builds a real directory tree in a temp dir, starts a watcher over a
//! [`MockBackend`] and injects events by hand, recording what reaches the handler.

use sluice_core::test_support::RecordingHandler;
use sluice_core::{DATA_SOURCE_KEY, METADATA_KEY};
use sluice_watch::{
    DirWatcher, Error, FsEvent, MockBackend, Result, WatcherConfig, DEFAULT_FILE_SETTLE_TIME,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    _temp: TempDir,
    root: PathBuf,
    backend: Arc<MockBackend>,
    handler: Arc<RecordingHandler>,
    watcher: Arc<DirWatcher>,
    cancel: CancellationToken,
}

impl Harness {
    fn new(setup: impl FnOnce(&Path), configure: impl FnOnce(WatcherConfig) -> WatcherConfig) -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let root = temp.path().canonicalize().expect("Failed to canonicalize root");
        setup(&root);

        let (backend, events) = MockBackend::new();
        let backend = Arc::new(backend);
        let handler = Arc::new(RecordingHandler::new());
        let config = configure(
            WatcherConfig::new(&root)
                .with_metadata_settle_delay(Duration::from_millis(10))
                .with_file_settle_time(Duration::ZERO)
                .with_rescan_interval(None),
        );
        let watcher = DirWatcher::new(config, backend.clone(), events, handler.clone())
            .expect("Failed to create watcher");

        Self {
            _temp: temp,
            root,
            backend,
            handler,
            watcher: Arc::new(watcher),
            cancel: CancellationToken::new(),
        }
    }

    fn start(&self) -> JoinHandle<Result<()>> {
        let watcher = self.watcher.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move { watcher.start(cancel).await })
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    async fn shutdown(&self, task: JoinHandle<Result<()>>) -> Result<()> {
        self.cancel.cancel();
        tokio::time::timeout(WAIT, task)
            .await
            .expect("Watcher did not shut down")
            .expect("Watcher task panicked")
    }
}

fn append(path: &Path, content: &str) {
    use std::io::Write;
    let mut file = fs::OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

async fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn test_existing_file_inherits_ancestor_metadata() {
    let h = Harness::new(
        |root| {
            write(&root.join("src1/.default_metadata.yaml"), "env: prod\n");
            write(&root.join("src1/sub/a.txt"), "hello");
        },
        |config| config,
    );
    let task = h.start();

    assert!(h.handler.wait_for_calls(1, WAIT).await);
    let calls = h.handler.calls_for(&h.path("src1/sub/a.txt"));
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].attributes[DATA_SOURCE_KEY], "src1");
    assert_eq!(calls[0].attributes[METADATA_KEY], r#"{"env":"prod"}"#);

    h.shutdown(task).await.unwrap();
    assert_eq!(h.handler.call_count(), 1, "metadata files are never dispatched");
}

#[tokio::test]
async fn test_file_without_metadata_gets_empty_object() {
    let h = Harness::new(|root| write(&root.join("src2/file.bin"), "x"), |config| config);
    let task = h.start();

    assert!(h.handler.wait_for_calls(1, WAIT).await);
    let call = &h.handler.handled()[0];
    assert_eq!(call.attributes[DATA_SOURCE_KEY], "src2");
    assert_eq!(call.attributes[METADATA_KEY], "{}");

    h.shutdown(task).await.unwrap();
}

#[tokio::test]
async fn test_new_metadata_file_overrides_for_later_files() {
    let h = Harness::new(
        |root| {
            write(&root.join("src1/.default_metadata.yaml"), "env: prod\n");
            fs::create_dir_all(root.join("src1/sub")).unwrap();
        },
        |config| config,
    );
    let task = h.start();
    assert!(eventually(|| h.watcher.is_watching(&h.path("src1/sub"))).await);

    let metadata_file = h.path("src1/sub/.default_metadata.json");
    write(&metadata_file, r#"{"env": "staging"}"#);
    h.backend.emit(FsEvent::created(&metadata_file));

    let new_file = h.path("src1/sub/b.txt");
    write(&new_file, "b");
    h.backend.emit(FsEvent::created(&new_file));

    assert!(h.handler.wait_for_calls(1, WAIT).await);
    let calls = h.handler.calls_for(&new_file);
    assert_eq!(calls[0].attributes[METADATA_KEY], r#"{"env":"staging"}"#);

    h.shutdown(task).await.unwrap();
}

#[tokio::test]
async fn test_deleted_metadata_file_falls_back_to_parent() {
    let h = Harness::new(
        |root| {
            write(&root.join("src1/.default_metadata.yaml"), "env: prod\n");
            write(&root.join("src1/sub/.default_metadata.yaml"), "env: sub\n");
        },
        |config| config,
    );
    let task = h.start();
    let sub = h.path("src1/sub");
    assert!(eventually(|| h.watcher.metadata().cached(&sub).is_some()).await);

    let metadata_file = sub.join(".default_metadata.yaml");
    fs::remove_file(&metadata_file).unwrap();
    h.backend.emit(FsEvent::removed(&metadata_file));

    let new_file = sub.join("c.txt");
    write(&new_file, "c");
    h.backend.emit(FsEvent::created(&new_file));

    assert!(h.handler.wait_for_calls(1, WAIT).await);
    assert_eq!(
        h.handler.calls_for(&new_file)[0].attributes[METADATA_KEY],
        r#"{"env":"prod"}"#
    );

    h.shutdown(task).await.unwrap();
}

#[tokio::test]
async fn test_watch_registration_is_idempotent() {
    let h = Harness::new(|root| fs::create_dir_all(root.join("src1/sub")).unwrap(), |c| c);
    let task = h.start();
    let sub = h.path("src1/sub");
    assert!(eventually(|| h.backend.is_watching(&sub)).await);

    h.backend.emit(FsEvent::created(&sub));
    h.backend.emit(FsEvent::created(&sub));
    h.backend.emit(FsEvent::created(h.path("src1")));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let calls = h.backend.watch_calls();
    assert_eq!(calls.iter().filter(|p| **p == sub).count(), 1);
    assert_eq!(calls.iter().filter(|p| **p == h.path("src1")).count(), 1);
    assert_eq!(calls.iter().filter(|p| **p == h.root).count(), 1);

    h.shutdown(task).await.unwrap();
}

#[tokio::test]
async fn test_oversized_file_is_never_dispatched() {
    let h = Harness::new(
        |root| {
            write(&root.join("src1/big.bin"), "01234567890");
            write(&root.join("src1/small.bin"), "0123456789");
        },
        |config| config.with_max_file_size(10),
    );
    let task = h.start();

    assert!(h.handler.wait_for_calls(1, WAIT).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.handler.calls_for(&h.path("src1/small.bin")).len(), 1);
    assert!(h.handler.calls_for(&h.path("src1/big.bin")).is_empty());
    assert!(h.path("src1/big.bin").exists(), "oversized file is left in place");

    h.shutdown(task).await.unwrap();
}

#[tokio::test]
async fn test_hidden_paths_are_skipped_except_root_children() {
    let h = Harness::new(
        |root| {
            write(&root.join("src1/.partial.tmp"), "x");
            write(&root.join("src1/.git/config"), "x");
            write(&root.join(".hidden_source/data.txt"), "x");
            write(&root.join("src1/visible.txt"), "x");
        },
        |config| config,
    );
    let task = h.start();

    assert!(h.handler.wait_for_calls(2, WAIT).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut paths: Vec<PathBuf> = h.handler.handled().into_iter().map(|c| c.path).collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![h.path(".hidden_source/data.txt"), h.path("src1/visible.txt")]
    );
    assert!(!h.watcher.is_watching(&h.path("src1/.git")));
    assert_eq!(
        h.handler.calls_for(&h.path(".hidden_source/data.txt"))[0].attributes[DATA_SOURCE_KEY],
        ".hidden_source"
    );

    h.backend.emit(FsEvent::created(h.path("src1/.another.tmp")));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.handler.call_count(), 2);

    h.shutdown(task).await.unwrap();
}

#[tokio::test]
async fn test_new_directory_is_watched_and_its_files_dispatched() {
    let h = Harness::new(|_| {}, |config| config);
    let task = h.start();
    assert!(eventually(|| h.backend.is_watching(&h.root)).await);

    let dir = h.path("src3/incoming");
    fs::create_dir_all(&dir).unwrap();
    h.backend.emit(FsEvent::created(h.path("src3")));
    h.backend.emit(FsEvent::created(&dir));
    assert!(eventually(|| h.backend.is_watching(&dir)).await);

    let file = dir.join("report.csv");
    write(&file, "a,b");
    h.backend.emit(FsEvent::created(&file));

    assert!(h.handler.wait_for_calls(1, WAIT).await);
    assert_eq!(h.handler.calls_for(&file)[0].attributes[DATA_SOURCE_KEY], "src3");

    h.shutdown(task).await.unwrap();
}

#[tokio::test]
async fn test_modify_of_regular_file_is_ignored() {
    let h = Harness::new(|root| fs::create_dir_all(root.join("src1")).unwrap(), |c| c);
    let task = h.start();
    assert!(eventually(|| h.backend.is_watching(&h.path("src1"))).await);

    let file = h.path("src1/late.txt");
    write(&file, "x");
    h.backend.emit(FsEvent::modified(&file));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.handler.call_count(), 0);

    h.shutdown(task).await.unwrap();
}

#[tokio::test]
async fn test_removed_directory_is_unwatched_with_descendants() {
    let h = Harness::new(
        |root| {
            write(&root.join("src1/a/.default_metadata.yaml"), "k: v");
            fs::create_dir_all(root.join("src1/a/b")).unwrap();
        },
        |config| config,
    );
    let task = h.start();
    let a = h.path("src1/a");
    let b = h.path("src1/a/b");
    assert!(eventually(|| h.backend.is_watching(&b)).await);
    assert!(eventually(|| h.watcher.metadata().cached(&a).is_some()).await);

    fs::remove_dir_all(&a).unwrap();
    h.backend.emit(FsEvent::removed(&a));

    assert!(eventually(|| !h.watcher.is_watching(&a) && !h.watcher.is_watching(&b)).await);
    assert!(!h.backend.is_watching(&a));
    assert!(!h.backend.is_watching(&b));
    assert!(h.watcher.metadata().cached(&a).is_none());
    assert!(h.watcher.is_watching(&h.path("src1")));

    h.shutdown(task).await.unwrap();
}

#[tokio::test]
async fn test_handler_failure_does_not_stop_watcher() {
    let h = Harness::new(|root| write(&root.join("src1/one.txt"), "1"), |c| c);
    h.handler.set_failing(true);
    let task = h.start();

    assert!(h.handler.wait_for_calls(1, WAIT).await);

    let second = h.path("src1/two.txt");
    write(&second, "2");
    h.backend.emit(FsEvent::created(&second));
    assert!(h.handler.wait_for_calls(2, WAIT).await);
    assert!(!task.is_finished());

    h.shutdown(task).await.unwrap();
}

#[tokio::test]
async fn test_backend_errors_are_not_fatal() {
    let h = Harness::new(|root| fs::create_dir_all(root.join("src1")).unwrap(), |c| c);
    let task = h.start();
    assert!(eventually(|| h.backend.is_watching(&h.path("src1"))).await);

    h.backend.emit_error("queue overflow");
    let file = h.path("src1/after_error.txt");
    write(&file, "x");
    h.backend.emit(FsEvent::created(&file));

    assert!(h.handler.wait_for_calls(1, WAIT).await);
    h.shutdown(task).await.unwrap();
}

#[tokio::test]
async fn test_event_stream_closing_is_fatal() {
    let h = Harness::new(|_| {}, |config| config);
    let task = h.start();
    assert!(eventually(|| h.backend.is_watching(&h.root)).await);

    h.backend.disconnect();

    let result = tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert!(matches!(result, Err(Error::EventStreamClosed)));
}

#[tokio::test]
async fn test_stop_is_idempotent_and_ends_start_cleanly() {
    let h = Harness::new(|_| {}, |config| config);
    let task = h.start();
    assert!(eventually(|| h.backend.is_watching(&h.root)).await);

    h.watcher.stop().unwrap();
    h.watcher.stop().unwrap();
    assert!(h.backend.is_closed());

    let result = tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_root_watch_failure_is_fatal() {
    let h = Harness::new(|_| {}, |config| config);
    h.backend.fail_watch_for(&h.root);

    let result = h.watcher.start(h.cancel.clone()).await;
    assert!(matches!(result, Err(Error::RootUnavailable { .. })));
    assert!(h.watcher.watched_directories().is_empty());
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let h = Harness::new(|_| {}, |config| config);
    let task = h.start();
    assert!(eventually(|| h.backend.is_watching(&h.root)).await);

    let second = h.watcher.start(h.cancel.clone()).await;
    assert!(matches!(second, Err(Error::AlreadyStarted)));

    h.shutdown(task).await.unwrap();
}

#[tokio::test]
async fn test_file_settle_time_waits_for_writer() {
    let h = Harness::new(
        |root| fs::create_dir_all(root.join("src1")).unwrap(),
        |config| config.with_file_settle_time(Duration::from_millis(300)),
    );
    let task = h.start();
    assert!(eventually(|| h.backend.is_watching(&h.path("src1"))).await);

    let file = h.path("src1/growing.log");
    write(&file, "part one");
    h.backend.emit(FsEvent::created(&file));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.handler.call_count(), 0, "still settling");

    assert!(h.handler.wait_for_calls(1, WAIT).await);
    h.shutdown(task).await.unwrap();
}

#[tokio::test]
async fn test_file_still_being_written_waits_under_default_settle_time() {
    let h = Harness::new(
        |root| fs::create_dir_all(root.join("src1")).unwrap(),
        |config| config.with_file_settle_time(DEFAULT_FILE_SETTLE_TIME),
    );
    let task = h.start();
    assert!(eventually(|| h.backend.is_watching(&h.path("src1"))).await);

    let file = h.path("src1/upload.bin");
    write(&file, "part1-");
    h.backend.emit(FsEvent::created(&file));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.handler.call_count(), 0, "writer is still active");
    append(&file, "part2");

    assert!(h.handler.wait_for_calls(1, WAIT).await);
    let calls = h.handler.calls_for(&file);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].size, Some("part1-part2".len() as u64));

    h.shutdown(task).await.unwrap();
}

#[tokio::test]
async fn test_every_file_gets_a_size_check_before_dispatch() {
    let h = Harness::new(|root| fs::create_dir_all(root.join("src1")).unwrap(), |c| c);
    let task = h.start();
    assert!(eventually(|| h.backend.is_watching(&h.path("src1"))).await);

    let file = h.path("src1/quick.txt");
    write(&file, "abc");
    h.backend.emit(FsEvent::created(&file));
    append(&file, "def");

    assert!(h.handler.wait_for_calls(1, WAIT).await);
    assert_eq!(h.handler.calls_for(&file)[0].size, Some(6));

    h.shutdown(task).await.unwrap();
}

#[tokio::test]
async fn test_directory_moved_in_with_contents_is_scanned() {
    let staging = TempDir::new().unwrap();
    write(&staging.path().join("batch/a.txt"), "alpha");
    write(&staging.path().join("batch/inner/b.txt"), "beta");
    write(&staging.path().join("batch/inner/.default_metadata.yaml"), "lane: fast\n");

    let h = Harness::new(|root| fs::create_dir_all(root.join("src1")).unwrap(), |c| c);
    let task = h.start();
    assert!(eventually(|| h.backend.is_watching(&h.path("src1"))).await);

    let batch = h.path("src1/batch");
    fs::rename(staging.path().join("batch"), &batch).unwrap();
    h.backend.emit(FsEvent::created(&batch));

    assert!(h.handler.wait_for_calls(2, WAIT).await);
    assert!(eventually(|| h.backend.is_watching(&batch.join("inner"))).await);
    assert!(h.watcher.is_watching(&batch));

    let a = h.handler.calls_for(&batch.join("a.txt"));
    let b = h.handler.calls_for(&batch.join("inner/b.txt"));
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(a[0].attributes[DATA_SOURCE_KEY], "src1");
    assert_eq!(b[0].attributes[METADATA_KEY], r#"{"lane":"fast"}"#);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.handler.call_count(), 2, "metadata files are never dispatched");

    h.shutdown(task).await.unwrap();
}

#[tokio::test]
async fn test_periodic_rescan_finds_files_without_events() {
    let h = Harness::new(
        |root| fs::create_dir_all(root.join("src1")).unwrap(),
        |config| config.with_rescan_interval(Some(Duration::from_millis(200))),
    );
    let task = h.start();
    assert!(eventually(|| h.backend.is_watching(&h.path("src1"))).await);

    let file = h.path("src1/deep/missed.txt");
    write(&file, "no event was emitted");

    assert!(h.handler.wait_for_calls(1, WAIT).await);
    assert_eq!(h.handler.calls_for(&file)[0].attributes[DATA_SOURCE_KEY], "src1");
    assert!(h.watcher.is_watching(&h.path("src1/deep")));

    h.shutdown(task).await.unwrap();
}

#[tokio::test]
async fn test_removing_a_file_keeps_directory_state() {
    let h = Harness::new(
        |root| {
            write(&root.join("src1/.default_metadata.yaml"), "env: prod\n");
            write(&root.join("src1/a.txt"), "hello");
        },
        |c| c,
    );
    let task = h.start();
    assert!(h.handler.wait_for_calls(1, WAIT).await);

    let src1 = h.path("src1");
    let file = src1.join("a.txt");
    fs::remove_file(&file).unwrap();
    h.backend.emit(FsEvent::removed(&file));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.watcher.is_watching(&src1));
    assert!(h.watcher.metadata().cached(&src1).is_some());

    h.shutdown(task).await.unwrap();
}

#[tokio::test]
async fn test_stop_ends_start_with_rescan_enabled() {
    let h = Harness::new(|_| {}, |c| c.with_rescan_interval(Some(Duration::from_secs(60))));
    let task = h.start();
    assert!(eventually(|| h.backend.is_watching(&h.root)).await);

    h.watcher.stop().unwrap();
    let result = tokio::time::timeout(WAIT, task)
        .await
        .expect("Watcher did not shut down after stop")
        .expect("Watcher task panicked");
    assert!(result.is_ok());
}
