use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use tessera_asset::handle::LoadStatus;
use tessera_asset::hot_reload::{HotReloadLibrary, ReloadEvent};
use tessera_asset::loader::RawBytesLoader;

fn temp_file(tag: &str, content: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("tessera-asset-it-{}-{}.bin", tag, std::process::id()));
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn poll_changes_reloads_modified_files() {
    let path = temp_file("poll", b"v1");
    let mut library = HotReloadLibrary::new(1, RawBytesLoader).unwrap();
    library.load("blob", &path);
    library.wait_idle();
    library.update();
    assert_eq!(library.poll_changes(), 0);

    std::fs::write(&path, b"v2").unwrap();
    // 修改时间的精度依赖文件系统，这里显式推后
    let file = std::fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(60)).unwrap();
    drop(file);

    assert_eq!(library.poll_changes(), 1);
    library.wait_idle();
    library.update();
    assert_eq!(library.get("blob").as_deref().map(Vec::as_slice), Some(&b"v2"[..]));
    assert_eq!(library.status("blob"), Some(LoadStatus::Ready));

    std::fs::remove_file(&path).ok();
}

#[test]
fn drop_joins_outstanding_tasks() {
    let path = temp_file("drop", b"payload");
    let finished = Arc::new(AtomicUsize::new(0));

    {
        let finished = finished.clone();
        let loader = move |path: &Path| -> anyhow::Result<usize> {
            std::thread::sleep(Duration::from_millis(20));
            let len = std::fs::read(path)?.len();
            finished.fetch_add(1, Ordering::SeqCst);
            Ok(len)
        };
        let mut library = HotReloadLibrary::new(2, loader).unwrap();
        library.load("a", &path);
        library.load("b", &path);
        // library 在这里 drop，必须等待后台任务结束
    }

    // 任务要么完成加载，要么在开始前被取消；drop 返回后不会再有任务运行
    let after_drop = finished.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(finished.load(Ordering::SeqCst), after_drop);

    std::fs::remove_file(&path).ok();
}

#[test]
fn cancelled_tasks_report_event() {
    let path = temp_file("cancel", b"x");
    let mut library = HotReloadLibrary::new(1, RawBytesLoader).unwrap();
    for _ in 0..4 {
        library.load("x", &path);
    }
    library.shutdown();

    let events = library.update();
    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|event| matches!(
        event,
        ReloadEvent::Reloaded { .. } | ReloadEvent::Stale { .. } | ReloadEvent::Cancelled { .. }
    )));

    std::fs::remove_file(&path).ok();
}
