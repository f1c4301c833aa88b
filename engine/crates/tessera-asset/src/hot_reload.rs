use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};
use crossbeam_utils::sync::WaitGroup;
use slotmap::SlotMap;

use crate::handle::{AssetKey, LoadStatus};
use crate::loader::AssetLoader;

/// 后台任务的结果，由 [`HotReloadLibrary::update`] 在主线程取出
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReloadEvent {
    Reloaded { name: String, version: u64 },
    Failed { name: String, version: u64, error: String },
    /// 任务完成时已经有更新的请求，结果被丢弃
    Stale { name: String, version: u64 },
    /// 任务开始或者替换之前 library 已经关闭
    Cancelled { name: String, version: u64 },
}

struct AssetEntry {
    name: String,
    path: PathBuf,
    status: LoadStatus,
    /// 最近一次请求的版本号，后台任务用它判断自己是否过期
    latest_version: Arc<AtomicU64>,
    /// 最近一次请求时文件的修改时间，用于 poll_changes
    last_modified: Option<SystemTime>,
}

type ResourceMap<T> = Arc<Mutex<HashMap<String, Arc<T>>>>;

/// 名称 -> 资源 的映射，资源由后台任务加载并替换
///
/// - 加载在自有的 rayon 线程池中进行，不持有锁
/// - 只有替换映射中的条目时才会持有锁
/// - 同一名称的多个请求中只有最新的一个能写入结果
/// - `shutdown`（Drop 时自动调用）会取消尚未开始的任务，并等待所有任务结束
pub struct HotReloadLibrary<T: Send + Sync + 'static> {
    loader: Arc<dyn AssetLoader<T>>,

    entries: SlotMap<AssetKey, AssetEntry>,
    name_to_key: HashMap<String, AssetKey>,
    resources: ResourceMap<T>,

    pool: rayon::ThreadPool,
    event_sender: Sender<ReloadEvent>,
    event_receiver: Receiver<ReloadEvent>,

    /// 每个任务持有一个 clone，任务结束时 drop
    wait_group: Option<WaitGroup>,
    cancelled: Arc<AtomicBool>,
}
// new & init
impl<T: Send + Sync + 'static> HotReloadLibrary<T> {
    pub fn new(workers: usize, loader: impl AssetLoader<T>) -> anyhow::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|index| format!("Hot-Reload-{}", index))
            .build()
            .context("创建热重载线程池失败")?;
        let (event_sender, event_receiver) = crossbeam_channel::unbounded();

        Ok(Self {
            loader: Arc::new(loader),
            entries: SlotMap::with_key(),
            name_to_key: HashMap::new(),
            resources: Arc::new(Mutex::new(HashMap::new())),
            pool,
            event_sender,
            event_receiver,
            wait_group: Some(WaitGroup::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }
}
// destroy
impl<T: Send + Sync + 'static> HotReloadLibrary<T> {
    /// 取消尚未开始的任务，并等待所有已经提交的任务结束
    ///
    /// 之后的重载请求都会被拒绝，已经加载的资源仍然可以读取。
    pub fn shutdown(&mut self) {
        let Some(wait_group) = self.wait_group.take() else {
            return;
        };
        self.cancelled.store(true, Ordering::Release);

        log::info!("HotReloadLibrary is shutting down, waiting for reload tasks...");
        wait_group.wait();
        log::info!("All reload tasks finished.");
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.wait_group.is_none()
    }
}
impl<T: Send + Sync + 'static> Drop for HotReloadLibrary<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
// getter
impl<T: Send + Sync + 'static> HotReloadLibrary<T> {
    /// 当前可用的资源；重载过程中返回旧的资源
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        self.lock_resources().get(name).cloned()
    }

    #[inline]
    pub fn key(&self, name: &str) -> Option<AssetKey> {
        self.name_to_key.get(name).copied()
    }

    pub fn status(&self, name: &str) -> Option<LoadStatus> {
        self.key(name).and_then(|key| self.entries.get(key)).map(|entry| entry.status)
    }

    pub fn path(&self, name: &str) -> Option<&Path> {
        self.key(name).and_then(|key| self.entries.get(key)).map(|entry| entry.path.as_path())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|entry| entry.name.as_str())
    }
}
// tools
impl<T: Send + Sync + 'static> HotReloadLibrary<T> {
    /// 注册 `name` 并立即请求加载
    ///
    /// 同名资源已经注册时，更新路径并重新加载。
    pub fn load(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> AssetKey {
        let name = name.into();
        let path = path.into();

        let key = match self.name_to_key.get(&name) {
            Some(&key) => {
                if let Some(entry) = self.entries.get_mut(key) {
                    entry.path = path;
                }
                key
            }
            None => {
                let key = self.entries.insert(AssetEntry {
                    name: name.clone(),
                    path,
                    status: LoadStatus::Unloaded,
                    latest_version: Arc::new(AtomicU64::new(0)),
                    last_modified: None,
                });
                self.name_to_key.insert(name, key);
                key
            }
        };

        self.request_reload_key(key);
        key
    }

    /// 直接放入一个资源，不经过后台任务
    pub fn insert(&mut self, name: impl Into<String>, value: T) {
        self.lock_resources().insert(name.into(), Arc::new(value));
    }

    /// 在后台重新加载 `name`
    ///
    /// # 返回
    /// 名称未注册或者 library 已经关闭时返回 false
    pub fn request_reload(&mut self, name: &str) -> bool {
        match self.key(name) {
            Some(key) => self.request_reload_key(key),
            None => {
                log::warn!("HotReloadLibrary: `{}` is not registered", name);
                false
            }
        }
    }

    /// 重新加载所有修改时间发生变化的文件
    ///
    /// # 返回
    /// 提交的重载任务数量
    pub fn poll_changes(&mut self) -> usize {
        let changed = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.status != LoadStatus::Loading)
            .filter(|(_, entry)| {
                let modified = std::fs::metadata(&entry.path).and_then(|meta| meta.modified()).ok();
                modified.is_some() && modified != entry.last_modified
            })
            .map(|(key, _)| key)
            .collect::<Vec<_>>();

        changed.into_iter().filter(|&key| self.request_reload_key(key)).count()
    }

    /// 取出后台任务的结果，并更新资源状态
    ///
    /// 应该在主线程每帧调用一次。
    pub fn update(&mut self) -> Vec<ReloadEvent> {
        let events = self.event_receiver.try_iter().collect::<Vec<_>>();
        for event in &events {
            match event {
                ReloadEvent::Reloaded { name, version } => {
                    log::info!("reloaded `{}` (v{})", name, version);
                    self.set_status(name, *version, LoadStatus::Ready);
                }
                ReloadEvent::Failed { name, version, error } => {
                    log::error!("failed to reload `{}` (v{}): {}", name, version, error);
                    self.set_status(name, *version, LoadStatus::Failed);
                }
                ReloadEvent::Stale { name, version } => {
                    log::debug!("drop stale reload of `{}` (v{})", name, version);
                }
                ReloadEvent::Cancelled { name, version } => {
                    log::debug!("reload of `{}` (v{}) cancelled", name, version);
                    // 没有新的结果，回到取消之前的状态
                    let status = if self.lock_resources().contains_key(name) {
                        LoadStatus::Ready
                    } else {
                        LoadStatus::Unloaded
                    };
                    self.set_status(name, *version, status);
                }
            }
        }
        events
    }

    /// 等待当前已经提交的任务全部结束，不影响之后的请求
    pub fn wait_idle(&mut self) {
        // 关闭之后 wait_group 保持为 None，不能在这里复活
        if let Some(wait_group) = self.wait_group.as_mut() {
            std::mem::replace(wait_group, WaitGroup::new()).wait();
        }
    }

    fn set_status(&mut self, name: &str, version: u64, status: LoadStatus) {
        let Some(entry) = self.name_to_key.get(name).and_then(|&key| self.entries.get_mut(key)) else {
            return;
        };
        // 只有最新请求的结果才能改变状态
        if entry.latest_version.load(Ordering::Acquire) == version {
            entry.status = status;
        }
    }

    fn lock_resources(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<T>>> {
        self.resources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request_reload_key(&mut self, key: AssetKey) -> bool {
        let Some(wait_group) = self.wait_group.as_ref() else {
            log::warn!("HotReloadLibrary is shut down, reload request ignored");
            return false;
        };
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };

        let version = entry.latest_version.fetch_add(1, Ordering::AcqRel) + 1;
        entry.status = LoadStatus::Loading;
        entry.last_modified = std::fs::metadata(&entry.path).and_then(|meta| meta.modified()).ok();

        let task = ReloadTask {
            name: entry.name.clone(),
            path: entry.path.clone(),
            version,
            latest_version: entry.latest_version.clone(),
            loader: self.loader.clone(),
            resources: self.resources.clone(),
            cancelled: self.cancelled.clone(),
            events: self.event_sender.clone(),
        };
        let wait_group = wait_group.clone();
        self.pool.spawn(move || {
            task.run();
            drop(wait_group);
        });
        true
    }
}

/// 在 worker 线程中执行的一次重载
struct ReloadTask<T: Send + Sync + 'static> {
    name: String,
    path: PathBuf,
    version: u64,
    latest_version: Arc<AtomicU64>,
    loader: Arc<dyn AssetLoader<T>>,
    resources: ResourceMap<T>,
    cancelled: Arc<AtomicBool>,
    events: Sender<ReloadEvent>,
}
impl<T: Send + Sync + 'static> ReloadTask<T> {
    fn run(self) {
        let _span = tracy_client::span!("HotReloadLibrary::reload");
        let event = self.load_and_swap();
        // 接收端只会随 library 一起销毁，发送失败说明已经没有人关心结果
        let _ = self.events.send(event);
    }

    fn load_and_swap(&self) -> ReloadEvent {
        let name = self.name.clone();
        let version = self.version;

        if self.cancelled.load(Ordering::Acquire) {
            return ReloadEvent::Cancelled { name, version };
        }
        if self.is_stale() {
            return ReloadEvent::Stale { name, version };
        }

        // 加载期间不持有锁
        let value = match self.loader.load(&self.path) {
            Ok(value) => value,
            Err(e) => {
                return ReloadEvent::Failed {
                    name,
                    version,
                    error: format!("{e:#}"),
                };
            }
        };

        let mut resources = self.resources.lock().unwrap_or_else(PoisonError::into_inner);
        if self.cancelled.load(Ordering::Acquire) {
            return ReloadEvent::Cancelled { name, version };
        }
        if self.is_stale() {
            return ReloadEvent::Stale { name, version };
        }
        resources.insert(name.clone(), Arc::new(value));
        ReloadEvent::Reloaded { name, version }
    }

    #[inline]
    fn is_stale(&self) -> bool {
        self.latest_version.load(Ordering::Acquire) != self.version
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::loader::TextLoader;

    fn temp_file(tag: &str, content: &str) -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let path = std::env::temp_dir().join(format!(
            "tessera-hot-reload-{}-{}-{}.txt",
            tag,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_and_reload() {
        let path = temp_file("reload", "first");
        let mut library = HotReloadLibrary::new(2, TextLoader).unwrap();

        library.load("shader", &path);
        assert_eq!(library.status("shader"), Some(LoadStatus::Loading));
        library.wait_idle();
        let events = library.update();
        assert_eq!(events, vec![ReloadEvent::Reloaded {
            name: "shader".to_string(),
            version: 1,
        }]);
        assert_eq!(library.status("shader"), Some(LoadStatus::Ready));
        assert_eq!(library.get("shader").as_deref().map(String::as_str), Some("first"));

        std::fs::write(&path, "second").unwrap();
        assert!(library.request_reload("shader"));
        library.wait_idle();
        library.update();
        assert_eq!(library.get("shader").as_deref().map(String::as_str), Some("second"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_failed_reload_keeps_old_value() {
        let path = temp_file("failed", "good");
        let mut library = HotReloadLibrary::new(1, TextLoader).unwrap();
        library.load("config", &path);
        library.wait_idle();
        library.update();

        std::fs::remove_file(&path).unwrap();
        library.request_reload("config");
        library.wait_idle();
        let events = library.update();
        assert!(matches!(events.as_slice(), [ReloadEvent::Failed { version: 2, .. }]));
        assert_eq!(library.status("config"), Some(LoadStatus::Failed));
        assert_eq!(library.get("config").as_deref().map(String::as_str), Some("good"));
    }

    #[test]
    fn test_only_latest_request_wins() {
        let path = temp_file("stale", "value");
        // 所有请求提交之后才放行加载
        let (gate_sender, gate) = crossbeam_channel::unbounded::<()>();
        let loader = move |path: &Path| -> anyhow::Result<String> {
            gate.recv().map_err(|_| anyhow::anyhow!("gate closed"))?;
            Ok(std::fs::read_to_string(path)?)
        };
        let mut library = HotReloadLibrary::new(1, loader).unwrap();
        library.load("a", &path);
        library.request_reload("a");
        library.request_reload("a");
        for _ in 0..3 {
            gate_sender.send(()).unwrap();
        }
        library.wait_idle();

        let events = library.update();
        assert_eq!(events.len(), 3);
        let stale = events.iter().filter(|event| matches!(event, ReloadEvent::Stale { .. })).count();
        assert_eq!(stale, 2);
        assert!(events.contains(&ReloadEvent::Reloaded {
            name: "a".to_string(),
            version: 3,
        }));
        assert_eq!(library.status("a"), Some(LoadStatus::Ready));
        assert_eq!(library.get("a").as_deref().map(String::as_str), Some("value"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_shutdown_rejects_new_requests() {
        let path = temp_file("shutdown", "x");
        let mut library = HotReloadLibrary::new(1, TextLoader).unwrap();
        library.load("x", &path);
        library.shutdown();
        assert!(library.is_shutdown());

        // shutdown 已经等待所有任务结束
        let events = library.update();
        assert_eq!(events.len(), 1);
        assert!(!library.request_reload("x"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_wait_idle_after_shutdown_stays_shut_down() {
        let path = temp_file("idle-after-shutdown", "x");
        let mut library = HotReloadLibrary::new(1, TextLoader).unwrap();
        library.load("x", &path);
        library.shutdown();
        library.update();

        library.wait_idle();
        assert!(library.is_shutdown());
        assert!(!library.request_reload("x"));
        assert!(library.update().is_empty());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_cancelled_reload_restores_status() {
        let path = temp_file("cancel-status", "new");
        let (gate_sender, gate) = crossbeam_channel::unbounded::<()>();
        let loader = move |path: &Path| -> anyhow::Result<String> {
            gate.recv().map_err(|_| anyhow::anyhow!("gate closed"))?;
            Ok(std::fs::read_to_string(path)?)
        };
        let mut library = HotReloadLibrary::new(1, loader).unwrap();
        library.insert("kept", "old".to_string());
        library.load("kept", &path);
        library.load("fresh", &path);

        // shutdown 设置取消标记之后才放行加载
        let release = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(100));
            for _ in 0..2 {
                let _ = gate_sender.send(());
            }
        });
        library.shutdown();
        release.join().unwrap();

        let events = library.update();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|event| matches!(event, ReloadEvent::Cancelled { .. })));
        assert_eq!(library.status("kept"), Some(LoadStatus::Ready));
        assert_eq!(library.get("kept").as_deref().map(String::as_str), Some("old"));
        assert_eq!(library.status("fresh"), Some(LoadStatus::Unloaded));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_unknown_name() {
        let mut library = HotReloadLibrary::new(1, TextLoader).unwrap();
        assert!(!library.request_reload("nope"));
        assert!(library.status("nope").is_none());
        library.insert("inline", "value".to_string());
        assert_eq!(library.get("inline").as_deref().map(String::as_str), Some("value"));
    }
}
