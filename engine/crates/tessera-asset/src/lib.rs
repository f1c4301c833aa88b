//! 资源热重载
//!
//! 文件 IO 是核心中唯一跨线程的部分：后台任务只会替换 [`hot_reload::HotReloadLibrary`]
//! 中 名称 -> 资源 的映射，不会接触 slot storage、pool 或者渲染图。

pub mod handle;
pub mod hot_reload;
pub mod loader;
