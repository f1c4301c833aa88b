use std::path::Path;

use anyhow::Context;

/// 在 worker 线程中把文件解析成资源
pub trait AssetLoader<T>: Send + Sync + 'static {
    fn load(&self, path: &Path) -> anyhow::Result<T>;
}
impl<T, F> AssetLoader<T> for F
where
    F: Fn(&Path) -> anyhow::Result<T> + Send + Sync + 'static,
{
    fn load(&self, path: &Path) -> anyhow::Result<T> {
        self(path)
    }
}

/// 读取文件的原始字节
pub struct RawBytesLoader;
impl AssetLoader<Vec<u8>> for RawBytesLoader {
    fn load(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        std::fs::read(path).with_context(|| format!("读取文件失败: {}", path.display()))
    }
}

/// 读取 UTF-8 文本，例如 shader 源码或者配置
pub struct TextLoader;
impl AssetLoader<String> for TextLoader {
    fn load(&self, path: &Path) -> anyhow::Result<String> {
        std::fs::read_to_string(path).with_context(|| format!("读取文本失败: {}", path.display()))
    }
}
