use slotmap::new_key_type;

// 已注册资源的句柄，与名称一一对应
new_key_type! { pub struct AssetKey; }

/// 资源加载状态
///
/// 状态流转: Unloaded -> Loading -> Ready
///                          \-> Failed
/// Ready / Failed 之后再次请求重载会回到 Loading，旧的资源在新资源就绪之前仍然可用。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LoadStatus {
    /// 已注册，尚未请求加载
    Unloaded,
    /// 后台任务正在读取/解析
    Loading,
    /// 最近一次加载成功
    Ready,
    /// 最近一次加载失败
    Failed,
}
