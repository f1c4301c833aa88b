use crate::handle::Handle;
use crate::state_key::State;

/// 根据 state 创建/销毁资源的工厂
///
/// Pool 与 Cache 只通过这个接口创建资源，不关心资源如何存放。
/// 具体的 factory 把 [`crate::slot_storage::SlotStorage`] 和某个图形设备绑定在一起：
/// `create` 调用设备创建原生资源并写入 storage，`destroy` 从 storage 中取出并交还设备。
pub trait Factory {
    type State: State;
    type Error;

    fn create(&mut self, state: &Self::State) -> Result<Handle, Self::Error>;

    /// 销毁句柄对应的资源，句柄失效时什么都不做
    fn destroy(&mut self, handle: Handle);
}
