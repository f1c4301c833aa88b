use std::rc::Rc;

use crate::error::GfxError;
use crate::pipeline::{GfxPipeline, GfxPipelineDesc};
use crate::texture::{GfxTexture, GfxTextureDesc};

/// 图形设备的抽象边界
///
/// 渲染核心（Pool / Cache / Registry）不会直接调用底层图形 API，
/// 所有的设备对象都通过这里创建和销毁。
///
/// 方法都只需要 `&self`：底层 API（ash::Device、vk_mem::Allocator）本身就是 `&self` 调用，
/// 这样同一个设备可以被 texture factory 和 pipeline factory 共享。
///
/// 设备只在渲染线程上使用，因此不要求 `Send + Sync`。
pub trait GfxDevice {
    /// 设备名称，仅用于日志
    fn name(&self) -> &str;

    fn create_texture(&self, desc: &GfxTextureDesc, debug_name: &str) -> Result<GfxTexture, GfxError>;

    /// 销毁 texture，调用者需要保证 GPU 已经不再使用该资源
    fn destroy_texture(&self, texture: &GfxTexture);

    fn create_graphics_pipeline(&self, desc: &GfxPipelineDesc, debug_name: &str) -> Result<GfxPipeline, GfxError>;

    fn destroy_graphics_pipeline(&self, pipeline: &GfxPipeline);
}

/// 在多个 factory 之间共享的设备
pub type SharedGfxDevice = Rc<dyn GfxDevice>;
