//! Tessera GFX 层
//!
//! 渲染核心只通过 [`GfxDevice`] 这一窄接口和图形设备打交道：
//! 创建/销毁 texture 与 graphics pipeline。
//!
//! - [`headless::HeadlessDevice`]：不依赖 GPU 的实现，用于测试和离线运行
//! - `vulkan::VulkanDevice`：基于 ash + vk-mem 的实现（需要开启 `vulkan` feature）

pub mod device;
pub mod error;
pub mod headless;
pub mod pipeline;
pub mod texture;

#[cfg(feature = "vulkan")]
pub mod vulkan;

pub use device::{GfxDevice, SharedGfxDevice};
pub use error::GfxError;
pub use pipeline::{GfxPipeline, GfxPipelineDesc};
pub use texture::{GfxTexture, GfxTextureDesc, VulkanFormatUtils};
