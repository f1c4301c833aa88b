//! 不依赖 GPU 的设备实现
//!
//! 只分配递增的伪句柄，并统计创建/销毁次数，
//! 供单元测试与 headless app 使用。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use ash::vk;
use ash::vk::Handle;

use crate::device::GfxDevice;
use crate::error::GfxError;
use crate::pipeline::{GfxPipeline, GfxPipelineDesc};
use crate::texture::{GfxTexture, GfxTextureDesc, VulkanFormatUtils};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeadlessDeviceStats {
    pub textures_created: u64,
    pub textures_destroyed: u64,
    pub pipelines_created: u64,
    pub pipelines_destroyed: u64,
    /// 当前存活的 texture 估算占用的字节数
    pub live_texture_bytes: u64,
}

pub struct HeadlessDevice {
    name: String,
    next_raw_handle: Cell<u64>,

    /// 显存预算，超出时创建 texture 失败，用于模拟 OOM
    memory_budget: Cell<Option<u64>>,

    /// image -> 估算字节数
    live_textures: RefCell<HashMap<u64, u64>>,
    live_pipelines: RefCell<HashMap<u64, String>>,

    stats: Cell<HeadlessDeviceStats>,
}
impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new("headless")
    }
}
// new & init
impl HeadlessDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            // 0 是 VK_NULL_HANDLE，从 1 开始分配
            next_raw_handle: Cell::new(1),
            memory_budget: Cell::new(None),
            live_textures: RefCell::new(HashMap::new()),
            live_pipelines: RefCell::new(HashMap::new()),
            stats: Cell::new(HeadlessDeviceStats::default()),
        }
    }

    /// 限制可分配的 texture 总字节数，None 表示不限制
    pub fn set_memory_budget(&self, budget: Option<u64>) {
        self.memory_budget.set(budget);
    }
}
// getter
impl HeadlessDevice {
    #[inline]
    pub fn stats(&self) -> HeadlessDeviceStats {
        self.stats.get()
    }

    #[inline]
    pub fn live_texture_count(&self) -> usize {
        self.live_textures.borrow().len()
    }

    #[inline]
    pub fn live_pipeline_count(&self) -> usize {
        self.live_pipelines.borrow().len()
    }
}
// tools
impl HeadlessDevice {
    fn alloc_raw_handle(&self) -> u64 {
        let raw = self.next_raw_handle.get();
        self.next_raw_handle.set(raw + 1);
        raw
    }

    fn update_stats(&self, f: impl FnOnce(&mut HeadlessDeviceStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}
impl GfxDevice for HeadlessDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_texture(&self, desc: &GfxTextureDesc, debug_name: &str) -> Result<GfxTexture, GfxError> {
        if desc.width == 0 || desc.height == 0 {
            return Err(GfxError::InvalidExtent {
                width: desc.width,
                height: desc.height,
            });
        }
        if VulkanFormatUtils::pixel_size_in_bytes(desc.format).is_none() {
            return Err(GfxError::UnsupportedFormat(desc.format));
        }

        let bytes = desc.approx_bytes();
        let live_bytes = self.stats.get().live_texture_bytes;
        if let Some(budget) = self.memory_budget.get() {
            if live_bytes + bytes > budget {
                return Err(GfxError::OutOfDeviceMemory {
                    requested: bytes,
                    available: budget.saturating_sub(live_bytes),
                });
            }
        }

        let raw_image = self.alloc_raw_handle();
        let raw_view = self.alloc_raw_handle();
        self.live_textures.borrow_mut().insert(raw_image, bytes);
        self.update_stats(|stats| {
            stats.textures_created += 1;
            stats.live_texture_bytes += bytes;
        });
        log::debug!(
            "[{}] create texture `{}`: {}x{} {:?}",
            self.name,
            debug_name,
            desc.width,
            desc.height,
            desc.format
        );

        Ok(GfxTexture {
            image: vk::Image::from_raw(raw_image),
            view: vk::ImageView::from_raw(raw_view),
            format: desc.format,
            extent: desc.extent(),
            samples: desc.samples.max(1),
        })
    }

    fn destroy_texture(&self, texture: &GfxTexture) {
        let Some(bytes) = self.live_textures.borrow_mut().remove(&texture.image.as_raw()) else {
            log::error!("[{}] destroy unknown texture: {:?}", self.name, texture.image);
            return;
        };
        self.update_stats(|stats| {
            stats.textures_destroyed += 1;
            stats.live_texture_bytes -= bytes;
        });
    }

    fn create_graphics_pipeline(&self, desc: &GfxPipelineDesc, debug_name: &str) -> Result<GfxPipeline, GfxError> {
        if desc.shader.is_empty() {
            return Err(GfxError::MissingShader(desc.shader.clone()));
        }

        let raw_pipeline = self.alloc_raw_handle();
        let raw_layout = self.alloc_raw_handle();
        self.live_pipelines.borrow_mut().insert(raw_pipeline, debug_name.to_string());
        self.update_stats(|stats| stats.pipelines_created += 1);
        log::debug!("[{}] create pipeline `{}` with shader `{}`", self.name, debug_name, desc.shader);

        Ok(GfxPipeline {
            pipeline: vk::Pipeline::from_raw(raw_pipeline),
            layout: vk::PipelineLayout::from_raw(raw_layout),
            bind_point: vk::PipelineBindPoint::GRAPHICS,
        })
    }

    fn destroy_graphics_pipeline(&self, pipeline: &GfxPipeline) {
        if self.live_pipelines.borrow_mut().remove(&pipeline.pipeline.as_raw()).is_none() {
            log::error!("[{}] destroy unknown pipeline: {:?}", self.name, pipeline.pipeline);
            return;
        }
        self.update_stats(|stats| stats.pipelines_destroyed += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color_desc(width: u32, height: u32) -> GfxTextureDesc {
        GfxTextureDesc {
            width,
            height,
            samples: 1,
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
        }
    }

    #[test]
    fn test_create_destroy_texture() {
        let device = HeadlessDevice::default();
        let texture = device.create_texture(&color_desc(4, 4), "t0").unwrap();
        assert_ne!(texture.image, vk::Image::null());
        assert_eq!(device.live_texture_count(), 1);
        assert_eq!(device.stats().live_texture_bytes, 64);

        device.destroy_texture(&texture);
        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.stats().textures_destroyed, 1);
        assert_eq!(device.stats().live_texture_bytes, 0);

        // 重复销毁只会记录错误
        device.destroy_texture(&texture);
        assert_eq!(device.stats().textures_destroyed, 1);
    }

    #[test]
    fn test_memory_budget() {
        let device = HeadlessDevice::default();
        device.set_memory_budget(Some(100));
        assert!(device.create_texture(&color_desc(4, 4), "fits").is_ok());
        let err = device.create_texture(&color_desc(4, 4), "too-big").unwrap_err();
        assert!(matches!(err, GfxError::OutOfDeviceMemory { requested: 64, available: 36 }));
    }

    #[test]
    fn test_invalid_extent() {
        let device = HeadlessDevice::default();
        assert!(matches!(
            device.create_texture(&color_desc(0, 4), "empty"),
            Err(GfxError::InvalidExtent { width: 0, height: 4 })
        ));
    }
}
