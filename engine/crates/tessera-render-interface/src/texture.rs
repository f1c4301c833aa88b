use ash::vk;
use tessera_gfx::{GfxError, GfxTexture, GfxTextureDesc, SharedGfxDevice};

use crate::factory::Factory;
use crate::handle::Handle;
use crate::slot_storage::SlotStorage;

/// 用于 texture 复用的 key：形状相同的 texture 可以互相替代
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureState {
    pub width: u32,
    pub height: u32,
    /// MSAA 采样数
    pub num_samplers: u32,
    pub format: vk::Format,
    pub usage_flags: vk::ImageUsageFlags,
}
impl TextureState {
    pub fn new(width: u32, height: u32, format: vk::Format, usage_flags: vk::ImageUsageFlags) -> Self {
        Self {
            width,
            height,
            num_samplers: 1,
            format,
            usage_flags,
        }
    }

    #[inline]
    pub fn with_samples(mut self, num_samplers: u32) -> Self {
        self.num_samplers = num_samplers;
        self
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    #[inline]
    pub fn to_desc(&self) -> GfxTextureDesc {
        GfxTextureDesc {
            width: self.width,
            height: self.height,
            samples: self.num_samplers,
            format: self.format,
            usage: self.usage_flags,
        }
    }
}

/// 句柄对应的 slot 中存放的内容，拥有原生 texture
#[derive(Debug)]
pub struct TextureRecord {
    pub native: GfxTexture,
    pub state: TextureState,
    pub approx_bytes: u64,
    /// 是否正在作为 render target 使用
    pub is_target: bool,
}

/// 把 texture 的 slot storage 和图形设备绑定在一起
pub struct TextureFactory {
    storage: SlotStorage<TextureRecord>,
    device: SharedGfxDevice,
    /// 用于生成 debug name
    created_count: u64,
}
// new & init
impl TextureFactory {
    pub fn new(device: SharedGfxDevice) -> Self {
        Self {
            storage: SlotStorage::new(),
            device,
            created_count: 0,
        }
    }
}
// getter
impl TextureFactory {
    #[inline]
    pub fn device(&self) -> &SharedGfxDevice {
        &self.device
    }

    #[inline]
    pub fn try_get(&self, handle: Handle) -> Option<&TextureRecord> {
        self.storage.try_get(handle)
    }

    #[inline]
    pub fn try_get_mut(&mut self, handle: Handle) -> Option<&mut TextureRecord> {
        self.storage.try_get_mut(handle)
    }

    #[inline]
    pub fn valid(&self, handle: Handle) -> bool {
        self.storage.valid(handle)
    }

    /// 存活的 texture 数量
    #[inline]
    pub fn live_count(&self) -> usize {
        self.storage.len()
    }

    pub fn live_texture_bytes(&self) -> u64 {
        self.storage.iter().map(|(_, record)| record.approx_bytes).sum()
    }
}
// destroy
impl TextureFactory {
    /// 销毁所有仍然存活的 texture，包括 pool 没有回收的
    pub fn destroy_all(&mut self) {
        let handles = self.storage.iter().map(|(handle, _)| handle).collect::<Vec<_>>();
        for handle in handles {
            self.destroy(handle);
        }
        self.storage.clear();
    }
}
impl Factory for TextureFactory {
    type State = TextureState;
    type Error = GfxError;

    fn create(&mut self, state: &TextureState) -> Result<Handle, GfxError> {
        let desc = state.to_desc();
        let debug_name = format!("texture-{}", self.created_count);
        let native = self.device.create_texture(&desc, &debug_name)?;
        self.created_count += 1;

        Ok(self.storage.allocate(TextureRecord {
            native,
            state: *state,
            approx_bytes: desc.approx_bytes(),
            is_target: false,
        }))
    }

    fn destroy(&mut self, handle: Handle) {
        if let Some(record) = self.storage.take(handle) {
            self.device.destroy_texture(&record.native);
        }
    }
}
