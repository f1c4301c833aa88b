//! 双缓冲的 render target 与 texture 池
//!
//! 每个具名 target 持有两张形状相同的 texture：本帧写入 `write`，读取上一帧的 `read`。
//! target 的 texture 来自 pool，尺寸变化时旧的一对会归还给 pool，再按新的 state 取一对。
//!
//! 帧边界的约定由调用者负责：`execute_all` 之前调用 `ensure_*`，帧末调用 [`TextureRegistry::swap_targets`]。

use ash::vk;
use indexmap::IndexMap;
use tessera_gfx::{GfxError, GfxTexture, SharedGfxDevice};

use crate::handle::Handle;
use crate::multi_buffer::DoubleBuffer;
use crate::pool::{Pool, PoolStats};
use crate::texture::{TextureFactory, TextureRecord, TextureState};

/// viewport target 的名称
pub const VIEWPORT_TARGET: &str = "viewport";

/// target 的最小尺寸，更小的请求会被放大到这个尺寸
pub const MIN_TARGET_EXTENT: u32 = 2;

#[derive(Clone, Debug, Default)]
pub struct TextureTarget {
    buffers: DoubleBuffer<Handle>,
    /// None 表示还没有获取过 texture
    state: Option<TextureState>,
}
// getter
impl TextureTarget {
    /// 两个 slot 都已经填充
    #[inline]
    pub fn valid(&self) -> bool {
        self.state.is_some() && self.buffers.iter().all(|handle| !handle.is_null())
    }

    #[inline]
    pub fn state(&self) -> Option<&TextureState> {
        self.state.as_ref()
    }

    #[inline]
    pub fn read(&self) -> Handle {
        *self.buffers.read()
    }

    #[inline]
    pub fn write(&self) -> Handle {
        *self.buffers.write()
    }

    #[inline]
    pub fn read_index(&self) -> usize {
        self.buffers.read_index()
    }

    #[inline]
    pub fn write_index(&self) -> usize {
        self.buffers.write_index()
    }

    #[inline]
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.buffers.iter().copied()
    }
}
// tools
impl TextureTarget {
    #[inline]
    pub fn swap(&mut self) {
        self.buffers.swap();
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureRegistryStats {
    /// ensure_* 走快速路径的次数
    pub target_reuses: u64,
    /// ensure_* 重新获取 texture 的次数
    pub target_rebuilds: u64,
    pub transient_acquires: u64,
    pub transient_releases: u64,
}

/// 拥有 texture 的 storage、factory 与 pool，不与其他 registry 共享
pub struct TextureRegistry {
    factory: TextureFactory,
    pool: Pool<TextureState>,

    targets: IndexMap<String, TextureTarget>,

    viewport_format: vk::Format,
    viewport_usage: vk::ImageUsageFlags,

    stats: TextureRegistryStats,
    destroyed: bool,
}
// new & init
impl TextureRegistry {
    pub fn new(device: SharedGfxDevice, viewport_format: vk::Format) -> Self {
        Self {
            factory: TextureFactory::new(device),
            pool: Pool::new(),
            targets: IndexMap::new(),
            viewport_format,
            viewport_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_SRC,
            stats: TextureRegistryStats::default(),
            destroyed: false,
        }
    }
}
// destroy
impl TextureRegistry {
    pub fn destroy(mut self) {
        self.destroy_mut();
    }

    /// 销毁所有 texture，包括仍被外部持有、没有归还的
    pub fn destroy_mut(&mut self) {
        let _span = tracy_client::span!("TextureRegistry::destroy");
        if self.destroyed {
            return;
        }

        for (_, target) in self.targets.drain(..) {
            if let Some(state) = target.state {
                for handle in target.buffers.iter() {
                    self.pool.release(&state, *handle);
                }
            }
        }

        let leaked = self.pool.outstanding_count();
        if leaked > 0 {
            log::warn!("TextureRegistry: {} transient textures were never released", leaked);
        }
        self.pool.clear(&mut self.factory);
        self.factory.destroy_all();

        self.destroyed = true;
    }
}
impl Drop for TextureRegistry {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            assert!(self.destroyed);
        }
    }
}
// getter
impl TextureRegistry {
    #[inline]
    pub fn device(&self) -> &SharedGfxDevice {
        self.factory.device()
    }

    #[inline]
    pub fn viewport_format(&self) -> vk::Format {
        self.viewport_format
    }

    #[inline]
    pub fn stats(&self) -> TextureRegistryStats {
        self.stats
    }

    #[inline]
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    #[inline]
    pub fn target(&self, name: &str) -> Option<&TextureTarget> {
        self.targets.get(name)
    }

    #[inline]
    pub fn viewport_target(&self) -> Option<&TextureTarget> {
        self.target(VIEWPORT_TARGET)
    }

    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// 存活的 texture 数量（target、外部持有、pool 中空闲的都算）
    #[inline]
    pub fn live_texture_count(&self) -> usize {
        self.factory.live_count()
    }

    /// 所有存活 texture 的估算字节数
    #[inline]
    pub fn live_texture_bytes(&self) -> u64 {
        self.factory.live_texture_bytes()
    }

    #[inline]
    pub fn record(&self, handle: Handle) -> Option<&TextureRecord> {
        self.factory.try_get(handle)
    }

    /// 句柄失效（从未创建或者已经销毁）时返回 None，调用者应当跳过这次绘制
    #[inline]
    pub fn resolve_texture(&self, handle: Handle) -> Option<&GfxTexture> {
        self.factory.try_get(handle).map(|record| &record.native)
    }

    /// 本帧应当读取的 target texture
    pub fn resolve_target_read(&self, name: &str) -> Option<&GfxTexture> {
        self.target(name).and_then(|target| self.resolve_texture(target.read()))
    }

    /// 本帧应当写入的 target texture
    pub fn resolve_target_write(&self, name: &str) -> Option<&GfxTexture> {
        self.target(name).and_then(|target| self.resolve_texture(target.write()))
    }
}
// targets
impl TextureRegistry {
    pub fn ensure_viewport_target(&mut self, width: u32, height: u32) -> Result<(), GfxError> {
        let format = self.viewport_format;
        let usage = self.viewport_usage;
        self.ensure_target(VIEWPORT_TARGET, width, height, format, usage)
    }

    /// 确保名为 `name` 的 target 的两张 texture 都存在，并且形状与请求一致
    ///
    /// 尺寸小于 [`MIN_TARGET_EXTENT`] 时会被放大，而不是报错。
    /// 获取 texture 失败时 target 保持为无效状态，下次调用会重新尝试。
    pub fn ensure_target(
        &mut self,
        name: &str,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Result<(), GfxError> {
        self.ensure_target_state(name, TextureState::new(width, height, format, usage))
    }

    /// 与 [`TextureRegistry::ensure_target`] 相同，但可以指定完整的 state（例如 MSAA 采样数）
    pub fn ensure_target_state(&mut self, name: &str, state: TextureState) -> Result<(), GfxError> {
        let state = TextureState {
            width: state.width.max(MIN_TARGET_EXTENT),
            height: state.height.max(MIN_TARGET_EXTENT),
            num_samplers: state.num_samplers.max(1),
            ..state
        };

        let index = match self.targets.get_index_of(name) {
            Some(index) => index,
            None => self.targets.insert_full(name.to_string(), TextureTarget::default()).0,
        };

        // 快速路径：两个 slot 都有效且形状一致
        {
            let target = &self.targets[index];
            if target.state == Some(state) && target.handles().all(|handle| self.factory.valid(handle)) {
                self.stats.target_reuses += 1;
                return Ok(());
            }
        }

        let _span = tracy_client::span!("TextureRegistry::ensure_target");
        let target = &mut self.targets[index];

        // 旧的一对先取消 target 标记，再归还给 pool
        if let Some(old_state) = target.state.take() {
            for handle in target.buffers.iter() {
                if let Some(record) = self.factory.try_get_mut(*handle) {
                    record.is_target = false;
                }
                self.pool.release(&old_state, *handle);
            }
        }
        target.buffers.reset();

        let first = self.pool.acquire(&state, &mut self.factory)?;
        let second = match self.pool.acquire(&state, &mut self.factory) {
            Ok(handle) => handle,
            Err(e) => {
                self.pool.release(&state, first);
                log::error!("TextureRegistry: failed to create target `{}`: {}", name, e);
                return Err(e);
            }
        };
        debug_assert_ne!(first, second);

        for handle in [first, second] {
            if let Some(record) = self.factory.try_get_mut(handle) {
                record.is_target = true;
            }
        }
        target.buffers = DoubleBuffer::new([first, second]);
        target.state = Some(state);

        self.stats.target_rebuilds += 1;
        log::info!("TextureRegistry: target `{}` -> {}x{} {:?}", name, state.width, state.height, state.format);
        Ok(())
    }

    /// 帧末调用，交换所有 target 的读写位置
    pub fn swap_targets(&mut self) {
        self.targets.values_mut().for_each(TextureTarget::swap);
    }

    /// 移除 target，它的 texture 归还给 pool
    pub fn remove_target(&mut self, name: &str) -> bool {
        let Some(target) = self.targets.shift_remove(name) else {
            return false;
        };
        if let Some(state) = target.state {
            for handle in target.buffers.iter() {
                if let Some(record) = self.factory.try_get_mut(*handle) {
                    record.is_target = false;
                }
                self.pool.release(&state, *handle);
            }
        }
        true
    }
}
// transient textures
impl TextureRegistry {
    /// 获取一张临时 texture，用完后通过 [`TextureRegistry::release_texture`] 以同一个 state 归还
    pub fn acquire_texture(&mut self, state: &TextureState) -> Result<Handle, GfxError> {
        let handle = self.pool.acquire(state, &mut self.factory)?;
        self.stats.transient_acquires += 1;
        Ok(handle)
    }

    pub fn release_texture(&mut self, state: &TextureState, handle: Handle) -> bool {
        let released = self.pool.release(state, handle);
        if released {
            self.stats.transient_releases += 1;
        }
        released
    }

    /// 销毁 pool 中所有空闲的 texture
    pub fn trim(&mut self) -> usize {
        self.pool.trim(&mut self.factory)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use tessera_gfx::headless::HeadlessDevice;

    use super::*;

    fn registry() -> (Rc<HeadlessDevice>, TextureRegistry) {
        let device = Rc::new(HeadlessDevice::default());
        let registry = TextureRegistry::new(device.clone(), vk::Format::R8G8B8A8_UNORM);
        (device, registry)
    }

    #[test]
    fn test_viewport_target_not_aliased() {
        let (_device, mut registry) = registry();
        assert!(registry.viewport_target().is_none());
        // 没有获取过 texture 的 target 无效
        let empty = TextureTarget::default();
        assert!(!empty.valid());
        assert!(empty.read().is_null() && empty.write().is_null());
        assert_ne!(empty.read_index(), empty.write_index());

        registry.ensure_viewport_target(64, 32).unwrap();
        let target = registry.viewport_target().unwrap();
        assert!(target.valid());
        assert_ne!(target.read(), target.write());

        let read = registry.resolve_texture(target.read()).unwrap();
        let write = registry.resolve_texture(target.write()).unwrap();
        assert_ne!(read.image, write.image);
        assert_eq!(write.extent, vk::Extent2D { width: 64, height: 32 });
        assert!(registry.record(target.write()).unwrap().is_target);

        registry.destroy_mut();
    }

    #[test]
    fn test_swap_exchanges_indices() {
        let (_device, mut registry) = registry();
        registry.ensure_viewport_target(16, 16).unwrap();
        let target = registry.viewport_target().unwrap();
        let (read, write) = (target.read(), target.write());
        let (read_index, write_index) = (target.read_index(), target.write_index());

        registry.swap_targets();
        let target = registry.viewport_target().unwrap();
        assert_eq!(target.read(), write);
        assert_eq!(target.write(), read);
        assert_eq!(target.read_index(), write_index);
        assert_eq!(target.write_index(), read_index);

        registry.destroy_mut();
    }

    #[test]
    fn test_same_size_is_reused() {
        let (device, mut registry) = registry();
        registry.ensure_viewport_target(100, 50).unwrap();
        let creations = registry.pool_stats().creations;

        registry.ensure_viewport_target(100, 50).unwrap();
        assert_eq!(registry.pool_stats().creations, creations);
        assert_eq!(registry.stats().target_reuses, 1);
        assert_eq!(registry.stats().target_rebuilds, 1);
        assert_eq!(device.stats().textures_created, 2);

        registry.destroy_mut();
    }

    #[test]
    fn test_resize_releases_and_acquires_one_pair() {
        let (_device, mut registry) = registry();
        registry.ensure_viewport_target(100, 50).unwrap();
        let old = registry.viewport_target().unwrap().clone();
        let before = registry.pool_stats();

        registry.ensure_viewport_target(200, 100).unwrap();
        let after = registry.pool_stats();
        assert_eq!(after.releases - before.releases, 2);
        assert_eq!(after.acquires - before.acquires, 2);

        // 旧的一对已经不是 target，回到 pool 中等待复用
        for handle in old.handles() {
            assert!(!registry.record(handle).unwrap().is_target);
        }
        assert_eq!(registry.live_texture_count(), 4);
        assert_eq!(registry.trim(), 2);
        assert_eq!(registry.live_texture_count(), 2);

        registry.destroy_mut();
    }

    #[test]
    fn test_degenerate_size_is_clamped() {
        let (_device, mut registry) = registry();
        registry.ensure_viewport_target(0, 1).unwrap();
        let state = *registry.viewport_target().unwrap().state().unwrap();
        assert_eq!((state.width, state.height), (MIN_TARGET_EXTENT, MIN_TARGET_EXTENT));

        registry.destroy_mut();
    }

    #[test]
    fn test_sample_count_is_part_of_state() {
        let (device, mut registry) = registry();
        let state = TextureState::new(8, 8, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::COLOR_ATTACHMENT);
        registry.ensure_target_state("msaa", state.with_samples(4)).unwrap();
        assert_eq!(registry.resolve_target_write("msaa").unwrap().samples, 4);

        registry.ensure_target_state("msaa", state.with_samples(4)).unwrap();
        assert_eq!(registry.stats().target_reuses, 1);
        registry.ensure_target_state("msaa", state).unwrap();
        assert_eq!(registry.stats().target_rebuilds, 2);
        assert_eq!(device.stats().textures_created, 4);

        registry.destroy_mut();
    }

    #[test]
    fn test_resolve_invalid_handle() {
        let (_device, mut registry) = registry();
        assert!(registry.resolve_texture(Handle::INVALID).is_none());

        let state = TextureState::new(4, 4, vk::Format::R16G16B16A16_SFLOAT, vk::ImageUsageFlags::STORAGE);
        let handle = registry.acquire_texture(&state).unwrap();
        assert!(registry.resolve_texture(handle).is_some());
        assert!(registry.release_texture(&state, handle));
        registry.trim();
        assert!(registry.resolve_texture(handle).is_none());

        registry.destroy_mut();
    }

    #[test]
    fn test_failed_creation_leaves_target_invalid() {
        let (device, mut registry) = registry();
        // 只够一张 texture
        device.set_memory_budget(Some(8 * 8 * 4));
        assert!(matches!(
            registry.ensure_viewport_target(8, 8),
            Err(GfxError::OutOfDeviceMemory { .. })
        ));
        assert!(!registry.viewport_target().unwrap().valid());

        device.set_memory_budget(None);
        registry.ensure_viewport_target(8, 8).unwrap();
        assert!(registry.viewport_target().unwrap().valid());
        // 第一次失败时创建的那张被复用
        assert_eq!(device.stats().textures_created, 2);

        registry.destroy_mut();
    }

    #[test]
    fn test_destroy_releases_everything() {
        let (device, mut registry) = registry();
        registry.ensure_viewport_target(8, 8).unwrap();
        registry
            .ensure_target("gbuffer.normal", 8, 8, vk::Format::R16G16B16A16_SFLOAT, vk::ImageUsageFlags::SAMPLED)
            .unwrap();
        let state = TextureState::new(4, 4, vk::Format::R8_UNORM, vk::ImageUsageFlags::STORAGE);
        registry.acquire_texture(&state).unwrap();
        assert_eq!(registry.target_names().collect::<Vec<_>>(), vec![VIEWPORT_TARGET, "gbuffer.normal"]);

        registry.destroy_mut();
        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.stats().live_texture_bytes, 0);
    }
}
