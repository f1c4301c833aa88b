//! graphics pipeline 的缓存
//!
//! key 为 (render pass 的 attachment 格式 × 材质状态)。
//! 没有可见效果的字段不参与 hash 与比较，避免同一条 pipeline 被重复编译。

use std::hash::{Hash, Hasher};

use ash::vk;
use tessera_gfx::{GfxError, GfxPipeline, GfxPipelineDesc, SharedGfxDevice};

use crate::cache::{Cache, CacheStats};
use crate::factory::Factory;
use crate::handle::Handle;
use crate::slot_storage::SlotStorage;

/// pass 输出的 attachment 格式
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RenderPassFormatState {
    pub color_formats: Vec<vk::Format>,
    /// 没有深度 attachment 时为 UNDEFINED
    pub depth_format: vk::Format,
    pub samples: u32,
}
impl RenderPassFormatState {
    pub fn new(color_formats: impl Into<Vec<vk::Format>>, depth_format: vk::Format) -> Self {
        Self {
            color_formats: color_formats.into(),
            depth_format,
            samples: 1,
        }
    }
}

/// 材质决定的固定管线状态
#[derive(Clone, Debug)]
pub struct MaterialState {
    pub shader: String,
    pub topology: vk::PrimitiveTopology,
    pub cull_mode: vk::CullModeFlags,
    pub blend_enable: bool,

    pub enable_depth_test: bool,
    /// 只有 enable_depth_test 时才有意义
    pub depth_write: bool,
    /// 只有 enable_depth_test 时才有意义
    pub compare_op: vk::CompareOp,
}
impl MaterialState {
    pub fn new(shader: impl Into<String>) -> Self {
        Self {
            shader: shader.into(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::BACK,
            blend_enable: false,
            enable_depth_test: false,
            depth_write: false,
            compare_op: vk::CompareOp::ALWAYS,
        }
    }

    /// 全屏 pass：不做剔除，不做深度测试
    pub fn fullscreen(shader: impl Into<String>) -> Self {
        Self {
            cull_mode: vk::CullModeFlags::NONE,
            ..Self::new(shader)
        }
    }

    #[inline]
    pub fn with_depth(mut self, depth_write: bool, compare_op: vk::CompareOp) -> Self {
        self.enable_depth_test = true;
        self.depth_write = depth_write;
        self.compare_op = compare_op;
        self
    }

    #[inline]
    pub fn with_blend(mut self) -> Self {
        self.blend_enable = true;
        self
    }
}
impl PartialEq for MaterialState {
    fn eq(&self, other: &Self) -> bool {
        let same_fixed = self.shader == other.shader
            && self.topology == other.topology
            && self.cull_mode == other.cull_mode
            && self.blend_enable == other.blend_enable
            && self.enable_depth_test == other.enable_depth_test;
        if !same_fixed {
            return false;
        }

        !self.enable_depth_test || (self.depth_write == other.depth_write && self.compare_op == other.compare_op)
    }
}
impl Eq for MaterialState {}
impl Hash for MaterialState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.shader.hash(state);
        self.topology.hash(state);
        self.cull_mode.hash(state);
        self.blend_enable.hash(state);
        self.enable_depth_test.hash(state);
        if self.enable_depth_test {
            self.depth_write.hash(state);
            self.compare_op.hash(state);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PipelineState {
    pub render_pass_state: RenderPassFormatState,
    pub material_state: MaterialState,
}
impl PipelineState {
    pub fn new(render_pass_state: RenderPassFormatState, material_state: MaterialState) -> Self {
        Self {
            render_pass_state,
            material_state,
        }
    }

    pub fn to_desc(&self) -> GfxPipelineDesc {
        let material = &self.material_state;
        GfxPipelineDesc {
            shader: material.shader.clone(),
            color_formats: self.render_pass_state.color_formats.clone(),
            depth_format: self.render_pass_state.depth_format,
            samples: self.render_pass_state.samples,
            topology: material.topology,
            cull_mode: material.cull_mode,
            blend_enable: material.blend_enable,
            depth_test: material.enable_depth_test,
            depth_write: material.enable_depth_test && material.depth_write,
            compare_op: if material.enable_depth_test { material.compare_op } else { vk::CompareOp::ALWAYS },
        }
    }
}

pub struct PipelineRecord {
    pub native: GfxPipeline,
    pub state: PipelineState,
}

pub struct PipelineFactory {
    storage: SlotStorage<PipelineRecord>,
    device: SharedGfxDevice,
}
impl PipelineFactory {
    pub fn new(device: SharedGfxDevice) -> Self {
        Self {
            storage: SlotStorage::new(),
            device,
        }
    }

    #[inline]
    pub fn try_get(&self, handle: Handle) -> Option<&PipelineRecord> {
        self.storage.try_get(handle)
    }
}
impl Factory for PipelineFactory {
    type State = PipelineState;
    type Error = GfxError;

    fn create(&mut self, state: &PipelineState) -> Result<Handle, GfxError> {
        let debug_name = format!("{}#{}", state.material_state.shader, self.storage.len());
        let native = self.device.create_graphics_pipeline(&state.to_desc(), &debug_name)?;
        Ok(self.storage.allocate(PipelineRecord {
            native,
            state: state.clone(),
        }))
    }

    fn destroy(&mut self, handle: Handle) {
        if let Some(record) = self.storage.take(handle) {
            self.device.destroy_graphics_pipeline(&record.native);
        }
    }
}

/// 一条 pipeline 对应一个不同的 [`PipelineState`]，在 cache 的生命周期内常驻
pub struct PipelineCache {
    factory: PipelineFactory,
    cache: Cache<PipelineState>,
    destroyed: bool,
}
// new & init
impl PipelineCache {
    pub fn new(device: SharedGfxDevice) -> Self {
        Self {
            factory: PipelineFactory::new(device),
            cache: Cache::new(),
            destroyed: false,
        }
    }
}
// destroy
impl PipelineCache {
    pub fn destroy(mut self) {
        self.destroy_mut();
    }

    pub fn destroy_mut(&mut self) {
        self.cache.clear(&mut self.factory);
        self.destroyed = true;
    }
}
impl Drop for PipelineCache {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            assert!(self.destroyed);
        }
    }
}
// getter
impl PipelineCache {
    #[inline]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    #[inline]
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// 只查询，不会编译新的 pipeline
    #[inline]
    pub fn get(&self, state: &PipelineState) -> Option<Handle> {
        self.cache.get(state)
    }

    #[inline]
    pub fn resolve(&self, handle: Handle) -> Option<&GfxPipeline> {
        self.factory.try_get(handle).map(|record| &record.native)
    }

    #[inline]
    pub fn record(&self, handle: Handle) -> Option<&PipelineRecord> {
        self.factory.try_get(handle)
    }
}
// tools
impl PipelineCache {
    pub fn get_or_create(&mut self, state: &PipelineState) -> Result<Handle, GfxError> {
        self.cache.get_or_create(state, &mut self.factory)
    }
}
