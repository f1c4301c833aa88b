//! Tessera 渲染接口层
//!
//! 自底向上：
//! - [`handle::Handle`]：(id, generation) 代际句柄
//! - [`slot_storage::SlotStorage`]：发放/校验/回收句柄的 slot map
//! - [`state_key::StateKey`]：把任意可 hash 的请求描述包装成 map 的 key
//! - [`pool::Pool`] / [`cache::Cache`]：基于 [`factory::Factory`] 的两种复用策略
//! - [`texture_registry::TextureRegistry`]：双缓冲的 render target 与 texture 池
//! - [`pipeline_cache::PipelineCache`]：按 (render pass 格式 × 材质状态) 缓存 pipeline

pub mod cache;
pub mod factory;
pub mod frame_counter;
pub mod handle;
pub mod multi_buffer;
pub mod pipeline_cache;
pub mod pipeline_settings;
pub mod pool;
pub mod slot_storage;
pub mod state_key;
pub mod texture;
pub mod texture_registry;
