//! Tessera 渲染图
//!
//! pass 通过名称声明依赖，[`render_graph::RenderGraph`] 在每次 `add_pass` 时校验整张图
//! （依赖存在且无环），并缓存一个拓扑顺序；`execute_all` 按这个顺序执行所有 pass，
//! pass 之间通过共享的 context（通常是 [`render_context::RenderContext`]）传递数据。

pub mod error;
pub mod render_context;
pub mod render_graph;
pub mod render_pass;

pub use error::RenderGraphError;
