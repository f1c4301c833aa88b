//! 延迟渲染管线
//!
//! 渲染图：
//! ```text
//! gbuffer -> lighting -> composite -> [ui] -> present
//! ```
//! 每帧 `execute_all` 之前确保所有 target 的尺寸与 viewport 一致，帧末交换双缓冲。

use ash::vk;
use tessera_gfx::{GfxError, SharedGfxDevice};
use tessera_render_graph::RenderGraphError;
use tessera_render_graph::render_context::{DrawItem, RecordedCommand, RenderContext};
use tessera_render_graph::render_graph::RenderGraph;
use tessera_render_graph::render_pass::{RenderPassInstance, RenderPassLayout, RenderPassType};
use tessera_render_interface::pipeline_cache::{MaterialState, PipelineState, RenderPassFormatState};
use tessera_render_interface::pipeline_settings::{DefaultRendererSettings, FrameSettings};
use tessera_render_interface::texture::TextureState;
use tessera_render_interface::texture_registry::VIEWPORT_TARGET;

use crate::config::RendererConfig;

/// 各个 target 的名称，同时也是 pass 输出的名称
pub struct DeferredTargets;
impl DeferredTargets {
    pub const GBUFFER_ALBEDO: &'static str = "gbuffer.albedo";
    pub const GBUFFER_NORMAL: &'static str = "gbuffer.normal";
    pub const GBUFFER_DEPTH: &'static str = "gbuffer.depth";
    pub const LIGHTING: &'static str = "lighting";
    pub const VIEWPORT: &'static str = VIEWPORT_TARGET;
}

/// 各个 pass 的名称
pub struct DeferredPasses;
impl DeferredPasses {
    pub const GBUFFER: &'static str = "gbuffer";
    pub const LIGHTING: &'static str = "lighting";
    pub const COMPOSITE: &'static str = "composite";
    pub const UI: &'static str = "ui";
    pub const PRESENT: &'static str = "present";
}

/// 一帧的统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub frame_id: u64,
    pub draw_calls: usize,
    pub skipped_draws: usize,
    pub presented: bool,
    pub pipelines: usize,
    pub live_textures: usize,
    pub live_texture_bytes: u64,
}

pub struct DeferredRenderer {
    graph: RenderGraph<RenderContext>,
    context: RenderContext,
    config: RendererConfig,
}
// new & init
impl DeferredRenderer {
    pub fn new(device: SharedGfxDevice, config: RendererConfig) -> Result<Self, RenderGraphError> {
        let frame_settings = config.frame_settings();
        let graph = Self::build_graph(&frame_settings, config.ui_overlay)?;
        log::info!("deferred render graph: {}", graph.execution_order().join(" -> "));

        Ok(Self {
            graph,
            context: RenderContext::new(device, frame_settings),
            config,
        })
    }

    fn build_graph(
        frame_settings: &FrameSettings,
        ui_overlay: bool,
    ) -> Result<RenderGraph<RenderContext>, RenderGraphError> {
        let mut graph = RenderGraph::new();

        graph.add_pass(Self::gbuffer_pass(frame_settings))?;
        graph.add_pass(Self::lighting_pass())?;
        graph.add_pass(Self::composite_pass(frame_settings))?;

        let present_after = if ui_overlay {
            graph.add_pass(Self::ui_pass(frame_settings))?;
            DeferredPasses::UI
        } else {
            DeferredPasses::COMPOSITE
        };
        graph.add_pass(
            RenderPassInstance::new(DeferredPasses::PRESENT, |ctx: &mut RenderContext| {
                match ctx.output(DeferredTargets::VIEWPORT).and_then(|h| ctx.texture_registry.resolve_texture(h)) {
                    Some(texture) => {
                        let image = texture.image;
                        ctx.record(RecordedCommand::Present(image));
                    }
                    None => ctx.record(RecordedCommand::SkippedDraw {
                        label: DeferredPasses::PRESENT.to_string(),
                    }),
                }
            })
            .with_type(RenderPassType::Present)
            .depends_on(present_after),
        )?;

        Ok(graph)
    }
}
// destroy
impl DeferredRenderer {
    pub fn destroy(mut self) {
        self.destroy_mut();
    }

    pub fn destroy_mut(&mut self) {
        self.graph.clear();
        self.context.destroy_mut();
    }
}
// getter
impl DeferredRenderer {
    #[inline]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    #[inline]
    pub fn graph(&self) -> &RenderGraph<RenderContext> {
        &self.graph
    }

    #[inline]
    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    #[inline]
    pub fn context_mut(&mut self) -> &mut RenderContext {
        &mut self.context
    }
}
// frame
impl DeferredRenderer {
    /// 下一帧开始时生效
    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.viewport_width = width;
        self.config.viewport_height = height;
        self.context.frame_settings.frame_extent = vk::Extent2D { width, height };
    }

    /// 确保所有 target 都与当前 viewport 一致
    pub fn prepare_targets(&mut self) -> Result<(), GfxError> {
        let _span = tracy_client::span!("DeferredRenderer::prepare_targets");
        let settings = self.context.frame_settings;
        let extent = settings.frame_extent;
        let registry = &mut self.context.texture_registry;

        let attachment = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED;
        let gbuffer = |format: vk::Format, usage: vk::ImageUsageFlags| {
            TextureState::new(extent.width, extent.height, format, usage).with_samples(settings.msaa_samples)
        };

        registry.ensure_target_state(
            DeferredTargets::GBUFFER_ALBEDO,
            gbuffer(DefaultRendererSettings::GBUFFER_ALBEDO_FORMAT, attachment),
        )?;
        registry.ensure_target_state(
            DeferredTargets::GBUFFER_NORMAL,
            gbuffer(DefaultRendererSettings::GBUFFER_NORMAL_FORMAT, attachment),
        )?;
        registry.ensure_target_state(
            DeferredTargets::GBUFFER_DEPTH,
            gbuffer(
                settings.depth_format,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            ),
        )?;
        registry.ensure_target(
            DeferredTargets::LIGHTING,
            extent.width,
            extent.height,
            DefaultRendererSettings::HDR_COLOR_FORMAT,
            attachment | vk::ImageUsageFlags::STORAGE,
        )?;
        registry.ensure_viewport_target(extent.width, extent.height)?;
        Ok(())
    }

    /// 渲染一帧
    ///
    /// 设备创建 target 失败时返回错误，这一帧不会执行任何 pass。
    pub fn render_frame(&mut self, draw_list: Vec<DrawItem>) -> Result<FrameReport, GfxError> {
        let _span = tracy_client::span!("DeferredRenderer::render_frame");

        self.context.begin_frame();
        self.prepare_targets()?;

        self.context.draw_list = draw_list;
        self.graph.execute_all(&mut self.context);

        let report = FrameReport {
            frame_id: self.context.frame_counter.frame_id(),
            draw_calls: self.context.draw_call_count(),
            skipped_draws: self.context.skipped_draw_count(),
            presented: self.context.commands().iter().any(|command| matches!(command, RecordedCommand::Present(_))),
            pipelines: self.context.pipeline_cache.len(),
            live_textures: self.context.texture_registry.live_texture_count(),
            live_texture_bytes: self.context.texture_registry.live_texture_bytes(),
        };

        self.context.end_frame();
        Ok(report)
    }
}
// passes
impl DeferredRenderer {
    fn gbuffer_pass(settings: &FrameSettings) -> RenderPassInstance<RenderContext> {
        let mut pass_state = RenderPassFormatState::new(
            [DefaultRendererSettings::GBUFFER_ALBEDO_FORMAT, DefaultRendererSettings::GBUFFER_NORMAL_FORMAT],
            settings.depth_format,
        );
        pass_state.samples = settings.msaa_samples;
        let layout = RenderPassLayout::new(DeferredTargets::GBUFFER_ALBEDO, pass_state.color_formats.clone())
            .with_depth(settings.depth_format);

        RenderPassInstance::new(DeferredPasses::GBUFFER, move |ctx: &mut RenderContext| {
            for target in [DeferredTargets::GBUFFER_ALBEDO, DeferredTargets::GBUFFER_NORMAL, DeferredTargets::GBUFFER_DEPTH] {
                if let Some(handle) = ctx.texture_registry.target(target).map(|target| target.write()) {
                    ctx.publish_output(target, handle);
                }
            }
            if !begin_rendering(ctx, DeferredPasses::GBUFFER, DeferredTargets::GBUFFER_ALBEDO) {
                return;
            }

            let draws = std::mem::take(&mut ctx.draw_list);
            for draw in &draws {
                // 材质 texture 失效时跳过，而不是中断整个 pass
                if ctx.texture_registry.resolve_texture(draw.texture).is_none() {
                    ctx.record(RecordedCommand::SkippedDraw {
                        label: draw.label.clone(),
                    });
                    continue;
                }
                let material = draw.material.clone().with_depth(true, vk::CompareOp::LESS);
                if !bind_pipeline(ctx, &PipelineState::new(pass_state.clone(), material), &draw.label) {
                    continue;
                }
                ctx.record(RecordedCommand::Draw {
                    label: draw.label.clone(),
                    vertex_count: draw.vertex_count,
                    instance_count: draw.instance_count,
                });
            }
            ctx.draw_list = draws;

            ctx.record(RecordedCommand::EndRendering);
        })
        .with_type(RenderPassType::Geometry)
        .with_layout(layout)
    }

    fn lighting_pass() -> RenderPassInstance<RenderContext> {
        let pass_state = RenderPassFormatState::new([DefaultRendererSettings::HDR_COLOR_FORMAT], vk::Format::UNDEFINED);
        let layout = RenderPassLayout::new(DeferredTargets::LIGHTING, pass_state.color_formats.clone());

        RenderPassInstance::new(DeferredPasses::LIGHTING, move |ctx: &mut RenderContext| {
            let inputs = [DeferredTargets::GBUFFER_ALBEDO, DeferredTargets::GBUFFER_NORMAL, DeferredTargets::GBUFFER_DEPTH];
            if inputs.iter().any(|input| ctx.resolve_output(input).is_none()) {
                ctx.record(RecordedCommand::SkippedDraw {
                    label: DeferredPasses::LIGHTING.to_string(),
                });
                return;
            }
            fullscreen_pass(
                ctx,
                DeferredPasses::LIGHTING,
                DeferredTargets::LIGHTING,
                &PipelineState::new(pass_state.clone(), MaterialState::fullscreen("deferred_lighting")),
            );
        })
        .with_type(RenderPassType::Lighting)
        .with_layout(layout)
        .depends_on(DeferredPasses::GBUFFER)
    }

    fn composite_pass(settings: &FrameSettings) -> RenderPassInstance<RenderContext> {
        let pass_state = RenderPassFormatState::new([settings.color_format], vk::Format::UNDEFINED);
        let layout = RenderPassLayout::new(DeferredTargets::VIEWPORT, pass_state.color_formats.clone());

        RenderPassInstance::new(DeferredPasses::COMPOSITE, move |ctx: &mut RenderContext| {
            if ctx.resolve_output(DeferredTargets::LIGHTING).is_none() {
                ctx.record(RecordedCommand::SkippedDraw {
                    label: DeferredPasses::COMPOSITE.to_string(),
                });
                return;
            }
            fullscreen_pass(
                ctx,
                DeferredPasses::COMPOSITE,
                DeferredTargets::VIEWPORT,
                &PipelineState::new(pass_state.clone(), MaterialState::fullscreen("tonemap")),
            );
        })
        .with_type(RenderPassType::Composite)
        .with_layout(layout)
        .depends_on(DeferredPasses::LIGHTING)
    }

    fn ui_pass(settings: &FrameSettings) -> RenderPassInstance<RenderContext> {
        let pass_state = RenderPassFormatState::new([settings.color_format], vk::Format::UNDEFINED);
        let layout = RenderPassLayout::new(DeferredTargets::VIEWPORT, pass_state.color_formats.clone());

        RenderPassInstance::new(DeferredPasses::UI, move |ctx: &mut RenderContext| {
            // 叠加在 composite 的结果之上
            fullscreen_pass(
                ctx,
                DeferredPasses::UI,
                DeferredTargets::VIEWPORT,
                &PipelineState::new(pass_state.clone(), MaterialState::fullscreen("ui_overlay").with_blend()),
            );
        })
        .with_type(RenderPassType::Ui)
        .with_layout(layout)
        .depends_on(DeferredPasses::COMPOSITE)
    }
}

/// 开始向 target 的写入端渲染，并把它发布为同名输出
///
/// target 无法解析时记录一次跳过并返回 false。
fn begin_rendering(ctx: &mut RenderContext, pass: &str, target: &str) -> bool {
    let Some(handle) = ctx.texture_registry.target(target).map(|target| target.write()) else {
        ctx.record(RecordedCommand::SkippedDraw { label: pass.to_string() });
        return false;
    };
    let Some(texture) = ctx.texture_registry.resolve_texture(handle).copied() else {
        ctx.record(RecordedCommand::SkippedDraw { label: pass.to_string() });
        return false;
    };

    ctx.set_active_target(target);
    ctx.publish_output(target, handle);
    ctx.record(RecordedCommand::BeginRendering {
        pass: pass.to_string(),
        target: texture.image,
        extent: texture.extent,
    });
    true
}

fn bind_pipeline(ctx: &mut RenderContext, state: &PipelineState, label: &str) -> bool {
    let pipeline = match ctx.pipeline_cache.get_or_create(state) {
        Ok(handle) => ctx.pipeline_cache.resolve(handle).map(|pipeline| pipeline.pipeline),
        Err(e) => {
            log::error!("failed to create pipeline for `{}`: {}", label, e);
            None
        }
    };
    match pipeline {
        Some(pipeline) => {
            ctx.record(RecordedCommand::BindPipeline(pipeline));
            true
        }
        None => {
            ctx.record(RecordedCommand::SkippedDraw { label: label.to_string() });
            false
        }
    }
}

/// 全屏三角形
fn fullscreen_pass(ctx: &mut RenderContext, pass: &str, target: &str, state: &PipelineState) {
    if !begin_rendering(ctx, pass, target) {
        return;
    }
    if bind_pipeline(ctx, state, pass) {
        ctx.record(RecordedCommand::Draw {
            label: pass.to_string(),
            vertex_count: 3,
            instance_count: 1,
        });
    }
    ctx.record(RecordedCommand::EndRendering);
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use tessera_gfx::headless::HeadlessDevice;
    use tessera_render_interface::handle::Handle;

    use super::*;

    fn small_config() -> RendererConfig {
        RendererConfig {
            viewport_width: 64,
            viewport_height: 32,
            ..Default::default()
        }
    }

    fn mesh(label: &str, texture: Handle) -> DrawItem {
        DrawItem {
            label: label.to_string(),
            material: MaterialState::new("mesh"),
            texture,
            vertex_count: 36,
            instance_count: 1,
        }
    }

    #[test]
    fn test_graph_order() {
        let mut renderer = DeferredRenderer::new(Rc::new(HeadlessDevice::default()), small_config()).unwrap();
        assert_eq!(renderer.graph().execution_order(), vec!["gbuffer", "lighting", "composite", "present"]);
        renderer.destroy_mut();

        let config = RendererConfig {
            ui_overlay: true,
            ..small_config()
        };
        let mut renderer = DeferredRenderer::new(Rc::new(HeadlessDevice::default()), config).unwrap();
        assert_eq!(renderer.graph().execution_order(), vec!["gbuffer", "lighting", "composite", "ui", "present"]);
        renderer.destroy_mut();
    }

    #[test]
    fn test_empty_frame() {
        let device = Rc::new(HeadlessDevice::default());
        let mut renderer = DeferredRenderer::new(device.clone(), small_config()).unwrap();

        let report = renderer.render_frame(Vec::new()).unwrap();
        assert_eq!(report.frame_id, 0);
        // lighting + composite
        assert_eq!(report.draw_calls, 2);
        assert_eq!(report.skipped_draws, 0);
        assert!(report.presented);
        assert_eq!(report.pipelines, 2);
        // 5 个 target，各两张
        assert_eq!(report.live_textures, 10);
        assert_eq!(renderer.context().frame_counter.frame_id(), 1);

        renderer.destroy_mut();
        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.live_pipeline_count(), 0);
    }

    #[test]
    fn test_invalid_texture_is_skipped() {
        let device = Rc::new(HeadlessDevice::default());
        let mut renderer = DeferredRenderer::new(device.clone(), small_config()).unwrap();

        let state = TextureState::new(4, 4, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::SAMPLED);
        let texture = renderer.context_mut().texture_registry.acquire_texture(&state).unwrap();

        let report = renderer.render_frame(vec![mesh("cube", texture), mesh("ghost", Handle::INVALID)]).unwrap();
        assert_eq!(report.draw_calls, 3);
        assert_eq!(report.skipped_draws, 1);
        assert!(renderer.context().commands().contains(&RecordedCommand::SkippedDraw {
            label: "ghost".to_string()
        }));
        // draw list 在执行后保留
        assert_eq!(renderer.context().draw_list.len(), 2);

        assert!(renderer.context_mut().texture_registry.release_texture(&state, texture));
        renderer.destroy_mut();
        assert_eq!(device.live_texture_count(), 0);
    }

    #[test]
    fn test_out_of_memory_frame() {
        let device = Rc::new(HeadlessDevice::default());
        device.set_memory_budget(Some(1024));
        let mut renderer = DeferredRenderer::new(device.clone(), small_config()).unwrap();

        assert!(renderer.render_frame(Vec::new()).is_err());
        assert_eq!(renderer.graph().get_pass("gbuffer").unwrap().execution_count(), 0);

        device.set_memory_budget(None);
        let report = renderer.render_frame(Vec::new()).unwrap();
        assert!(report.presented);

        renderer.destroy_mut();
        assert_eq!(device.live_texture_count(), 0);
    }
}
