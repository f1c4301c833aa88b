use std::collections::HashMap;

use ash::vk;
use tessera_gfx::{GfxTexture, SharedGfxDevice};
use tessera_render_interface::frame_counter::FrameCounter;
use tessera_render_interface::handle::Handle;
use tessera_render_interface::pipeline_cache::{MaterialState, PipelineCache};
use tessera_render_interface::pipeline_settings::FrameSettings;
use tessera_render_interface::texture_registry::TextureRegistry;

/// 一次绘制请求，由场景层每帧填充
#[derive(Clone, Debug)]
pub struct DrawItem {
    pub label: String,
    pub material: MaterialState,
    /// 材质使用的 texture，无效时这次绘制会被跳过
    pub texture: Handle,
    pub vertex_count: u32,
    pub instance_count: u32,
}

/// pass 录制的命令
///
/// 核心不直接调用设备的命令接口，只记录下来交给提交层。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedCommand {
    BeginRendering {
        pass: String,
        target: vk::Image,
        extent: vk::Extent2D,
    },
    BindPipeline(vk::Pipeline),
    Draw {
        label: String,
        vertex_count: u32,
        instance_count: u32,
    },
    /// 资源无法解析，这次绘制被跳过
    SkippedDraw {
        label: String,
    },
    EndRendering,
    /// 把 image 交给呈现层
    Present(vk::Image),
}

// Render 期间由各个 pass 共享并修改
pub struct RenderContext {
    pub texture_registry: TextureRegistry,
    pub pipeline_cache: PipelineCache,

    pub frame_counter: FrameCounter,
    pub frame_settings: FrameSettings,

    pub delta_time_s: f32,
    pub total_time_s: f32,

    /// 本帧需要绘制的内容
    pub draw_list: Vec<DrawItem>,

    /// 当前正在写入的 target 名称
    active_target: Option<String>,
    /// pass 的输出：名称 -> texture 句柄，后面的 pass 通过名称读取
    outputs: HashMap<String, Handle>,
    commands: Vec<RecordedCommand>,

    destroyed: bool,
}
// new & init
impl RenderContext {
    pub fn new(device: SharedGfxDevice, frame_settings: FrameSettings) -> Self {
        Self {
            texture_registry: TextureRegistry::new(device.clone(), frame_settings.color_format),
            pipeline_cache: PipelineCache::new(device),
            frame_counter: FrameCounter::default(),
            frame_settings,
            delta_time_s: 0.0,
            total_time_s: 0.0,
            draw_list: Vec::new(),
            active_target: None,
            outputs: HashMap::new(),
            commands: Vec::new(),
            destroyed: false,
        }
    }
}
// destroy
impl RenderContext {
    pub fn destroy(mut self) {
        self.destroy_mut();
    }

    pub fn destroy_mut(&mut self) {
        self.outputs.clear();
        self.pipeline_cache.destroy_mut();
        self.texture_registry.destroy_mut();
        self.destroyed = true;
    }
}
impl Drop for RenderContext {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            assert!(self.destroyed);
        }
    }
}
// frame
impl RenderContext {
    /// 清除上一帧的输出与命令
    pub fn begin_frame(&mut self) {
        self.active_target = None;
        self.outputs.clear();
        self.commands.clear();
    }

    /// 交换双缓冲 target，帧序号递增
    pub fn end_frame(&mut self) {
        self.texture_registry.swap_targets();
        self.frame_counter.next_frame();
        self.delta_time_s = self.frame_counter.delta_time().as_secs_f32();
        self.total_time_s = self.frame_counter.total_time().as_secs_f32();
    }
}
// pass io
impl RenderContext {
    #[inline]
    pub fn set_active_target(&mut self, name: impl Into<String>) {
        self.active_target = Some(name.into());
    }

    #[inline]
    pub fn active_target(&self) -> Option<&str> {
        self.active_target.as_deref()
    }

    /// 发布 pass 的输出，同名的输出会被覆盖
    #[inline]
    pub fn publish_output(&mut self, name: impl Into<String>, handle: Handle) {
        self.outputs.insert(name.into(), handle);
    }

    #[inline]
    pub fn output(&self, name: &str) -> Option<Handle> {
        self.outputs.get(name).copied()
    }

    /// 把输出解析成原生 texture，输出不存在或者句柄失效时返回 None
    pub fn resolve_output(&self, name: &str) -> Option<&GfxTexture> {
        self.output(name).and_then(|handle| self.texture_registry.resolve_texture(handle))
    }

    #[inline]
    pub fn record(&mut self, command: RecordedCommand) {
        self.commands.push(command);
    }

    #[inline]
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    pub fn skipped_draw_count(&self) -> usize {
        self.commands.iter().filter(|command| matches!(command, RecordedCommand::SkippedDraw { .. })).count()
    }

    pub fn draw_call_count(&self) -> usize {
        self.commands.iter().filter(|command| matches!(command, RecordedCommand::Draw { .. })).count()
    }
}
