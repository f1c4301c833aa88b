use ash::vk;

/// 创建 graphics pipeline 所需的全部信息
///
/// 使用 dynamic rendering，不需要 vk::RenderPass；attachment 的格式直接写在这里。
#[derive(Clone, Debug)]
pub struct GfxPipelineDesc {
    /// 已经在设备上注册过的 shader 名称
    pub shader: String,

    pub color_formats: Vec<vk::Format>,
    pub depth_format: vk::Format,
    pub samples: u32,

    pub topology: vk::PrimitiveTopology,
    pub cull_mode: vk::CullModeFlags,
    pub blend_enable: bool,

    pub depth_test: bool,
    pub depth_write: bool,
    pub compare_op: vk::CompareOp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub bind_point: vk::PipelineBindPoint,
}
