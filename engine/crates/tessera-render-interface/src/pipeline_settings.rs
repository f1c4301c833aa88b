use ash::vk;

/// 渲染器默认配置
pub struct DefaultRendererSettings;
impl DefaultRendererSettings {
    pub const LDR_COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
    pub const HDR_COLOR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
    pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

    /// G-buffer 各个 attachment 的格式
    pub const GBUFFER_ALBEDO_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
    pub const GBUFFER_NORMAL_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
    pub const GBUFFER_MATERIAL_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
}

/// 帧级渲染配置
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameSettings {
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
    pub frame_extent: vk::Extent2D,
    pub msaa_samples: u32,
}
impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            color_format: DefaultRendererSettings::LDR_COLOR_FORMAT,
            depth_format: DefaultRendererSettings::DEPTH_FORMAT,
            frame_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            msaa_samples: 1,
        }
    }
}
