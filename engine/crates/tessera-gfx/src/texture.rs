use ash::vk;

/// Vulkan 格式相关的工具类
pub struct VulkanFormatUtils;
impl VulkanFormatUtils {
    /// 计算指定 Vulkan 格式下每个像素需要的字节数
    ///
    /// # return
    /// 不认识的格式返回 None，由调用者决定如何处理
    pub fn pixel_size_in_bytes(format: vk::Format) -> Option<u64> {
        let size = match format {
            vk::Format::R8_UNORM | vk::Format::R8_SNORM | vk::Format::R8_UINT | vk::Format::S8_UINT => 1,

            vk::Format::R8G8_UNORM | vk::Format::R16_SFLOAT | vk::Format::R16_UNORM | vk::Format::D16_UNORM => 2,

            vk::Format::R8G8B8_UNORM | vk::Format::R8G8B8_SRGB | vk::Format::B8G8R8_SRGB | vk::Format::D16_UNORM_S8_UINT => 3,

            vk::Format::R8G8B8A8_UNORM
            | vk::Format::R8G8B8A8_SRGB
            | vk::Format::B8G8R8A8_UNORM
            | vk::Format::B8G8R8A8_SRGB
            | vk::Format::A2B10G10R10_UNORM_PACK32
            | vk::Format::B10G11R11_UFLOAT_PACK32
            | vk::Format::R16G16_SFLOAT
            | vk::Format::R32_SFLOAT
            | vk::Format::R32_UINT
            | vk::Format::D32_SFLOAT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::X8_D24_UNORM_PACK32 => 4,

            vk::Format::D32_SFLOAT_S8_UINT => 5,

            vk::Format::R16G16B16_UNORM | vk::Format::R16G16B16_SFLOAT => 6,

            vk::Format::R16G16B16A16_UNORM
            | vk::Format::R16G16B16A16_SFLOAT
            | vk::Format::R32G32_SFLOAT => 8,

            vk::Format::R32G32B32_SFLOAT => 12,
            vk::Format::R32G32B32A32_SFLOAT => 16,

            _ => return None,
        };
        Some(size)
    }

    #[inline]
    pub fn is_depth_format(format: vk::Format) -> bool {
        matches!(
            format,
            vk::Format::D16_UNORM
                | vk::Format::D16_UNORM_S8_UINT
                | vk::Format::D24_UNORM_S8_UINT
                | vk::Format::X8_D24_UNORM_PACK32
                | vk::Format::D32_SFLOAT
                | vk::Format::D32_SFLOAT_S8_UINT
        )
    }

    /// 根据格式推断 image view 的 aspect
    pub fn aspect_flags(format: vk::Format) -> vk::ImageAspectFlags {
        match format {
            vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
                vk::ImageAspectFlags::DEPTH
            }
            vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            _ => vk::ImageAspectFlags::COLOR,
        }
    }
}

/// 创建一张 2D texture 所需的信息
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxTextureDesc {
    pub width: u32,
    pub height: u32,
    /// 每个像素的采样数（MSAA），1 表示不做多重采样
    pub samples: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
}
impl GfxTextureDesc {
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    #[inline]
    pub fn sample_count_flags(&self) -> vk::SampleCountFlags {
        match self.samples {
            0 | 1 => vk::SampleCountFlags::TYPE_1,
            2 => vk::SampleCountFlags::TYPE_2,
            4 => vk::SampleCountFlags::TYPE_4,
            8 => vk::SampleCountFlags::TYPE_8,
            _ => vk::SampleCountFlags::TYPE_16,
        }
    }

    /// 估算显存占用，不认识的格式按 4 字节计算
    pub fn approx_bytes(&self) -> u64 {
        let pixel_size = VulkanFormatUtils::pixel_size_in_bytes(self.format).unwrap_or(4);
        self.width as u64 * self.height as u64 * self.samples.max(1) as u64 * pixel_size
    }
}

/// 设备创建出来的 texture：image 以及默认的 image view
///
/// 这里只保存原生句柄，销毁必须通过创建它的 [`crate::GfxDevice`] 进行。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxTexture {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub samples: u32,
}
