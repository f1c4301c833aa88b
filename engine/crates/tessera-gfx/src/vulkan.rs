//! 基于 ash + vk-mem 的设备实现
//!
//! instance / physical device / device 的创建属于平台层，不在这里处理；
//! 调用者把已经创建好的 `ash::Device` 和 `vk_mem::Allocator` 交给 [`VulkanDevice`]。

use std::cell::RefCell;
use std::collections::HashMap;

use ash::vk;
use vk_mem::{Alloc, Allocation};

use crate::device::GfxDevice;
use crate::error::GfxError;
use crate::pipeline::{GfxPipeline, GfxPipelineDesc};
use crate::texture::{GfxTexture, GfxTextureDesc, VulkanFormatUtils};

/// 已注册的 shader，生命周期由调用者管理
#[derive(Clone, Copy)]
struct RegisteredShader {
    vertex: vk::ShaderModule,
    fragment: vk::ShaderModule,
}

pub struct VulkanDevice {
    device: ash::Device,
    allocator: vk_mem::Allocator,

    shaders: RefCell<HashMap<String, RegisteredShader>>,
    /// image -> VMA 分配信息
    allocations: RefCell<HashMap<vk::Image, Allocation>>,
}
// new & init
impl VulkanDevice {
    pub fn new(device: ash::Device, allocator: vk_mem::Allocator) -> Self {
        Self {
            device,
            allocator,
            shaders: RefCell::new(HashMap::new()),
            allocations: RefCell::new(HashMap::new()),
        }
    }

    /// 注册 shader module，pipeline 通过名称引用
    pub fn register_shader(&self, name: impl Into<String>, vertex: vk::ShaderModule, fragment: vk::ShaderModule) {
        self.shaders.borrow_mut().insert(name.into(), RegisteredShader { vertex, fragment });
    }
}
impl Drop for VulkanDevice {
    fn drop(&mut self) {
        let leaked = self.allocations.get_mut().len();
        if leaked > 0 {
            log::error!("VulkanDevice dropped with {} live images", leaked);
        }
    }
}
impl GfxDevice for VulkanDevice {
    fn name(&self) -> &str {
        "vulkan"
    }

    fn create_texture(&self, desc: &GfxTextureDesc, debug_name: &str) -> Result<GfxTexture, GfxError> {
        let _span = tracy_client::span!("VulkanDevice::create_texture");

        if desc.width == 0 || desc.height == 0 {
            return Err(GfxError::InvalidExtent {
                width: desc.width,
                height: desc.height,
            });
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(desc.sample_count_flags())
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let alloc_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };

        let (image, mut allocation) = unsafe { self.allocator.create_image(&image_info, &alloc_info)? };

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: VulkanFormatUtils::aspect_flags(desc.format),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = match unsafe { self.device.create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe { self.allocator.destroy_image(image, &mut allocation) };
                return Err(e.into());
            }
        };

        self.allocations.borrow_mut().insert(image, allocation);
        log::debug!("create image `{}`: {}x{} {:?}", debug_name, desc.width, desc.height, desc.format);

        Ok(GfxTexture {
            image,
            view,
            format: desc.format,
            extent: desc.extent(),
            samples: desc.samples.max(1),
        })
    }

    fn destroy_texture(&self, texture: &GfxTexture) {
        let Some(mut allocation) = self.allocations.borrow_mut().remove(&texture.image) else {
            log::error!("destroy unknown image: {:?}", texture.image);
            return;
        };
        unsafe {
            self.device.destroy_image_view(texture.view, None);
            self.allocator.destroy_image(texture.image, &mut allocation);
        }
    }

    fn create_graphics_pipeline(&self, desc: &GfxPipelineDesc, debug_name: &str) -> Result<GfxPipeline, GfxError> {
        let _span = tracy_client::span!("VulkanDevice::create_graphics_pipeline");

        let shader = self
            .shaders
            .borrow()
            .get(&desc.shader)
            .copied()
            .ok_or_else(|| GfxError::MissingShader(desc.shader.clone()))?;

        let layout = unsafe { self.device.create_pipeline_layout(&vk::PipelineLayoutCreateInfo::default(), None)? };

        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(shader.vertex)
                .name(c"main"),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(shader.fragment)
                .name(c"main"),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default().topology(desc.topology);
        let viewport_state = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(desc.cull_mode)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(
            GfxTextureDesc {
                width: 1,
                height: 1,
                samples: desc.samples,
                format: vk::Format::UNDEFINED,
                usage: vk::ImageUsageFlags::empty(),
            }
            .sample_count_flags(),
        );
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_test)
            .depth_write_enable(desc.depth_test && desc.depth_write)
            .depth_compare_op(if desc.depth_test { desc.compare_op } else { vk::CompareOp::ALWAYS });

        let blend_attachments = desc
            .color_formats
            .iter()
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(desc.blend_enable)
                    .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                    .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                    .color_blend_op(vk::BlendOp::ADD)
                    .src_alpha_blend_factor(vk::BlendFactor::ONE)
                    .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                    .alpha_blend_op(vk::BlendOp::ADD)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
            .collect::<Vec<_>>();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&desc.color_formats)
            .depth_attachment_format(desc.depth_format);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            self.device.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&create_info), None)
        };
        match pipelines {
            Ok(pipelines) => {
                log::debug!("create graphics pipeline `{}`", debug_name);
                Ok(GfxPipeline {
                    pipeline: pipelines[0],
                    layout,
                    bind_point: vk::PipelineBindPoint::GRAPHICS,
                })
            }
            Err((_, e)) => {
                unsafe { self.device.destroy_pipeline_layout(layout, None) };
                Err(e.into())
            }
        }
    }

    fn destroy_graphics_pipeline(&self, pipeline: &GfxPipeline) {
        unsafe {
            self.device.destroy_pipeline(pipeline.pipeline, None);
            self.device.destroy_pipeline_layout(pipeline.layout, None);
        }
    }
}
