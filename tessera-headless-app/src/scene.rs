use ash::vk;
use tessera_gfx::GfxError;
use tessera_render_graph::render_context::DrawItem;
use tessera_render_interface::handle::Handle;
use tessera_render_interface::pipeline_cache::MaterialState;
use tessera_render_interface::texture::TextureState;
use tessera_render_interface::texture_registry::TextureRegistry;

/// 用于驱动帧循环的演示场景
///
/// 每个 mesh 使用一张从 registry 获取的材质 texture；
/// 每隔 `frames_per_swap` 帧归还一张再重新获取，用来观察 pool 的复用。
pub struct DemoScene {
    texture_state: TextureState,
    textures: Vec<Handle>,
    frames_per_swap: u64,
}
// new & init
impl DemoScene {
    pub fn new(registry: &mut TextureRegistry, mesh_count: usize, frames_per_swap: u64) -> Result<Self, GfxError> {
        let texture_state = TextureState::new(
            256,
            256,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        );

        let mut textures = Vec::with_capacity(mesh_count);
        for _ in 0..mesh_count {
            match registry.acquire_texture(&texture_state) {
                Ok(handle) => textures.push(handle),
                Err(e) => {
                    textures.drain(..).for_each(|handle| {
                        registry.release_texture(&texture_state, handle);
                    });
                    return Err(e);
                }
            }
        }

        Ok(Self {
            texture_state,
            textures,
            frames_per_swap: frames_per_swap.max(1),
        })
    }
}
// destroy
impl DemoScene {
    /// 把所有 texture 还给 registry
    pub fn destroy(&mut self, registry: &mut TextureRegistry) {
        for handle in self.textures.drain(..) {
            registry.release_texture(&self.texture_state, handle);
        }
    }
}
// getter
impl DemoScene {
    #[inline]
    pub fn mesh_count(&self) -> usize {
        self.textures.len()
    }

    #[inline]
    pub fn textures(&self) -> &[Handle] {
        &self.textures
    }
}
// tools
impl DemoScene {
    pub fn update(&mut self, frame_id: u64, registry: &mut TextureRegistry) -> Result<(), GfxError> {
        if frame_id == 0 || frame_id % self.frames_per_swap != 0 || self.textures.is_empty() {
            return Ok(());
        }

        let old = self.textures.remove(0);
        registry.release_texture(&self.texture_state, old);
        let new = registry.acquire_texture(&self.texture_state)?;
        self.textures.push(new);
        log::debug!("frame {}: swap material texture {:?} -> {:?}", frame_id, old, new);
        Ok(())
    }

    pub fn draw_list(&self, frame_id: u64) -> Vec<DrawItem> {
        self.textures
            .iter()
            .enumerate()
            .map(|(index, &texture)| DrawItem {
                label: format!("mesh.{}", index),
                material: MaterialState::new(if index % 2 == 0 { "pbr_opaque" } else { "pbr_masked" }),
                texture,
                vertex_count: 36,
                instance_count: 1 + (frame_id % 4) as u32,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use tessera_gfx::headless::HeadlessDevice;

    use super::*;

    #[test]
    fn test_swap_reuses_pool() {
        let device = Rc::new(HeadlessDevice::default());
        let mut registry = TextureRegistry::new(device.clone(), vk::Format::R8G8B8A8_UNORM);
        let mut scene = DemoScene::new(&mut registry, 3, 2).unwrap();
        assert_eq!(device.stats().textures_created, 3);

        for frame_id in 0..6 {
            scene.update(frame_id, &mut registry).unwrap();
        }
        // 归还后立即重新获取，命中 pool 中的空闲 texture
        assert_eq!(device.stats().textures_created, 3);
        assert_eq!(registry.pool_stats().hits, 2);
        assert_eq!(scene.mesh_count(), 3);

        let draws = scene.draw_list(5);
        assert_eq!(draws.len(), 3);
        assert_eq!(draws[1].material.shader, "pbr_masked");
        assert_eq!(draws[0].instance_count, 2);

        scene.destroy(&mut registry);
        registry.destroy_mut();
        assert_eq!(device.live_texture_count(), 0);
    }

    #[test]
    fn test_out_of_memory_releases_partial() {
        let device = Rc::new(HeadlessDevice::default());
        // 刚好够两张 256x256 RGBA8
        device.set_memory_budget(Some(2 * 256 * 256 * 4));
        let mut registry = TextureRegistry::new(device.clone(), vk::Format::R8G8B8A8_UNORM);

        assert!(DemoScene::new(&mut registry, 3, 1).is_err());
        assert_eq!(registry.pool_stats().releases, 2);

        registry.destroy_mut();
        assert_eq!(device.live_texture_count(), 0);
    }
}
