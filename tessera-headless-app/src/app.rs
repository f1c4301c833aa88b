use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::Context;
use tessera_asset::hot_reload::{HotReloadLibrary, ReloadEvent};
use tessera_gfx::GfxDevice;
use tessera_gfx::headless::HeadlessDevice;
use tessera_renderer::config::RendererConfig;
use tessera_renderer::deferred::{DeferredRenderer, FrameReport};

use crate::scene::DemoScene;

/// 热重载库中配置文件的名称
const CONFIG_ASSET: &str = "renderer.config";

const DEMO_MESH_COUNT: usize = 8;
const DEMO_FRAMES_PER_SWAP: u64 = 30;
const LOG_INTERVAL: u64 = 30;

/// 整个运行期间的统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub draw_calls: u64,
    pub skipped_draws: u64,
    pub config_reloads: u64,
}

pub struct HeadlessApp {
    device: Rc<HeadlessDevice>,
    renderer: DeferredRenderer,
    scene: DemoScene,

    /// 只有从文件加载配置时才存在
    config_library: Option<HotReloadLibrary<RendererConfig>>,

    summary: RunSummary,
    destroyed: bool,
}
// new & init
impl HeadlessApp {
    /// `config_path` 为 None 时使用默认配置，并且不监听配置变化
    pub fn new(config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let config = match &config_path {
            Some(path) => RendererConfig::from_file(path)?,
            None => RendererConfig::default(),
        };
        Self::with_config(config, config_path)
    }

    pub fn with_config(config: RendererConfig, config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let _span = tracy_client::span!("HeadlessApp::new");
        log::info!("renderer config: {:?}", config);

        let config_library = match config_path {
            Some(path) => {
                let loader = |path: &Path| RendererConfig::from_file(path);
                let mut library = HotReloadLibrary::new(config.reload_workers, loader)?;
                library.insert(CONFIG_ASSET, config.clone());
                library.load(CONFIG_ASSET, path);
                Some(library)
            }
            None => None,
        };

        let device = Rc::new(HeadlessDevice::new("tessera-headless"));
        let mut renderer = DeferredRenderer::new(device.clone(), config).context("构建渲染图失败")?;
        let scene = match DemoScene::new(
            &mut renderer.context_mut().texture_registry,
            DEMO_MESH_COUNT,
            DEMO_FRAMES_PER_SWAP,
        ) {
            Ok(scene) => scene,
            Err(e) => {
                renderer.destroy_mut();
                return Err(e).context("创建演示场景失败");
            }
        };

        Ok(Self {
            device,
            renderer,
            scene,
            config_library,
            summary: RunSummary::default(),
            destroyed: false,
        })
    }
}
// destroy
impl HeadlessApp {
    pub fn destroy(mut self) {
        self.destroy_mut();
    }

    pub fn destroy_mut(&mut self) {
        if self.destroyed {
            return;
        }
        if let Some(library) = self.config_library.as_mut() {
            library.shutdown();
        }
        self.scene.destroy(&mut self.renderer.context_mut().texture_registry);
        self.renderer.destroy_mut();

        let stats = self.device.stats();
        log::info!(
            "device `{}`: textures {}/{} (created/destroyed), pipelines {}/{}",
            self.device.name(),
            stats.textures_created,
            stats.textures_destroyed,
            stats.pipelines_created,
            stats.pipelines_destroyed
        );
        self.destroyed = true;
    }
}
impl Drop for HeadlessApp {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            assert!(self.destroyed);
        }
    }
}
// getter
impl HeadlessApp {
    #[inline]
    pub fn device(&self) -> &Rc<HeadlessDevice> {
        &self.device
    }

    #[inline]
    pub fn renderer(&self) -> &DeferredRenderer {
        &self.renderer
    }

    #[inline]
    pub fn summary(&self) -> RunSummary {
        self.summary
    }
}
// frame
impl HeadlessApp {
    /// 渲染配置中指定的帧数
    pub fn run(&mut self) -> anyhow::Result<RunSummary> {
        let frames = self.renderer.config().frames_to_run;
        log::info!("run {} frames on headless device", frames);
        for _ in 0..frames {
            self.tick()?;
        }

        let summary = self.summary;
        let cache_stats = self.renderer.context().pipeline_cache.stats();
        let pool_stats = self.renderer.context().texture_registry.pool_stats();
        log::info!(
            "finished {} frames: {} draws, {} skipped, {} config reloads",
            summary.frames,
            summary.draw_calls,
            summary.skipped_draws,
            summary.config_reloads
        );
        log::info!("pipeline cache: {} hits, {} misses", cache_stats.hits, cache_stats.misses);
        log::info!(
            "texture pool: {} acquires, {} hits, {} misses, {} rejected releases",
            pool_stats.acquires,
            pool_stats.hits,
            pool_stats.misses,
            pool_stats.rejected_releases
        );
        Ok(summary)
    }

    pub fn tick(&mut self) -> anyhow::Result<FrameReport> {
        let _span = tracy_client::span!("HeadlessApp::tick");
        self.update_config();

        let frame_id = self.renderer.context().frame_counter.frame_id();
        self.scene
            .update(frame_id, &mut self.renderer.context_mut().texture_registry)
            .context("更新场景失败")?;
        let draws = self.scene.draw_list(frame_id);

        let report = self
            .renderer
            .render_frame(draws)
            .with_context(|| format!("渲染第 {} 帧失败", frame_id))?;

        self.summary.frames += 1;
        self.summary.draw_calls += report.draw_calls as u64;
        self.summary.skipped_draws += report.skipped_draws as u64;

        if frame_id % LOG_INTERVAL == 0 {
            log::info!(
                "[F{}] draws: {}, skipped: {}, pipelines: {}, textures: {} ({} KiB)",
                report.frame_id,
                report.draw_calls,
                report.skipped_draws,
                report.pipelines,
                report.live_textures,
                report.live_texture_bytes / 1024
            );
        }
        Ok(report)
    }

    /// 检查配置文件是否被修改，并应用重载后的配置
    fn update_config(&mut self) {
        let Some(library) = self.config_library.as_mut() else {
            return;
        };
        library.poll_changes();

        let reloaded = library
            .update()
            .into_iter()
            .any(|event| matches!(event, ReloadEvent::Reloaded { ref name, .. } if name == CONFIG_ASSET));
        if !reloaded {
            return;
        }
        let Some(config) = library.get(CONFIG_ASSET) else {
            return;
        };
        self.apply_config(&config);
    }

    fn apply_config(&mut self, config: &RendererConfig) {
        let current = self.renderer.config().clone();
        if *config == current {
            return;
        }
        self.summary.config_reloads += 1;

        if config.viewport_width != current.viewport_width || config.viewport_height != current.viewport_height {
            log::info!("resize viewport to {}x{}", config.viewport_width, config.viewport_height);
            self.renderer.resize(config.viewport_width, config.viewport_height);
        }
        if config.hdr != current.hdr || config.msaa_samples != current.msaa_samples || config.ui_overlay != current.ui_overlay
        {
            log::warn!("`hdr`, `msaa_samples` and `ui_overlay` only take effect after restart");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> RendererConfig {
        RendererConfig {
            viewport_width: 64,
            viewport_height: 64,
            frames_to_run: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_run_and_destroy() {
        let mut app = HeadlessApp::with_config(small_config(), None).unwrap();
        let summary = app.run().unwrap();
        assert_eq!(summary.frames, 3);
        // 每帧：8 个 mesh + lighting + composite
        assert_eq!(summary.draw_calls, 30);
        assert_eq!(summary.skipped_draws, 0);

        let device = app.device().clone();
        app.destroy();
        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.live_pipeline_count(), 0);
    }

    #[test]
    fn test_apply_config_resizes() {
        let mut app = HeadlessApp::with_config(small_config(), None).unwrap();
        app.tick().unwrap();

        let config = RendererConfig {
            viewport_width: 32,
            ..small_config()
        };
        app.apply_config(&config);
        app.tick().unwrap();
        assert_eq!(app.summary().config_reloads, 1);
        assert_eq!(app.renderer().config().viewport_width, 32);

        // 相同的配置不计入重载
        app.apply_config(&config);
        assert_eq!(app.summary().config_reloads, 1);

        app.destroy();
    }
}
