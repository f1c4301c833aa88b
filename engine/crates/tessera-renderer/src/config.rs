use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use ash::vk;
use serde::{Deserialize, Serialize};
use tessera_render_interface::pipeline_settings::{DefaultRendererSettings, FrameSettings};

/// 渲染器的 TOML 配置，所有字段都有默认值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// 开启后 viewport 使用浮点格式
    pub hdr: bool,

    /// G-buffer 的 MSAA 采样数
    pub msaa_samples: u32,

    /// headless 运行时渲染的帧数
    pub frames_to_run: u64,

    /// 热重载使用的 worker 线程数
    pub reload_workers: usize,

    /// 日志级别：error / warn / info / debug / trace
    pub log_level: String,

    /// 是否在 composite 之后叠加 UI pass
    pub ui_overlay: bool,
}
impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            viewport_width: 1280,
            viewport_height: 720,
            hdr: false,
            msaa_samples: 1,
            frames_to_run: 120,
            reload_workers: 2,
            log_level: "info".to_string(),
            ui_overlay: false,
        }
    }
}
impl FromStr for RendererConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("解析 TOML 配置失败")
    }
}
impl RendererConfig {
    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).with_context(|| format!("读取配置文件失败: {:?}", path.as_ref()))?;

        let config: RendererConfig =
            toml::from_str(&content).with_context(|| format!("解析 TOML 配置失败: {:?}", path.as_ref()))?;

        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;

        fs::write(path.as_ref(), content).with_context(|| format!("写入配置文件失败: {:?}", path.as_ref()))?;

        Ok(())
    }

    #[inline]
    pub fn color_format(&self) -> vk::Format {
        if self.hdr { DefaultRendererSettings::HDR_COLOR_FORMAT } else { DefaultRendererSettings::LDR_COLOR_FORMAT }
    }

    pub fn frame_settings(&self) -> FrameSettings {
        FrameSettings {
            color_format: self.color_format(),
            depth_format: DefaultRendererSettings::DEPTH_FORMAT,
            frame_extent: vk::Extent2D {
                width: self.viewport_width,
                height: self.viewport_height,
            },
            msaa_samples: self.msaa_samples.max(1),
        }
    }
}
