use std::path::PathBuf;

use tessera_crate_tools::init_log;
use tessera_headless_app::app::HeadlessApp;
use tessera_renderer::config::RendererConfig;

/// 用法：`tessera-headless [config.toml]`
fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match &config_path {
        Some(path) => RendererConfig::from_file(path)?,
        None => RendererConfig::default(),
    };
    init_log::init_log_with_level(init_log::parse_level(&config.log_level));

    let mut app = HeadlessApp::with_config(config, config_path)?;
    let result = app.run();
    app.destroy();

    let summary = result?;
    log::info!("end run after {} frames.", summary.frames);
    Ok(())
}
