//! headless 驱动：不需要窗口和 GPU，用 [`tessera_gfx::headless::HeadlessDevice`] 跑完整的帧循环。

pub mod app;
pub mod scene;
