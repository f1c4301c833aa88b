use ash::vk;

/// 设备层的错误
#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    #[error("device out of memory: requested {requested} bytes, {available} bytes available")]
    OutOfDeviceMemory { requested: u64, available: u64 },

    #[error("unsupported format: {0:?}")]
    UnsupportedFormat(vk::Format),

    #[error("invalid texture extent: {width}x{height}")]
    InvalidExtent { width: u32, height: u32 },

    #[error("shader `{0}` is not registered on this device")]
    MissingShader(String),

    #[error("vulkan call failed: {0}")]
    Vulkan(#[from] vk::Result),
}
