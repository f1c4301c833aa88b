use std::fmt;

/// 代际句柄
///
/// `id` 是 slot 在 storage 中的下标，`generation` 是分配时 slot 的代数。
/// slot 被释放时代数会递增，因此旧句柄会被识别为失效，而不会访问到新的资源。
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    pub(crate) id: u32,
    pub(crate) generation: u32,
}
impl Handle {
    /// 无效句柄使用的 id
    pub const SENTINEL_ID: u32 = u32::MAX;

    /// 构造即无效的句柄
    pub const INVALID: Self = Self {
        id: Self::SENTINEL_ID,
        generation: 0,
    };

    #[inline]
    pub(crate) const fn new(id: u32, generation: u32) -> Self {
        Self { id, generation }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// 是否为 sentinel 句柄
    ///
    /// 注意：返回 false 并不代表句柄一定有效，还需要通过 storage 校验代数。
    #[inline]
    pub fn is_null(&self) -> bool {
        self.id == Self::SENTINEL_ID
    }
}
impl Default for Handle {
    fn default() -> Self {
        Self::INVALID
    }
}
impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "H(null)")
        } else {
            write!(f, "H({}.v{})", self.id, self.generation)
        }
    }
}
