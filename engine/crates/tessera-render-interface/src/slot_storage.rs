//! 代际 slot map
//!
//! storage 对记录的类型是同质的：一个 `SlotStorage<R>` 在整个生命周期内只存放 `R`，
//! 记录的 size / align 因此由类型系统保证一致。
//!
//! `try_get` 返回的是借用，storage 扩容（`allocate`）需要 `&mut self`，
//! 所以不可能在扩容后还持有指向旧内存的引用；跨帧只应该保存 [`Handle`]。

use slotmap::{Key, KeyData, SlotMap, new_key_type};

use crate::handle::Handle;

new_key_type! {
    /// [`Handle`] 在 slot map 中的表示
    struct SlotKey;
}

/// slotmap 的 ffi 格式：低 32 位是 slot 下标，高 32 位是版本号
#[inline]
fn slot_key(handle: Handle) -> SlotKey {
    KeyData::from_ffi(((handle.generation as u64) << 32) | handle.id as u64).into()
}

#[inline]
fn handle_of(key: SlotKey) -> Handle {
    let ffi = key.data().as_ffi();
    Handle::new(ffi as u32, (ffi >> 32) as u32)
}

pub struct SlotStorage<R> {
    slots: SlotMap<SlotKey, R>,
}
impl<R> Default for SlotStorage<R> {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl<R> SlotStorage<R> {
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SlotMap::with_capacity_and_key(capacity),
        }
    }
}
// getter
impl<R> SlotStorage<R> {
    /// 存活记录的数量
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// 不扩容时最多可以存放的记录数量
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }
}
// tools
impl<R> SlotStorage<R> {
    /// 分配一个 slot 存放 `record`，优先复用最近释放的 slot
    pub fn allocate(&mut self, record: R) -> Handle {
        let handle = handle_of(self.slots.insert(record));
        assert!(!handle.is_null(), "slot storage exhausted");
        handle
    }

    /// 释放句柄对应的 slot
    ///
    /// # 返回
    /// 句柄已经失效（重复释放、过期句柄、sentinel）时返回 false
    pub fn free(&mut self, handle: Handle) -> bool {
        self.take(handle).is_some()
    }

    /// 释放 slot，并把记录交还给调用者
    ///
    /// 释放后 slot 的代数递增，所有指向该 slot 的旧句柄都会失效。
    pub fn take(&mut self, handle: Handle) -> Option<R> {
        if handle.is_null() {
            return None;
        }
        self.slots.remove(slot_key(handle))
    }

    #[inline]
    pub fn valid(&self, handle: Handle) -> bool {
        !handle.is_null() && self.slots.contains_key(slot_key(handle))
    }

    /// 句柄失效时返回 None，调用者需要自行处理
    #[inline]
    pub fn try_get(&self, handle: Handle) -> Option<&R> {
        if handle.is_null() {
            return None;
        }
        self.slots.get(slot_key(handle))
    }

    #[inline]
    pub fn try_get_mut(&mut self, handle: Handle) -> Option<&mut R> {
        if handle.is_null() {
            return None;
        }
        self.slots.get_mut(slot_key(handle))
    }

    /// 遍历所有存活的记录
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &R)> {
        self.slots.iter().map(|(key, record)| (handle_of(key), record))
    }

    /// 整体重置，所有已经发放的句柄都会失效
    ///
    /// 记录本身只是被丢弃：记录中持有的设备资源必须在调用之前由 factory 销毁。
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_get() {
        let mut storage = SlotStorage::new();
        let a = storage.allocate(10u64);
        let b = storage.allocate(20u64);
        assert_ne!(a, b);
        assert_eq!(storage.try_get(a), Some(&10));
        assert_eq!(storage.try_get(b), Some(&20));
        assert_eq!(storage.len(), 2);

        *storage.try_get_mut(a).unwrap() = 11;
        assert_eq!(storage.try_get(a), Some(&11));
    }

    #[test]
    fn test_reuse_bumps_generation() {
        let mut storage = SlotStorage::new();
        let old = storage.allocate("first");
        assert!(storage.free(old));

        let new = storage.allocate("second");
        assert_eq!(new.id(), old.id());
        assert_ne!(new.generation(), old.generation());

        assert!(!storage.valid(old));
        assert!(storage.try_get(old).is_none());
        assert_eq!(storage.try_get(new), Some(&"second"));
    }

    #[test]
    fn test_lifo_reuse() {
        let mut storage = SlotStorage::new();
        let handles = (0..4).map(|i| storage.allocate(i)).collect::<Vec<_>>();
        storage.free(handles[1]);
        storage.free(handles[3]);

        // 最近释放的 id 最先被复用
        assert_eq!(storage.allocate(100).id(), handles[3].id());
        assert_eq!(storage.allocate(101).id(), handles[1].id());
        // 空闲列表耗尽后才增长
        let grown = storage.allocate(102);
        assert!(handles.iter().all(|handle| handle.id() != grown.id()));
    }

    #[test]
    fn test_double_free() {
        let mut storage = SlotStorage::new();
        let h = storage.allocate(1);
        assert!(storage.free(h));
        assert!(!storage.free(h));
        assert!(!storage.free(Handle::INVALID));
        assert!(storage.is_empty());
    }

    #[test]
    fn test_invalid_handles() {
        let storage = SlotStorage::<u32>::new();
        assert!(!storage.valid(Handle::INVALID));
        assert!(storage.try_get(Handle::INVALID).is_none());
        // 从未分配过的 id
        assert!(storage.try_get(Handle::new(42, 0)).is_none());
        assert!(storage.try_get(Handle::new(0, 0)).is_none());
    }

    #[test]
    fn test_handle_round_trips_through_key() {
        let mut storage = SlotStorage::new();
        let handle = storage.allocate(7u8);
        assert!(!handle.is_null());
        assert_eq!(handle_of(slot_key(handle)), handle);
        assert!(slot_key(Handle::INVALID).is_null());
    }

    #[test]
    fn test_growth_keeps_handles_valid() {
        let mut storage = SlotStorage::with_capacity(1);
        let first = storage.allocate(String::from("first"));
        for i in 0..1000 {
            storage.allocate(i.to_string());
        }
        assert_eq!(storage.try_get(first).map(String::as_str), Some("first"));
    }

    #[test]
    fn test_clear_invalidates_everything() {
        let mut storage = SlotStorage::new();
        let a = storage.allocate(1);
        let b = storage.allocate(2);
        storage.clear();

        assert!(storage.is_empty());
        assert!(!storage.valid(a));
        assert!(!storage.valid(b));

        // 复用的 slot 不会让旧句柄复活
        let c = storage.allocate(3);
        assert!(c.id() == a.id() || c.id() == b.id());
        assert!(!storage.valid(a));
        assert!(!storage.valid(b));
        assert!(storage.valid(c));
    }

    #[test]
    fn test_iter() {
        let mut storage = SlotStorage::new();
        let a = storage.allocate('a');
        let b = storage.allocate('b');
        storage.free(a);
        let items = storage.iter().collect::<Vec<_>>();
        assert_eq!(items, vec![(b, &'b')]);
    }
}
