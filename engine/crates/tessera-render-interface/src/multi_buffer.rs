//! N 路轮转的 buffer
//!
//! 每一帧写入 `write()`，读取上一帧写入的 `read()`，帧末调用 `swap()`。
//! N >= 2 时，同一帧内读和写永远不会落在同一个元素上。

/// 写入位置是游标，读取位置是游标的前一个
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiBuffer<T, const N: usize> {
    items: [T; N],
    cursor: usize,
}

pub type SingleBuffer<T> = MultiBuffer<T, 1>;
pub type DoubleBuffer<T> = MultiBuffer<T, 2>;
pub type RingBuffer<T, const N: usize> = MultiBuffer<T, N>;

impl<T: Default, const N: usize> Default for MultiBuffer<T, N> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}
// new & init
impl<T, const N: usize> MultiBuffer<T, N> {
    pub fn new(items: [T; N]) -> Self {
        assert!(N > 0, "MultiBuffer needs at least one item");
        Self { items, cursor: 0 }
    }

    pub fn from_fn(f: impl FnMut(usize) -> T) -> Self {
        Self::new(std::array::from_fn(f))
    }
}
// getter
impl<T, const N: usize> MultiBuffer<T, N> {
    #[inline]
    pub const fn len(&self) -> usize {
        N
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        false
    }

    #[inline]
    pub fn write_index(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn read_index(&self) -> usize {
        (self.cursor + N - 1) % N
    }

    #[inline]
    pub fn write(&self) -> &T {
        &self.items[self.write_index()]
    }

    #[inline]
    pub fn write_mut(&mut self) -> &mut T {
        let index = self.write_index();
        &mut self.items[index]
    }

    #[inline]
    pub fn read(&self) -> &T {
        &self.items[self.read_index()]
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// 按存储顺序遍历，与游标无关
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    #[inline]
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }
}
// tools
impl<T, const N: usize> MultiBuffer<T, N> {
    /// 帧末调用：本帧写入的元素变为下一帧的读取元素
    #[inline]
    pub fn swap(&mut self) {
        self.cursor = (self.cursor + 1) % N;
    }

    /// 逐个转换元素，保留游标位置
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> MultiBuffer<U, N> {
        MultiBuffer {
            items: self.items.map(f),
            cursor: self.cursor,
        }
    }

    /// 所有元素恢复为默认值，游标归零
    pub fn reset(&mut self)
    where
        T: Default,
    {
        self.items.iter_mut().for_each(|item| *item = T::default());
        self.cursor = 0;
    }
}
impl<'a, T, const N: usize> IntoIterator for &'a MultiBuffer<T, N> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
