//! acquire / release 复用策略
//!
//! 每个不同的 state 对应一个 bucket，bucket 内保存已经 release、可以再次使用的句柄。
//! acquire 时优先从 bucket 中取（hit），没有时才调用 factory 创建（miss）。

use std::collections::HashMap;
use std::marker::PhantomData;

use indexmap::IndexMap;

use crate::factory::Factory;
use crate::handle::Handle;
use crate::state_key::{State, StateKey, as_dyn_state};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BucketStats {
    pub hits: u64,
    pub misses: u64,
    /// 当前可复用的句柄数量
    pub free_count: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub acquires: u64,
    pub releases: u64,
    pub hits: u64,
    pub misses: u64,
    /// factory.create 成功的次数
    pub creations: u64,
    /// clear 时销毁的句柄数量
    pub destroyed: u64,
    /// 被拒绝的 release（重复 release、state 不匹配、不属于该 pool）
    pub rejected_releases: u64,
}

#[derive(Default)]
struct Bucket {
    free_list: Vec<Handle>,
    hits: u64,
    misses: u64,
}

pub struct Pool<S: State> {
    buckets: IndexMap<StateKey, Bucket>,

    /// 已经 acquire 尚未 release 的句柄 -> acquire 时所在 bucket 的下标
    ///
    /// 用于拒绝在错误的 state 下 release，避免污染其他 bucket 的空闲列表。
    /// bucket 只会在 clear 时整体移除，下标在此之前保持稳定。
    outstanding: HashMap<Handle, usize>,

    stats: PoolStats,
    _marker: PhantomData<fn(&S)>,
}
impl<S: State> Default for Pool<S> {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl<S: State> Pool<S> {
    pub fn new() -> Self {
        Self {
            buckets: IndexMap::new(),
            outstanding: HashMap::new(),
            stats: PoolStats::default(),
            _marker: PhantomData,
        }
    }
}
// getter
impl<S: State> Pool<S> {
    #[inline]
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    pub fn bucket_stats(&self, state: &S) -> Option<BucketStats> {
        self.buckets.get(as_dyn_state(state)).map(|bucket| BucketStats {
            hits: bucket.hits,
            misses: bucket.misses,
            free_count: bucket.free_list.len(),
        })
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// 所有 bucket 中可复用的句柄总数
    pub fn free_count(&self) -> usize {
        self.buckets.values().map(|bucket| bucket.free_list.len()).sum()
    }

    #[inline]
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.len()
    }

    #[inline]
    pub fn is_outstanding(&self, handle: Handle) -> bool {
        self.outstanding.contains_key(&handle)
    }
}
// tools
impl<S: State> Pool<S> {
    /// 获取一个与 `state` 匹配的资源
    ///
    /// 返回的句柄在 release 之前不会再被其他调用者获取到。
    pub fn acquire<F>(&mut self, state: &S, factory: &mut F) -> Result<Handle, F::Error>
    where
        F: Factory<State = S>,
    {
        let _span = tracy_client::span!("Pool::acquire");

        let bucket_index = match self.buckets.get_index_of(as_dyn_state(state)) {
            Some(index) => index,
            None => self.buckets.insert_full(StateKey::new(state), Bucket::default()).0,
        };
        let bucket = &mut self.buckets[bucket_index];

        let handle = match bucket.free_list.pop() {
            Some(handle) => {
                bucket.hits += 1;
                self.stats.hits += 1;
                handle
            }
            None => {
                bucket.misses += 1;
                self.stats.misses += 1;
                let handle = factory.create(state)?;
                self.stats.creations += 1;
                handle
            }
        };

        let previous = self.outstanding.insert(handle, bucket_index);
        debug_assert!(previous.is_none(), "pool handed out {handle:?} twice");
        self.stats.acquires += 1;

        Ok(handle)
    }

    /// 归还通过 `acquire(state)` 获取的句柄
    ///
    /// # 返回
    /// 以下情况会拒绝并返回 false（不会修改任何空闲列表）：
    /// - 句柄不是由该 pool 发放的，或者已经被 release 过
    /// - 句柄是在另一个 state 下 acquire 的
    pub fn release(&mut self, state: &S, handle: Handle) -> bool {
        let Some(&owner_index) = self.outstanding.get(&handle) else {
            log::error!("Pool: release of {:?} which is not outstanding (double release?)", handle);
            self.stats.rejected_releases += 1;
            return false;
        };

        if self.buckets.get_index_of(as_dyn_state(state)) != Some(owner_index) {
            log::error!("Pool: {:?} released under {:?}, but it was acquired under another state", handle, state);
            self.stats.rejected_releases += 1;
            return false;
        }

        self.outstanding.remove(&handle);
        self.buckets[owner_index].free_list.push(handle);
        self.stats.releases += 1;
        true
    }

    /// 销毁空闲的句柄，但保留 bucket 以及仍被持有的句柄的记录
    ///
    /// 例如窗口尺寸变化后，旧尺寸的 texture 不会再被请求到。
    pub fn trim<F>(&mut self, factory: &mut F) -> usize
    where
        F: Factory<State = S>,
    {
        let mut destroyed = 0;
        for bucket in self.buckets.values_mut() {
            for handle in bucket.free_list.drain(..) {
                factory.destroy(handle);
                destroyed += 1;
            }
        }
        self.stats.destroyed += destroyed as u64;
        destroyed
    }

    /// 销毁所有空闲的句柄
    ///
    /// 这是关闭时使用的操作：仍被持有（未 release）的句柄不会被销毁，只会被遗忘。
    pub fn clear<F>(&mut self, factory: &mut F)
    where
        F: Factory<State = S>,
    {
        for (_, mut bucket) in self.buckets.drain(..) {
            for handle in bucket.free_list.drain(..) {
                factory.destroy(handle);
                self.stats.destroyed += 1;
            }
        }

        if !self.outstanding.is_empty() {
            log::warn!("Pool: cleared with {} handles still acquired, they are leaked", self.outstanding.len());
            self.outstanding.clear();
        }
    }
}
