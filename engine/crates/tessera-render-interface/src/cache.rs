use std::marker::PhantomData;

use indexmap::IndexMap;

use crate::factory::Factory;
use crate::handle::Handle;
use crate::state_key::{State, StateKey, as_dyn_state};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// 每个不同的 state 只创建一次资源，直到 clear 为止
///
/// 没有 release：适用于 pipeline 这类重建昂贵、常驻代价很小的资源。
pub struct Cache<S: State> {
    instances: IndexMap<StateKey, Handle>,
    stats: CacheStats,
    _marker: PhantomData<fn(&S)>,
}
impl<S: State> Default for Cache<S> {
    fn default() -> Self {
        Self::new()
    }
}
// new & init
impl<S: State> Cache<S> {
    pub fn new() -> Self {
        Self {
            instances: IndexMap::new(),
            stats: CacheStats::default(),
            _marker: PhantomData,
        }
    }
}
// getter
impl<S: State> Cache<S> {
    #[inline]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    #[inline]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    #[inline]
    pub fn contains(&self, state: &S) -> bool {
        self.instances.contains_key(as_dyn_state(state))
    }

    /// 只查询，不会创建
    #[inline]
    pub fn get(&self, state: &S) -> Option<Handle> {
        self.instances.get(as_dyn_state(state)).copied()
    }

    /// 按插入顺序遍历所有缓存的 (state, handle)
    pub fn iter(&self) -> impl Iterator<Item = (&S, Handle)> {
        self.instances.iter().filter_map(|(key, handle)| key.downcast_ref::<S>().map(|state| (state, *handle)))
    }
}
// tools
impl<S: State> Cache<S> {
    /// 结构上相等的 state 总是得到同一个句柄
    ///
    /// factory 创建失败时不会插入任何条目，下次调用会重新尝试创建。
    pub fn get_or_create<F>(&mut self, state: &S, factory: &mut F) -> Result<Handle, F::Error>
    where
        F: Factory<State = S>,
    {
        if let Some(handle) = self.instances.get(as_dyn_state(state)) {
            self.stats.hits += 1;
            return Ok(*handle);
        }

        self.stats.misses += 1;
        log::debug!("Cache: miss for {:?}", state);
        let handle = factory.create(state)?;
        self.instances.insert(StateKey::new(state), handle);
        Ok(handle)
    }

    /// 销毁所有缓存的资源
    pub fn clear<F>(&mut self, factory: &mut F)
    where
        F: Factory<State = S>,
    {
        for (_, handle) in self.instances.drain(..) {
            factory.destroy(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::test_utils::{FakeFactory, FakeState};

    #[test]
    fn test_equal_states_share_instance() {
        let mut factory = FakeFactory::default();
        let mut cache = Cache::new();

        let first = FakeState { value: 42 };
        let second = FakeState { value: 42 };

        let a = cache.get_or_create(&first, &mut factory).unwrap();
        let b = cache.get_or_create(&second, &mut factory).unwrap();
        assert_eq!(a, b);
        assert_eq!(factory.created, 1);
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn test_distinct_states() {
        let mut factory = FakeFactory::default();
        let mut cache = Cache::new();

        let a = cache.get_or_create(&FakeState { value: 1 }, &mut factory).unwrap();
        let b = cache.get_or_create(&FakeState { value: 2 }, &mut factory).unwrap();
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&FakeState { value: 2 }));
        assert!(!cache.contains(&FakeState { value: 3 }));
        assert_eq!(cache.get(&FakeState { value: 1 }), Some(a));

        let states = cache.iter().map(|(state, _)| state.value).collect::<Vec<_>>();
        assert_eq!(states, vec![1, 2]);
    }

    #[test]
    fn test_clear_destroys_everything() {
        let mut factory = FakeFactory::default();
        let mut cache = Cache::new();

        let h = cache.get_or_create(&FakeState { value: 1 }, &mut factory).unwrap();
        cache.get_or_create(&FakeState { value: 2 }, &mut factory).unwrap();
        cache.clear(&mut factory);

        assert!(cache.is_empty());
        assert_eq!(factory.destroyed, 2);
        assert!(!factory.storage.valid(h));

        // clear 之后重新创建
        cache.get_or_create(&FakeState { value: 1 }, &mut factory).unwrap();
        assert_eq!(factory.created, 3);
    }
}
