//! 把任意的请求描述（例如 texture 的尺寸/格式/用途）包装成关联容器的 key
//!
//! [`StateKey`] 持有 state 的一份拷贝，hash 与相等比较都委托给 state 自身，
//! 因此 state 不需要能按位比较。
//!
//! 查找时不需要构造 `StateKey`：`StateKey: Borrow<dyn DynState>`，
//! 可以直接用 [`as_dyn_state`] 在 `HashMap<StateKey, _>` 中查询，
//! 只有插入新 key 时才会拷贝一次 state。

use std::any::{Any, TypeId};
use std::borrow::Borrow;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// 可以作为 Pool / Cache key 的 state
///
/// 所有 `Hash + Eq + Clone + Debug + 'static` 的类型都自动满足。
pub trait State: Hash + Eq + Clone + fmt::Debug + 'static {}
impl<T> State for T where T: Hash + Eq + Clone + fmt::Debug + 'static {}

/// object safe 的 state 接口
pub trait DynState: Any + fmt::Debug {
    fn as_any(&self) -> &dyn Any;

    /// 不同的具体类型之间永远不相等
    fn dyn_eq(&self, other: &dyn DynState) -> bool;

    /// 具体类型的 TypeId 会参与 hash
    fn dyn_hash(&self, hasher: &mut dyn Hasher);

    fn clone_boxed(&self) -> Box<dyn DynState>;
}
impl<T: State> DynState for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn DynState) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|other| self == other)
    }

    fn dyn_hash(&self, mut hasher: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut hasher);
        self.hash(&mut hasher);
    }

    fn clone_boxed(&self) -> Box<dyn DynState> {
        Box::new(self.clone())
    }
}
impl<'a> PartialEq for dyn DynState + 'a {
    fn eq(&self, other: &Self) -> bool {
        self.dyn_eq(other)
    }
}
impl<'a> Eq for dyn DynState + 'a {}
impl<'a> Hash for dyn DynState + 'a {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dyn_hash(state);
    }
}

/// 用于在 `HashMap<StateKey, _>` 中查询
#[inline]
pub fn as_dyn_state<S: State>(state: &S) -> &(dyn DynState + 'static) {
    state
}

/// 持有一份 state 拷贝的 key
///
/// 没有实现 `Clone`：隐式拷贝 key 会悄悄复制一份 state，需要时使用 [`StateKey::clone_key`]。
pub struct StateKey {
    state: Box<dyn DynState>,
}
impl StateKey {
    /// 拷贝一份 `state` 作为 key
    pub fn new<S: State>(state: &S) -> Self {
        Self {
            state: Box::new(state.clone()),
        }
    }

    pub fn clone_key(&self) -> Self {
        Self {
            state: self.state.clone_boxed(),
        }
    }

    #[inline]
    pub fn state(&self) -> &(dyn DynState + 'static) {
        &*self.state
    }

    #[inline]
    pub fn downcast_ref<S: State>(&self) -> Option<&S> {
        self.state.as_any().downcast_ref::<S>()
    }

    /// key 的 64 位 hash，用于记录句柄的归属
    pub fn key_hash(&self) -> u64 {
        Self::hash_of(self.state())
    }

    /// 与 [`StateKey::key_hash`] 一致的 hash，但不需要构造 key
    pub fn hash_of(state: &dyn DynState) -> u64 {
        let mut hasher = DefaultHasher::new();
        state.dyn_hash(&mut hasher);
        hasher.finish()
    }
}
impl PartialEq for StateKey {
    fn eq(&self, other: &Self) -> bool {
        self.state() == other.state()
    }
}
impl Eq for StateKey {}
impl Hash for StateKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.state().hash(state);
    }
}
impl Borrow<dyn DynState> for StateKey {
    fn borrow(&self) -> &(dyn DynState + 'static) {
        &*self.state
    }
}
impl fmt::Debug for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateKey({:?})", self.state)
    }
}
