//! Fx-hashed collections for interpreter bookkeeping. Keys are small
//! (qualified names, slot indices, addresses), so SipHash buys nothing here.

pub type FastHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

pub type FastHashSet<K> = rustc_hash::FxHashSet<K>;

/// Set of visited objects keyed by address, for walks over shared `Rc` graphs.
pub type VisitedSet<T> = FastHashSet<*const T>;

#[inline]
pub fn fast_hash_map_new<K, V>() -> FastHashMap<K, V> {
    rustc_hash::FxHashMap::default()
}

#[inline]
pub fn fast_hash_set_new<K>() -> FastHashSet<K> {
    rustc_hash::FxHashSet::default()
}
