// Merge strategies
// Reduce every node's snapshot of an object into a single value

use std::{collections::HashMap, sync::Arc};

use orrery_api::ObjectInfo;

use crate::value::{ConcurrentList, ConcurrentMap};

/// Reduces the snapshots of all nodes into one value.
///
/// Snapshots are passed in the order the caller collected them; strategies
/// that resolve collisions let later snapshots win.
pub trait MergeStrategy<T> {
    type Output;

    fn merge(&self, infos: &[Arc<ObjectInfo<T>>]) -> Self::Output;
}

impl<T, O, F> MergeStrategy<T> for F
where
    F: Fn(&[Arc<ObjectInfo<T>>]) -> O,
{
    type Output = O;

    fn merge(&self, infos: &[Arc<ObjectInfo<T>>]) -> O {
        self(infos)
    }
}

/// Concatenates every node's sequence, duplicates preserved
#[derive(Clone, Copy, Debug, Default)]
pub struct UnionListMerge;

impl<E: Clone> MergeStrategy<Vec<E>> for UnionListMerge {
    type Output = Vec<E>;

    fn merge(&self, infos: &[Arc<ObjectInfo<Vec<E>>>]) -> Vec<E> {
        infos
            .iter()
            .flat_map(|info| info.value().iter().cloned())
            .collect()
    }
}

impl<E: Clone> MergeStrategy<ConcurrentList<E>> for UnionListMerge {
    type Output = Vec<E>;

    fn merge(&self, infos: &[Arc<ObjectInfo<ConcurrentList<E>>>]) -> Vec<E> {
        let mut result = Vec::new();
        for info in infos {
            result.extend(info.value().snapshot());
        }
        result
    }
}

/// Unions every node's map; on key collision the later snapshot wins
#[derive(Clone, Copy, Debug, Default)]
pub struct UnionMapMerge;

impl<V: Clone> MergeStrategy<HashMap<String, V>> for UnionMapMerge {
    type Output = HashMap<String, V>;

    fn merge(&self, infos: &[Arc<ObjectInfo<HashMap<String, V>>>]) -> HashMap<String, V> {
        let mut result = HashMap::new();
        for info in infos {
            result.extend(info.value().iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        result
    }
}

impl<V: Clone> MergeStrategy<ConcurrentMap<V>> for UnionMapMerge {
    type Output = HashMap<String, V>;

    fn merge(&self, infos: &[Arc<ObjectInfo<ConcurrentMap<V>>>]) -> HashMap<String, V> {
        let mut result = HashMap::new();
        for info in infos {
            result.extend(info.value().snapshot());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info<T>(node: &str, value: T) -> Arc<ObjectInfo<T>> {
        Arc::new(ObjectInfo::new(node, "test", value))
    }

    #[test]
    fn test_union_list_merge() {
        let infos = vec![info("A", vec![1, 2]), info("B", vec![3])];
        assert_eq!(UnionListMerge.merge(&infos[..]), vec![1, 2, 3]);
    }

    #[test]
    fn test_union_list_merge_keeps_duplicates() {
        let infos = vec![info("A", vec![1, 2]), info("B", vec![2, 1])];
        assert_eq!(UnionListMerge.merge(&infos[..]), vec![1, 2, 2, 1]);
    }

    #[test]
    fn test_union_concurrent_list_merge() {
        let infos = vec![
            info("A", ConcurrentList::from(vec!["a"])),
            info("B", ConcurrentList::from(vec!["b", "c"])),
        ];
        assert_eq!(UnionListMerge.merge(&infos[..]), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_union_map_merge_later_wins() {
        let a: HashMap<String, i32> = [("x".to_string(), 1), ("y".to_string(), 5)].into();
        let b: HashMap<String, i32> = [("x".to_string(), 2)].into();

        let merged = UnionMapMerge.merge(&[info("A", a.clone()), info("B", b.clone())][..]);
        assert_eq!(merged.get("x"), Some(&2));
        assert_eq!(merged.get("y"), Some(&5));

        let reversed = UnionMapMerge.merge(&[info("B", b), info("A", a)][..]);
        assert_eq!(reversed.get("x"), Some(&1));
    }

    #[test]
    fn test_union_concurrent_map_merge() {
        let a: ConcurrentMap<i32> = [("x", 1)].into_iter().collect();
        let b: ConcurrentMap<i32> = [("x", 2), ("z", 3)].into_iter().collect();
        let merged = UnionMapMerge.merge(&[info("A", a), info("B", b)][..]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get("x"), Some(&2));
    }

    #[test]
    fn test_empty_merge() {
        let infos: Vec<Arc<ObjectInfo<Vec<i32>>>> = Vec::new();
        assert!(UnionListMerge.merge(&infos[..]).is_empty());
    }

    #[test]
    fn test_closure_merge() {
        let infos = vec![info("A", 3u64), info("B", 4u64)];
        let sum = |infos: &[Arc<ObjectInfo<u64>>]| {
            infos.iter().map(|info| *info.value()).sum::<u64>()
        };
        assert_eq!(sum.merge(&infos[..]), 7);
    }
}
