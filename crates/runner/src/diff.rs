use std::hash::Hash;

use rustc_hash::FxHashSet;

/// Keys present in `before` but not in `after`.
///
/// Duplicates on either side are ignored and the result holds each stale key
/// once, in no particular order.
pub fn stale_keys<K, B, A>(before: B, after: A) -> Vec<K>
where
    K: Eq + Hash,
    B: IntoIterator<Item = K>,
    A: IntoIterator<Item = K>,
{
    let after: FxHashSet<K> = after.into_iter().collect();
    let before: FxHashSet<K> = before.into_iter().collect();
    before.into_iter().filter(|k| !after.contains(k)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut v: Vec<&'static str>) -> Vec<&'static str> {
        v.sort_unstable();
        v
    }

    #[test]
    fn returns_the_set_difference() {
        assert_eq!(sorted(stale_keys(["a", "b", "c"], ["b"])), vec!["a", "c"]);
        assert!(stale_keys(["a", "b"], ["b", "a"]).is_empty());
        assert!(stale_keys(Vec::<&str>::new(), ["x"]).is_empty());
        assert_eq!(sorted(stale_keys(["a"], Vec::<&str>::new())), vec!["a"]);
    }

    #[test]
    fn duplicates_do_not_matter() {
        assert_eq!(stale_keys(["a", "a", "b"], ["b", "b"]), vec!["a"]);
    }
}
