//! History traversal: reachability, divergence, and completeness queries
//! over a [`VersionHistory`] cache.
//!
//! The default walk follows `parents` edges only. `unrelated` and `squashed`
//! edges carry no ancestry semantics — they answer *membership* questions
//! ("was this older hash absorbed?") without walking the pre-graft or
//! pre-squash history, and are consulted only by [`is_ref_absorbed`] and the
//! no-common-ancestor arm of [`diverge_data`].
//!
//! Entries missing from the cache are reported, never a panic: a walk that
//! runs off the known graph returns the unresolvable refs in `missing`.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ModelComponent, Ref, VersionHistory};

// ---------------------------------------------------------------------------
// WalkResult
// ---------------------------------------------------------------------------

/// The outcome of a reachability walk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WalkResult {
    /// Every ref reachable from the start via `parents`, start included
    /// (when present in the cache). A set: identical across invocations
    /// regardless of parent iteration order.
    pub found: BTreeSet<Ref>,
    /// Refs encountered on a `parents` edge (or as the start) with no cache
    /// entry. Sorted, deduplicated.
    pub missing: Vec<Ref>,
}

impl WalkResult {
    /// Returns `true` when the walk resolved every ref it encountered.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Walk `parents` edges from `start`, collecting every reachable ref.
///
/// Stops at refs missing from the cache and reports them in `missing`.
/// Does **not** follow `unrelated` or `squashed`.
#[must_use]
pub fn all_hashes_from(history: &VersionHistory, start: &Ref) -> WalkResult {
    let mut found = BTreeSet::new();
    let mut missing = BTreeSet::new();
    let mut stack = vec![start.clone()];

    while let Some(current) = stack.pop() {
        if found.contains(&current) || missing.contains(&current) {
            continue;
        }
        match history.get(&current) {
            Some(entry) => {
                stack.extend(entry.parents.iter().cloned());
                found.insert(current);
            }
            None => {
                missing.insert(current);
            }
        }
    }

    WalkResult {
        found,
        missing: missing.into_iter().collect(),
    }
}

/// Returns `true` if `candidate` is reachable from `start` via `parents`.
#[must_use]
pub fn is_ref_part_of_history(history: &VersionHistory, start: &Ref, candidate: &Ref) -> bool {
    all_hashes_from(history, start).found.contains(candidate)
}

/// Membership query: was `candidate` either reached from `start`, or
/// absorbed by a reachable version through an `unrelated` graft or a
/// `squashed` collapse?
#[must_use]
pub fn is_ref_absorbed(history: &VersionHistory, start: &Ref, candidate: &Ref) -> bool {
    let walk = all_hashes_from(history, start);
    if walk.found.contains(candidate) {
        return true;
    }
    walk.found.iter().any(|hash| {
        let Some(entry) = history.get(hash) else {
            return false;
        };
        entry.unrelated.as_ref() == Some(candidate)
            || entry
                .squashed
                .as_ref()
                .is_some_and(|squashed| squashed.contains(candidate))
    })
}

/// Returns `true` iff every transitive parent of `start` is present in the
/// cache. Memoized: a successful answer is recorded in
/// `graph_complete_refs` (marking the record dirty) and later calls return
/// without re-walking.
pub fn is_graph_complete_since(history: &mut VersionHistory, start: &Ref) -> bool {
    if history.is_marked_graph_complete(start) {
        return true;
    }
    let complete = all_hashes_from(history, start).is_complete();
    if complete {
        history.mark_graph_complete(start.clone());
    }
    complete
}

// ---------------------------------------------------------------------------
// Divergence
// ---------------------------------------------------------------------------

/// The relationship between two heads of the same component.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DivergeData {
    /// The chosen common ancestor, when one exists.
    pub common_ancestor: Option<Ref>,
    /// Refs reachable from `local` but not from `remote`. Sorted.
    pub local_only: Vec<Ref>,
    /// Refs reachable from `remote` but not from `local`. Sorted.
    pub remote_only: Vec<Ref>,
    /// `true` when both sides carry history the other lacks.
    pub diverged: bool,
}

impl DivergeData {
    /// `local` is strictly ahead: it reaches `remote` and adds more.
    #[must_use]
    pub fn is_local_ahead(&self) -> bool {
        !self.diverged && !self.local_only.is_empty()
    }

    /// `remote` is strictly ahead: it reaches `local` and adds more.
    #[must_use]
    pub fn is_remote_ahead(&self) -> bool {
        !self.diverged && !self.remote_only.is_empty()
    }

    /// Neither side carries anything the other lacks.
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.local_only.is_empty() && self.remote_only.is_empty()
    }
}

/// Compare two heads: common ancestor, per-side exclusive history, and
/// whether they diverged.
///
/// When several lowest common ancestors exist the choice is deterministic:
/// the candidate with the greatest number of descendants within
/// `found(local) ∪ found(remote)` wins; remaining ties break to the
/// lexicographically greatest hash.
///
/// When no common ancestor exists but either side absorbed the other
/// (`unrelated` graft or `squashed` collapse), the heads are reported as
/// not diverged with empty exclusive sets.
#[must_use]
pub fn diverge_data(history: &VersionHistory, local: &Ref, remote: &Ref) -> DivergeData {
    let local_walk = all_hashes_from(history, local);
    let remote_walk = all_hashes_from(history, remote);

    let common: BTreeSet<Ref> = local_walk
        .found
        .intersection(&remote_walk.found)
        .cloned()
        .collect();
    let local_only: Vec<Ref> = local_walk
        .found
        .difference(&remote_walk.found)
        .cloned()
        .collect();
    let remote_only: Vec<Ref> = remote_walk
        .found
        .difference(&local_walk.found)
        .cloned()
        .collect();

    if common.is_empty() {
        if is_ref_absorbed(history, local, remote) || is_ref_absorbed(history, remote, local) {
            return DivergeData {
                common_ancestor: None,
                local_only: Vec::new(),
                remote_only: Vec::new(),
                diverged: false,
            };
        }
        return DivergeData {
            common_ancestor: None,
            diverged: !local_only.is_empty() && !remote_only.is_empty(),
            local_only,
            remote_only,
        };
    }

    // Reachability sets per node, computed once and shared between the
    // lowest-ancestor filter and the descendant-count tie-break.
    let union: BTreeSet<Ref> = local_walk.found.union(&remote_walk.found).cloned().collect();
    let reach: BTreeMap<Ref, BTreeSet<Ref>> = union
        .iter()
        .map(|node| (node.clone(), all_hashes_from(history, node).found))
        .collect();

    // Lowest common ancestors: common nodes that are not a proper ancestor
    // of another common node.
    let lowest = common
        .iter()
        .filter(|c| {
            !common
                .iter()
                .any(|d| d != *c && reach[d].contains(*c))
        })
        .cloned();

    let descendant_count = |c: &Ref| {
        union
            .iter()
            .filter(|n| *n != c && reach[*n].contains(c))
            .count()
    };

    let common_ancestor = lowest
        .map(|c| (descendant_count(&c), c))
        .max_by(|(count_a, ref_a), (count_b, ref_b)| {
            count_a.cmp(count_b).then_with(|| ref_a.cmp(ref_b))
        })
        .map(|(_, c)| c);

    DivergeData {
        common_ancestor,
        diverged: !local_only.is_empty() && !remote_only.is_empty(),
        local_only,
        remote_only,
    }
}

/// Merge-pending: the component has both a local head and a recorded remote
/// head, and the two have diverged.
#[must_use]
pub fn is_merge_pending(component: &ModelComponent, history: &VersionHistory) -> bool {
    let (Some(local), Some(remote)) = (&component.head, &component.remote_head) else {
        return false;
    };
    if local == remote {
        return false;
    }
    diverge_data(history, local, remote).diverged
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VersionParents;

    fn r(c: char) -> Ref {
        Ref::new(&c.to_string().repeat(40)).unwrap()
    }

    /// Build a history from `(hash, parents)` pairs.
    fn history(entries: &[(char, &[char])]) -> VersionHistory {
        let mut h = VersionHistory::new("acme", "button");
        for (hash, parents) in entries {
            h.add_entry(VersionParents {
                hash: r(*hash),
                parents: parents.iter().map(|c| r(*c)).collect(),
                unrelated: None,
                squashed: None,
            });
        }
        h.has_changed = false;
        h
    }

    // -- all_hashes_from --

    #[test]
    fn walk_linear_chain() {
        let h = history(&[('a', &[]), ('b', &['a']), ('c', &['b'])]);
        let walk = all_hashes_from(&h, &r('c'));
        assert_eq!(walk.found, [r('a'), r('b'), r('c')].into());
        assert!(walk.is_complete());
    }

    #[test]
    fn walk_reports_missing_parent() {
        let h = history(&[('b', &['a'])]);
        let walk = all_hashes_from(&h, &r('b'));
        assert_eq!(walk.found, [r('b')].into());
        assert_eq!(walk.missing, vec![r('a')]);
    }

    #[test]
    fn walk_missing_start() {
        let h = history(&[('a', &[])]);
        let walk = all_hashes_from(&h, &r('z'));
        assert!(walk.found.is_empty());
        assert_eq!(walk.missing, vec![r('z')]);
    }

    #[test]
    fn walk_handles_diamond() {
        // a ← b, a ← c, {b,c} ← d
        let h = history(&[('a', &[]), ('b', &['a']), ('c', &['a']), ('d', &['b', 'c'])]);
        let walk = all_hashes_from(&h, &r('d'));
        assert_eq!(walk.found.len(), 4);
    }

    #[test]
    fn walk_ignores_unrelated_and_squashed() {
        let mut h = history(&[('a', &[]), ('x', &[])]);
        h.add_entry(VersionParents {
            hash: r('b'),
            parents: vec![r('a')],
            unrelated: Some(r('x')),
            squashed: Some(vec![r('9')]),
        });
        let walk = all_hashes_from(&h, &r('b'));
        assert_eq!(walk.found, [r('a'), r('b')].into());
        assert!(walk.is_complete());
    }

    #[test]
    fn walk_found_is_order_insensitive() {
        let forward = history(&[('a', &[]), ('b', &[]), ('c', &['a', 'b'])]);
        let reversed = history(&[('a', &[]), ('b', &[]), ('c', &['b', 'a'])]);
        assert_eq!(
            all_hashes_from(&forward, &r('c')).found,
            all_hashes_from(&reversed, &r('c')).found
        );
    }

    // -- is_ref_part_of_history / is_ref_absorbed --

    #[test]
    fn part_of_history_via_parents_only() {
        let h = history(&[('a', &[]), ('b', &['a'])]);
        assert!(is_ref_part_of_history(&h, &r('b'), &r('a')));
        assert!(!is_ref_part_of_history(&h, &r('a'), &r('b')));
    }

    #[test]
    fn absorbed_via_squashed() {
        let mut h = history(&[('a', &[])]);
        h.add_entry(VersionParents {
            hash: r('b'),
            parents: vec![r('a')],
            unrelated: None,
            squashed: Some(vec![r('1'), r('2')]),
        });
        assert!(is_ref_absorbed(&h, &r('b'), &r('1')));
        assert!(!is_ref_part_of_history(&h, &r('b'), &r('1')));
        assert!(!is_ref_absorbed(&h, &r('b'), &r('9')));
    }

    #[test]
    fn absorbed_via_unrelated() {
        let mut h = history(&[('a', &[])]);
        h.add_entry(VersionParents {
            hash: r('b'),
            parents: vec![r('a')],
            unrelated: Some(r('x')),
            squashed: None,
        });
        assert!(is_ref_absorbed(&h, &r('b'), &r('x')));
    }

    // -- is_graph_complete_since --

    #[test]
    fn graph_complete_memoizes() {
        let mut h = history(&[('a', &[]), ('b', &['a'])]);
        assert!(is_graph_complete_since(&mut h, &r('b')));
        assert!(h.has_changed);
        assert!(h.is_marked_graph_complete(&r('b')));

        // Second call answers from the memo without re-walking (and without
        // re-dirtying the record).
        h.has_changed = false;
        assert!(is_graph_complete_since(&mut h, &r('b')));
        assert!(!h.has_changed);
    }

    #[test]
    fn graph_incomplete_is_not_marked() {
        let mut h = history(&[('b', &['a'])]);
        assert!(!is_graph_complete_since(&mut h, &r('b')));
        assert!(!h.is_marked_graph_complete(&r('b')));
        assert!(!h.has_changed);
    }

    // -- diverge_data --

    #[test]
    fn diverge_local_ahead() {
        let h = history(&[('a', &[]), ('b', &['a'])]);
        let d = diverge_data(&h, &r('b'), &r('a'));
        assert!(!d.diverged);
        assert!(d.is_local_ahead());
        assert_eq!(d.common_ancestor, Some(r('a')));
        assert_eq!(d.local_only, vec![r('b')]);
        assert!(d.remote_only.is_empty());
    }

    #[test]
    fn diverge_remote_ahead() {
        let h = history(&[('a', &[]), ('b', &['a'])]);
        let d = diverge_data(&h, &r('a'), &r('b'));
        assert!(!d.diverged);
        assert!(d.is_remote_ahead());
        assert_eq!(d.common_ancestor, Some(r('a')));
    }

    #[test]
    fn diverge_same_head_up_to_date() {
        let h = history(&[('a', &[])]);
        let d = diverge_data(&h, &r('a'), &r('a'));
        assert!(d.is_up_to_date());
        assert_eq!(d.common_ancestor, Some(r('a')));
    }

    #[test]
    fn diverge_true_fork() {
        // a ← b and a ← c: both sides have exclusive history.
        let h = history(&[('a', &[]), ('b', &['a']), ('c', &['a'])]);
        let d = diverge_data(&h, &r('b'), &r('c'));
        assert!(d.diverged);
        assert_eq!(d.common_ancestor, Some(r('a')));
        assert_eq!(d.local_only, vec![r('b')]);
        assert_eq!(d.remote_only, vec![r('c')]);
    }

    #[test]
    fn diverge_criss_cross_is_deterministic() {
        // Criss-cross: two equally-low common ancestors b and c.
        //   a ← b, a ← c; d merges (b,c); e merges (b,c).
        let h = history(&[
            ('a', &[]),
            ('b', &['a']),
            ('c', &['a']),
            ('d', &['b', 'c']),
            ('e', &['b', 'c']),
        ]);
        let first = diverge_data(&h, &r('d'), &r('e'));
        let second = diverge_data(&h, &r('d'), &r('e'));
        assert_eq!(first, second);
        assert!(first.diverged);
        // b and c tie on descendant count; the lexicographically greater
        // hash wins.
        assert_eq!(first.common_ancestor, Some(r('c')));
    }

    #[test]
    fn diverge_no_common_ancestor() {
        let h = history(&[('a', &[]), ('x', &[])]);
        let d = diverge_data(&h, &r('a'), &r('x'));
        assert!(d.diverged);
        assert_eq!(d.common_ancestor, None);
        assert_eq!(d.local_only, vec![r('a')]);
        assert_eq!(d.remote_only, vec![r('x')]);
    }

    #[test]
    fn diverge_unrelated_graft_suppresses_divergence() {
        // Local 'b' grafted the foreign head 'x' via an unrelated edge.
        let mut h = history(&[('a', &[]), ('x', &[])]);
        h.add_entry(VersionParents {
            hash: r('b'),
            parents: vec![r('a')],
            unrelated: Some(r('x')),
            squashed: None,
        });
        let d = diverge_data(&h, &r('b'), &r('x'));
        assert!(!d.diverged);
        assert_eq!(d.common_ancestor, None);
        assert!(d.local_only.is_empty());
        assert!(d.remote_only.is_empty());
    }

    #[test]
    fn diverge_squashed_suppresses_divergence() {
        // 'b' squashed away the range that contained 'x'.
        let mut h = history(&[('a', &[]), ('x', &[])]);
        h.add_entry(VersionParents {
            hash: r('b'),
            parents: vec![r('a')],
            unrelated: None,
            squashed: Some(vec![r('x')]),
        });
        let d = diverge_data(&h, &r('b'), &r('x'));
        assert!(!d.diverged);
    }

    // -- is_merge_pending --

    #[test]
    fn merge_pending_on_fork() {
        let h = history(&[('a', &[]), ('b', &['a']), ('c', &['a'])]);
        let mut component = ModelComponent::new("acme", "button");
        component.head = Some(r('b'));
        component.remote_head = Some(r('c'));
        assert!(is_merge_pending(&component, &h));
    }

    #[test]
    fn no_merge_pending_when_local_ahead() {
        let h = history(&[('a', &[]), ('b', &['a'])]);
        let mut component = ModelComponent::new("acme", "button");
        component.head = Some(r('b'));
        component.remote_head = Some(r('a'));
        assert!(!is_merge_pending(&component, &h));
    }

    #[test]
    fn no_merge_pending_without_remote() {
        let h = history(&[('a', &[])]);
        let mut component = ModelComponent::new("acme", "button");
        component.head = Some(r('a'));
        assert!(!is_merge_pending(&component, &h));
    }
}

#[cfg(test)]
mod determinism {
    use super::*;
    use crate::model::VersionParents;
    use proptest::prelude::*;

    fn nth_ref(n: usize) -> Ref {
        Ref::for_bytes(format!("node-{n}").as_bytes())
    }

    /// Build a DAG where node `i` picks parents from nodes `0..i`.
    fn build(parent_picks: &[Vec<prop::sample::Index>], reverse: bool) -> VersionHistory {
        let mut h = VersionHistory::new("acme", "button");
        for (i, picks) in parent_picks.iter().enumerate() {
            let mut parents: Vec<Ref> = picks
                .iter()
                .filter_map(|idx| (i > 0).then(|| nth_ref(idx.index(i))))
                .collect();
            parents.sort();
            parents.dedup();
            if reverse {
                parents.reverse();
            }
            h.add_entry(VersionParents {
                hash: nth_ref(i),
                parents,
                unrelated: None,
                squashed: None,
            });
        }
        h
    }

    proptest! {
        /// `found` is a set: parent iteration order never changes it.
        #[test]
        fn walk_is_parent_order_insensitive(
            parent_picks in prop::collection::vec(
                prop::collection::vec(any::<prop::sample::Index>(), 0..4),
                1..24,
            )
        ) {
            let forward = build(&parent_picks, false);
            let reversed = build(&parent_picks, true);
            let start = nth_ref(parent_picks.len() - 1);
            prop_assert_eq!(
                all_hashes_from(&forward, &start).found,
                all_hashes_from(&reversed, &start).found
            );
        }
    }
}
