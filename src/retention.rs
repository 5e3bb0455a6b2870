//! Managed-snapshot pruning (spec.md §4.6 Steps 6–7). The teacher's own
//! `retention.rs::apply_retention` is an `unimplemented!()` stub — its
//! `RetentionOpts::keep_unusual` names a date-based policy but never
//! implements one; the actual date-tag check (`^\d{4}-\d{2}-\d{2}$`) lives
//! in `dataset.rs`. This module fills in the stub's shape (take an
//! inventory and a policy, hand back what to destroy) with spec.md §6's
//! keep-count policy (`SNAP_KEEP`) instead of a date-keyed one.

use crate::dataset::Snap;

/// The oldest snapshots in `inventory` (already sorted ascending by
/// creation) that must be destroyed so that, once Step 8 creates the new
/// managed snapshot, the side holds no more than `keep` in total. Pruning
/// therefore brings the count down to `keep - 1`, not `keep` — the new
/// snapshot is the `+1` spec.md §3 counts ("inclusive of the new one").
/// Returns an empty slice when `inventory.len() < keep` — spec.md's "if
/// `|S| >= SNAP_KEEP`" guard.
pub fn prune_candidates(inventory: &[Snap], keep: usize) -> &[Snap] {
    if inventory.len() < keep {
        return &[];
    }
    let target = keep.saturating_sub(1);
    let excess = inventory.len().saturating_sub(target);
    &inventory[..excess]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn snap(guid: u64, name: &str, secs: i64) -> Snap {
        Snap { guid, name: name.to_string(), creation: DateTime::from_timestamp(secs, 0).unwrap() }
    }

    #[test]
    fn keeps_newest_minus_one_when_over_budget() {
        let snaps = vec![snap(1, "T1", 100), snap(2, "T2", 200), snap(3, "T3", 300)];
        let candidates = prune_candidates(&snaps, 2);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].name, "T1");
        assert_eq!(candidates[1].name, "T2");
    }

    #[test]
    fn no_candidates_when_under_budget() {
        let snaps = vec![snap(1, "T1", 100)];
        assert!(prune_candidates(&snaps, 2).is_empty());
    }

    #[test]
    fn exactly_at_budget_prunes_down_to_keep_minus_one() {
        // spec.md Step 6 prunes once |S| >= SNAP_KEEP, making room so the
        // new snapshot Step 8 creates brings the total back to SNAP_KEEP,
        // not SNAP_KEEP + 1.
        let snaps = vec![snap(1, "T1", 100), snap(2, "T2", 200)];
        let candidates = prune_candidates(&snaps, 2);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "T1");
    }

    #[test]
    fn s4_retention_scenario_leaves_two_after_creation() {
        // spec.md S4: source [T1,T2,T3] under SNAP_KEEP=2 -> T1 and T2 are
        // destroyed, so post-creation the side holds exactly [T3,T4].
        let snaps = vec![snap(1, "T1", 100), snap(2, "T2", 200), snap(3, "T3", 300)];
        let candidates: Vec<&str> = prune_candidates(&snaps, 2).iter().map(|s| s.name.as_str()).collect();
        assert_eq!(candidates, vec!["T1", "T2"]);
    }
}
