//! Dataset and snapshot data model (spec.md §3).
//!
//! A dataset is identified by its slash-separated name; a snapshot belongs
//! to a dataset and is identified by the part of its name after `@`.
//! Inventories are plain, owned `Vec<Snap>` kept sorted ascending by
//! creation time, mirroring the teacher's `Dataset.snaps` invariant but
//! without bundling the host or the filesystem name into the same type —
//! that split lives in [`crate::machine`] and [`crate::pair`] instead, so
//! this module stays free of any notion of "local" vs "remote".

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashSet;

/// A single ZFS-style snapshot record.
///
/// Two `Snap`s are equal iff their `guid`s match (same snapshot object, not
/// just the same name) but ordering and lookup elsewhere in this crate are
/// name-based: see [`select_base`] for why.
#[derive(Debug, Clone)]
pub struct Snap {
    pub guid: u64,
    /// Just the part of the snapshot identifier after `@`.
    pub name: String,
    pub creation: DateTime<Utc>,
}

impl Snap {
    pub fn full_name(&self, dataset: &str) -> String {
        format!("{dataset}@{}", self.name)
    }
}

impl PartialEq for Snap {
    fn eq(&self, other: &Self) -> bool {
        self.guid == other.guid
    }
}
impl Eq for Snap {}

/// Total order by creation time, tie-broken by GUID so that `Vec::sort`
/// never panics on same-instant snapshots (the teacher's `PartialOrd`
/// returns `None` in that case and documents it as "undefined" — this
/// makes the common multi-snapshot-per-second case well-defined instead).
impl PartialOrd for Snap {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Snap {
    fn cmp(&self, other: &Self) -> Ordering {
        self.creation.cmp(&other.creation).then(self.guid.cmp(&other.guid))
    }
}

/// Returns the leading path component (the pool name).
pub fn pool_of(dataset: &str) -> &str {
    dataset.split('/').next().unwrap_or(dataset)
}

/// True iff `dataset` equals its own pool, i.e. it is a pool root.
pub fn is_root_dataset(dataset: &str) -> bool {
    !dataset.contains('/')
}

/// `dirname` with "parent of a root dataset" being `None`.
pub fn parent_of(dataset: &str) -> Option<&str> {
    dataset.rsplit_once('/').map(|(parent, _)| parent)
}

/// Sort an inventory ascending by creation time (spec.md §3 "sorted by
/// creation time ascending").
pub fn sort_ascending(snaps: &mut [Snap]) {
    snaps.sort_unstable();
}

/// Keep only snapshots whose full identifier (`dataset@name`) contains
/// `pattern` as a substring, per spec.md §4.2's `listSnapshots` filter.
/// An empty pattern matches everything.
pub fn filter_by_pattern(dataset: &str, snaps: &[Snap], pattern: &str) -> Vec<Snap> {
    if pattern.is_empty() {
        return snaps.to_vec();
    }
    snaps
        .iter()
        .filter(|s| s.full_name(dataset).contains(pattern))
        .cloned()
        .collect()
}

/// Select the base snapshot for an incremental send (spec.md §4.6 Step 4).
///
/// Walks `source` from most-recent to least-recent; the first source
/// snapshot whose *name* also appears anywhere in `dest` is the base. This
/// is deliberately name-keyed rather than GUID-keyed: a `zfs recv`'d
/// snapshot on the destination is a distinct object from its source
/// counterpart and will not share a GUID with it, only a name.
pub fn select_base<'a>(source: &'a [Snap], dest: &[Snap]) -> Option<&'a Snap> {
    if source.is_empty() || dest.is_empty() {
        return None;
    }
    let dest_names: HashSet<&str> = dest.iter().map(|s| s.name.as_str()).collect();
    source.iter().rev().find(|s| dest_names.contains(s.name.as_str()))
}

/// Parses `zfs list -Hp -o name,creation,guid -t snapshot -d1 <dataset>`
/// style output into an inventory. One line per snapshot, tab-separated
/// fields `name\tcreation\tguid`, where `name` is `dataset@snapname`.
pub fn parse_snapshot_listing(output: &str) -> Vec<Snap> {
    let mut out = Vec::new();
    for line in output.lines() {
        let mut fields = line.split('\t');
        let Some(full) = fields.next() else { continue };
        let Some(snapname) = full.rsplit_once('@').map(|(_, n)| n) else { continue };
        let Some(creation_raw) = fields.next() else { continue };
        let Some(guid_raw) = fields.next() else { continue };
        let Ok(creation_secs) = creation_raw.parse::<i64>() else { continue };
        let Ok(guid) = guid_raw.parse::<u64>() else { continue };
        let Some(creation) = DateTime::from_timestamp(creation_secs, 0) else { continue };
        out.push(Snap { guid, name: snapname.to_string(), creation: creation.with_timezone(&Utc) });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(guid: u64, name: &str, secs: i64) -> Snap {
        Snap { guid, name: name.to_string(), creation: DateTime::from_timestamp(secs, 0).unwrap() }
    }

    #[test]
    fn pool_and_root() {
        assert_eq!(pool_of("tank/a/b"), "tank");
        assert_eq!(pool_of("tank"), "tank");
        assert!(is_root_dataset("tank"));
        assert!(!is_root_dataset("tank/a"));
        assert_eq!(parent_of("tank/a/b"), Some("tank/a"));
        assert_eq!(parent_of("tank"), None);
    }

    #[test]
    fn filter_by_pattern_substring() {
        let snaps = vec![
            snap(1, "autorep-T1", 100),
            snap(2, "manual-foo", 200),
            snap(3, "autorep-T2", 300),
        ];
        let filtered = filter_by_pattern("tank/a", &snaps, "@autorep-");
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].name, "autorep-T1");
        assert_eq!(filtered[1].name, "autorep-T2");
    }

    #[test]
    fn select_base_picks_newest_common_by_name() {
        // S = [s1<s2<s3], D = [s2,s3] (by name) -> base = s3.
        let source = vec![snap(1, "s1", 100), snap(2, "s2", 200), snap(3, "s3", 300)];
        let dest = vec![snap(9, "s2", 50), snap(10, "s3", 60)];
        let base = select_base(&source, &dest).unwrap();
        assert_eq!(base.name, "s3");
    }

    #[test]
    fn select_base_none_when_disjoint() {
        let source = vec![snap(1, "s1", 100)];
        let dest = vec![snap(2, "manual-x", 50)];
        assert!(select_base(&source, &dest).is_none());
    }

    #[test]
    fn select_base_none_when_either_side_empty() {
        let source = vec![snap(1, "s1", 100)];
        assert!(select_base(&source, &[]).is_none());
        assert!(select_base(&[], &[snap(1, "s1", 100)]).is_none());
    }

    #[test]
    fn parse_listing_round_trip() {
        let text = "tank/a@autorep-T1\t1000\t42\ntank/a@autorep-T2\t2000\t43\n";
        let snaps = parse_snapshot_listing(text);
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].name, "autorep-T1");
        assert_eq!(snaps[0].guid, 42);
        assert_eq!(snaps[1].name, "autorep-T2");
    }

    #[test]
    fn sort_ascending_orders_by_creation() {
        let mut snaps = vec![snap(1, "b", 300), snap(2, "a", 100), snap(3, "c", 200)];
        sort_ascending(&mut snaps);
        let names: Vec<_> = snaps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c", "b"]);
    }
}
