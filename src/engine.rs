//! The per-dataset replication state machine (spec.md §4.6) — the hard
//! part. Generalizes the teacher's `replicate.rs::replicate_dataset`,
//! which matched snapshots across two inventories by `PartialOrd`/`Eq`
//! (GUID- and creation-time-based — correct for the teacher's own
//! scenario of two datasets descended from one `zfs send -p`, which
//! preserves GUIDs). That key is wrong here: spec.md's base snapshot is
//! "any snapshot name present in both inventories" (§3 Lifecycle), and a
//! destination's `autorep-<TAG>` snapshot, freshly created by `zfs recv`,
//! does not share a GUID with its source counterpart. Base selection is
//! therefore name-keyed ([`crate::dataset::select_base`]), while the
//! overall shape — a pure, unit-tested core wrapped by a thin
//! filesystem-touching driver — stays the teacher's.

use std::path::Path;

use crate::dataset::select_base;
use crate::lock;
use crate::log::Logger;
use crate::machine::{self, Host, MachineError, SendOpts};
use crate::retention;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Replicated,
    Skipped(String),
}

pub struct EngineOpts<'a> {
    pub tag: &'a str,
    pub snap_pattern: &'a str,
    pub snap_keep: usize,
    pub allow_reconciliation: bool,
    pub send_opts: SendOpts,
    pub lock_dir: &'a Path,
    /// When false, the sender's progress is rendered with `indicatif`
    /// (spec.md §4.3's ambient progress texture) rather than discarded.
    pub quiet: bool,
}

/// Drive one `(srcSet, dstSet)` dataset pair through spec.md §4.6's ten
/// steps. Never returns an `Err`: every failure mode resolves to
/// `Outcome::Skipped` with a diagnostic, since a single misbehaving
/// dataset must never halt the run (spec.md §7).
pub fn replicate_dataset(
    src_host: &Host,
    src_set: &str,
    dst_host: &Host,
    dst_set: &str,
    opts: &EngineOpts,
    log: &mut Logger,
) -> Outcome {
    let new_name = format!("autorep-{}", opts.tag);

    // Step 1 — destination materialization.
    match machine::exists(dst_host, dst_set) {
        Ok(true) => {}
        _ => {
            if let Err(e) = machine::create_parents(dst_host, dst_set) {
                return Outcome::Skipped(format!(
                    "could not create ancestors of destination '{dst_set}' on {dst_host}: {e}"
                ));
            }
        }
    }

    // Step 2 — inventory collection.
    let mut src_inv = match machine::list_snapshots(src_host, src_set, opts.snap_pattern) {
        Ok(v) => v,
        Err(e) => {
            return Outcome::Skipped(format!(
                "could not list snapshots of source '{src_set}' on {src_host}: {e}"
            ))
        }
    };
    let mut dst_inv = match machine::list_snapshots(dst_host, dst_set, opts.snap_pattern) {
        Ok(v) => v,
        Err(MachineError::NoDataset) => Vec::new(),
        Err(e) => {
            return Outcome::Skipped(format!(
                "could not list snapshots of destination '{dst_set}' on {dst_host}: {e}"
            ))
        }
    };

    // Step 3 — duplicate-name defense: idempotency under same-TAG retry.
    if let Some(pos) = src_inv.iter().position(|s| s.name == new_name) {
        log.info(&format!(
            "'{src_set}@{new_name}' already exists on {src_host}; destroying it before re-creating (same-TAG retry)"
        ));
        let _ = machine::destroy_snapshot(src_host, src_set, &new_name);
        src_inv.remove(pos);
    }

    // Step 4 — base selection.
    let base_name = select_base(&src_inv, &dst_inv).map(|s| s.name.clone());

    // Step 5 — divergence gating.
    if base_name.is_none() && !dst_inv.is_empty() {
        if !opts.allow_reconciliation {
            return Outcome::Skipped(format!(
                "destination '{dst_set}' holds snapshots unrelated to any source snapshot; set ALLOW_RECONCILIATION=1 to permit destroying them"
            ));
        }
        log.info(&format!(
            "no common ancestor between '{src_set}' and '{dst_set}'; ALLOW_RECONCILIATION=1, destroying all destination snapshots"
        ));
        match machine::destroy_all_snapshots(dst_host, dst_set) {
            Ok(failed) if !failed.is_empty() => {
                log.info(&format!("failed to destroy some destination snapshots: {failed:?}"));
            }
            Err(e) => {
                return Outcome::Skipped(format!("reconciliation failed to list destination snapshots: {e}"))
            }
            _ => {}
        }
        dst_inv.clear();
    }

    // Step 6 — source-side managed pruning.
    let src_prune: Vec<String> = retention::prune_candidates(&src_inv, opts.snap_keep)
        .iter()
        .map(|s| s.name.clone())
        .collect();
    for name in &src_prune {
        if machine::destroy_snapshot(src_host, src_set, name).is_err() {
            log.info(&format!("failed to destroy source snapshot '{src_set}@{name}' during pruning"));
        }
    }
    src_inv.retain(|s| !src_prune.contains(&s.name));

    // Step 7 — destination-side managed pruning.
    let dst_prune: Vec<String> = retention::prune_candidates(&dst_inv, opts.snap_keep)
        .iter()
        .map(|s| s.name.clone())
        .collect();
    for name in &dst_prune {
        if machine::destroy_snapshot(dst_host, dst_set, name).is_err() {
            log.info(&format!("failed to destroy destination snapshot '{dst_set}@{name}' during pruning"));
        }
    }

    // Step 8 — snapshot creation.
    if let Err(e) = machine::create_snapshot(src_host, src_set, &new_name) {
        return Outcome::Skipped(format!(
            "could not create snapshot '{src_set}@{new_name}' on {src_host}: {e}"
        ));
    }

    // Step 9 — send, guarded by the process-wide `send` lock.
    let send_guard = match lock::acquire(opts.lock_dir, "send") {
        Ok(guard) => guard,
        Err(e) => {
            let _ = machine::destroy_snapshot(src_host, src_set, &new_name);
            return Outcome::Skipped(format!("could not acquire send lock: {e}"));
        }
    };
    let send_result = if opts.quiet {
        machine::send_snapshot(
            src_host,
            src_set,
            base_name.as_deref(),
            &new_name,
            dst_host,
            dst_set,
            &opts.send_opts,
        )
    } else {
        machine::send_snapshot_with_progress(
            src_host,
            src_set,
            base_name.as_deref(),
            &new_name,
            dst_host,
            dst_set,
            &opts.send_opts,
        )
    };
    drop(send_guard);

    if let Err(e) = send_result {
        let _ = machine::destroy_snapshot(src_host, src_set, &new_name);
        return Outcome::Skipped(format!(
            "send of '{src_set}@{new_name}' to '{dst_set}' on {dst_host} failed, rolled back: {e}"
        ));
    }

    // Step 10 — advance to the next dataset.
    Outcome::Replicated
}
