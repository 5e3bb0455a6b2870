//! Parse, validate, and probe a single `(source, destination)` replication
//! pair (spec.md §4.5). Grounded on the teacher's `dataset.rs::parse_spec`
//! shape — split on separators, walk characters, build one typed error
//! variant per malformed case — driving a different grammar:
//! `src[@srcHost]:dst[@dstHost]` instead of the teacher's `host:dataset`.

use crate::dataset;
use crate::machine::{self, Host};
use subprocess::{Exec, Redirection};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub src_set: String,
    pub src_host: Host,
    pub dst_set: String,
    pub dst_host: Host,
}

#[derive(Error, Debug)]
pub enum PairError {
    #[error("malformed pair spec '{spec}': {reason}")]
    Malformed { spec: String, reason: String },
    #[error("destination '{dst}' resolves to a root dataset; set ALLOW_ROOT_DATASETS=1 to permit this")]
    RootDatasetDestination { dst: String },
    #[error("host '{host}' did not respond to the liveness probe")]
    HostUnreachable { host: String },
    #[error("source dataset '{set}' does not exist")]
    SourceMissing { set: String },
    #[error("could not determine whether the destination parent of '{set}' exists")]
    DestinationParentUnknown { set: String },
}

fn split_host(part: &str) -> (&str, Option<&str>) {
    match part.split_once('@') {
        Some((set, host)) => (set, Some(host)),
        None => (part, None),
    }
}

/// Parse `src[@srcHost]:dst[@dstHost]` into its four components. Splits on
/// the first `:`, trims trailing whitespace from each half, then peels off
/// an optional `@host` suffix from each half.
pub fn parse_spec(spec: &str) -> Result<(String, Host, String, Host), PairError> {
    let Some((src_part, dst_part)) = spec.split_once(':') else {
        return Err(PairError::Malformed {
            spec: spec.to_string(),
            reason: "missing ':' separator between source and destination".to_string(),
        });
    };
    let src_part = src_part.trim_end();
    let dst_part = dst_part.trim_end();
    let (src_set, src_host) = split_host(src_part);
    let (dst_set, dst_host) = split_host(dst_part);
    if src_set.is_empty() || dst_set.is_empty() {
        return Err(PairError::Malformed {
            spec: spec.to_string(),
            reason: "source and destination must both be non-empty".to_string(),
        });
    }
    Ok((
        src_set.to_string(),
        Host::from_opt(src_host.map(str::to_string)),
        dst_set.to_string(),
        Host::from_opt(dst_host.map(str::to_string)),
    ))
}

/// Run the configured `HOST_CHECK` template against `host`, substituting
/// `%HOST%`. Always runs locally — it is the local machine probing
/// reachability of `host`, not a command executed on `host` itself.
fn probe_host(host_check_template: &str, host: &str) -> bool {
    let line = host_check_template.replace("%HOST%", host);
    Exec::shell(line)
        .stdout(Redirection::Pipe)
        .stderr(Redirection::Pipe)
        .capture()
        .map(|c| c.exit_status.success())
        .unwrap_or(false)
}

/// Parse and fully validate one pair spec: grammar, root-dataset guard,
/// host liveness, and source/destination-parent existence (spec.md §4.5).
/// A returned `Err` means "skip this pair"; the caller is responsible for
/// logging it and incrementing the pair-skip counter, never aborting the
/// whole run over one bad pair.
pub fn plan(spec: &str, allow_root_datasets: bool, host_check_template: &str) -> Result<Pair, PairError> {
    let (src_set, src_host, dst_set, dst_host) = parse_spec(spec)?;

    if dataset::is_root_dataset(&dst_set) && !allow_root_datasets {
        return Err(PairError::RootDatasetDestination { dst: dst_set });
    }

    for host in [&src_host, &dst_host] {
        if let Host::Remote(h) = host {
            if !probe_host(host_check_template, h) {
                return Err(PairError::HostUnreachable { host: h.clone() });
            }
        }
    }

    match machine::exists(&src_host, &src_set) {
        Ok(true) => {}
        Ok(false) | Err(_) => return Err(PairError::SourceMissing { set: src_set }),
    }

    if !dataset::is_root_dataset(&dst_set) {
        let parent = dataset::parent_of(&dst_set).expect("non-root dataset has a parent");
        if let Err(machine::MachineError::CommandFailure { .. } | machine::MachineError::Spawn(_)) =
            machine::exists(&dst_host, parent)
        {
            return Err(PairError::DestinationParentUnknown { set: dst_set });
        }
    }

    Ok(Pair { src_set, src_host, dst_set, dst_host })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_local_to_local() {
        let (src, src_host, dst, dst_host) = parse_spec("p1/a:p2/a").unwrap();
        assert_eq!(src, "p1/a");
        assert_eq!(src_host, Host::Local);
        assert_eq!(dst, "p2/a");
        assert_eq!(dst_host, Host::Local);
    }

    #[test]
    fn parses_hosts_on_either_side() {
        let (src, src_host, dst, dst_host) = parse_spec("p1/a@box1:p2/a@box2").unwrap();
        assert_eq!(src, "p1/a");
        assert_eq!(src_host, Host::Remote("box1".into()));
        assert_eq!(dst, "p2/a");
        assert_eq!(dst_host, Host::Remote("box2".into()));
    }

    #[test]
    fn trims_trailing_whitespace_per_half() {
        let (src, _, dst, _) = parse_spec("p1/a  :p2/a  ").unwrap();
        assert_eq!(src, "p1/a");
        assert_eq!(dst, "p2/a");
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(matches!(parse_spec("p1/a"), Err(PairError::Malformed { .. })));
    }

    #[test]
    fn rejects_empty_halves() {
        assert!(matches!(parse_spec(":p2/a"), Err(PairError::Malformed { .. })));
        assert!(matches!(parse_spec("p1/a:"), Err(PairError::Malformed { .. })));
    }

    #[test]
    fn probe_host_false_on_bogus_command() {
        assert!(!probe_host("false", "anyhost"));
    }

    #[test]
    fn probe_host_substitutes_host_token() {
        // `echo %HOST%` always exits zero regardless of substitution; this
        // just confirms the template is invoked at all, not the substring.
        assert!(probe_host("echo %HOST%", "box1"));
    }
}
