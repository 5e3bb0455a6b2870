//! Renders the diagnostic output of `zfs send -vP` as a progress bar
//! (spec.md §4.3, ambient texture). Grounded on the teacher's
//! `do_progressbar_from_zfs_send_stderr`, simplified for this crate's
//! sends: each call to [`crate::machine::send_snapshot_with_progress`]
//! transfers exactly one snapshot (never a `-R` multi-snapshot stream),
//! so there is only ever one header line and one running byte count to
//! track, not the teacher's itemized per-snapshot bookkeeping.
//!
//! This must never affect send success/failure: any unparseable line is
//! silently skipped rather than panicking, unlike the teacher's version.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::{BufRead, BufReader};

/// Consume `stream` (the sender's stderr) line by line, rendering a byte
/// progress bar as `zfs send -vP`'s tab-separated lines arrive. Returns
/// once the stream reaches EOF, regardless of whether any line was ever
/// successfully parsed — a malformed or truncated stream just means no
/// bar is drawn, never a crash.
pub fn render_send_progress<R: std::io::Read>(stream: R) {
    let stream = BufReader::new(stream);
    let mut bar: Option<ProgressBar> = None;

    for line in stream.lines() {
        let Ok(line) = line else { break };
        let fields: Vec<&str> = line.split('\t').collect();
        match fields.as_slice() {
            ["size", total] => {
                if let Ok(total) = total.parse::<u64>() {
                    let pb = ProgressBar::new(total);
                    pb.set_style(
                        ProgressStyle::with_template(
                            "[{elapsed_precise}] {bar:40.cyan} {bytes:>12}/{total_bytes:<12} {binary_bytes_per_sec}",
                        )
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("##-"),
                    );
                    bar = Some(pb);
                }
            }
            [_elapsed, xfer, _snap] => {
                if let (Some(pb), Ok(xfer)) = (&bar, xfer.parse::<u64>()) {
                    pb.set_position(xfer);
                }
            }
            _ => {} // "full"/"incremental" header lines and anything else: ignored.
        }
    }
    if let Some(pb) = bar {
        pb.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_stream_never_panics() {
        let input = b"not-the-right-format\nstill\tnonsense\n".as_slice();
        render_send_progress(input);
    }

    #[test]
    fn empty_stream_is_fine() {
        render_send_progress(&b""[..]);
    }

    #[test]
    fn well_formed_stream_renders() {
        let input = b"size\t1000\n0.1\t500\ttank/a@autorep-T1\n0.2\t1000\ttank/a@autorep-T1\n".as_slice();
        render_send_progress(input);
    }
}
