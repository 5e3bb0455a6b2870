//! Configuration surface (spec.md §6, §9 "Config Loader (C9)"). Grounded
//! on `chrisdsa-zfs2s3`'s `config.rs`: a `#[derive(Deserialize)]` struct
//! tree parsed with `toml::from_str`, a `validate()` pass turning
//! cross-field constraints into a typed error, and `Default` impls for
//! every optional field. Unlike zfs2s3 (TOML-only), every key here can
//! also be supplied as an identically-named environment variable, which
//! takes precedence over the file — spec.md frames the file and the
//! environment as one configuration surface, not two.

use chrono::{DateTime, Local};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

use crate::machine::IncrementalMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidToml(String),
    MissingRequired(&'static str),
    InvalidValue { key: &'static str, reason: String },
}

impl std::error::Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidToml(e) => write!(f, "invalid TOML configuration: {e}"),
            ConfigError::MissingRequired(key) => write!(f, "missing required configuration key {key}"),
            ConfigError::InvalidValue { key, reason } => write!(f, "invalid value for {key}: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    pub replicate_sets: String,
    pub allow_root_datasets: bool,
    pub allow_reconciliation: bool,
    pub recurse_children: bool,
    pub snap_pattern: String,
    pub snap_keep: usize,
    pub syslog: bool,
    pub syslog_facility: String,
    pub tag: String,
    pub log_file: String,
    pub log_base: String,
    pub log_keep: usize,
    pub host_check: String,
    pub zfs_incr_opt: IncrementalMode,
    /// Raw `zfs send` option letters, e.g. `-p` or `-pv` (spec.md §6
    /// `ZFS_SEND_OPTS`); scanned character-by-character rather than
    /// modeled as a struct of booleans, matching the shell original's
    /// "pass these flags through verbatim" framing.
    pub zfs_send_opts: String,
    pub zfs_recv_opts: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            replicate_sets: String::new(),
            allow_root_datasets: false,
            allow_reconciliation: false,
            recurse_children: false,
            snap_pattern: "@autorep-".to_string(),
            snap_keep: 2,
            syslog: true,
            syslog_facility: "user".to_string(),
            tag: "%MOY%%DOM%%CYR%_%NOW%".to_string(),
            log_file: String::new(),
            log_base: String::new(),
            log_keep: 7,
            host_check: "ping -c1 -q -W2 %HOST%".to_string(),
            zfs_incr_opt: IncrementalMode::default(),
            zfs_send_opts: "-p".to_string(),
            zfs_recv_opts: "-F -v".to_string(),
        }
    }
}

impl Config {
    pub fn from_str(toml_text: &str) -> Result<Self, ConfigError> {
        let mut config: Config =
            toml::from_str(toml_text).map_err(|e| ConfigError::InvalidToml(e.to_string()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::InvalidToml(format!("reading {}: {e}", path.display())))?;
        Self::from_str(&text)
    }

    /// Every key in spec.md §6's table may be supplied as an identically
    /// named environment variable, overriding whatever the file set.
    fn apply_env_overrides(&mut self) {
        use std::env::var;

        if let Ok(v) = var("REPLICATE_SETS") {
            self.replicate_sets = v;
        }
        if let Some(b) = bool_env("ALLOW_ROOT_DATASETS") {
            self.allow_root_datasets = b;
        }
        if let Some(b) = bool_env("ALLOW_RECONCILIATION") {
            self.allow_reconciliation = b;
        }
        if let Some(b) = bool_env("RECURSE_CHILDREN") {
            self.recurse_children = b;
        }
        if let Ok(v) = var("SNAP_PATTERN") {
            self.snap_pattern = v;
        }
        if let Some(v) = var("SNAP_KEEP").ok().and_then(|s| s.parse().ok()) {
            self.snap_keep = v;
        }
        if let Some(b) = bool_env("SYSLOG") {
            self.syslog = b;
        }
        if let Ok(v) = var("SYSLOG_FACILITY") {
            self.syslog_facility = v;
        }
        if let Ok(v) = var("TAG") {
            self.tag = v;
        }
        if let Ok(v) = var("LOG_FILE") {
            self.log_file = v;
        }
        if let Ok(v) = var("LOG_BASE") {
            self.log_base = v;
        }
        if let Some(v) = var("LOG_KEEP").ok().and_then(|s| s.parse().ok()) {
            self.log_keep = v;
        }
        if let Ok(v) = var("HOST_CHECK") {
            self.host_check = v;
        }
        if let Ok(v) = var("ZFS_INCR_OPT") {
            if v.eq_ignore_ascii_case("i") || v.eq_ignore_ascii_case("simple") {
                self.zfs_incr_opt = IncrementalMode::Simple;
            } else if v.eq_ignore_ascii_case("I") || v.eq_ignore_ascii_case("intermediates") {
                self.zfs_incr_opt = IncrementalMode::Intermediates;
            }
        }
        if let Ok(v) = var("ZFS_SEND_OPTS") {
            self.zfs_send_opts = v;
        }
        if let Ok(v) = var("ZFS_RECV_OPTS") {
            self.zfs_recv_opts = v;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.replicate_sets.trim().is_empty() {
            return Err(ConfigError::MissingRequired("REPLICATE_SETS"));
        }
        if self.snap_keep < 2 {
            return Err(ConfigError::InvalidValue {
                key: "SNAP_KEEP",
                reason: "must be >= 2".to_string(),
            });
        }
        Ok(())
    }

    /// The whitespace-separated pair specs (spec.md §6 `REPLICATE_SETS`).
    pub fn pairs(&self) -> Vec<&str> {
        self.replicate_sets.split_whitespace().collect()
    }

    pub fn send_opts(&self) -> crate::machine::SendOpts {
        crate::machine::SendOpts {
            incremental_mode: self.zfs_incr_opt,
            send_include_properties: self.zfs_send_opts.contains('p'),
            verbose_send: self.zfs_send_opts.contains('v'),
            recv_force: self.zfs_recv_opts.contains('F'),
            recv_verbose: self.zfs_recv_opts.contains('v'),
        }
    }
}

fn bool_env(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Replace `%DOW% %DOM% %MOY% %CYR% %NOW% %TAG%` tokens in `template`,
/// substituting `tag` for `%TAG%` (spec.md §6 "Macro substitution").
fn expand_once(template: &str, tag: &str, now: DateTime<Local>) -> String {
    template
        .replace("%DOW%", &now.format("%a").to_string())
        .replace("%DOM%", &now.format("%d").to_string())
        .replace("%MOY%", &now.format("%m").to_string())
        .replace("%CYR%", &now.format("%Y").to_string())
        .replace("%NOW%", &now.timestamp().to_string())
        .replace("%TAG%", tag)
}

/// Expand the `TAG` template itself. Run twice, as spec.md §6 requires,
/// so a (rare) self-referential `%TAG%` token resolves against the
/// already-expanded value from the first pass rather than being left
/// untouched.
pub fn expand_tag(template: &str, now: DateTime<Local>) -> String {
    let pass1 = expand_once(template, "", now);
    expand_once(&pass1, &pass1, now)
}

/// Expand `LOG_FILE` against the already-expanded `tag`, also twice.
pub fn expand_log_file(template: &str, tag: &str, now: DateTime<Local>) -> String {
    let pass1 = expand_once(template, tag, now);
    expand_once(&pass1, tag, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn defaults_apply_when_fields_omitted() {
        let cfg = Config::from_str(r#"REPLICATE_SETS = "p1/a:p2""#).unwrap();
        assert_eq!(cfg.snap_keep, 2);
        assert_eq!(cfg.snap_pattern, "@autorep-");
        assert!(cfg.syslog);
        assert_eq!(cfg.host_check, "ping -c1 -q -W2 %HOST%");
    }

    #[test]
    fn missing_replicate_sets_is_fatal() {
        assert_eq!(Config::from_str(""), Err(ConfigError::MissingRequired("REPLICATE_SETS")));
    }

    #[test]
    fn snap_keep_below_two_is_rejected() {
        let toml = r#"
            REPLICATE_SETS = "p1/a:p2"
            SNAP_KEEP = 1
        "#;
        assert!(matches!(Config::from_str(toml), Err(ConfigError::InvalidValue { key: "SNAP_KEEP", .. })));
    }

    #[test]
    fn env_override_takes_precedence_over_file() {
        std::env::set_var("SNAP_KEEP", "5");
        let cfg = Config::from_str("REPLICATE_SETS = \"p1/a:p2\"\nSNAP_KEEP = 2\n");
        std::env::remove_var("SNAP_KEEP");
        assert_eq!(cfg.unwrap().snap_keep, 5);
    }

    #[test]
    fn pairs_split_on_whitespace() {
        let cfg = Config::from_str(r#"REPLICATE_SETS = "p1/a:p2  p3/b:p4""#).unwrap();
        assert_eq!(cfg.pairs(), vec!["p1/a:p2", "p3/b:p4"]);
    }

    #[test]
    fn macro_expansion_substitutes_tokens() {
        let now = Local.with_ymd_and_hms(2026, 3, 7, 0, 0, 0).unwrap();
        let tag = expand_tag("%MOY%%DOM%%CYR%_%NOW%", now);
        assert!(tag.starts_with("03072026_"));
    }

    #[test]
    fn log_file_macro_can_reference_expanded_tag() {
        let now = Local.with_ymd_and_hms(2026, 3, 7, 0, 0, 0).unwrap();
        let tag = expand_tag("%MOY%%DOM%%CYR%_%NOW%", now);
        let log_file = expand_log_file("autorep-%TAG%.log", &tag, now);
        assert_eq!(log_file, format!("autorep-{tag}.log"));
    }
}
