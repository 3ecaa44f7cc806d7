use std::path::PathBuf;

use clap::Parser;
use reaper_core::ReaperConfigLayer;

/// Deletes tombstoned replicas from storage endpoints.
///
/// Settings come from `--config` first; any flag given here overrides the
/// matching key of the file.
#[derive(Debug, Parser)]
#[command(name = "reaper", version, about)]
pub struct Args {
    /// TOML configuration file
    #[arg(long, env = "REAPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// JSON catalog snapshot (rses and replicas)
    #[arg(long, env = "REAPER_CATALOG")]
    pub catalog: PathBuf,

    /// Write the catalog back to this file on exit
    #[arg(long)]
    pub dump_catalog: Option<PathBuf>,

    /// Refuse to delete `file://` paths outside this directory
    #[arg(long)]
    pub posix_root: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Number of deletion workers
    #[arg(long)]
    pub threads: Option<usize>,

    /// Max replicas per deletion batch
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Minimum seconds between cycle starts
    #[arg(long)]
    pub sleep_time: Option<u64>,

    /// Run a single cycle and exit
    #[arg(long)]
    pub run_once: bool,

    /// Ignore tombstone age (deprecated, prefer the rse greedy attribute)
    #[arg(long)]
    pub greedy: bool,

    /// RSE expression of endpoints to work on
    #[arg(long)]
    pub include_rses: Option<String>,

    /// RSE expression of endpoints to leave alone
    #[arg(long)]
    pub exclude_rses: Option<String>,

    /// Explicit endpoint list; overrides the expressions
    #[arg(long, value_delimiter = ',')]
    pub rses: Vec<String>,

    /// Only endpoints of these VOs
    #[arg(long, value_delimiter = ',')]
    pub vos: Vec<String>,

    /// Seconds before a stuck BEING_DELETED claim may be taken again
    #[arg(long)]
    pub delay_seconds: Option<u64>,

    /// Force one deletion protocol scheme
    #[arg(long)]
    pub scheme: Option<String>,

    /// Consecutive failed batches before an endpoint is excluded (0 disables)
    #[arg(long)]
    pub auto_exclude_threshold: Option<u32>,

    /// Seconds an excluded endpoint stays excluded
    #[arg(long)]
    pub auto_exclude_timeout: Option<u64>,
}

impl Args {
    /// Only flags that were actually given end up `Some`.
    pub fn layer(&self) -> ReaperConfigLayer {
        let non_empty = |v: &Vec<String>| (!v.is_empty()).then(|| v.clone());
        ReaperConfigLayer {
            threads: self.threads,
            chunk_size: self.chunk_size,
            sleep_time: self.sleep_time,
            run_once: self.run_once.then_some(true),
            greedy: self.greedy.then_some(true),
            include_rses: self.include_rses.clone(),
            exclude_rses: self.exclude_rses.clone(),
            rses: non_empty(&self.rses),
            vos: non_empty(&self.vos),
            delay_seconds: self.delay_seconds,
            scheme: self.scheme.clone(),
            auto_exclude_threshold: self.auto_exclude_threshold,
            auto_exclude_timeout: self.auto_exclude_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_flags_leave_the_layer_empty() {
        let args = Args::try_parse_from(["reaper", "--catalog", "c.json"]).unwrap();
        assert_eq!(args.layer(), ReaperConfigLayer::default());
    }

    #[test]
    fn flags_map_to_config_keys() {
        let args = Args::try_parse_from([
            "reaper",
            "--catalog",
            "c.json",
            "--threads",
            "4",
            "--run-once",
            "--rses",
            "SITE_A,SITE_B",
            "--auto-exclude-threshold",
            "0",
        ])
        .unwrap();
        let layer = args.layer();
        assert_eq!(layer.threads, Some(4));
        assert_eq!(layer.run_once, Some(true));
        assert_eq!(layer.greedy, None);
        assert_eq!(
            layer.rses,
            Some(vec!["SITE_A".to_string(), "SITE_B".to_string()])
        );
        assert_eq!(layer.auto_exclude_threshold, Some(0));
    }
}
