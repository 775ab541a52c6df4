//! Engine configuration, loaded from TOML by the `air` binary.
//! Every tunable the components need is named here rather than hard-coded,
//! except protocol constants MPEG-TS itself fixes (sync byte, packet size,
//! 90 kHz PTS clock — see `air_pipeline::mux::ts`).

use serde::{Deserialize, Serialize};

fn default_lookahead_depth() -> usize {
    3
}

fn default_drift_warn_us() -> u64 {
    2_000
}

fn default_pcr_interval_ms() -> u64 {
    40
}

fn default_sink_queue_bytes() -> usize {
    4 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Target lookahead buffer depth, N. Buffer capacity is 2N.
    #[serde(default = "default_lookahead_depth")]
    pub lookahead_depth: usize,

    /// Deadline slip, in microseconds, past which a late frame is logged
    /// as clock drift rather than ordinary scheduling jitter.
    #[serde(default = "default_drift_warn_us")]
    pub drift_warn_us: u64,

    /// Cadence at which PCR adaptation fields are inserted on the video PID.
    #[serde(default = "default_pcr_interval_ms")]
    pub pcr_interval_ms: u64,

    /// Bound on a `FileSink`'s internal queue before bytes are dropped.
    #[serde(default = "default_sink_queue_bytes")]
    pub sink_queue_bytes: usize,

    #[serde(default)]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookahead_depth: default_lookahead_depth(),
            drift_warn_us: default_drift_warn_us(),
            pcr_interval_ms: default_pcr_interval_ms(),
            sink_queue_bytes: default_sink_queue_bytes(),
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let cfg = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.lookahead_depth, 3);
        assert_eq!(cfg.pcr_interval_ms, 40);
    }

    #[test]
    fn partial_overrides_merge_with_defaults() {
        let cfg = EngineConfig::from_toml_str("lookahead_depth = 5\n").unwrap();
        assert_eq!(cfg.lookahead_depth, 5);
        assert_eq!(cfg.sink_queue_bytes, default_sink_queue_bytes());
    }
}
