//! Configuration for the slot driver.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use nrsched_scheduler::{SchedulerExpertConfig, TddPattern, TIME_RR_STRATEGY};

/// Slot driver configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of cells, all driven by their own thread.
    pub nof_cells: u8,

    /// Subcarrier spacing of every cell.
    pub numerology: u8,

    /// Bandwidth of every cell in PRBs.
    pub nof_prbs: u32,

    /// Optional TDD pattern shared by all cells. FDD when absent.
    pub tdd_pattern: Option<TddPattern>,

    /// Wall-clock duration of one slot.
    pub slot_period: Duration,

    /// Stop after this many slots. Runs until interrupted when zero.
    pub nof_slots: u32,

    /// UEs created at startup, spread over the cells.
    pub nof_ues: u16,

    /// Configure every UE on all cells (carrier aggregation).
    pub carrier_aggregation: bool,

    /// Name of the scheduling strategy.
    pub strategy: String,

    /// Scheduler tunables.
    pub expert: SchedulerExpertConfig,

    /// SR and CSI periods in slots. Zero disables the occasion.
    pub sr_period_slots: u32,
    pub csi_period_slots: u32,

    /// Seed of the lower-layer emulation.
    pub seed: u64,

    /// Probability that a HARQ-ACK bit is decoded as ACK.
    pub ack_probability: f64,

    /// Probability that a PUSCH passes CRC.
    pub crc_ok_probability: f64,

    /// Slots between two injected error indications. Zero disables them.
    pub error_indication_period_slots: u32,

    /// Interval of the DL traffic generator.
    pub traffic_interval: Duration,

    /// Bytes added to a random UE's DL buffer per traffic tick.
    pub traffic_bytes: u32,

    /// Capacity of the metrics report channel.
    pub metrics_channel_capacity: usize,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let numerology = parse_var(&lookup, "NRSCHED_NUMEROLOGY").unwrap_or(0u8);
        if numerology > nrsched_id::MAX_NUMEROLOGY {
            bail!("NRSCHED_NUMEROLOGY must not exceed {}", nrsched_id::MAX_NUMEROLOGY);
        }

        let nof_cells = parse_var(&lookup, "NRSCHED_NOF_CELLS").unwrap_or(2u8);
        if nof_cells == 0 || usize::from(nof_cells) > nrsched_id::MAX_NOF_CELLS {
            bail!("NRSCHED_NOF_CELLS must be between 1 and {}", nrsched_id::MAX_NOF_CELLS);
        }

        let tdd_pattern = match lookup("NRSCHED_TDD_PATTERN") {
            Some(s) => Some(parse_tdd_pattern(&s)?),
            None => None,
        };

        // One millisecond per subframe.
        let slot_period = parse_var(&lookup, "NRSCHED_SLOT_PERIOD_US")
            .map(Duration::from_micros)
            .unwrap_or_else(|| Duration::from_micros(1000 >> numerology));

        let expert = match lookup("NRSCHED_EXPERT_CONFIG") {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read expert config {path}"))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("failed to parse expert config {path}"))?
            }
            None => SchedulerExpertConfig::default(),
        };

        let ack_probability = parse_var(&lookup, "NRSCHED_ACK_PROBABILITY").unwrap_or(0.9);
        let crc_ok_probability = parse_var(&lookup, "NRSCHED_CRC_OK_PROBABILITY").unwrap_or(0.9);
        for (key, p) in [
            ("NRSCHED_ACK_PROBABILITY", ack_probability),
            ("NRSCHED_CRC_OK_PROBABILITY", crc_ok_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                bail!("{key} must be within [0, 1], got {p}");
            }
        }

        Ok(Self {
            nof_cells,
            numerology,
            nof_prbs: parse_var(&lookup, "NRSCHED_NOF_PRBS").unwrap_or(52),
            tdd_pattern,
            slot_period,
            nof_slots: parse_var(&lookup, "NRSCHED_NOF_SLOTS").unwrap_or(0),
            nof_ues: parse_var(&lookup, "NRSCHED_NOF_UES").unwrap_or(8),
            carrier_aggregation: parse_var(&lookup, "NRSCHED_CARRIER_AGGREGATION")
                .unwrap_or(false),
            strategy: lookup("NRSCHED_STRATEGY").unwrap_or_else(|| TIME_RR_STRATEGY.to_string()),
            expert,
            sr_period_slots: parse_var(&lookup, "NRSCHED_SR_PERIOD").unwrap_or(40),
            csi_period_slots: parse_var(&lookup, "NRSCHED_CSI_PERIOD").unwrap_or(80),
            seed: parse_var(&lookup, "NRSCHED_SEED").unwrap_or(1),
            ack_probability,
            crc_ok_probability,
            error_indication_period_slots: parse_var(&lookup, "NRSCHED_ERROR_INDICATION_PERIOD")
                .unwrap_or(0),
            traffic_interval: Duration::from_millis(
                parse_var(&lookup, "NRSCHED_TRAFFIC_INTERVAL_MS").unwrap_or(5),
            ),
            traffic_bytes: parse_var(&lookup, "NRSCHED_TRAFFIC_BYTES").unwrap_or(1500),
            metrics_channel_capacity: parse_var(&lookup, "NRSCHED_METRICS_CHANNEL_CAPACITY")
                .unwrap_or(16),
            log_level: lookup("NRSCHED_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.parse().ok())
}

/// Parses `period/dl/ul`, e.g. `10/7/2`.
fn parse_tdd_pattern(s: &str) -> Result<TddPattern> {
    let fields: Vec<u32> = s
        .split('/')
        .map(|f| f.trim().parse())
        .collect::<Result<_, _>>()
        .with_context(|| format!("invalid TDD pattern {s:?}"))?;
    let [period_slots, nof_dl_slots, nof_ul_slots] = fields[..] else {
        bail!("TDD pattern must be period/dl/ul, got {s:?}");
    };
    if period_slots == 0 || nof_dl_slots + nof_ul_slots > period_slots {
        bail!("TDD pattern {s:?} does not fit its period");
    }
    Ok(TddPattern {
        period_slots,
        nof_dl_slots,
        nof_ul_slots,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.nof_cells, 2);
        assert_eq!(cfg.slot_period, Duration::from_millis(1));
        assert_eq!(cfg.strategy, TIME_RR_STRATEGY);
        assert!(cfg.tdd_pattern.is_none());
        assert_eq!(cfg.expert, SchedulerExpertConfig::default());
    }

    #[test]
    fn test_slot_period_follows_numerology() {
        let cfg = config(&[("NRSCHED_NUMEROLOGY", "1")]).unwrap();
        assert_eq!(cfg.slot_period, Duration::from_micros(500));
    }

    #[test]
    fn test_tdd_pattern() {
        let cfg = config(&[("NRSCHED_TDD_PATTERN", "10/7/2")]).unwrap();
        assert_eq!(
            cfg.tdd_pattern,
            Some(TddPattern {
                period_slots: 10,
                nof_dl_slots: 7,
                nof_ul_slots: 2,
            })
        );
        assert!(config(&[("NRSCHED_TDD_PATTERN", "10/9/2")]).is_err());
        assert!(config(&[("NRSCHED_TDD_PATTERN", "10/7")]).is_err());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(config(&[("NRSCHED_NOF_CELLS", "0")]).is_err());
        assert!(config(&[("NRSCHED_NUMEROLOGY", "5")]).is_err());
        assert!(config(&[("NRSCHED_ACK_PROBABILITY", "1.5")]).is_err());
    }
}
