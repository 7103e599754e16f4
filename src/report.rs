//! Turns trial records into the comparison printed at the end of a run.

use std::fmt::{self, Write as _};
use std::time::Duration;

use time::OffsetDateTime;

use crate::config::GlobalConfig;
use crate::counters::{CounterSpec, Layout};
use crate::driver::TrialResult;
use crate::error::TrialError;
use crate::util::harness_utils::HostInfo;

#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    Completed(TrialResult),
    Failed(TrialError),
    /// Never run because an earlier trial halted the session.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    /// 1-based A/B round.
    pub round: usize,
    pub layout: Layout,
    pub outcome: TrialOutcome,
}

impl TrialRecord {
    pub fn result(&self) -> Option<&TrialResult> {
        match &self.outcome {
            TrialOutcome::Completed(result) => Some(result),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    PaddingHelped,
    NoSignificantDifference,
    PaddingHurt,
    Inconclusive,
}

impl Verdict {
    pub fn classify(ratio: Option<f64>, tolerance: f64) -> Verdict {
        match ratio {
            Some(r) if !r.is_finite() => Verdict::Inconclusive,
            Some(r) if r > 1.0 + tolerance => Verdict::PaddingHelped,
            Some(r) if r < 1.0 - tolerance => Verdict::PaddingHurt,
            Some(_) => Verdict::NoSignificantDifference,
            None => Verdict::Inconclusive,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Verdict::PaddingHelped => {
                "padding helped: the packed layout is paying for false sharing"
            }
            Verdict::NoSignificantDifference => "no significant difference between layouts",
            Verdict::PaddingHurt => {
                "padding hurt: something other than line sharing dominates the comparison"
            }
            Verdict::Inconclusive => "inconclusive: a layout has no successful trials",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutStats {
    pub layout: Layout,
    pub successes: usize,
    pub mean: Option<Duration>,
    pub mean_ops_per_sec: Option<f64>,
}

impl LayoutStats {
    fn from_results<'a>(layout: Layout, results: impl Iterator<Item = &'a TrialResult>) -> Self {
        let mut successes = 0usize;
        let mut total_nanos = 0u128;
        let mut total_rate = 0f64;
        for result in results {
            successes += 1;
            total_nanos += result.elapsed.as_nanos();
            total_rate += result.ops_per_sec();
        }
        if successes == 0 {
            return LayoutStats {
                layout,
                successes,
                mean: None,
                mean_ops_per_sec: None,
            };
        }
        let mean_nanos = total_nanos / successes as u128;
        LayoutStats {
            layout,
            successes,
            mean: Some(Duration::from_nanos(mean_nanos.min(u64::MAX as u128) as u64)),
            mean_ops_per_sec: Some(total_rate / successes as f64),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub packed: LayoutStats,
    pub padded: LayoutStats,
    /// packed mean / padded mean
    pub ratio: Option<f64>,
    pub verdict: Verdict,
    pub scheduled: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Summary {
    /// Only completed trials are averaged; failed and skipped ones are
    /// counted but contribute no timing.
    pub fn from_records(records: &[TrialRecord], tolerance: f64) -> Self {
        let stats = |layout: Layout| {
            LayoutStats::from_results(
                layout,
                records
                    .iter()
                    .filter(|record| record.layout == layout)
                    .filter_map(TrialRecord::result),
            )
        };
        let packed = stats(Layout::Packed);
        let padded = stats(Layout::Padded);

        let ratio = match (packed.mean, padded.mean) {
            (Some(p), Some(q)) if !q.is_zero() => Some(p.as_nanos() as f64 / q.as_nanos() as f64),
            _ => None,
        };

        let failed = records
            .iter()
            .filter(|record| matches!(record.outcome, TrialOutcome::Failed(_)))
            .count();
        let skipped = records
            .iter()
            .filter(|record| record.outcome == TrialOutcome::Skipped)
            .count();

        Summary {
            packed,
            padded,
            ratio,
            verdict: Verdict::classify(ratio, tolerance),
            scheduled: records.len(),
            failed,
            skipped,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && self.scheduled > 0
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1e3
}

/// Run parameters and host details printed before the first trial.
pub struct RunHeader {
    pub started: OffsetDateTime,
    pub host: HostInfo,
    pub config: GlobalConfig,
}

impl RunHeader {
    pub fn new(host: HostInfo, config: GlobalConfig) -> Self {
        RunHeader {
            started: OffsetDateTime::now_utc(),
            host,
            config,
        }
    }

    pub fn render(&self) -> String {
        let host = &self.host;
        let config = &self.config;
        let mut out = String::new();

        let _ = writeln!(out, "linebench  {}", self.started);
        let _ = writeln!(
            out,
            "machine    {} ({}-bit, {})",
            host.machine,
            host.arch_bits,
            host.os_release.as_deref().unwrap_or("unknown os")
        );
        let _ = writeln!(
            out,
            "cpu        {} ({} logical, {} physical)",
            host.cpu_brand,
            host.logical_cores,
            host.physical_cores
                .map_or_else(|| "?".to_string(), |cores| cores.to_string())
        );
        let _ = writeln!(
            out,
            "memory     {} MiB, page {} B, L1d line {}",
            host.total_memory_bytes / (1024 * 1024),
            host.page_size.unwrap_or(0),
            host.cache_line
                .map_or_else(|| "unknown".to_string(), |line| format!("{line} B"))
        );
        let _ = writeln!(
            out,
            "workers    {}  readers {}  iterations {}  trials {}  warm-up {}x{}",
            config.workers,
            config.readers,
            config.iterations,
            config.trials,
            config.warmup_rounds,
            config.warmup_iterations
        );
        let packed = CounterSpec::new(Layout::Packed, config.workers, config.stride);
        let padded = CounterSpec::new(Layout::Padded, config.workers, config.stride);
        let _ = writeln!(
            out,
            "footprint  packed {} B  padded {} B (stride {} B)",
            packed.expected_footprint(),
            padded.expected_footprint(),
            config.stride
        );
        out
    }
}

pub fn render_trial(record: &TrialRecord) -> String {
    let prefix = format!("round {:>3}  {:<7}", record.round, record.layout.label());
    match &record.outcome {
        TrialOutcome::Completed(result) => format!(
            "{prefix}{:>12.3} ms  {:>10.1} Mops/s",
            millis(result.elapsed),
            result.ops_per_sec() / 1e6
        ),
        TrialOutcome::Failed(err) => format!("{prefix}FAILED: {err}"),
        TrialOutcome::Skipped => format!("{prefix}skipped"),
    }
}

fn render_stats(out: &mut String, stats: &LayoutStats) {
    match (stats.mean, stats.mean_ops_per_sec) {
        (Some(mean), Some(rate)) => {
            let _ = writeln!(
                out,
                "mean {:<7}{:>12.3} ms  {:>10.1} Mops/s  ({} trials)",
                stats.layout.label(),
                millis(mean),
                rate / 1e6,
                stats.successes
            );
        }
        _ => {
            let _ = writeln!(out, "mean {:<7}no successful trials", stats.layout.label());
        }
    }
}

pub fn render_results(records: &[TrialRecord], summary: &Summary) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    for record in records {
        let _ = writeln!(out, "{}", render_trial(record));
    }
    let _ = writeln!(out);
    render_stats(&mut out, &summary.packed);
    render_stats(&mut out, &summary.padded);
    match summary.ratio {
        Some(ratio) => {
            let _ = writeln!(out, "ratio      {ratio:.2}x (packed / padded)");
        }
        None => {
            let _ = writeln!(out, "ratio      n/a");
        }
    }
    let _ = writeln!(out, "verdict    {}", summary.verdict);
    if summary.failed > 0 || summary.skipped > 0 {
        let _ = writeln!(
            out,
            "excluded   {} failed, {} skipped of {} scheduled; re-run to replace them",
            summary.failed, summary.skipped, summary.scheduled
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(round: usize, layout: Layout, millis: u64) -> TrialRecord {
        TrialRecord {
            round,
            layout,
            outcome: TrialOutcome::Completed(TrialResult {
                layout,
                workers: 4,
                iterations: 1_000_000,
                elapsed: Duration::from_millis(millis),
                footprint_bytes: 0,
                slot_values: vec![1_000_000; 4],
            }),
        }
    }

    #[test]
    fn classify_uses_the_tolerance_band() {
        assert_eq!(Verdict::classify(Some(2.5), 0.1), Verdict::PaddingHelped);
        assert_eq!(Verdict::classify(Some(1.05), 0.1), Verdict::NoSignificantDifference);
        assert_eq!(Verdict::classify(Some(0.95), 0.1), Verdict::NoSignificantDifference);
        assert_eq!(Verdict::classify(Some(0.5), 0.1), Verdict::PaddingHurt);
        assert_eq!(Verdict::classify(Some(1.05), 0.0), Verdict::PaddingHelped);
        assert_eq!(Verdict::classify(None, 0.1), Verdict::Inconclusive);
        assert_eq!(Verdict::classify(Some(f64::NAN), 0.1), Verdict::Inconclusive);
    }

    #[test]
    fn means_and_ratio_over_successful_trials() {
        let records = vec![
            completed(1, Layout::Packed, 300),
            completed(1, Layout::Padded, 100),
            completed(2, Layout::Packed, 500),
            completed(2, Layout::Padded, 100),
        ];
        let summary = Summary::from_records(&records, 0.1);
        assert_eq!(summary.packed.mean, Some(Duration::from_millis(400)));
        assert_eq!(summary.padded.mean, Some(Duration::from_millis(100)));
        assert_eq!(summary.ratio, Some(4.0));
        assert_eq!(summary.verdict, Verdict::PaddingHelped);
        assert!(summary.all_succeeded());
        // 4M ops in 100 ms
        let rate = summary.padded.mean_ops_per_sec.unwrap();
        assert!((rate - 40_000_000.0).abs() < 1.0);
    }

    #[test]
    fn failed_trials_are_excluded_from_the_mean() {
        let records = vec![
            completed(1, Layout::Packed, 200),
            completed(1, Layout::Padded, 200),
            TrialRecord {
                round: 2,
                layout: Layout::Packed,
                outcome: TrialOutcome::Failed(TrialError::WorkerFailed {
                    worker: 1,
                    slot: 1,
                    reason: "boom".to_string(),
                }),
            },
            completed(2, Layout::Padded, 220),
        ];
        let summary = Summary::from_records(&records, 0.1);
        assert_eq!(summary.packed.successes, 1);
        assert_eq!(summary.packed.mean, Some(Duration::from_millis(200)));
        assert_eq!(summary.padded.mean, Some(Duration::from_millis(210)));
        assert_eq!(summary.failed, 1);
        assert!(!summary.all_succeeded());
        assert_eq!(summary.verdict, Verdict::NoSignificantDifference);
    }

    #[test]
    fn missing_layout_is_inconclusive() {
        let records = vec![
            completed(1, Layout::Packed, 200),
            TrialRecord {
                round: 1,
                layout: Layout::Padded,
                outcome: TrialOutcome::Skipped,
            },
        ];
        let summary = Summary::from_records(&records, 0.1);
        assert_eq!(summary.ratio, None);
        assert_eq!(summary.verdict, Verdict::Inconclusive);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.all_succeeded());
    }

    #[test]
    fn rendering_names_every_trial_and_the_verdict() {
        let records = vec![
            completed(1, Layout::Packed, 250),
            TrialRecord {
                round: 1,
                layout: Layout::Padded,
                outcome: TrialOutcome::Failed(TrialError::Interrupted),
            },
        ];
        let summary = Summary::from_records(&records, 0.1);
        let text = render_results(&records, &summary);
        assert!(text.contains("round   1  packed      250.000 ms"));
        assert!(text.contains("FAILED: trial interrupted by signal"));
        assert!(text.contains("mean padded no successful trials"));
        assert!(text.contains("ratio      n/a"));
        assert!(text.contains(Verdict::Inconclusive.message()));
        assert!(text.contains("1 failed, 0 skipped of 2 scheduled"));
    }

    #[test]
    fn header_shows_both_footprints() {
        let config = GlobalConfig {
            workers: 8,
            stride: 128,
            ..GlobalConfig::default()
        };
        let header = RunHeader::new(HostInfo::default(), config).render();
        assert!(header.contains("packed 64 B  padded 1024 B (stride 128 B)"));
        assert!(header.contains("workers    8"));
    }
}
