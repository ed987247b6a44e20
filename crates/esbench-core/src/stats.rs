//! Sample statistics for benchmark tasks.
//!
//! Latency samples are kept in milliseconds. Margins of error use a 95%
//! two-sided Student-t interval.

use serde::Serialize;

/// Two-sided 95% Student-t critical values for 1..=30 degrees of freedom.
const T_TABLE: [f64; 30] = [
    12.706, 4.303, 3.182, 2.776, 2.571, 2.447, 2.365, 2.306, 2.262, 2.228, 2.201, 2.179, 2.16,
    2.145, 2.131, 2.12, 2.11, 2.101, 2.093, 2.086, 2.08, 2.074, 2.069, 2.064, 2.06, 2.056, 2.052,
    2.048, 2.045, 2.042,
];

/// Normal approximation used beyond the table.
const T_INFINITY: f64 = 1.96;

fn critical_value(degrees_of_freedom: usize) -> f64 {
    match degrees_of_freedom {
        0 => f64::NAN,
        df if df <= T_TABLE.len() => T_TABLE[df - 1],
        _ => T_INFINITY,
    }
}

/// Summary of a sample set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub samples: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p75: f64,
    pub p99: f64,
    /// Sample standard deviation.
    pub sd: f64,
    /// Standard error of the mean.
    pub sem: f64,
    /// Margin of error of the mean.
    pub moe: f64,
    /// Margin of error relative to the mean, in percent.
    pub rme: f64,
}

impl Statistics {
    /// Compute statistics over `samples`. Returns `None` for an empty set.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let variance = if n > 1 {
            sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };
        let sd = variance.sqrt();
        let sem = sd / (n as f64).sqrt();
        let moe = sem * critical_value(n - 1);
        let rme = if mean != 0.0 { moe / mean * 100.0 } else { f64::NAN };

        Some(Self {
            samples: n,
            mean,
            min: sorted[0],
            max: sorted[n - 1],
            p50: percentile(&sorted, 0.50),
            p75: percentile(&sorted, 0.75),
            p99: percentile(&sorted, 0.99),
            sd,
            sem,
            moe,
            rme,
        })
    }
}

/// Nearest-rank percentile of an ascending sample set.
fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    let rank = (quantile * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Per-task latency and throughput statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStats {
    /// Latency in milliseconds.
    pub latency: Statistics,
    /// Throughput in operations per second.
    pub throughput: Statistics,
    /// Wall time spent measuring, in milliseconds.
    pub total_time_ms: f64,
}

impl TaskStats {
    /// Derive latency and throughput statistics from latency samples (ms).
    pub fn from_latencies(latencies_ms: &[f64], total_time_ms: f64) -> Option<Self> {
        let latency = Statistics::from_samples(latencies_ms)?;
        let throughput: Vec<f64> = latencies_ms
            .iter()
            .map(|ms| if *ms > 0.0 { 1000.0 / ms } else { 0.0 })
            .collect();
        let throughput = Statistics::from_samples(&throughput)?;
        Some(Self {
            latency,
            throughput,
            total_time_ms,
        })
    }
}
