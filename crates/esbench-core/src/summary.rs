//! Fixed-width text summaries of benchmark results.

use comfy_table::{Cell, Table, TableComponent};

use crate::runner::TaskReport;

const HEADERS: [&str; 3] = ["operation", "throughput (ops/s)", "latency"];

/// Cell text for a task that never produced a timing.
pub const NO_SAMPLES: &str = "no samples recorded";

/// Placeholder for values that cannot be rendered.
pub const NOT_AVAILABLE: &str = "n/a";

/// Latency sub-units below milliseconds and their factor from milliseconds.
const SUB_UNITS: [(&str, f64); 2] = [("µs", 1e3), ("ns", 1e6)];

/// Throughput suffixes, each a factor of 1000 above the previous one.
const SI_SUFFIXES: [(f64, &str); 4] = [(1.0, ""), (1e3, "k"), (1e6, "M"), (1e9, "B")];

/// Render `value` with 0, 1 or 2 decimals depending on `magnitude`.
fn fixed(value: f64, magnitude: f64) -> String {
    let magnitude = magnitude.abs();
    let decimals = if magnitude >= 100.0 {
        0
    } else if magnitude >= 10.0 {
        1
    } else {
        2
    };
    format!("{:.*}", decimals, value)
}

/// Whether rendered text reached the next unit once rounded.
fn overflows_unit(text: &str) -> bool {
    text.parse::<f64>().is_ok_and(|v| v.abs() >= 1000.0)
}

/// Seconds always render without decimals.
fn seconds(ms: f64) -> String {
    format!("{:.0} s", ms / 1000.0)
}

/// Format a latency given in milliseconds.
pub fn format_latency(ms: f64) -> String {
    if !ms.is_finite() {
        return NOT_AVAILABLE.to_string();
    }

    let magnitude = ms.abs();
    if magnitude >= 1000.0 {
        return seconds(ms);
    }
    if magnitude >= 1.0 || magnitude == 0.0 {
        let text = fixed(ms, magnitude);
        if overflows_unit(&text) {
            return seconds(ms);
        }
        return format!("{} ms", text);
    }

    let mut index = 0;
    while index + 1 < SUB_UNITS.len() && (ms * SUB_UNITS[index].1).abs() < 1.0 {
        index += 1;
    }
    loop {
        let (unit, factor) = SUB_UNITS[index];
        let value = ms * factor;
        let text = fixed(value, value);
        if !overflows_unit(&text) {
            return format!("{} {}", text, unit);
        }
        if index == 0 {
            return format!("{} ms", fixed(ms, magnitude));
        }
        index -= 1;
    }
}

/// Format an operations-per-second figure with an SI suffix.
pub fn format_throughput(ops: f64) -> String {
    if !ops.is_finite() {
        return NOT_AVAILABLE.to_string();
    }
    let mut index = SI_SUFFIXES
        .iter()
        .rposition(|(scale, _)| ops.abs() >= *scale)
        .unwrap_or(0);
    loop {
        let (scale, suffix) = SI_SUFFIXES[index];
        let scaled = ops / scale;
        let text = fixed(scaled, scaled);
        if index + 1 < SI_SUFFIXES.len() && overflows_unit(&text) {
            index += 1;
            continue;
        }
        return format!("{}{}", text, suffix);
    }
}

/// Format a relative margin of error given in percent.
pub fn format_rme(rme: f64) -> String {
    if !rme.is_finite() {
        return NOT_AVAILABLE.to_string();
    }
    format!("±{:.2}%", rme)
}

fn row(task: &TaskReport) -> [String; 3] {
    let stats = task.result.as_ref().and_then(|r| r.stats.as_ref());
    match stats {
        Some(stats) if stats.latency.samples > 0 => [
            task.name.clone(),
            format!(
                "{} {}",
                format_throughput(stats.throughput.mean),
                format_rme(stats.throughput.rme)
            ),
            format!(
                "{} {}",
                format_latency(stats.latency.mean),
                format_rme(stats.latency.rme)
            ),
        ],
        _ => [
            task.name.clone(),
            NO_SAMPLES.to_string(),
            NO_SAMPLES.to_string(),
        ],
    }
}

/// Borderless table: ` | ` between columns, `-+-` in the header rule.
fn summary_table() -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_style(TableComponent::VerticalLines, '|');
    table.set_style(TableComponent::HeaderLines, '-');
    table.set_style(TableComponent::MiddleHeaderIntersections, '+');
    table
}

/// Render tasks as a table, one row per task in the given order.
pub fn summarize(tasks: &[TaskReport]) -> String {
    let mut table = summary_table();
    table.set_header(HEADERS.iter().map(|h| Cell::new(h)));
    for task in tasks {
        table.add_row(row(task).into_iter().map(Cell::new));
    }

    let last = HEADERS.len() - 1;
    for (index, column) in table.column_iter_mut().enumerate() {
        let left = if index == 0 { 0 } else { 1 };
        let right = if index == last { 0 } else { 1 };
        column.set_padding((left, right));
    }

    table
        .lines()
        .map(|line| line.trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::TaskResult;
    use crate::stats::{Statistics, TaskStats};

    fn stats(mean: f64, rme: f64) -> Statistics {
        Statistics {
            samples: 10,
            mean,
            min: mean,
            max: mean,
            p50: mean,
            p75: mean,
            p99: mean,
            sd: 0.0,
            sem: 0.0,
            moe: 0.0,
            rme,
        }
    }

    fn task(name: &str, ops: f64, latency_ms: f64, rme: f64) -> TaskReport {
        TaskReport {
            name: name.to_string(),
            result: Some(TaskResult {
                stats: Some(TaskStats {
                    latency: stats(latency_ms, rme),
                    throughput: stats(ops, rme),
                    total_time_ms: 1.0,
                }),
                error: None,
            }),
        }
    }

    #[test]
    fn test_format_latency_units() {
        assert_eq!(format_latency(1.0), "1.00 ms");
        assert_eq!(format_latency(1000.0), "1 s");
        assert_eq!(format_latency(2600.0), "3 s");
        assert_eq!(format_latency(250.0), "250 ms");
        assert_eq!(format_latency(12.34), "12.3 ms");
        assert_eq!(format_latency(0.5), "500 µs");
        assert_eq!(format_latency(0.0123), "12.3 µs");
        assert_eq!(format_latency(0.0005), "500 ns");
        assert_eq!(format_latency(0.000002), "2.00 ns");
        assert_eq!(format_latency(0.0), "0.00 ms");
    }

    #[test]
    fn test_rounding_moves_to_next_unit() {
        assert_eq!(format_latency(999.9999), "1 s");
        assert_eq!(format_latency(0.9999999), "1.00 ms");
        assert_eq!(format_latency(0.0009999999), "1.00 µs");
        assert_eq!(format_latency(999.4), "999 ms");
        assert_eq!(format_throughput(999_999.0), "1.00M");
        assert_eq!(format_throughput(999.7), "1.00k");
        assert_eq!(format_throughput(999_999_999_999.0), "1000B");
    }

    #[test]
    fn test_format_non_finite() {
        assert_eq!(format_latency(f64::NAN), "n/a");
        assert_eq!(format_throughput(f64::INFINITY), "n/a");
        assert_eq!(format_rme(f64::NAN), "n/a");
    }

    #[test]
    fn test_format_throughput_suffixes() {
        assert_eq!(format_throughput(12345.0), "12.3k");
        assert_eq!(format_throughput(532.0), "532");
        assert_eq!(format_throughput(5.5), "5.50");
        assert_eq!(format_throughput(2_500_000.0), "2.50M");
        assert_eq!(format_throughput(150_000_000_000.0), "150B");
    }

    #[test]
    fn test_format_rme() {
        assert_eq!(format_rme(1.2), "±1.20%");
        assert_eq!(format_rme(0.0), "±0.00%");
    }

    #[test]
    fn test_summary_rows() {
        let tasks = vec![
            task("list", 12345.0, 0.081, 1.2),
            TaskReport {
                name: "get".into(),
                result: None,
            },
        ];
        let table = summarize(&tasks);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("operation | throughput (ops/s)"));
        assert!(lines[1].chars().all(|c| c == '-' || c == '+'));
        assert!(lines[1].contains("-+-"));
        assert!(lines[1].starts_with(&"-".repeat("operation".len())));
        assert!(lines[2].starts_with("list"));
        assert!(lines[2].contains("12.3k ±1.20%"));
        assert!(lines[2].contains("81.0 µs ±1.20%"));
        assert!(lines[3].starts_with("get"));
        assert_eq!(lines[3].matches(NO_SAMPLES).count(), 2);
    }

    #[test]
    fn test_summary_columns_align() {
        let tasks = vec![task("get", 10.0, 100.0, 0.5), task("restore", 1e6, 0.001, 12.0)];
        let table = summarize(&tasks);
        let separators: Vec<Vec<usize>> = table
            .lines()
            .filter(|l| l.contains(" | "))
            .map(|l| {
                l.char_indices()
                    .filter(|(_, c)| *c == '|')
                    .map(|(i, _)| l[..i].chars().count())
                    .collect()
            })
            .collect();
        assert!(separators.windows(2).all(|w| w[0] == w[1]));
    }
}
