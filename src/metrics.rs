//! Prometheus text exposition (format 0.0.4) and the response latency
//! histogram.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Mutex;
use std::time::Duration;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Default Prometheus histogram buckets, in seconds.
const DEFAULT_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
    Histogram,
}

impl MetricKind {
    fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
            MetricKind::Histogram => "histogram",
        }
    }
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}

/// Builds one exposition document. Callers emit each family header once,
/// followed by all of that family's samples.
#[derive(Debug, Default)]
pub struct Exposition {
    out: String,
}

impl Exposition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn family(&mut self, name: &str, help: &str, kind: MetricKind) {
        let _ = writeln!(self.out, "# HELP {} {}", name, escape_help(help));
        let _ = writeln!(self.out, "# TYPE {} {}", name, kind.as_str());
    }

    pub fn sample(&mut self, name: &str, labels: &[(&str, &str)], value: f64) {
        self.out.push_str(name);
        if !labels.is_empty() {
            let label_str = labels
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
                .collect::<Vec<_>>()
                .join(",");
            let _ = write!(self.out, "{{{label_str}}}");
        }
        let _ = writeln!(self.out, " {}", format_value(value));
    }

    /// Header plus a single unlabeled sample.
    pub fn single(&mut self, name: &str, help: &str, kind: MetricKind, value: f64) {
        self.family(name, help, kind);
        self.sample(name, &[], value);
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[derive(Debug, Clone, Default)]
struct HistogramData {
    count: u64,
    sum: f64,
    buckets: [u64; DEFAULT_BUCKETS.len()],
}

/// Latency histogram labeled by operation.
#[derive(Debug)]
pub struct LatencyHistogram {
    name: &'static str,
    help: &'static str,
    series: Mutex<BTreeMap<String, HistogramData>>,
}

impl LatencyHistogram {
    pub fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            series: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn observe(&self, operation: &str, duration: Duration) {
        let secs = duration.as_secs_f64();
        let mut series = match self.series.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let data = series.entry(operation.to_string()).or_default();
        data.count += 1;
        data.sum += secs;
        for (i, bound) in DEFAULT_BUCKETS.iter().enumerate() {
            if secs <= *bound {
                data.buckets[i] += 1;
            }
        }
    }

    /// Render all series. Nothing is written before the first observation.
    pub fn render(&self, out: &mut Exposition) {
        let series = match self.series.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if series.is_empty() {
            return;
        }

        out.family(self.name, self.help, MetricKind::Histogram);
        let bucket_name = format!("{}_bucket", self.name);
        let sum_name = format!("{}_sum", self.name);
        let count_name = format!("{}_count", self.name);
        for (operation, data) in &series {
            let operation = operation.as_str();
            for (bound, count) in DEFAULT_BUCKETS.iter().zip(data.buckets.iter()) {
                let le = bound.to_string();
                out.sample(
                    &bucket_name,
                    &[("operation", operation), ("le", le.as_str())],
                    *count as f64,
                );
            }
            out.sample(
                &bucket_name,
                &[("operation", operation), ("le", "+Inf")],
                data.count as f64,
            );
            out.sample(&sum_name, &[("operation", operation)], data.sum);
            out.sample(&count_name, &[("operation", operation)], data.count as f64);
        }
    }
}
