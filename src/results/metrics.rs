//! Metric extraction from test-tool logs.

use std::fs;
use std::io;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Values matched by a tool's metric pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub pattern: String,
    pub samples: Vec<f64>,
    /// Last matched value, usually the tool's final summary line
    pub value: Option<f64>,
    pub mean: Option<f64>,
}

/// Apply `pattern` to every line of `log_path`, collecting its `value` group
pub fn extract_metrics(pattern: &Regex, log_path: &Path) -> io::Result<Metrics> {
    let content = match fs::read(log_path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e),
    };
    // tools may print binary noise; invalid bytes must not hide later lines
    Ok(metrics_from_text(pattern, &String::from_utf8_lossy(&content)))
}

pub fn metrics_from_text(pattern: &Regex, text: &str) -> Metrics {
    let samples: Vec<f64> = pattern
        .captures_iter(text)
        .filter_map(|caps| caps.name("value"))
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .collect();
    let mean = if samples.is_empty() {
        None
    } else {
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    };

    Metrics {
        pattern: pattern.as_str().to_string(),
        value: samples.last().copied(),
        mean,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iperf_style_output() {
        let pattern = Regex::new(r"(?P<value>[\d.]+) Mbits/sec\s+receiver").unwrap();
        let text = "\
[  5]   0.00-10.00  sec   112 MBytes  94.1 Mbits/sec  sender
[  5]   0.00-10.04  sec   111 MBytes  92.8 Mbits/sec  receiver
";
        let metrics = metrics_from_text(&pattern, text);
        assert_eq!(metrics.samples, vec![92.8]);
        assert_eq!(metrics.value, Some(92.8));
    }

    #[test]
    fn test_mean_of_samples() {
        let pattern = Regex::new(r"rtt=(?P<value>\d+)ms").unwrap();
        let metrics = metrics_from_text(&pattern, "rtt=10ms\nrtt=20ms\nrtt=30ms\n");
        assert_eq!(metrics.mean, Some(20.0));
        assert_eq!(metrics.value, Some(30.0));
    }

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = Regex::new(r"(?P<value>\d+)").unwrap();
        let metrics = extract_metrics(&pattern, &dir.path().join("absent.log")).unwrap();
        assert!(metrics.samples.is_empty());
        assert_eq!(metrics.value, None);
    }

    #[test]
    fn test_invalid_utf8_log_still_matches() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("client.log");
        let mut bytes = vec![0xff, 0xfe, b'\n'];
        bytes.extend_from_slice(b"rate 10\n");
        fs::write(&log, bytes).unwrap();

        let pattern = Regex::new(r"rate (?P<value>[\d.]+)").unwrap();
        let metrics = extract_metrics(&pattern, &log).unwrap();
        assert_eq!(metrics.samples, vec![10.0]);
        assert_eq!(metrics.value, Some(10.0));
    }
}
