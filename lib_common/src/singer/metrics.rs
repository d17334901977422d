//! Singer metrics, emitted as `METRIC: {...}` log lines.

use std::time::Instant;

use serde_json::{json, Value};

fn emit(kind: &str, metric: &str, value: Value, tags: Value) {
    let line = json!({
        "type": kind,
        "metric": metric,
        "value": value,
        "tags": tags,
    });
    log::info!("METRIC: {}", line);
}

/// Counts records emitted for an endpoint.
///
/// The `record_count` line is logged when the counter is dropped, so a sync
/// that aborts early still reports what it emitted.
#[derive(Debug)]
pub struct Counter {
    endpoint: String,
    value: u64,
}

impl Counter {
    /// A `record_count` counter for `endpoint`.
    pub fn record_count(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            value: 0,
        }
    }

    /// Adds one.
    pub fn increment(&mut self) {
        self.value += 1;
    }

    /// The final count. The metric line is logged when `self` drops.
    pub fn finish(self) -> u64 {
        self.value
    }
}

impl Drop for Counter {
    fn drop(&mut self) {
        emit(
            "counter",
            "record_count",
            json!(self.value),
            json!({"endpoint": self.endpoint}),
        );
    }
}

/// Times a single HTTP request.
#[derive(Debug)]
pub struct Timer {
    endpoint: String,
    started: Instant,
}

impl Timer {
    /// Starts an `http_request_duration` timer for `endpoint`.
    pub fn http_request(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            started: Instant::now(),
        }
    }

    /// Logs the elapsed time with the response status, or a failure when the
    /// request never produced one.
    pub fn finish(self, http_status_code: Option<u16>) {
        let status = if http_status_code.is_some() { "succeeded" } else { "failed" };
        emit(
            "timer",
            "http_request_duration",
            json!(self.started.elapsed().as_secs_f64()),
            json!({
                "endpoint": self.endpoint,
                "http_status_code": http_status_code,
                "status": status,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn counter_counts() {
        testing::capture_logs();
        let mut counter = Counter::record_count("metrics-finish");
        counter.increment();
        counter.increment();
        assert_eq!(counter.finish(), 2);

        let lines = testing::lines_containing("metrics-finish");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("METRIC: "));
        assert!(lines[0].contains("\"value\":2"));
    }

    #[test]
    fn counter_reports_when_dropped_early() {
        testing::capture_logs();
        fn count_then_fail() -> Result<u64, String> {
            let mut counter = Counter::record_count("metrics-early-exit");
            counter.increment();
            if counter.endpoint.starts_with("metrics") {
                return Err("transport failed".to_string());
            }
            Ok(counter.finish())
        }
        let result = count_then_fail();
        assert!(result.is_err());

        let lines = testing::lines_containing("metrics-early-exit");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("\"metric\":\"record_count\""));
        assert!(lines[0].contains("\"value\":1"));
    }

    #[test]
    fn timer_tags_status() {
        testing::capture_logs();
        Timer::http_request("metrics-timer-ok").finish(Some(200));
        Timer::http_request("metrics-timer-failed").finish(None);

        let ok = testing::lines_containing("metrics-timer-ok");
        assert!(ok[0].contains("\"status\":\"succeeded\""));
        assert!(ok[0].contains("\"http_status_code\":200"));
        let failed = testing::lines_containing("metrics-timer-failed");
        assert!(failed[0].contains("\"status\":\"failed\""));
    }
}
