use std::sync::atomic::{AtomicU64, Ordering};

/// Totals kept by the demultiplexer.
#[derive(Debug, Default)]
pub struct DemuxCounters {
    http_requests: AtomicU64,
    ws_requests: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    pub http_requests: u64,
    pub ws_requests: u64,
    pub errors: u64,
}

impl DemuxCounters {
    pub fn http_request(&self) {
        self.http_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ws_request(&self) {
        self.ws_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            http_requests: self.http_requests.load(Ordering::Relaxed),
            ws_requests: self.ws_requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

impl CounterSnapshot {
    /// Lines appended to the `/metrics` output.
    pub fn as_extra(&self) -> [(&'static str, u64); 3] {
        [
            ("metricws_demux_http_requests_total", self.http_requests),
            ("metricws_demux_ws_requests_total", self.ws_requests),
            ("metricws_demux_errors_total", self.errors),
        ]
    }
}
