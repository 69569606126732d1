//! Observability and Metrics
//!
//! Operational counters for the server: connections, frames, responses,
//! failures by class and mailbox traffic.
//!
//! Uses atomic counters for thread-safe metrics collection. One [`Metrics`] is
//! shared by the dispatcher and the server loop through an `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

use crate::error::ErrorClass;

#[derive(Debug)]
pub struct Metrics {
    /// Total connections accepted and served
    pub connections_total: AtomicU64,
    /// Currently active connections
    pub connections_active: AtomicU64,
    /// Connections closed on accept because the cap was reached
    pub connections_rejected: AtomicU64,
    /// Complete request frames received
    pub frames_received: AtomicU64,
    /// Request bytes received, headers included
    pub bytes_received: AtomicU64,
    /// Responses written
    pub responses_sent: AtomicU64,
    /// Response bytes written, headers included
    pub bytes_sent: AtomicU64,
    /// ERROR responses among `responses_sent`
    pub error_responses: AtomicU64,
    pub protocol_errors: AtomicU64,
    pub domain_errors: AtomicU64,
    pub store_errors: AtomicU64,
    pub transport_errors: AtomicU64,
    pub clients_registered: AtomicU64,
    pub messages_queued: AtomicU64,
    pub messages_delivered: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            responses_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            error_responses: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            domain_errors: AtomicU64::new(0),
            store_errors: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            clients_registered: AtomicU64::new(0),
            messages_queued: AtomicU64::new(0),
            messages_delivered: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a new connection
    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection closed
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_received(&self, byte_count: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn response_sent(&self, byte_count: u64, is_error: bool) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
        if is_error {
            self.error_responses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count one failure under its class
    pub fn error(&self, class: ErrorClass) {
        let counter = match class {
            ErrorClass::Protocol => &self.protocol_errors,
            ErrorClass::Domain => &self.domain_errors,
            ErrorClass::Store => &self.store_errors,
            ErrorClass::Transport => &self.transport_errors,
            // Config failures are fatal at startup and never reach a connection
            ErrorClass::Config => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_registered(&self) {
        self.clients_registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_queued(&self) {
        self.messages_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_delivered(&self, count: u64) {
        self.messages_delivered.fetch_add(count, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            error_responses: self.error_responses.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            domain_errors: self.domain_errors.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            clients_registered: self.clients_registered.load(Ordering::Relaxed),
            messages_queued: self.messages_queued.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            connections_rejected = snapshot.connections_rejected,
            frames_received = snapshot.frames_received,
            bytes_received = snapshot.bytes_received,
            responses_sent = snapshot.responses_sent,
            bytes_sent = snapshot.bytes_sent,
            error_responses = snapshot.error_responses,
            protocol_errors = snapshot.protocol_errors,
            domain_errors = snapshot.domain_errors,
            store_errors = snapshot.store_errors,
            transport_errors = snapshot.transport_errors,
            clients_registered = snapshot.clients_registered,
            messages_queued = snapshot.messages_queued,
            messages_delivered = snapshot.messages_delivered,
            uptime_seconds = snapshot.uptime_seconds,
            "Server metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub connections_rejected: u64,
    pub frames_received: u64,
    pub bytes_received: u64,
    pub responses_sent: u64,
    pub bytes_sent: u64,
    pub error_responses: u64,
    pub protocol_errors: u64,
    pub domain_errors: u64,
    pub store_errors: u64,
    pub transport_errors: u64,
    pub clients_registered: u64,
    pub messages_queued: u64,
    pub messages_delivered: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_us = duration.as_micros() as u64,
            "Operation completed"
        );
    }
}
