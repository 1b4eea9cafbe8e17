//! Exchange session ownership: connect/retry, per-call fallback and request metrics.

mod client;
mod session;

pub use client::{Gateway, SpreadAlert};
pub use session::{MetricsSnapshot, SessionMetrics, SessionState};
