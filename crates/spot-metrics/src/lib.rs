//! Prometheus metrics and HTTP endpoints for the spot rescheduler.
//!
//! [`PrometheusRegistry`] implements [`spot_core::MetricsSink`] so the
//! controller can record into it directly. [`MetricsServer`] exposes the
//! registry together with the controller status:
//!
//! | Route | Body |
//! |-------|------|
//! | `/metrics` | Prometheus text format |
//! | `/healthz` | `ok` |
//! | `/status` | [`spot_core::ControllerStatus`] as JSON |

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod prometheus;
pub mod routes;
pub mod server;

pub use error::{MetricsError, Result};
pub use prometheus::{PrometheusRegistry, ReschedulerMetrics};
pub use routes::{ServerState, create_router};
pub use server::MetricsServer;
