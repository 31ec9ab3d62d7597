//! HTTP server for health, metrics and admission webhooks
//!
//! Provides Kubernetes health probes:
//! - `/healthz` - Liveness probe (process is running)
//! - `/readyz` - Readiness probe (controller is ready to serve)
//!
//! Also provides graceful shutdown handling for SIGTERM/SIGINT.

mod health;
pub mod metrics;
pub mod shutdown;
pub mod webhook;

pub use health::{build_router, run_server, run_server_tls, ReadinessState, ServerState};
pub use metrics::{create_metrics, ControllerMetrics, SharedMetrics};
pub use shutdown::{wait_for_signal, Shutdown, ShutdownListener};

#[cfg(test)]
#[path = "health_test.rs"]
mod health_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;
