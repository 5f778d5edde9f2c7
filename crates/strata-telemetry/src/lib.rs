//! # Strata Telemetry
//!
//! Structured logging setup for strata services.
//!
//! The pipeline crates emit events through [`tracing`]; this crate wires
//! those events to an output format. Call [`init_logging`] once at
//! startup, before the server begins accepting traffic.
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(addr = "0.0.0.0:8080", "starting server");
//! ```

#![doc(html_root_url = "https://docs.rs/strata-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod logging;

pub use logging::{init_logging, LogConfig, TelemetryError};
