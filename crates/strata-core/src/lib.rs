//! # Strata Core
//!
//! Core types for the strata middleware pipeline.
//!
//! This crate provides the foundational types used throughout strata:
//!
//! - [`RequestId`] - UUID v7 request identifier for log correlation
//! - [`StrataError`] - Standard error taxonomy with HTTP status mapping
//! - [`StrataResult`] - Result alias used across the workspace

#![doc(html_root_url = "https://docs.rs/strata-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod id;

pub use error::{StrataError, StrataResult};
pub use id::RequestId;
