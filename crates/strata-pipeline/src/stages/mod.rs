//! Built-in middleware stages.
//!
//! These stages cover the request-shaping concerns every service needs
//! before routing:
//!
//! - [`body`] - decode the collected request body into a typed extension
//! - [`cors`] - cross-origin policy enforcement and response headers
//!
//! Static file serving and routing live in `strata-server`, since they
//! depend on the filesystem and on route handlers respectively.

pub mod body;
pub mod cors;

pub use body::{BodyDecoder, DecodedBody};
pub use cors::{AllowedOrigins, Cors, CorsBuilder, CorsDecision};
