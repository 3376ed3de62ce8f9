//! Rotating access tokens.
//!
//! A [`TokenRegistry`] holds a fixed number of live secrets. Trusted local
//! callers mint them through the publisher router served on the UNIX
//! socket; network callers present them in a request header checked by the
//! gate middleware.

mod clock;
mod registry;
pub mod transport;

pub use clock::{Clock, SystemClock};
pub use registry::{TokenPolicy, TokenRegistry};
pub use transport::{publisher_router, require_token, TokenGate, DEFAULT_TOKEN_HEADER};
