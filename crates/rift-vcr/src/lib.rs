//! Record and replay of intercepted browser traffic.
//!
//! A [`Vcr`] binds a cassette namespace to an [`Interceptor`]. The resulting
//! [`VcrSession`] fingerprints every request, answers it from the cassette
//! when a recording exists and records it live otherwise, according to its
//! [`RecordMode`].

pub mod cassette;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod headers;
pub mod interceptor;
pub mod recording;
pub mod temporal;
pub mod vcr;

pub use config::VcrConfig;
pub use error::{InterceptError, Result, VcrError};
pub use interceptor::{Interceptor, RequestId};
pub use recording::{RecordMode, VcrSession};
pub use vcr::Vcr;
