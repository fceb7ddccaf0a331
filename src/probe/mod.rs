//! HTTP probing of the instrumented container

mod http;

pub use http::{probe_url, ReqwestHttpProbe, PROBE_ATTEMPTS};
