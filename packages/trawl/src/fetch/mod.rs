//! The rate-limited fetch engine: request pacing, the retrying HTTP
//! client, and the robots.txt guard.

pub mod client;
pub mod pacer;
pub mod robots;

pub use client::{
    FetchClient, FetchPolicy, FetchRequest, FetchResult, HttpTransport, ReqwestTransport,
    TransportError, TransportResponse,
};
pub use pacer::RequestPacer;
pub use robots::{RobotsGuard, RobotsRules};
