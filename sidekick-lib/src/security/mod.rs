pub mod client_key;
pub mod rate_limit;

pub use client_key::{client_key, ClientIdentifier};
pub use rate_limit::{Decision, LimiterRegistry};
