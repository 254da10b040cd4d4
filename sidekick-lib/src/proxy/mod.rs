pub mod client_pool;
pub mod connection;
pub mod context;
pub mod forwarding;
pub mod headers;
pub mod http_result;
pub mod pipeline;
pub mod router;
pub mod server;
pub mod stages;
pub mod synthetic_response;

use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;

/// Body type of every response the gateway produces
pub type RespBody = BoxBody<Bytes, hyper::Error>;

pub use context::RequestContext;
pub use forwarding::Forwarder;
pub use http_result::HttpError;
pub use pipeline::{Flow, Pipeline, Stage};
pub use router::Route;
pub use server::{run, serve, spawn_sweeper, Gateway};
