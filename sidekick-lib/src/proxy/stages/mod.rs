//! Concrete pipeline stages.
//!
//! Proxied requests go through, in order:
//! request id, access log, instrumentation, client identification, admission.
//! Operational endpoints stop after instrumentation.

mod access_log;
mod admission;
mod identify;
mod instrumentation;
mod request_id;

pub use access_log::AccessLogStage;
pub use admission::{too_many_requests_response, AdmissionStage};
pub use identify::IdentifyStage;
pub use instrumentation::InstrumentationStage;
pub use request_id::RequestIdStage;
