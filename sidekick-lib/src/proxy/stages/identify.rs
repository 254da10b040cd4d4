use http::request::Parts;

use crate::proxy::context::RequestContext;
use crate::proxy::pipeline::{Flow, Stage};
use crate::security::ClientIdentifier;

/// Derives the client key used by admission.
pub struct IdentifyStage {
    identifier: ClientIdentifier,
}

impl IdentifyStage {
    pub fn new(identifier: ClientIdentifier) -> Self {
        Self { identifier }
    }
}

impl Stage for IdentifyStage {
    fn name(&self) -> &'static str {
        "identify"
    }

    fn on_request(&self, parts: &mut Parts, ctx: &mut RequestContext) -> Flow {
        ctx.client_key = Some(self.identifier.identify(&parts.headers, ctx.peer));
        Flow::Continue
    }
}
