// Request-scoped viewer plumbing for the HTTP layer.

pub mod viewer_context_extractor;
pub mod viewer_context_middleware;

pub use viewer_context_extractor::Vc;
pub use viewer_context_middleware::{viewer_context_middleware, USER_ID_HEADER};
