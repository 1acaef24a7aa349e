//! HTTP plumbing shared by every route

mod ctx;
mod middleware;
mod router;

pub use ctx::Ctx;
pub use middleware::{mw_require_ctx, USER_ID_HEADER};
pub use router::router;
