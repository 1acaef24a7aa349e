use crate::conversation::validate_identity;
use crate::error::{Error, Result};
use crate::web::Ctx;
use axum::{extract::Request, middleware::Next, response::Response};
use tracing::debug;

/// Set by the upstream gateway once it has authenticated the caller
pub const USER_ID_HEADER: &str = "x-user-id";

pub async fn mw_require_ctx(mut req: Request, next: Next) -> Result<Response> {
    debug!("MIDDLEWARE: require_ctx");

    let user_id = match req.headers().get(USER_ID_HEADER) {
        Some(h) => h.to_str().map_err(|_| Error::Unauthorized)?.trim().to_string(),
        None => return Err(Error::Unauthorized),
    };
    if user_id.is_empty() {
        return Err(Error::Unauthorized);
    }
    validate_identity(&user_id).map_err(|_| Error::Unauthorized)?;

    req.extensions_mut().insert(Ctx::new(user_id));

    Ok(next.run(req).await)
}
