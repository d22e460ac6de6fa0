//! Route definitions for the `/system` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::system;
use crate::state::AppState;

/// Routes mounted at `/system`.
///
/// ```text
/// POST /notice  -> broadcast an announcement (requires auth)
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/notice", post(system::notice))
}
