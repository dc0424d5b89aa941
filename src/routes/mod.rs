pub mod auth;
pub mod friendships;
pub mod home;
pub mod posts;
pub mod uploads;
pub mod users;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full application router with state applied.
pub fn app(state: AppState) -> Router {
    let uploads = format!(
        "{}/{{*key}}",
        state.config.storage.public_prefix.trim_end_matches('/')
    );

    Router::new()
        .route("/", get(home::index))
        .route(&uploads, get(uploads::serve))
        .merge(auth::router())
        .merge(users::router())
        .merge(friendships::router())
        .merge(posts::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
