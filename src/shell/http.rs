use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::modules::backlog::adapters::inbound::http as backlog_http;
use crate::shell::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/items",
            post(backlog_http::create_item).get(backlog_http::list_items),
        )
        .route("/items/reorder", post(backlog_http::reorder_items))
        .route(
            "/items/{id}",
            get(backlog_http::get_item)
                .patch(backlog_http::update_item)
                .delete(backlog_http::delete_item),
        )
        .route("/items/{id}/children", get(backlog_http::get_children))
        .route("/items/{id}/replay", get(backlog_http::replay_item))
        .route(
            "/items/{id}/external-ids/{system}",
            put(backlog_http::set_external_id),
        )
        .route(
            "/external-ids/{system}/{external_id}",
            get(backlog_http::get_by_external_id),
        )
        .route("/metrics", get(backlog_http::get_metrics))
        .route("/health", get(backlog_http::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
