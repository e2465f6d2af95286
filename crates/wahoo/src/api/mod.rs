//! JSON API and the bundled web page.

mod chats;
mod contacts;
mod error;
mod session;
mod state;

use axum::Router;
use axum::response::Html;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use wahoo_ipc::SessionTransport;

pub use error::ApiError;
pub use state::AppState;

const INDEX_HTML: &str = include_str!("../../web/index.html");

pub fn build_app<T: SessionTransport>(state: AppState<T>) -> Router {
    let api = Router::new()
        .route("/chats", get(chats::list_chats::<T>))
        .route("/messages", get(chats::list_messages::<T>))
        .route(
            "/send",
            post(session::send_message::<T>).fallback(session::send_requires_post),
        )
        .route("/contacts", get(contacts::search_contacts::<T>))
        .route("/status", get(session::status::<T>))
        .with_state(state);

    Router::new()
        .route("/", get(index))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Parse a `limit` query value. Absent or malformed values use the default;
/// numbers are clamped into the allowed range.
pub(crate) fn parse_limit(raw: Option<&str>) -> i64 {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .map(wahoo_db::clamp_limit)
        .unwrap_or(wahoo_db::DEFAULT_LIMIT)
}

/// Query flags accept `true`/`false` and `1`/`0`.
pub(crate) fn parse_flag(raw: Option<&str>, default: bool) -> bool {
    match raw.map(str::trim) {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None), 50);
        assert_eq!(parse_limit(Some("abc")), 50);
        assert_eq!(parse_limit(Some("")), 50);
        assert_eq!(parse_limit(Some("-5")), 50);
        assert_eq!(parse_limit(Some(" 20 ")), 20);
        assert_eq!(parse_limit(Some("100000")), wahoo_db::MAX_LIMIT);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag(None, true));
        assert!(!parse_flag(Some("0"), true));
        assert!(parse_flag(Some("true"), false));
        assert!(!parse_flag(Some("maybe"), false));
    }
}
