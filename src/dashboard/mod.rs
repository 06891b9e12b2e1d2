use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::debug;

use crate::aggregator::{AggregatorClosed, AggregatorHandle};
use crate::models::DateCategory;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: AggregatorHandle,
}

/// Build the Axum router for the view API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/view", get(view_handler))
        .route("/api/sports/:id/select", post(select_sport_handler))
        .route("/api/date-category/:category", post(select_date_category_handler))
        .route("/api/retry", post(retry_handler))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

fn accepted(result: Result<(), AggregatorClosed>) -> Result<StatusCode, (StatusCode, String)> {
    result
        .map(|_| StatusCode::ACCEPTED)
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
}

/// GET /api/view
async fn view_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.aggregator.current())
}

/// POST /api/sports/:id/select
async fn select_sport_handler(
    State(state): State<Arc<AppState>>,
    Path(sport_id): Path<i64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    debug!(sport_id, "Select sport");
    accepted(state.aggregator.select_sport(sport_id).await)
}

/// POST /api/date-category/:category
async fn select_date_category_handler(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let category: DateCategory = category
        .parse()
        .map_err(|e: String| (StatusCode::BAD_REQUEST, e))?;
    debug!(%category, "Select date category");
    accepted(state.aggregator.select_date_category(category).await)
}

/// POST /api/retry
async fn retry_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    accepted(state.aggregator.retry().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{Aggregator, AggregatorConfig};
    use crate::snapshot::test_support::MemoryStore;
    use crate::sync::synchronizer::test_support::{
        event_payload, fixed_clock, sport_payload, Script, ScriptedFetcher,
    };
    use serde_json::Value;
    use std::time::Duration;

    async fn serve() -> (String, AggregatorHandle) {
        let fetcher = ScriptedFetcher::new(
            vec![Script::Ok(vec![
                sport_payload(1, "Football"),
                sport_payload(2, "Basketball"),
            ])],
            vec![Script::Ok(vec![])],
            vec![Script::Ok(vec![
                event_payload(1, 1, "LIVE", "2025-06-09 11:00"),
                event_payload(2, 2, "LIVE", "2025-06-09 11:30"),
                event_payload(3, 2, "PRE_MATCH", "2025-06-10 20:00"),
            ])],
        );
        let (handle, _task) = Aggregator::spawn(AggregatorConfig {
            fetcher: Arc::new(fetcher),
            store: Arc::new(MemoryStore::default()),
            clock: fixed_clock("2025-06-09 12:00"),
            cache_read_timeout: Duration::from_millis(500),
            refresh_interval: None,
        });

        let app = router(AppState {
            aggregator: handle.clone(),
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), handle)
    }

    /// Poll GET /api/view until `pred` holds.
    async fn view_until<F>(base: &str, mut pred: F) -> Value
    where
        F: FnMut(&Value) -> bool,
    {
        let client = reqwest::Client::new();
        for _ in 0..100 {
            let view: Value = client
                .get(format!("{}/api/view", base))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            if pred(&view) {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("view never reached expected state");
    }

    fn live_ids(view: &Value) -> Vec<i64> {
        view["live_matches"]
            .as_array()
            .map(|a| a.iter().filter_map(|e| e["id"].as_i64()).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_view_and_selection_routes() {
        let (base, _handle) = serve().await;
        let client = reqwest::Client::new();

        let view = view_until(&base, |v| v["state"] == "success" && !live_ids(v).is_empty()).await;
        assert_eq!(view["selected_sport_id"], 1);

        let resp = client
            .post(format!("{}/api/sports/2/select", base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);

        let resp = client
            .post(format!("{}/api/date-category/tomorrow", base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);

        let view = view_until(&base, |v| v["selected_date_category"] == "TOMORROW").await;
        assert_eq!(view["selected_sport_id"], 2);
        assert_eq!(live_ids(&view), vec![2]);
        assert_eq!(view["upcoming_matches"][0]["id"], 3);
    }

    #[tokio::test]
    async fn test_unknown_category_is_bad_request() {
        let (base, _handle) = serve().await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/date-category/someday", base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_commands_after_shutdown_are_unavailable() {
        let (base, handle) = serve().await;
        let client = reqwest::Client::new();

        let resp = client.post(format!("{}/api/retry", base)).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);

        handle.shutdown().await.unwrap();
        let resp = client.post(format!("{}/api/retry", base)).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

        // The last published view is still served
        let resp = client.get(format!("{}/api/view", base)).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
    }
}
