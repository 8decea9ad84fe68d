/// HTTP 服务 (HTTP surface)
///
/// - GET /            监控页面
/// - GET /video_feed  MJPEG 视频流
/// - GET /get_status  事故状态 + 备选路线 (JSON)
pub mod stream;

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::incident::SharedIncident;
use crate::pipeline::FrameReceiver;
use crate::routes::{alternative_routes, AlternativeRoutes, DirectionsProvider, MAIN_ROAD};

const INDEX_HTML: &str = include_str!("../../templates/index.html");

#[derive(Clone)]
pub struct AppState {
    pub incident: SharedIncident,
    pub frames: FrameReceiver,
    pub directions: Arc<dyn DirectionsProvider>,
}

#[derive(Debug, Serialize)]
pub struct MainRoadStatus {
    pub name: &'static str,
    pub name_ar: &'static str,
    pub wait_time: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub accident: bool,
    pub main_road: MainRoadStatus,
    pub alternative_routes: AlternativeRoutes,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/video_feed", get(video_feed_handler))
        .route("/get_status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn video_feed_handler(State(state): State<AppState>) -> Response {
    let body = Body::from_stream(stream::multipart_stream(state.frames.clone()));
    ([(header::CONTENT_TYPE, stream::content_type())], body).into_response()
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    // 路线查询是阻塞 HTTP 调用, 在加锁之前完成
    let location = state.incident.snapshot().location;
    let directions = Arc::clone(&state.directions);
    let routes = tokio::task::spawn_blocking(move || {
        alternative_routes(directions.as_ref(), location)
    })
    .await
    .unwrap_or_else(|e| {
        warn!("⚠️ 路线查询任务失败: {}", e);
        AlternativeRoutes::new()
    });

    let incident = state.incident.snapshot();
    Json(StatusResponse {
        accident: incident.active,
        main_road: MainRoadStatus {
            name: MAIN_ROAD.name,
            name_ar: MAIN_ROAD.name_ar,
            wait_time: incident.remaining_display(),
        },
        alternative_routes: routes,
    })
}
