//! ==============================================================================
//! server.rs - web dashboard and json api
//! ==============================================================================
//!
//! routes:
//!     GET  /                       html dashboard (status, farms, weather, notices)
//!     POST /refresh                dashboard refresh button; redirects back to /
//!     GET  /api/status             current DashboardState
//!     POST /api/status/refresh     fetch + decode now
//!     GET  /api/config             farm configuration
//!     POST /api/config             partial farm configuration update
//!     POST /api/plant              validate + upload plant configuration
//!     GET  /api/weather            weather card data
//!     GET  /api/advisory           farming guidance + snapshot notices
//!     GET  /api/advisory/download  guidance as a text file
//!
//! relationships:
//!     - uses: monitor.rs (state + refresh), config.rs (ConfigContext),
//!       weather.rs, advisory.rs
//!     - used by: main.rs
//!
//! ==============================================================================

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use std::fmt::Write as _;
use tower_http::cors::CorsLayer;

use crate::advisory::{self, Advisory, Severity};
use crate::config::{ConfigContext, FarmConfig, FarmConfigUpdate};
use crate::domain::{Farm, SystemSnapshot};
use crate::monitor::{DashboardState, MonitorError, StatusMonitor};
use crate::plant::PlantConfig;
use crate::weather::{WeatherClient, WeatherData};

/// everything the handlers need, injected once at startup
#[derive(Clone)]
pub struct AppContext {
    pub monitor: StatusMonitor,
    pub config: ConfigContext,
    pub weather: WeatherClient,
    pub city: String,
}

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/refresh", post(refresh_form_handler))
        .route("/api/status", get(status_handler))
        .route("/api/status/refresh", post(refresh_handler))
        .route("/api/config", get(get_config_handler).post(update_config_handler))
        .route("/api/plant", post(plant_handler))
        .route("/api/weather", get(weather_handler))
        .route("/api/advisory", get(advisory_handler))
        .route("/api/advisory/download", get(download_handler))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

pub async fn run_server(bind: &str, ctx: AppContext) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("dashboard live at http://{}", listener.local_addr()?);
    axum::serve(listener, router(ctx)).await?;
    Ok(())
}

// ==============================================================================
// errors
// ==============================================================================

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl From<MonitorError> for ApiError {
    fn from(e: MonitorError) -> Self {
        let status = match &e {
            MonitorError::Busy => StatusCode::CONFLICT,
            MonitorError::Transport(_) => StatusCode::BAD_GATEWAY,
            MonitorError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MonitorError::Plant(_) => StatusCode::BAD_REQUEST,
        };
        let message = match &e {
            MonitorError::Plant(p) => p.to_string(),
            other => other.user_message(),
        };
        Self::new(status, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({"status": "error", "message": self.message});
        (self.status, Json(body)).into_response()
    }
}

// ==============================================================================
// handlers
// ==============================================================================

async fn dashboard_handler(State(ctx): State<AppContext>) -> Html<String> {
    let state = ctx.monitor.state().await;
    let weather = ctx.weather.fetch(&ctx.city).await;
    let notices = advisory::advisories(&state.snapshot);
    Html(render_dashboard(&state, &ctx.config.get(), &weather, &notices))
}

/// json api endpoint for programmatic access
async fn status_handler(State(ctx): State<AppContext>) -> Json<DashboardState> {
    Json(ctx.monitor.state().await)
}

async fn refresh_handler(State(ctx): State<AppContext>) -> Result<Json<SystemSnapshot>, ApiError> {
    Ok(Json(ctx.monitor.refresh().await?))
}

/// form post from the dashboard; the outcome shows up on the reloaded page
async fn refresh_form_handler(State(ctx): State<AppContext>) -> Redirect {
    if let Err(MonitorError::Busy) = ctx.monitor.refresh().await {
        tracing::debug!("dashboard refresh ignored, one already in flight");
    }
    Redirect::to("/")
}

async fn get_config_handler(State(ctx): State<AppContext>) -> Json<FarmConfig> {
    Json(ctx.config.get())
}

async fn update_config_handler(
    State(ctx): State<AppContext>,
    Json(update): Json<FarmConfigUpdate>,
) -> Result<Json<FarmConfig>, ApiError> {
    ctx.config
        .update(update)
        .map(Json)
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))
}

async fn plant_handler(
    State(ctx): State<AppContext>,
    Json(plant): Json<PlantConfig>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ctx.monitor.send_plant_config(&plant).await?;
    Ok(Json(serde_json::json!({"status": "ok", "saved": plant})))
}

async fn weather_handler(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    let weather = ctx.weather.fetch(&ctx.city).await;
    Json(serde_json::json!({"sky": weather.sky(), "weather": weather}))
}

async fn advisory_handler(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    let state = ctx.monitor.state().await;
    Json(serde_json::json!({
        "info": advisory::farming_info(),
        "notices": advisory::advisories(&state.snapshot),
    }))
}

async fn download_handler() -> impl IntoResponse {
    let info = advisory::farming_info();
    let disposition = format!("attachment; filename=\"{}\"", advisory::download_file_name(&info));
    (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        advisory::render_download(&info),
    )
}

// ==============================================================================
// html
// ==============================================================================

pub fn render_dashboard(
    state: &DashboardState,
    farms: &FarmConfig,
    weather: &WeatherData,
    notices: &[Advisory],
) -> String {
    let env = &state.snapshot.environment;
    let mut body = String::new();

    if let Some(error) = &state.last_error {
        let _ = write!(body, r#"<p class="error">{}</p>"#, html_escape(error));
    }

    let _ = write!(
        body,
        r#"<section class="cards">
<div class="card"><h3>Temperature</h3><p>{:.1}°C</p></div>
<div class="card"><h3>Humidity</h3><p>{:.1}%</p></div>
<div class="card"><h3>Rain Status</h3><p>{}</p></div>
<div class="card"><h3>Weather</h3><p>{:.1}°C</p><small>{}</small></div>
</section>
<section class="card"><h2>Farm Status</h2>"#,
        env.temperature_celsius,
        env.humidity_percent,
        if env.is_raining { "Raining" } else { "Clear" },
        weather.temperature,
        html_escape(&weather.description),
    );

    for farm in Farm::ALL {
        let reading = state.snapshot.farm(farm);
        let crop = match farm {
            Farm::A => &farms.crop_name_a,
            Farm::B => &farms.crop_name_b,
        };
        let _ = write!(
            body,
            r#"<div class="farm"><h3>{}{}</h3>
<p>Current Moisture: {}%</p><p>Ideal Moisture: {}%</p><p>Pump Status: {}</p></div>"#,
            farm.label(),
            if crop.is_empty() { String::new() } else { format!(" ({})", html_escape(crop)) },
            reading.current_moisture,
            reading.ideal_moisture,
            if reading.pump_active { "On" } else { "Off" },
        );
    }
    body.push_str("</section>");

    if !notices.is_empty() {
        body.push_str(r#"<section class="card"><h2>Notifications</h2><ul>"#);
        for notice in notices {
            let class = match notice.severity {
                Severity::Warning => "warning",
                Severity::Info => "info",
            };
            let _ = write!(body, r#"<li class="{}">{}</li>"#, class, html_escape(&notice.message));
        }
        body.push_str("</ul></section>");
    }

    let updated = if state.last_update_ms == 0 {
        "never".to_string()
    } else {
        format!("{} ms since epoch", state.last_update_ms)
    };

    format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>System Status</title>
<style>
body {{ font-family: system-ui; padding: 2rem; background: #1a1a2e; color: #eee; }}
.cards {{ display: grid; grid-template-columns: repeat(auto-fit, minmax(12rem, 1fr)); gap: 1rem; }}
.card {{ background: #16213e; padding: 1rem; border-radius: 8px; margin-top: 1rem; }}
.error, .warning {{ color: #ff6b6b; }}
.info {{ color: #7fd1ff; }}
</style></head>
<body>
<h1>System Status</h1>
<form method="post" action="/refresh"><button{}>{}</button></form>
{}
<p><small>Last update: {}</small></p>
</body>
</html>"#,
        if state.fetching { " disabled" } else { "" },
        if state.fetching { "Loading..." } else { "Fetch System Status" },
        body,
        updated,
    )
}

/// escape html special characters to prevent xss
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
     .replace('<', "&lt;")
     .replace('>', "&gt;")
     .replace('"', "&quot;")
}
