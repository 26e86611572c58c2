//! Local controller exposing the engine to a browser UI.
//!
//! Serves a single HTML page, a server-sent event stream mirroring the
//! running job's feed, and JSON endpoints proxying the session and
//! download operations. At most one job runs at a time; `stop` trips
//! the running job's cancel flag.

mod page;

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, Mutex};
use tower_http::cors::CorsLayer;

use crate::error::{exit_codes, Error, Result};
use crate::job::{run_batch_job, BatchJobOptions, CancelFlag};
use crate::media::MediaKind;
use crate::output::{render_event_json, render_event_text};
use crate::scraper::Engine;
use crate::session::{cookies, Session, SessionStore};

/// One message on the SSE feed: the event name plus its JSON payload.
#[derive(Debug, Clone)]
struct FeedMessage {
    name: &'static str,
    data: String,
}

struct ServerState {
    store: SessionStore,
    events: broadcast::Sender<FeedMessage>,
    running: Mutex<Option<CancelFlag>>,
}

#[derive(Clone)]
struct AppState(Arc<ServerState>);

/// Serve the controller until the process is stopped.
pub async fn serve(store: SessionStore, port: u16) -> Result<()> {
    let (events, _) = broadcast::channel(256);
    let state = AppState(Arc::new(ServerState {
        store,
        events,
        running: Mutex::new(None),
    }));

    let app = Router::new()
        .route("/", get(index))
        .route("/events", get(event_stream))
        .route("/api/login", post(api_login))
        .route("/api/whoami", post(api_whoami))
        .route("/api/login-interactive", post(api_login_interactive))
        .route("/api/logout", post(api_logout))
        .route("/api/download", post(api_download))
        .route("/api/stop", post(api_stop))
        .route("/api/status", get(api_status))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!("controller listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(page::INDEX_HTML)
}

async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<SseEvent, Infallible>>> {
    let receiver = state.0.events.subscribe();
    let stream = futures::stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(message) => {
                    let event = SseEvent::default().event(message.name).data(message.data);
                    return Some((Ok(event), receiver));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event stream subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Uniform response shape of the single-shot proxy endpoints.
fn command_response(outcome: Result<String>) -> Json<Value> {
    match outcome {
        Ok(stdout) => Json(json!({
            "exitCode": exit_codes::SUCCESS,
            "stdout": stdout,
            "stderr": "",
            "ok": true,
        })),
        Err(error) => Json(json!({
            "exitCode": error.exit_code(),
            "stdout": "",
            "stderr": format!(
                "Error [{}] (exit={}): {}",
                error.class(),
                error.exit_code(),
                error
            ),
            "ok": false,
        })),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    cookies: String,
    #[serde(default)]
    strict: Option<bool>,
}

async fn api_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Json<Value> {
    command_response(login_with_cookies(
        &state.0.store,
        &request.cookies,
        request.strict.unwrap_or(true),
    ))
}

fn login_with_cookies(store: &SessionStore, blob: &str, strict: bool) -> Result<String> {
    let normalized = cookies::normalize_cookies(blob);
    if normalized.is_empty() {
        return Err(Error::Usage("no cookies found in input".into()));
    }
    if strict {
        let missing = cookies::missing_required(&normalized, &cookies::REQUIRED_COOKIES);
        if !missing.is_empty() {
            return Err(Error::Auth(format!(
                "missing required cookie(s): {}",
                missing.join(", ")
            )));
        }
    }
    let mut session = Session::new(normalized);
    session.valid =
        cookies::missing_required(&session.cookies, &cookies::REQUIRED_COOKIES).is_empty();
    store.save(&session)?;
    Ok(format!("Saved session with {} cookie(s)", session.cookies.len()))
}

async fn api_whoami(State(state): State<AppState>) -> Json<Value> {
    command_response(whoami(&state.0.store))
}

/// Interactive cookie capture needs the browser-login helper, which
/// this controller does not bundle. The endpoint stays on the surface
/// and reports that, in the usual `{exitCode, stdout, stderr, ok}`
/// shape.
async fn api_login_interactive() -> Json<Value> {
    command_response(Err(Error::Usage(
        "interactive login is not available in this controller; \
         paste cookie text into /api/login instead"
            .into(),
    )))
}

fn whoami(store: &SessionStore) -> Result<String> {
    let Some(session) = store.load()? else {
        return Err(Error::Auth("no saved session".into()));
    };
    let missing = cookies::missing_required(&session.cookies, &cookies::REQUIRED_COOKIES);
    if !missing.is_empty() {
        return Err(Error::Auth(format!(
            "session is missing required cookie(s): {}",
            missing.join(", ")
        )));
    }
    Ok(format!(
        "Session: {} cookie(s), updated {}",
        session.cookies.len(),
        session.updated_at
    ))
}

async fn api_logout(State(state): State<AppState>) -> Json<Value> {
    command_response(
        state
            .0
            .store
            .clear()
            .map(|_| "Session cleared".to_string()),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadRequest {
    users: Vec<String>,
    output_dir: String,
    #[serde(default)]
    media_kinds: Option<Vec<MediaKind>>,
    #[serde(default)]
    engine: Option<Engine>,
    #[serde(default)]
    max_tweets: Option<usize>,
    #[serde(default)]
    concurrency: Option<usize>,
    #[serde(default)]
    retry: Option<u32>,
    #[serde(default)]
    user_retry: Option<u32>,
    #[serde(default)]
    user_delay_ms: Option<u64>,
    #[serde(default)]
    request_delay_ms: Option<u64>,
}

async fn api_download(
    State(state): State<AppState>,
    Json(request): Json<DownloadRequest>,
) -> (StatusCode, Json<Value>) {
    let mut running = state.0.running.lock().await;
    if running.is_some() {
        return (
            StatusCode::CONFLICT,
            Json(json!({"error": "a job is already running"})),
        );
    }

    let defaults = BatchJobOptions::default();
    let options = BatchJobOptions {
        users: request.users,
        output_dir: request.output_dir.into(),
        media_kinds: request.media_kinds.unwrap_or(defaults.media_kinds),
        engine: request.engine.unwrap_or(defaults.engine),
        max_tweets_per_user: request.max_tweets.unwrap_or(defaults.max_tweets_per_user),
        concurrency: request.concurrency.unwrap_or(defaults.concurrency),
        retry_count: request.retry.unwrap_or(defaults.retry_count),
        user_retry_count: request.user_retry.unwrap_or(defaults.user_retry_count),
        user_delay_ms: request.user_delay_ms.unwrap_or(defaults.user_delay_ms),
        per_request_delay_ms: request
            .request_delay_ms
            .unwrap_or(defaults.per_request_delay_ms),
    };

    let mut job = run_batch_job(state.0.store.clone(), options, None);
    *running = Some(job.cancel_flag());
    drop(running);

    let feed = state.0.events.clone();
    let _ = feed.send(FeedMessage {
        name: "job",
        data: json!({"type": "started"}).to_string(),
    });

    let state_for_task = state.clone();
    tokio::spawn(async move {
        while let Some(event) = job.next_event().await {
            let _ = state_for_task.0.events.send(FeedMessage {
                name: "log",
                data: json!({
                    "stream": "stdout",
                    "line": console::strip_ansi_codes(&render_event_text(&event)).to_string(),
                    "parsed": serde_json::from_str::<Value>(&render_event_json(&event))
                        .unwrap_or(Value::Null),
                })
                .to_string(),
            });
        }

        let terminal = match job.join().await {
            Ok(result) => {
                let partial = result.has_final_failures();
                json!({
                    "type": "finished",
                    "result": result,
                    "partial": partial,
                })
            }
            Err(error) => json!({
                "type": "error",
                "message": error.to_string(),
                "exitCode": error.exit_code(),
            }),
        };
        let _ = state_for_task.0.events.send(FeedMessage {
            name: "job",
            data: terminal.to_string(),
        });
        *state_for_task.0.running.lock().await = None;
    });

    (StatusCode::OK, Json(json!({"started": true})))
}

async fn api_stop(State(state): State<AppState>) -> Json<Value> {
    let running = state.0.running.lock().await;
    match running.as_ref() {
        Some(cancel) => {
            cancel.cancel();
            Json(json!({"stopped": true}))
        }
        None => Json(json!({"stopped": false})),
    }
}

async fn api_status(State(state): State<AppState>) -> Json<Value> {
    let running = state.0.running.lock().await.is_some();
    Json(json!({"running": running}))
}
