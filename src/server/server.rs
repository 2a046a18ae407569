use anyhow::Result;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{debug, error, info};

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, response, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::http_layers::{log_requests, RequestsLoggingLevel};
use super::session::Session;
use super::state::{
    GuardedDedupEngine, GuardedLibraryStore, GuardedOwnerManager, ServerState,
};
use crate::dedup::DuplicateReviewEngine;
use crate::import::{parse_export, ImportPipeline};
use crate::library_store::{LibraryStore, Track, TrackOrder};
use crate::owner::{OwnerManager, TokenValue};
use crate::selection::{export_m3u, PLAYLIST_MIME, RESULT_CAP};

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
    pub session_token: Option<String>,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(session: Option<Session>, State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
        session_token: session.map(|s| s.token),
    };
    Json(stats)
}

// =============================================================================
// Auth
// =============================================================================

#[derive(Deserialize, Debug)]
struct LoginBody {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
struct LoginSuccessResponse {
    token: String,
}

async fn login(
    State(owner_manager): State<GuardedOwnerManager>,
    Json(body): Json<LoginBody>,
) -> Response {
    debug!("login() called for {}", body.username);
    match owner_manager.login(&body.username, &body.password) {
        Ok(Some(token)) => {
            let response_body = LoginSuccessResponse {
                token: token.0.clone(),
            };
            let response_body = match serde_json::to_string(&response_body) {
                Ok(body) => body,
                Err(err) => {
                    error!("Failed to serialize login response: {}", err);
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            };
            let cookie_value =
                match HeaderValue::from_str(&format!("session_token={}; Path=/; HttpOnly", token.0))
                {
                    Ok(value) => value,
                    Err(err) => {
                        error!("Failed to build session cookie: {}", err);
                        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                    }
                };
            response::Builder::new()
                .status(StatusCode::CREATED)
                .header(header::SET_COOKIE, cookie_value)
                .body(Body::from(response_body))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Ok(None) => StatusCode::FORBIDDEN.into_response(),
        Err(err) => {
            error!("Error during login: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn logout(State(owner_manager): State<GuardedOwnerManager>, session: Session) -> Response {
    match owner_manager.logout(&TokenValue(session.token)) {
        Ok(true) => {
            // Blank the cookie; the token itself is already invalid
            let cookie_value = Cookie::build(Cookie::new("session_token", ""))
                .path("/")
                .same_site(SameSite::Lax)
                .build();

            response::Builder::new()
                .status(StatusCode::OK)
                .header(header::SET_COOKIE, cookie_value.to_string())
                .body(Body::empty())
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Ok(false) => StatusCode::BAD_REQUEST.into_response(),
        Err(err) => {
            error!("Error during logout: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// =============================================================================
// Library
// =============================================================================

#[derive(Deserialize, Debug)]
struct ListParams {
    pub order: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

async fn list_tracks(
    session: Session,
    State(store): State<GuardedLibraryStore>,
    Query(params): Query<ListParams>,
) -> Response {
    let order = match params.order.as_deref() {
        None | Some("created") => TrackOrder::CreatedAt,
        Some("title") => TrackOrder::Title,
        Some(other) => {
            return (StatusCode::BAD_REQUEST, format!("Unknown order: {}", other)).into_response()
        }
    };
    let limit = params.limit.unwrap_or(RESULT_CAP);
    let offset = params.offset.unwrap_or(0);
    match store.list_tracks(session.owner_id, order, limit, offset) {
        Ok(tracks) => Json(tracks).into_response(),
        Err(err) => {
            error!("Failed to list tracks: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Deserialize, Debug)]
struct SearchParams {
    pub q: String,
    pub limit: Option<usize>,
}

async fn search_tracks(
    session: Session,
    State(store): State<GuardedLibraryStore>,
    Query(params): Query<SearchParams>,
) -> Response {
    let limit = params.limit.unwrap_or(RESULT_CAP).min(RESULT_CAP);
    match store.search_tracks(session.owner_id, &params.q, limit) {
        Ok(tracks) => Json(tracks).into_response(),
        Err(err) => {
            error!("Failed to search tracks: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Deserialize, Debug)]
struct ImportParams {
    /// "chunked" (default) or "bulk".
    pub strategy: Option<String>,
}

async fn import_export_file(
    session: Session,
    State(state): State<ServerState>,
    Query(params): Query<ImportParams>,
    mut multipart: Multipart,
) -> Response {
    let field = match multipart.next_field().await {
        Ok(Some(field)) => field,
        Ok(None) => return (StatusCode::BAD_REQUEST, "No file uploaded").into_response(),
        Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    };
    let filename = field.file_name().map(|s| s.to_string());
    let content = match field.text().await {
        Ok(content) => content,
        Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    };

    let candidates = match parse_export(&content, filename.as_deref()) {
        Ok(candidates) => candidates,
        Err(err) => return (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()).into_response(),
    };
    info!(
        "Importing {} candidates from {:?} for owner {}",
        candidates.len(),
        filename,
        session.owner_id
    );

    match params.strategy.as_deref() {
        Some("bulk") => {
            let pipeline = state.import_pipeline.clone();
            let owner_id = session.owner_id;
            let joined =
                tokio::task::spawn_blocking(move || pipeline.import_bulk(owner_id, &candidates))
                    .await;
            match joined {
                Ok(outcome) => Json(outcome).into_response(),
                Err(err) => {
                    error!("Bulk import task failed: {}", err);
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        }
        None | Some("chunked") => {
            let outcome = state
                .import_pipeline
                .import_chunked(session.owner_id, candidates, &state.shutdown)
                .await;
            info!("Import finished: {}", outcome.summary());
            Json(outcome).into_response()
        }
        Some(other) => {
            (StatusCode::BAD_REQUEST, format!("Unknown strategy: {}", other)).into_response()
        }
    }
}

// =============================================================================
// Duplicates
// =============================================================================

fn scan_groups(
    engine: &DuplicateReviewEngine,
    owner_id: i64,
    mode: &str,
) -> Result<Vec<crate::dedup::DuplicateGroup>, Response> {
    match mode {
        "exact" => engine.find_exact(owner_id),
        "fuzzy" => engine.find_fuzzy(owner_id),
        other => {
            return Err(
                (StatusCode::BAD_REQUEST, format!("Unknown mode: {}", other)).into_response()
            )
        }
    }
    .map_err(|err| {
        error!("Duplicate scan failed: {}", err);
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}

#[derive(Deserialize, Debug)]
struct DuplicatesParams {
    pub mode: Option<String>,
}

async fn get_duplicates(
    session: Session,
    State(engine): State<GuardedDedupEngine>,
    Query(params): Query<DuplicatesParams>,
) -> Response {
    let mode = params.mode.as_deref().unwrap_or("exact").to_string();
    let owner_id = session.owner_id;
    let joined =
        tokio::task::spawn_blocking(move || scan_groups(&engine, owner_id, &mode)).await;
    match joined {
        Ok(Ok(groups)) => {
            let tracks: Vec<Vec<Track>> = groups.into_iter().map(|g| g.tracks).collect();
            Json(tracks).into_response()
        }
        Ok(Err(response)) => response,
        Err(err) => {
            error!("Duplicate scan task failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Deserialize, Debug)]
struct ResolveBody {
    pub mode: String,
    /// Per scanned group, the track ids to keep. Groups are matched by
    /// index against a fresh scan in the same mode.
    pub keep: Vec<Vec<i64>>,
}

async fn resolve_duplicates(
    session: Session,
    State(engine): State<GuardedDedupEngine>,
    Json(body): Json<ResolveBody>,
) -> Response {
    let owner_id = session.owner_id;
    let joined = tokio::task::spawn_blocking(move || {
        let groups = scan_groups(&engine, owner_id, &body.mode)?;
        if groups.len() != body.keep.len() {
            return Err((
                StatusCode::CONFLICT,
                "The library changed since the duplicate scan, scan again".to_string(),
            )
                .into_response());
        }

        let mut review = engine.review(owner_id, groups);
        for (group_index, keep_ids) in body.keep.iter().enumerate() {
            // Mark everything requested first so the keep set never empties
            for track_id in keep_ids {
                if !review.is_kept(group_index, *track_id) {
                    review.toggle_keep(group_index, *track_id);
                }
            }
            let unkeep: Vec<i64> = review.groups()[group_index]
                .tracks
                .iter()
                .map(|t| t.id)
                .filter(|id| review.is_kept(group_index, *id) && !keep_ids.contains(id))
                .collect();
            for track_id in unkeep {
                if !review.toggle_keep(group_index, track_id) {
                    return Err((
                        StatusCode::BAD_REQUEST,
                        "Each group must keep at least one track".to_string(),
                    )
                        .into_response());
                }
            }
        }
        Ok(engine.resolve(&review))
    })
    .await;

    match joined {
        Ok(Ok(outcome)) => Json(outcome).into_response(),
        Ok(Err(response)) => response,
        Err(err) => {
            error!("Duplicate resolution task failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// =============================================================================
// Selections
// =============================================================================

async fn get_selection(
    session: Session,
    State(store): State<GuardedLibraryStore>,
    Path(client_id): Path<String>,
) -> Response {
    match store.get_selected_tracks(session.owner_id, &client_id) {
        Ok(tracks) => Json(tracks).into_response(),
        Err(err) => {
            error!("Failed to load selection: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Serialize)]
struct ToggleResponse {
    selected: bool,
}

async fn toggle_selection(
    session: Session,
    State(store): State<GuardedLibraryStore>,
    Path((client_id, track_id)): Path<(String, i64)>,
) -> Response {
    match store.remove_selection(session.owner_id, &client_id, track_id) {
        Ok(true) => return Json(ToggleResponse { selected: false }).into_response(),
        Ok(false) => {}
        Err(err) => {
            error!("Failed to toggle selection: {}", err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    // The track must exist and belong to the caller before it can be selected
    match store.get_tracks(session.owner_id, &[track_id]) {
        Ok(tracks) if tracks.is_empty() => return StatusCode::NOT_FOUND.into_response(),
        Ok(_) => {}
        Err(err) => {
            error!("Failed to check track: {}", err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    match store.add_selection(session.owner_id, &client_id, track_id) {
        Ok(()) => Json(ToggleResponse { selected: true }).into_response(),
        // Lost a race with another toggle for the same client
        Err(err) if err.is_conflict() => Json(ToggleResponse { selected: true }).into_response(),
        Err(err) => {
            error!("Failed to toggle selection: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn clear_selection(
    session: Session,
    State(store): State<GuardedLibraryStore>,
    Path(client_id): Path<String>,
) -> Response {
    match store.clear_selection(session.owner_id, &client_id) {
        Ok(removed) => Json(serde_json::json!({ "removed": removed })).into_response(),
        Err(err) => {
            error!("Failed to clear selection: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Deserialize, Debug)]
struct PlaylistParams {
    pub name: Option<String>,
}

async fn download_playlist(
    session: Session,
    State(store): State<GuardedLibraryStore>,
    Path(client_id): Path<String>,
    Query(params): Query<PlaylistParams>,
) -> Response {
    let tracks = match store.get_selected_tracks(session.owner_id, &client_id) {
        Ok(tracks) => tracks,
        Err(err) => {
            error!("Failed to load selection: {}", err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    if tracks.is_empty() {
        return (StatusCode::BAD_REQUEST, "The selection is empty").into_response();
    }

    let name = params.name.unwrap_or_else(|| format!("{} setlist", session.username));
    let export = match export_m3u(&name, &tracks) {
        Ok(export) => export,
        Err(err) => return (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()).into_response(),
    };

    let disposition = format!("attachment; filename=\"{}\"", export.filename);
    response::Builder::new()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, PLAYLIST_MIME)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header("X-Omitted-Tracks", export.omitted.to_string())
        .body(Body::from(export.content))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

// =============================================================================
// Wiring
// =============================================================================

pub(super) fn make_app(state: ServerState) -> Router {
    let auth_routes: Router = Router::new()
        .route("/login", post(login))
        .route("/logout", get(logout))
        .with_state(state.clone());

    let library_routes: Router = Router::new()
        .route("/tracks", get(list_tracks))
        .route("/search", get(search_tracks))
        .route(
            "/import",
            post(import_export_file).layer(DefaultBodyLimit::max(256 * 1024 * 1024)), // 256MB
        )
        .route("/duplicates", get(get_duplicates))
        .route("/duplicates/resolve", post(resolve_duplicates))
        .with_state(state.clone());

    let selection_routes: Router = Router::new()
        .route("/{client_id}", get(get_selection))
        .route("/{client_id}", delete(clear_selection))
        .route("/{client_id}/toggle/{track_id}", put(toggle_selection))
        .route("/{client_id}/playlist", get(download_playlist))
        .with_state(state.clone());

    Router::new()
        .route("/", get(home))
        .with_state(state.clone())
        .nest("/v1/auth", auth_routes)
        .nest("/v1/library", library_routes)
        .nest("/v1/selection", selection_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

#[allow(clippy::too_many_arguments)]
pub async fn run_server(
    library_store: Arc<dyn LibraryStore>,
    owner_manager: Arc<OwnerManager>,
    import_pipeline: Arc<ImportPipeline>,
    dedup_engine: Arc<DuplicateReviewEngine>,
    requests_logging_level: RequestsLoggingLevel,
    port: u16,
    shutdown: CancellationToken,
) -> Result<()> {
    let state = ServerState {
        start_time: Instant::now(),
        logging_level: requests_logging_level,
        library_store,
        owner_manager,
        import_pipeline,
        dedup_engine,
        hash: env!("GIT_HASH").to_string(),
        shutdown: shutdown.clone(),
    };
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Listening on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::DedupConfig;
    use crate::import::ImportConfig;
    use crate::library_store::{NewTrack, SqliteLibraryStore};
    use crate::owner::SqliteOwnerStore;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_state(dir: &TempDir) -> ServerState {
        let library_store: Arc<dyn LibraryStore> =
            Arc::new(SqliteLibraryStore::new(dir.path().join("library.db"), 2).unwrap());
        let owner_store = Arc::new(SqliteOwnerStore::new(dir.path().join("owner.db")).unwrap());
        ServerState {
            start_time: Instant::now(),
            logging_level: RequestsLoggingLevel::None,
            library_store: library_store.clone(),
            owner_manager: Arc::new(OwnerManager::new(owner_store)),
            import_pipeline: Arc::new(ImportPipeline::new(
                library_store.clone(),
                ImportConfig::default(),
            )),
            dedup_engine: Arc::new(DuplicateReviewEngine::new(
                library_store,
                DedupConfig::default(),
            )),
            hash: "test".to_string(),
            shutdown: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn responds_forbidden_on_protected_routes() {
        let dir = TempDir::new().unwrap();
        let app = make_app(test_state(&dir));

        let protected_routes = vec![
            "/v1/auth/logout",
            "/v1/library/tracks",
            "/v1/library/search?q=x",
            "/v1/library/duplicates",
            "/v1/selection/client-1",
            "/v1/selection/client-1/playlist",
        ];

        for route in protected_routes {
            let request = Request::builder().uri(route).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "route {}", route);
        }
    }

    #[tokio::test]
    async fn authorization_header_grants_access_to_owned_tracks() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let owner_id = state.owner_manager.register("dj", "pw").unwrap();
        let token = state.owner_manager.login("dj", "pw").unwrap().unwrap();

        state
            .library_store
            .insert_track(
                owner_id,
                &NewTrack {
                    title: "Mine".to_string(),
                    ..NewTrack::default()
                },
            )
            .unwrap();
        // Another owner's track must stay invisible
        state
            .library_store
            .insert_track(
                owner_id + 1,
                &NewTrack {
                    title: "Not Mine".to_string(),
                    ..NewTrack::default()
                },
            )
            .unwrap();

        let app = make_app(state);
        let request = Request::builder()
            .uri("/v1/library/tracks")
            .header("Authorization", &token.0)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let tracks: Vec<Track> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "Mine");
    }

    #[tokio::test]
    async fn playlist_download_sets_mime_and_filename() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let owner_id = state.owner_manager.register("dj", "pw").unwrap();
        let token = state.owner_manager.login("dj", "pw").unwrap().unwrap();

        let track_id = state
            .library_store
            .insert_track(
                owner_id,
                &NewTrack {
                    title: "Strobe".to_string(),
                    file_location: Some("/music/strobe.mp3".to_string()),
                    ..NewTrack::default()
                },
            )
            .unwrap();
        state
            .library_store
            .add_selection(owner_id, "client-1", track_id)
            .unwrap();

        let app = make_app(state);
        let request = Request::builder()
            .uri("/v1/selection/client-1/playlist?name=warm%20up")
            .header("Authorization", &token.0)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "audio/x-mpegurl"
        );
        assert_eq!(
            response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"warm_up.m3u\""
        );

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let content = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(content.starts_with("#EXTM3U\n"));
        assert!(content.contains("/music/strobe.mp3"));
    }

    #[tokio::test]
    async fn import_accepts_exports_larger_than_the_default_body_limit() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        state.owner_manager.register("dj", "pw").unwrap();
        let token = state.owner_manager.login("dj", "pw").unwrap().unwrap();

        // Roughly 3.5MB of rows, above axum's 2MB default
        let content = format!("header\n{}", "row without a title\n".repeat(250_000));
        let body = format!(
            "--boundary\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"collection.txt\"\r\n\
             \r\n\
             {}\r\n\
             --boundary--\r\n",
            content
        );

        let app = make_app(state);
        let request = Request::builder()
            .method("POST")
            .uri("/v1/library/import")
            .header("Authorization", &token.0)
            .header(
                header::CONTENT_TYPE,
                "multipart/form-data; boundary=boundary",
            )
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_list_order_is_a_bad_request() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        state.owner_manager.register("dj", "pw").unwrap();
        let token = state.owner_manager.login("dj", "pw").unwrap().unwrap();

        let app = make_app(state);
        let request = Request::builder()
            .uri("/v1/library/tracks?order=bogus")
            .header("Authorization", &token.0)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
