use crate::errors::{DeskError, DeskErrorType, Result};
use crate::mutator::TreeOp;
use crate::previews::{PreviewSurface, SANDBOX_POLICY};
use crate::session::{lock_session, Services, Session, SessionManager};
use crate::storage::NewComment;

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::instrument;
use warp::http::StatusCode;
use warp::reply::{Reply, Response};

#[derive(Debug, Deserialize)]
pub(crate) struct OpenRequest {
    pub(crate) owner_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoadRequest {
    pub(crate) owner_id: String,
    pub(crate) project_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SelectRequest {
    #[serde(default)]
    pub(crate) path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MetaRequest {
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) license: Option<String>,
}

#[derive(Serialize)]
struct FileContents {
    path: String,
    content: String,
}

fn respond<T: Serialize>(result: Result<T>, status: StatusCode) -> Response {
    match result {
        Ok(value) => warp::reply::with_status(warp::reply::json(&value), status).into_response(),
        Err(e) => {
            if e.error_type == DeskErrorType::PersistenceError {
                tracing::error!("{}", e.message);
                return DeskError::persistence("Could not reach project storage").into_response();
            }
            e.into_response()
        }
    }
}

fn sandboxed(document: String) -> Response {
    warp::reply::with_header(
        warp::reply::html(document),
        "Content-Security-Policy",
        SANDBOX_POLICY,
    )
    .into_response()
}

fn lock_manager(manager: &Mutex<SessionManager>) -> MutexGuard<'_, SessionManager> {
    manager.lock().unwrap_or_else(|e| e.into_inner())
}

/// Looks a session up and releases the manager before the caller touches it.
fn with_session<T>(
    manager: &Mutex<SessionManager>,
    session_id: &str,
    f: impl FnOnce(&mut Session) -> Result<T>,
) -> Result<T> {
    let session = lock_manager(manager).get(session_id)?;
    let mut session = lock_session(&session);
    f(&mut session)
}

/// Runs work that may wait on a session lock or a transpiler process on the
/// blocking pool, inside the caller's span.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let span = tracing::Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(f))
        .await
        .unwrap_or_else(|e| {
            Err(DeskError::new(
                DeskErrorType::InternalError,
                format!("Worker task failed: {}", e),
            ))
        })
}

#[instrument(name = "handlers.get_version", level = "info")]
pub(crate) fn get_version() -> Response {
    warp::reply::with_status(
        warp::reply::json(&env!("CARGO_PKG_VERSION").to_string()),
        StatusCode::OK,
    )
    .into_response()
}

#[instrument(
    name = "handlers.open_session",
    level = "info",
    skip(manager),
    fields(owner_id = %request.owner_id)
)]
pub(crate) fn open_session(manager: Arc<Mutex<SessionManager>>, request: OpenRequest) -> Response {
    let result = lock_manager(&manager)
        .open(&request.owner_id)
        .map(|session| lock_session(&session).view());
    respond(result, StatusCode::CREATED)
}

#[instrument(
    name = "handlers.load_session",
    level = "info",
    skip(manager),
    fields(owner_id = %request.owner_id, project_name = %request.project_name)
)]
pub(crate) fn load_session(manager: Arc<Mutex<SessionManager>>, request: LoadRequest) -> Response {
    let result = lock_manager(&manager)
        .open_stored(&request.owner_id, &request.project_name)
        .map(|session| lock_session(&session).view());
    respond(result, StatusCode::CREATED)
}

#[instrument(name = "handlers.get_session", level = "info", skip(manager))]
pub(crate) async fn get_session(
    manager: Arc<Mutex<SessionManager>>,
    session_id: String,
) -> std::result::Result<Response, Infallible> {
    let result = blocking(move || {
        with_session(&manager, &session_id, |session| Ok(session.view()))
    })
    .await;
    Ok(respond(result, StatusCode::OK))
}

#[instrument(name = "handlers.close_session", level = "info", skip(manager))]
pub(crate) async fn close_session(
    manager: Arc<Mutex<SessionManager>>,
    session_id: String,
) -> std::result::Result<Response, Infallible> {
    let result = blocking(move || {
        let (session, services) = {
            let mut manager = lock_manager(&manager);
            (manager.remove(&session_id)?, manager.services())
        };
        lock_session(&session).release_preview(&services.previews);
        Ok(format!("Session {} closed", session_id))
    })
    .await;
    Ok(respond(result, StatusCode::OK))
}

#[instrument(
    name = "handlers.apply_op",
    level = "info",
    skip(manager, op)
)]
pub(crate) async fn apply_op(
    manager: Arc<Mutex<SessionManager>>,
    session_id: String,
    op: TreeOp,
) -> std::result::Result<Response, Infallible> {
    let result = blocking(move || {
        with_session(&manager, &session_id, |session| {
            session.apply(&op)?;
            Ok(session.view())
        })
    })
    .await;
    Ok(respond(result, StatusCode::OK))
}

#[instrument(
    name = "handlers.select",
    level = "info",
    skip(manager),
    fields(path = ?request.path)
)]
pub(crate) async fn select(
    manager: Arc<Mutex<SessionManager>>,
    session_id: String,
    request: SelectRequest,
) -> std::result::Result<Response, Infallible> {
    let result = blocking(move || {
        with_session(&manager, &session_id, |session| {
            session.select(request.path.as_deref())?;
            Ok(session.view())
        })
    })
    .await;
    Ok(respond(result, StatusCode::OK))
}

#[instrument(name = "handlers.update_meta", level = "info", skip(manager))]
pub(crate) async fn update_meta(
    manager: Arc<Mutex<SessionManager>>,
    session_id: String,
    request: MetaRequest,
) -> std::result::Result<Response, Infallible> {
    let result = blocking(move || {
        with_session(&manager, &session_id, |session| {
            if let Some(name) = &request.name {
                session.set_name(name)?;
            }
            if let Some(license) = &request.license {
                session.set_license(license);
            }
            Ok(session.view())
        })
    })
    .await;
    Ok(respond(result, StatusCode::OK))
}

#[instrument(name = "handlers.read_file", level = "info", skip(manager))]
pub(crate) async fn read_file(
    manager: Arc<Mutex<SessionManager>>,
    session_id: String,
    path: String,
) -> std::result::Result<Response, Infallible> {
    let result = blocking(move || {
        with_session(&manager, &session_id, |session| {
            let content = session.read_file(&path)?;
            Ok(FileContents {
                path: path.clone(),
                content,
            })
        })
    })
    .await;
    Ok(respond(result, StatusCode::OK))
}

#[instrument(name = "handlers.list", level = "info", skip(manager))]
pub(crate) async fn list(
    manager: Arc<Mutex<SessionManager>>,
    session_id: String,
    path: String,
) -> std::result::Result<Response, Infallible> {
    let result =
        blocking(move || with_session(&manager, &session_id, |session| session.list(&path))).await;
    Ok(respond(result, StatusCode::OK))
}

#[instrument(name = "handlers.run", level = "info", skip(manager))]
pub(crate) async fn run(
    manager: Arc<Mutex<SessionManager>>,
    session_id: String,
) -> std::result::Result<Response, Infallible> {
    let result = blocking(move || {
        let services = lock_manager(&manager).services();
        with_session(&manager, &session_id, |session| Ok(session.run(&services)))
    })
    .await;
    Ok(respond(result, StatusCode::OK))
}

#[instrument(name = "handlers.save", level = "info", skip(manager))]
pub(crate) async fn save(
    manager: Arc<Mutex<SessionManager>>,
    session_id: String,
) -> std::result::Result<Response, Infallible> {
    let result = blocking(move || {
        let services = lock_manager(&manager).services();
        with_session(&manager, &session_id, |session| session.save(&services))
    })
    .await;
    Ok(respond(result, StatusCode::OK))
}

#[instrument(name = "handlers.get_preview", level = "info", skip(previews))]
pub(crate) fn get_preview(previews: Arc<PreviewSurface>, preview_id: String) -> Response {
    match previews.get(&preview_id) {
        Some(document) => sandboxed(document.to_string()),
        None => DeskError::not_found(format!("Preview {} does not exist", preview_id))
            .into_response(),
    }
}

#[instrument(name = "handlers.explore_projects", level = "info", skip(services))]
pub(crate) fn explore_projects(services: Arc<Services>) -> Response {
    respond(services.store.list_projects(), StatusCode::OK)
}

#[instrument(name = "handlers.explore_preview", level = "info", skip(services))]
pub(crate) async fn explore_preview(
    services: Arc<Services>,
    project_id: String,
) -> std::result::Result<Response, Infallible> {
    let result = blocking(move || {
        let project = services.store.get_project(&project_id)?;
        services.pipeline.build(&project.files).map_err(|e| {
            tracing::info!("Stored project {} failed to build: {}", project_id, e);
            DeskError::from(e)
        })
    })
    .await;
    Ok(match result {
        Ok(document) => sandboxed(document),
        Err(e) => respond::<()>(Err(e), StatusCode::OK),
    })
}

#[instrument(name = "handlers.list_comments", level = "info", skip(services))]
pub(crate) fn list_comments(services: Arc<Services>, project_id: String) -> Response {
    respond(services.store.list_comments(&project_id), StatusCode::OK)
}

#[instrument(
    name = "handlers.add_comment",
    level = "info",
    skip(services, comment),
    fields(user_id = %comment.user_id)
)]
pub(crate) fn add_comment(
    services: Arc<Services>,
    project_id: String,
    comment: NewComment,
) -> Response {
    respond(
        services.store.insert_comment(&project_id, comment),
        StatusCode::CREATED,
    )
}
