mod explore;
mod sessions;

use crate::session::SessionManager;
use std::sync::{Arc, Mutex};
use warp::Filter;

// Largest request body accepted; file contents arrive inline.
const BODY_LIMIT: u64 = 4 * 1024 * 1024;

pub(crate) fn routes(
    manager: Arc<Mutex<SessionManager>>,
) -> impl warp::Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let services = manager
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .services();
    sessions::routes(manager.clone()).or(explore::routes(services))
}
