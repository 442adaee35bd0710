use super::BODY_LIMIT;
use crate::handlers::{self, LoadRequest, MetaRequest, OpenRequest, SelectRequest};
use crate::mutator::TreeOp;
use crate::session::SessionManager;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use warp::Filter;

pub(super) fn routes(
    manager: Arc<Mutex<SessionManager>>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    get_version()
        .or(open_session(manager.clone()))
        .or(load_session(manager.clone()))
        .or(get_session(manager.clone()))
        .or(close_session(manager.clone()))
        .or(apply_op(manager.clone()))
        .or(select(manager.clone()))
        .or(update_meta(manager.clone()))
        .or(read_file(manager.clone()))
        .or(list(manager.clone()))
        .or(run(manager.clone()))
        .or(save(manager.clone()))
}

fn json_body<T: serde::de::DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone {
    warp::body::content_length_limit(BODY_LIMIT).and(warp::body::json())
}

fn path_param(params: &HashMap<String, String>) -> String {
    params.get("path").cloned().unwrap_or_default()
}

fn get_version() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("version")
        .and(warp::get())
        .map(handlers::get_version)
}

fn open_session(
    manager: Arc<Mutex<SessionManager>>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions")
        .and(warp::post())
        .and(json_body::<OpenRequest>())
        .map(move |request| handlers::open_session(manager.clone(), request))
}

fn load_session(
    manager: Arc<Mutex<SessionManager>>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions" / "load")
        .and(warp::post())
        .and(json_body::<LoadRequest>())
        .map(move |request| handlers::load_session(manager.clone(), request))
}

fn get_session(
    manager: Arc<Mutex<SessionManager>>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions" / String)
        .and(warp::get())
        .and_then(move |session_id| handlers::get_session(manager.clone(), session_id))
}

fn close_session(
    manager: Arc<Mutex<SessionManager>>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions" / String)
        .and(warp::delete())
        .and_then(move |session_id| handlers::close_session(manager.clone(), session_id))
}

fn apply_op(
    manager: Arc<Mutex<SessionManager>>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions" / String / "ops")
        .and(warp::post())
        .and(json_body::<TreeOp>())
        .and_then(move |session_id, op| {
            handlers::apply_op(manager.clone(), session_id, op)
        })
}

fn select(
    manager: Arc<Mutex<SessionManager>>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions" / String / "selection")
        .and(warp::put())
        .and(json_body::<SelectRequest>())
        .and_then(move |session_id, request| {
            handlers::select(manager.clone(), session_id, request)
        })
}

fn update_meta(
    manager: Arc<Mutex<SessionManager>>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions" / String / "meta")
        .and(warp::put())
        .and(json_body::<MetaRequest>())
        .and_then(move |session_id, request| {
            handlers::update_meta(manager.clone(), session_id, request)
        })
}

fn read_file(
    manager: Arc<Mutex<SessionManager>>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions" / String / "files")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and_then(move |session_id, params: HashMap<String, String>| {
            handlers::read_file(manager.clone(), session_id, path_param(&params))
        })
}

fn list(
    manager: Arc<Mutex<SessionManager>>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions" / String / "list")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and_then(move |session_id, params: HashMap<String, String>| {
            handlers::list(manager.clone(), session_id, path_param(&params))
        })
}

fn run(
    manager: Arc<Mutex<SessionManager>>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions" / String / "run")
        .and(warp::post())
        .and_then(move |session_id| handlers::run(manager.clone(), session_id))
}

fn save(
    manager: Arc<Mutex<SessionManager>>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("sessions" / String / "save")
        .and(warp::post())
        .and_then(move |session_id| handlers::save(manager.clone(), session_id))
}
