use super::BODY_LIMIT;
use crate::handlers;
use crate::session::Services;
use crate::storage::NewComment;
use std::sync::Arc;
use warp::Filter;

pub(super) fn routes(
    services: Arc<Services>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    get_preview(services.clone())
        .or(explore_projects(services.clone()))
        .or(explore_preview(services.clone()))
        .or(list_comments(services.clone()))
        .or(add_comment(services.clone()))
}

fn get_preview(
    services: Arc<Services>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("previews" / String)
        .and(warp::get())
        .map(move |preview_id| handlers::get_preview(services.previews.clone(), preview_id))
}

fn explore_projects(
    services: Arc<Services>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("explore" / "projects")
        .and(warp::get())
        .map(move || handlers::explore_projects(services.clone()))
}

fn explore_preview(
    services: Arc<Services>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("explore" / "projects" / String / "preview")
        .and(warp::get())
        .and_then(move |project_id| handlers::explore_preview(services.clone(), project_id))
}

fn list_comments(
    services: Arc<Services>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("explore" / "projects" / String / "comments")
        .and(warp::get())
        .map(move |project_id| handlers::list_comments(services.clone(), project_id))
}

fn add_comment(
    services: Arc<Services>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("explore" / "projects" / String / "comments")
        .and(warp::post())
        .and(warp::body::content_length_limit(BODY_LIMIT))
        .and(warp::body::json::<NewComment>())
        .map(move |project_id, comment| {
            handlers::add_comment(services.clone(), project_id, comment)
        })
}
