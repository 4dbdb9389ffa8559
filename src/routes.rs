use std::sync::Arc;

use log::{error, warn, Logger};
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reject;
use warp::http::header::HeaderValue;
use warp::reply::{json, with_status, Reply, Response};
use warp::Filter;

use crate::environment::Environment;
use crate::errors::BackendError;

pub mod admin;
mod handlers;
mod rejection;
mod response;

pub use internal::*;

/// The maximum form data size to accept. This should be enforced by
/// the HTTP gateway, so on the Rust side it’s set to an unreasonably
/// large number. Resumes have their own, much lower ceiling.
const MAX_CONTENT_LENGTH: u64 = 2 * 1024 * 1024 * 1024;

/// Assembles every public route, with error formatting and CORS for
/// the frontend at `cors_origin`.
pub fn make_api(environment: Environment, cors_origin: &str) -> BoxedFilter<(impl Reply,)> {
    let logger = environment.logger.clone();

    let cors = warp::cors()
        .allow_origin(cors_origin)
        .allow_methods(vec!["GET", "POST"])
        .allow_header("content-type")
        .expose_header("content-disposition");

    make_status_route(environment.clone())
        .or(make_submit_info_route(environment.clone()))
        .or(make_submit_video_route(environment.clone()))
        .or(make_resume_route(environment.clone()))
        .or(make_video_route(environment.clone()))
        .or(make_retrieve_route(environment))
        .recover(move |r| format_rejection(logger.clone(), r))
        .with(cors)
        .boxed()
}

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<Response, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        let status = status_code_for(e);

        if status.is_server_error() {
            error!(logger, "Backend error"; "context" => ?r.context, "error" => ?r.error, "status" => %status, "message" => %r.error);
        } else {
            warn!(logger, "Rejected request"; "context" => ?r.context, "status" => %status, "message" => %r.error);
        }

        let flattened = r.flatten();
        let mut response = with_status(json(&flattened), status).into_response();

        if let Some(timing) = r
            .server_timing
            .as_deref()
            .and_then(|t| HeaderValue::from_str(t).ok())
        {
            response
                .headers_mut()
                .insert(handlers::SERVER_TIMING_HEADER, timing);
        }

        return Ok(response);
    }

    Err(rej)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        MissingFields
        | InvalidExperience(..)
        | ResumeMissing
        | VideoMissing
        | MalformedFormSubmission
        | InvalidId(..) => StatusCode::BAD_REQUEST,
        ResumeNotPdf | UnsupportedVideoType(..) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ResumeTooLarge(..) => StatusCode::PAYLOAD_TOO_LARGE,
        NonExistentId(..) | ResumeNotFound | VideoNotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

mod internal {
    use warp::filters::multipart::form;
    use warp::filters::BoxedFilter;
    use warp::path::end;
    use warp::Filter;
    use warp::Reply;
    use warp::{get as g, path as p, path::param as par, post};

    use super::{handlers, MAX_CONTENT_LENGTH};
    use crate::environment::Environment;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    macro_rules! route_filter {
        ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
        ($route_variable:ident; $first:expr, $($rest:expr),+) => (
            let $route_variable = $route_variable.and($first);
            route_filter!($route_variable; $($rest),+);
        )
    }

    macro_rules! route {
        ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
            pub fn $name(environment: Environment) -> Route {
                let c = environment.urls.candidates_path.clone();

                let $route_variable = warp::any()
                    .map(move || environment.clone())
                    .and(p("api"))
                    .and(p(c));

                route_filter!($route_variable; $($filters),+);

                $route_variable.and_then(handlers::$handler)
                    .boxed()
            }
        );
    }

    /// The status message lives at the server root, outside the
    /// candidates prefix.
    pub fn make_status_route(environment: Environment) -> Route {
        warp::any()
            .map(move || environment.clone())
            .and(end())
            .and(g())
            .and_then(handlers::status)
            .boxed()
    }

    route!(make_submit_info_route => submit_info, rt; p("info"), end(), post(), form().max_length(MAX_CONTENT_LENGTH));
    route!(make_submit_video_route => submit_video, rt; p("video"), par::<String>(), end(), post(), form().max_length(MAX_CONTENT_LENGTH));
    route!(make_retrieve_route => retrieve, rt; par::<String>(), end(), g());
    route!(make_resume_route => download_resume, rt; p("resume"), par::<String>(), end(), g());
    route!(make_video_route => stream_video, rt; p("video"), par::<String>(), end(), g());
}
