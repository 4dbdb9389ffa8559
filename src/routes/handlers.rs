use std::time::{Duration, Instant};

use futures::stream::TryStreamExt;
use log::{debug, error, info, o, warn, Logger};
use time::OffsetDateTime;
use uuid::Uuid;
use warp::{
    filters::multipart::FormData,
    http::{header, Response, StatusCode},
    hyper::Body,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::candidate::{Candidate, NewCandidate, Profile};
use crate::environment::Environment;
use crate::errors::BackendError;
use crate::io::{parse_info_submission, parse_video_submission, part_as_stream};
use crate::media::{verify_resume, video_extension, video_type};
use crate::routes::{
    rejection::{Context, Rejection},
    response::SuccessResponse,
};
use crate::store::{stream_from_bytes, BlobStream, NewBlob, StoredBlob};

pub(crate) const SERVER_TIMING_HEADER: &str = "server-timing";
const STATUS_MESSAGE: &str = "Candidate API is up.";
const DEFAULT_RESUME_FILENAME: &str = "resume.pdf";

type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($body:tt)*) => {{
        let start = Instant::now();

        let result = async move { Ok::<_, Rejection>({ $($body)* }) }.await;
        let timing = format_server_timing(start.elapsed());

        match result {
            Ok(reply) => Ok(Box::new(with_header(reply, SERVER_TIMING_HEADER, timing)) as Box<dyn Reply>),
            Err(rejection) => Err(reject::custom(rejection.with_server_timing(timing))),
        }
    }};
}

pub async fn status(_environment: Environment) -> RouteResult {
    timed! {
        STATUS_MESSAGE
    }
}

pub async fn submit_info(environment: Environment, content: FormData) -> RouteResult {
    timed! {
        let Environment {
            logger,
            db,
            store,
            urls,
            config,
        } = environment;

        let error_handler = |e: BackendError| Rejection::new(Context::submit_info(), e);

        debug!(logger, "Parsing submission...");
        let submission = parse_info_submission(content, config.max_resume_size)
            .await
            .map_err(error_handler)?;

        let profile = Profile::from_fields(&submission.fields).map_err(error_handler)?;
        let resume = submission
            .resume
            .ok_or(BackendError::ResumeMissing)
            .map_err(error_handler)?;

        debug!(logger, "Verifying resume..."; "size" => resume.data.len());
        verify_resume(resume.content_type.as_deref(), &resume.data).map_err(error_handler)?;

        let filename = resume
            .filename
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| DEFAULT_RESUME_FILENAME.to_owned());

        debug!(logger, "Saving resume to store...");
        let blob = store
            .save(
                NewBlob::new(filename, mime::APPLICATION_PDF.essence_str()),
                stream_from_bytes(resume.data),
            )
            .await
            .map_err(|e| BackendError::upload_incomplete("resume", e))
            .map_err(error_handler)?;

        let logger = logger.new(o!("resume_file_id" => blob.id.to_string()));

        debug!(logger, "Writing candidate to database...");
        let candidate = db
            .insert(NewCandidate::new(profile, Some(blob.id)))
            .await
            .map_err(|e| {
                error!(logger, "Resume stored without a candidate"; "orphan" => %blob.id);
                error_handler(e)
            })?;

        let id = *candidate.id();
        let location = urls
            .candidate(&id)
            .map_err(|source| BackendError::FailedToGenerateUrl { source })
            .map_err(error_handler)?;

        info!(logger, "Candidate created"; "id" => %id);

        with_header(
            with_status(
                json(&SuccessResponse::Created { candidate_id: id }),
                StatusCode::CREATED,
            ),
            "location",
            location.as_str(),
        )
    }
}

pub async fn submit_video(
    environment: Environment,
    id: String,
    content: FormData,
) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::submit_video(id.clone()), e);

        let candidate_id = parse_id(&id).map_err(&error_handler)?;
        let logger = environment.logger.new(o!("id" => id.clone()));

        debug!(logger, "Parsing submission...");
        let video = parse_video_submission(content)
            .await
            .map_err(&error_handler)?;
        let video_type = video_type(video.content_type()).map_err(&error_handler)?;

        // nothing is stored for an unknown candidate
        debug!(logger, "Looking up candidate...");
        find_candidate(&environment, &candidate_id)
            .await
            .map_err(&error_handler)?;

        let filename = format!(
            "video_{}_{}.{}",
            candidate_id,
            OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000,
            video_extension(&video_type)
        );

        debug!(logger, "Saving video to store..."; "filename" => &filename, "type" => %video_type);
        let blob = environment
            .store
            .save(
                NewBlob::new(filename, video_type.essence_str()),
                part_as_stream(video),
            )
            .await
            .map_err(|e| BackendError::upload_incomplete("video", e))
            .map_err(&error_handler)?;

        debug!(logger, "Attaching video to candidate..."; "video_file_id" => %blob.id);
        let previous = environment
            .db
            .attach_video(&candidate_id, &blob.id)
            .await
            .map_err(|e| {
                error!(logger, "Video stored without a candidate"; "orphan" => %blob.id);
                error_handler(e)
            })?;

        if let Some(previous) = previous {
            debug!(logger, "Deleting replaced video..."; "video_file_id" => %previous);

            if let Err(e) = environment.store.delete(&previous).await {
                warn!(logger, "Failed to delete replaced video"; "orphan" => %previous, "error" => ?e);
            }
        }

        json(&SuccessResponse::VideoAttached { success: true })
    }
}

pub async fn retrieve(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::retrieve(id.clone()), e);

        let id = parse_id(&id).map_err(&error_handler)?;
        debug!(environment.logger, "Retrieving candidate..."; "id" => %id);

        let candidate = find_candidate(&environment, &id)
            .await
            .map_err(&error_handler)?;

        json(&candidate)
    }
}

pub async fn download_resume(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::resume(id.clone()), e);

        let id = parse_id(&id).map_err(&error_handler)?;
        debug!(environment.logger, "Retrieving resume..."; "id" => %id);

        let candidate = find_candidate(&environment, &id)
            .await
            .map_err(&error_handler)?;
        let (blob, content) = open_blob(&environment, candidate.resume_file_id(), BackendError::ResumeNotFound)
            .await
            .map_err(&error_handler)?;

        streamed(
            &environment.logger,
            &blob,
            content,
            mime::APPLICATION_PDF.essence_str(),
            Some(format!("attachment; filename=resume_{}.pdf", id)),
        )
        .map_err(&error_handler)?
    }
}

pub async fn stream_video(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::video(id.clone()), e);

        let id = parse_id(&id).map_err(&error_handler)?;
        debug!(environment.logger, "Retrieving video..."; "id" => %id);

        let candidate = find_candidate(&environment, &id)
            .await
            .map_err(&error_handler)?;
        let (blob, content) = open_blob(&environment, candidate.video_file_id(), BackendError::VideoNotFound)
            .await
            .map_err(&error_handler)?;

        let content_type = blob.content_type.clone();

        streamed(&environment.logger, &blob, content, &content_type, None)
            .map_err(&error_handler)?
    }
}

fn parse_id(id: &str) -> Result<Uuid, BackendError> {
    Uuid::parse_str(id).map_err(|_| BackendError::InvalidId(id.to_owned()))
}

async fn find_candidate(environment: &Environment, id: &Uuid) -> Result<Candidate, BackendError> {
    environment
        .db
        .retrieve(id)
        .await?
        .ok_or(BackendError::NonExistentId(*id))
}

/// Opens the blob a candidate refers to. A missing reference and a
/// reference to a missing blob both count as `not_found`.
async fn open_blob(
    environment: &Environment,
    blob_id: Option<&Uuid>,
    not_found: BackendError,
) -> Result<(StoredBlob, BlobStream), BackendError> {
    let blob_id = match blob_id {
        Some(blob_id) => blob_id,
        None => return Err(not_found),
    };

    match environment.store.open(blob_id).await? {
        Some(opened) => Ok(opened),
        None => {
            warn!(environment.logger, "Candidate refers to a missing blob"; "blob_id" => %blob_id);
            Err(not_found)
        }
    }
}

/// Builds a response that relays `content` as it's read from the store.
fn streamed(
    logger: &Logger,
    blob: &StoredBlob,
    content: BlobStream,
    content_type: &str,
    disposition: Option<String>,
) -> Result<Response<Body>, BackendError> {
    let logger = logger.new(o!("blob_id" => blob.id.to_string()));

    // the status is already sent, so a failure midway can only be logged
    let content = content.inspect_err(move |e| {
        error!(logger, "Failed to stream blob"; "error" => %e);
    });

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, blob.length);

    if let Some(disposition) = disposition {
        builder = builder.header(header::CONTENT_DISPOSITION, disposition);
    }

    builder
        .body(Body::wrap_stream(content))
        .map_err(|source| BackendError::ResponseFailed { source })
}

fn format_server_timing(seconds: Duration) -> String {
    format!("handler;dur={}", seconds.as_secs_f64() * 1000.0)
}
