use std::collections::HashMap;
use std::io;

use bytes::Buf;
use futures::stream::{StreamExt, TryStreamExt};
use warp::multipart::{FormData, Part};

use crate::errors::BackendError;
use crate::store::BlobStream;

/// The name of the file part in an info submission.
pub const RESUME_PART: &str = "resume";

/// The name of the file part in a video submission.
pub const VIDEO_PART: &str = "video";

/// A file read in full from a submission.
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// The parts of an info submission.
#[derive(Debug)]
pub struct InfoSubmission {
    /// Every text field, by name.
    pub fields: HashMap<String, String>,

    /// The resume, unless none was attached.
    pub resume: Option<UploadedFile>,
}

/// Reads an info submission, holding at most `max_resume_size` bytes of
/// resume in memory. File parts other than the resume are skipped.
pub async fn parse_info_submission(
    mut form: FormData,
    max_resume_size: usize,
) -> Result<InfoSubmission, BackendError> {
    let mut fields = HashMap::new();
    let mut resume = None;

    while let Some(part) = form
        .try_next()
        .await
        .map_err(|_| BackendError::MalformedFormSubmission)?
    {
        if part.name() == RESUME_PART {
            let filename = part.filename().map(str::to_owned);
            let content_type = part.content_type().map(str::to_owned);
            let data = part_as_limited_vec(part, max_resume_size).await?;

            // browsers send an empty, nameless part when no file was picked
            let picked = !data.is_empty() || filename.as_deref().map_or(false, |f| !f.is_empty());

            if picked {
                resume = Some(UploadedFile {
                    filename,
                    content_type,
                    data,
                });
            }
        } else if part.filename().is_none() {
            let name = part.name().to_owned();
            let value = String::from_utf8(part_as_vec(part).await?)
                .map_err(|_| BackendError::MalformedFormSubmission)?;

            fields.insert(name, value);
        }
    }

    Ok(InfoSubmission { fields, resume })
}

/// Finds the video part of a video submission.
pub async fn parse_video_submission(mut form: FormData) -> Result<Part, BackendError> {
    while let Some(part) = form
        .try_next()
        .await
        .map_err(|_| BackendError::MalformedFormSubmission)?
    {
        if part.name() == VIDEO_PART {
            return Ok(part);
        }
    }

    Err(BackendError::VideoMissing)
}

/// Collects chunks of [`Part`].
pub async fn part_as_vec(raw: Part) -> Result<Vec<u8>, BackendError> {
    part_as_stream(raw)
        .try_fold(Vec::new(), |mut all, data| async move {
            all.extend_from_slice(&data);
            Ok(all)
        })
        .await
        .map_err(|_| BackendError::MalformedFormSubmission)
}

/// Collects chunks of [`Part`], failing once more than `limit` bytes
/// have arrived.
pub async fn part_as_limited_vec(raw: Part, limit: usize) -> Result<Vec<u8>, BackendError> {
    let mut chunks = part_as_stream(raw);
    let mut all = Vec::new();

    while let Some(data) = chunks
        .try_next()
        .await
        .map_err(|_| BackendError::MalformedFormSubmission)?
    {
        if all.len() + data.len() > limit {
            return Err(BackendError::ResumeTooLarge(limit));
        }

        all.extend_from_slice(&data);
    }

    Ok(all)
}

/// Collects raw data from [`Part`].
pub fn part_as_stream(raw: Part) -> BlobStream {
    raw.stream()
        .map(|r| {
            r.map(|mut x| x.copy_to_bytes(x.remaining()))
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "could not retrieve chunk"))
        })
        .boxed()
}
