use std::io;

use rusoto_core::RusotoError;
use rusoto_s3::{DeleteObjectError, GetObjectError, ListObjectsV2Error, PutObjectError};
use thiserror::Error;
use uuid::Uuid;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Represents an SQL error.
    #[error("SQLx error")]
    Sqlx { source: sqlx::Error },

    /// Represents a submission lacking one of the candidate fields.
    #[error("All fields are required")]
    MissingFields,

    /// Represents a years-of-experience value that isn't a whole number.
    #[error("Experience must be a non-negative whole number of years")]
    InvalidExperience(String),

    /// Represents a submission without a resume.
    #[error("Resume file is required")]
    ResumeMissing,

    /// Represents a resume of the wrong type.
    #[error("Resume must be a PDF")]
    ResumeNotPdf,

    /// Represents a resume larger than the configured ceiling.
    #[error("Resume must not exceed {0} bytes")]
    ResumeTooLarge(usize),

    /// Represents a submission without a video.
    #[error("Video file required")]
    VideoMissing,

    /// Represents a video part declaring a non-video type.
    #[error("Unsupported video type {0}")]
    UnsupportedVideoType(String),

    /// Represents an error caused by an unreadable form submission.
    #[error("Malformed form submission")]
    MalformedFormSubmission,

    /// Represents an identifier that couldn't be parsed.
    #[error("Invalid ID {0}")]
    InvalidId(String),

    /// Represents a candidate that doesn't exist.
    #[error("Candidate not found")]
    NonExistentId(Uuid),

    /// Represents a candidate without a resume.
    #[error("Resume not found")]
    ResumeNotFound,

    /// Represents a candidate without a video.
    #[error("Video not found")]
    VideoNotFound,

    /// Represents a store failure while saving a submitted file.
    #[error("Failed to upload {kind}")]
    UploadIncomplete {
        kind: &'static str,
        source: Box<BackendError>,
    },

    /// Represents a failure reading or writing blob content.
    #[error("Blob stream error")]
    BlobStream { source: io::Error },

    /// Represents an error returned by S3 when uploading.
    #[error("S3 upload error")]
    UploadFailed { source: RusotoError<PutObjectError> },

    /// Represents an error returned by S3 when downloading.
    #[error("S3 download error")]
    DownloadFailed { source: RusotoError<GetObjectError> },

    /// Represents an error returned by S3 when deleting.
    #[error("S3 deletion error")]
    DeleteFailed { source: RusotoError<DeleteObjectError> },

    /// Represents an error returned by S3 when listing objects.
    #[error("S3 listing error")]
    ListFailed { source: RusotoError<ListObjectsV2Error> },

    /// Represents a blob whose metadata can't be interpreted.
    #[error("Malformed metadata for blob {0}")]
    MalformedBlobMetadata(String),

    /// Represents a failure to generate a resource URL.
    #[error("Failed to generate URL")]
    FailedToGenerateUrl { source: url::ParseError },

    /// Represents a failure to assemble a streaming response.
    #[error("Failed to build response")]
    ResponseFailed { source: warp::http::Error },
}

impl BackendError {
    /// Wraps a store error raised while saving a submitted `kind` of file.
    pub fn upload_incomplete(kind: &'static str, source: BackendError) -> Self {
        BackendError::UploadIncomplete {
            kind,
            source: Box::new(source),
        }
    }

    /// Whether this error was caused by the client's request rather
    /// than by the server or its backends.
    pub fn is_client_error(&self) -> bool {
        use BackendError::*;

        matches!(
            self,
            MissingFields
                | InvalidExperience(..)
                | ResumeMissing
                | ResumeNotPdf
                | ResumeTooLarge(..)
                | VideoMissing
                | UnsupportedVideoType(..)
                | MalformedFormSubmission
                | InvalidId(..)
                | NonExistentId(..)
                | ResumeNotFound
                | VideoNotFound
        )
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(source: sqlx::Error) -> Self {
        BackendError::Sqlx { source }
    }
}

/// Enumerates errors in the process configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Represents a required variable that isn't set.
    #[error("must define {0} environment variable")]
    Missing(&'static str),

    /// Represents a variable whose value can't be used.
    #[error("invalid value {value:?} for {name}")]
    Invalid { name: &'static str, value: String },
}
