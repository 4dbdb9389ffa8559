use serde::Serialize;
use warp::reject;

use crate::errors::BackendError;

/// The message sent in place of the details of a server-side failure.
const SERVER_ERROR_MESSAGE: &str = "Server error";

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
    pub(crate) server_timing: Option<String>,
}

impl Rejection {
    pub fn new(context: Context, error: BackendError) -> Self {
        Rejection {
            context,
            error,
            server_timing: None,
        }
    }

    pub fn with_server_timing(self, server_timing: String) -> Self {
        Rejection {
            server_timing: Some(server_timing),
            ..self
        }
    }

    pub fn flatten(&self) -> FlattenedRejection {
        FlattenedRejection {
            error: self.public_message(),
            context: self.context.clone(),
        }
    }

    /// What the client is told. Internal failures are only described
    /// in the log.
    fn public_message(&self) -> String {
        match &self.error {
            e if e.is_client_error() => e.to_string(),
            e @ BackendError::UploadIncomplete { .. } => e.to_string(),
            _ => SERVER_ERROR_MESSAGE.to_owned(),
        }
    }
}

impl reject::Reject for Rejection {}

#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    pub(crate) error: String,
    #[serde(flatten)]
    pub(crate) context: Context,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Context {
    SubmitInfo,
    SubmitVideo { id: String },
    Retrieve { id: String },
    Resume { id: String },
    Video { id: String },
}

impl Context {
    pub fn submit_info() -> Context {
        Context::SubmitInfo
    }

    pub fn submit_video(id: String) -> Context {
        Context::SubmitVideo { id }
    }

    pub fn retrieve(id: String) -> Context {
        Context::Retrieve { id }
    }

    pub fn resume(id: String) -> Context {
        Context::Resume { id }
    }

    pub fn video(id: String) -> Context {
        Context::Video { id }
    }
}
