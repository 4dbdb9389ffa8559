use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SuccessResponse<'a> {
    Created {
        #[serde(rename = "candidateId")]
        candidate_id: Uuid,
    },
    Healthz {
        revision: Option<&'a str>,
        timestamp: Option<&'a str>,
        version: &'a str,
    },
    VideoAttached {
        success: bool,
    },
}
