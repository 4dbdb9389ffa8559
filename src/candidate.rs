use std::collections::HashMap;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::BackendError;
use crate::normalization::non_blank;

/// Names of the text fields in an info submission.
pub const FIRST_NAME: &str = "firstName";
pub const LAST_NAME: &str = "lastName";
pub const POSITION_APPLIED: &str = "positionApplied";
pub const CURRENT_POSITION: &str = "currentPosition";
pub const EXPERIENCE_YEARS: &str = "experienceYears";

/// A single candidate in the database.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// The ID of the candidate.
    #[serde(rename = "_id")]
    id: Uuid,

    /// The first name provided.
    first_name: String,

    /// The last name provided.
    last_name: String,

    /// The position applied for.
    position_applied: String,

    /// The position currently held.
    current_position: String,

    /// The years of experience provided.
    experience_years: i32,

    /// The ID of the stored resume, if any.
    resume_file_id: Option<Uuid>,

    /// The ID of the stored video, if any.
    video_file_id: Option<Uuid>,

    /// The date and time it was created.
    #[serde(with = "time::serde::timestamp")]
    created_at: OffsetDateTime,
}

impl Candidate {
    pub fn new(id: Uuid, created_at: OffsetDateTime, new: NewCandidate) -> Self {
        let NewCandidate {
            profile,
            resume_file_id,
        } = new;

        Candidate {
            id,
            first_name: profile.first_name,
            last_name: profile.last_name,
            position_applied: profile.position_applied,
            current_position: profile.current_position,
            experience_years: profile.experience_years,
            resume_file_id,
            video_file_id: None,
            created_at,
        }
    }

    pub fn id(&self) -> &Uuid {
        &self.id
    }

    pub fn resume_file_id(&self) -> Option<&Uuid> {
        self.resume_file_id.as_ref()
    }

    pub fn video_file_id(&self) -> Option<&Uuid> {
        self.video_file_id.as_ref()
    }

    pub(crate) fn set_video_file_id(&mut self, id: Uuid) -> Option<Uuid> {
        self.video_file_id.replace(id)
    }
}

/// The personal and job details submitted in the first step.
#[derive(Clone, Debug, PartialEq)]
pub struct Profile {
    pub(crate) first_name: String,
    pub(crate) last_name: String,
    pub(crate) position_applied: String,
    pub(crate) current_position: String,
    pub(crate) experience_years: i32,
}

impl Profile {
    /// Validates and normalizes the text fields of an info submission.
    /// Unknown fields are ignored.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, BackendError> {
        let field = |name: &str| {
            fields
                .get(name)
                .and_then(non_blank)
                .ok_or(BackendError::MissingFields)
        };

        let first_name = field(FIRST_NAME)?;
        let last_name = field(LAST_NAME)?;
        let position_applied = field(POSITION_APPLIED)?;
        let current_position = field(CURRENT_POSITION)?;
        let experience = field(EXPERIENCE_YEARS)?;

        let experience_years = experience
            .parse::<i32>()
            .ok()
            .filter(|years| *years >= 0)
            .ok_or(BackendError::InvalidExperience(experience))?;

        Ok(Profile {
            first_name,
            last_name,
            position_applied,
            current_position,
            experience_years,
        })
    }
}

/// A candidate before it's written to the database.
#[derive(Clone, Debug, PartialEq)]
pub struct NewCandidate {
    pub(crate) profile: Profile,
    pub(crate) resume_file_id: Option<Uuid>,
}

impl NewCandidate {
    pub fn new(profile: Profile, resume_file_id: Option<Uuid>) -> Self {
        Self {
            profile,
            resume_file_id,
        }
    }
}
