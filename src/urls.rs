use url::{ParseError, Url};
use uuid::Uuid;

/// Convenience wrapper for URL generation functions.
#[derive(Clone, Debug)]
pub struct Urls {
    /// Path segment under `api/` for all candidate-related actions.
    pub(crate) candidates_path: String,

    /// Prefix for all candidate-related actions, including trailing slash.
    candidates: Url,
}

impl Urls {
    /// Create a new instance. `base` should include a trailing slash
    /// and `candidates_path` should not.
    pub fn new(
        base: impl AsRef<str>,
        candidates_path: impl Into<String>,
    ) -> Result<Self, ParseError> {
        let base = Url::parse(base.as_ref())?;
        let candidates_path = candidates_path.into();
        let candidates = base.join(&format!("api/{}/", candidates_path))?;

        Ok(Urls {
            candidates_path,
            candidates,
        })
    }

    pub fn candidates(&self) -> &Url {
        &self.candidates
    }

    pub fn candidate(&self, id: &Uuid) -> Result<Url, ParseError> {
        self.candidates.join(&id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_nest_under_candidates_path() {
        let urls = Urls::new("https://portal.example.com/backend/", "people").expect("parse base");
        let id = Uuid::parse_str("8f5e1b7c-4a8e-4c5a-9a59-2d9c2d4f7e10").expect("parse ID");

        assert_eq!(
            urls.candidates().as_str(),
            "https://portal.example.com/backend/api/people/"
        );
        assert_eq!(
            urls.candidate(&id).expect("candidate URL").as_str(),
            "https://portal.example.com/backend/api/people/8f5e1b7c-4a8e-4c5a-9a59-2d9c2d4f7e10"
        );
    }

    #[test]
    fn invalid_base_is_rejected() {
        assert!(Urls::new("not a url", "candidates").is_err());
    }
}
