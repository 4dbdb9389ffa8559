use mime::Mime;

use crate::errors::BackendError;

/// Every PDF starts with this signature.
const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// The type recorded for videos submitted without one. Browsers record
/// WebM by default.
pub const DEFAULT_VIDEO_TYPE: &str = "video/webm";

/// Checks that a resume part is a PDF, going by both the declared type
/// and the content.
pub fn verify_resume(content_type: Option<&str>, data: &[u8]) -> Result<(), BackendError> {
    let declared = content_type
        .and_then(essence)
        .ok_or(BackendError::ResumeNotPdf)?;

    if declared != mime::APPLICATION_PDF {
        return Err(BackendError::ResumeNotPdf);
    }

    if !data.starts_with(PDF_SIGNATURE) {
        return Err(BackendError::ResumeNotPdf);
    }

    Ok(())
}

/// Determines the type to store a video under. Parts without a type
/// are assumed to be WebM; parts with a type must declare a video.
pub fn video_type(content_type: Option<&str>) -> Result<Mime, BackendError> {
    let content_type = content_type.unwrap_or(DEFAULT_VIDEO_TYPE);

    match essence(content_type) {
        Some(parsed) if parsed.type_() == mime::VIDEO => Ok(parsed),
        _ => Err(BackendError::UnsupportedVideoType(content_type.to_owned())),
    }
}

/// Parses the type and subtype of a content type, ignoring parameters.
/// Recorders emit parameters such as `codecs=vp8,opus` that aren't valid
/// unquoted, so they're dropped rather than rejected.
fn essence(content_type: &str) -> Option<Mime> {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .and_then(|essence| essence.parse().ok())
}

/// The file extension to give a stored video of the given type.
pub fn video_extension(video_type: &Mime) -> &str {
    match video_type.subtype().as_str() {
        "quicktime" => "mov",
        "x-matroska" => "mkv",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDF: &[u8] = b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n";

    #[test]
    fn pdf_resumes_are_accepted() {
        assert!(verify_resume(Some("application/pdf"), PDF).is_ok());
        assert!(verify_resume(Some("application/pdf; name=cv.pdf"), PDF).is_ok());
    }

    #[test]
    fn other_resumes_are_rejected() {
        for (content_type, data) in &[
            (None, PDF),
            (Some("application/msword"), PDF),
            (Some("not a type"), PDF),
            (Some("application/pdf"), &b"PK\x03\x04"[..]),
            (Some("application/pdf"), &b""[..]),
        ] {
            assert!(
                matches!(
                    verify_resume(*content_type, data),
                    Err(BackendError::ResumeNotPdf)
                ),
                "{:?} should be rejected",
                content_type
            );
        }
    }

    #[test]
    fn video_types() {
        assert_eq!(video_type(None).expect("default type"), "video/webm");
        assert_eq!(
            video_type(Some("video/webm;codecs=vp8,opus")).expect("recorded type"),
            "video/webm"
        );
        assert!(matches!(
            video_type(Some("audio/ogg")),
            Err(BackendError::UnsupportedVideoType(t)) if t == "audio/ogg"
        ));
    }

    #[test]
    fn video_extensions() {
        let webm: Mime = "video/webm".parse().expect("parse type");
        let mov: Mime = "video/quicktime".parse().expect("parse type");

        assert_eq!(video_extension(&webm), "webm");
        assert_eq!(video_extension(&mov), "mov");
    }
}
