use unicode_normalization::UnicodeNormalization;

/// Normalizes a submitted text field by stripping surrounding whitespace
/// and composing it into Unicode Normalization Form C.
///
/// ```
/// use portal::normalization::normalize_field;
/// assert_eq!(normalize_field(" Jose\u{301} "), "José");
/// ```
pub fn normalize_field(value: impl AsRef<str>) -> String {
    value.as_ref().trim().nfc().collect()
}

/// Normalizes a field and discards it if nothing is left.
pub fn non_blank(value: impl AsRef<str>) -> Option<String> {
    let normalized = normalize_field(value);

    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}
