/// Parse common boolean spellings from an environment value.
///
/// Returns `None` for unrecognized values so callers can fall back to their
/// own default instead of silently coercing garbage.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
