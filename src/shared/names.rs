pub const MAX_PLAYER_NAME_LENGTH: usize = 20;

/// Collapses whitespace, strips control characters and caps the length.
/// Returns the fallback when nothing printable remains.
pub fn sanitize_player_name(name: &str, fallback: &str) -> String {
    let cleaned = name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>();
    if cleaned.is_empty() {
        return fallback.to_string();
    }
    cleaned.chars().take(MAX_PLAYER_NAME_LENGTH).collect()
}

/// A display name is valid when it is 1-20 printable (non-control) chars.
pub fn is_valid_player_name(name: &str) -> bool {
    let length = name.chars().count();
    (1..=MAX_PLAYER_NAME_LENGTH).contains(&length) && name.chars().all(|ch| !ch.is_control())
}
