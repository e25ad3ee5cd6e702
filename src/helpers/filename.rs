use once_cell::sync::Lazy;
use regex::Regex;

use crate::catalog::Recording;

/// Anything that is not a letter, a number, `_`, whitespace, `-` or `.`.
/// Numbers include `³` and `½`; combining marks are dropped.
static UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^-\s\p{L}\p{N}_.]").expect("Invalid regex"));

/// Name the file for `recording` at 1-based `rank` in the sorted catalog.
///
/// The rank is zero-padded to at least four digits. Path separators, quotes
/// and other punctuation are stripped from the assembled name.
pub fn derive_filename(recording: &Recording, rank: usize) -> String {
    let name = match &recording.episode_title {
        Some(episode) => format!("{} - {} - {:04}.TiVo", recording.title, episode, rank),
        None => format!("{} - {:04}.TiVo", recording.title, rank),
    };

    UNSAFE_CHARS.replace_all(&name, "").into_owned()
}
