//! Folder argument handling: raw ids pass through, Drive URLs are reduced to their id.

use regex::Regex;
use std::sync::LazyLock;

/// Drive URL shapes that embed an object id.
static DRIVE_URL_REGEXES: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"^https?://drive\.google\.com/drive/(?:u/\d+/)?folders/([a-zA-Z0-9_-]+)")
            .expect("Invalid folder URL regex"),
        Regex::new(r"^https?://drive\.google\.com/file/d/([a-zA-Z0-9_-]+)")
            .expect("Invalid file URL regex"),
        Regex::new(r"^https?://drive\.google\.com/open\?id=([a-zA-Z0-9_-]+)")
            .expect("Invalid open URL regex"),
    ]
});

/// Resolve the destination folder argument to a folder id.
///
/// Recognised forms:
/// - `https://drive.google.com/drive/folders/<ID>`
/// - `https://drive.google.com/drive/u/0/folders/<ID>`
/// - `https://drive.google.com/file/d/<ID>/view`
/// - `https://drive.google.com/open?id=<ID>`
///
/// Anything else is returned unchanged; the id format is not validated
/// locally and an invalid id surfaces as a remote error.
///
/// # Examples
///
/// ```
/// use gbackup::folder_id::folder_id_from_arg;
///
/// let id = folder_id_from_arg("https://drive.google.com/drive/folders/1abc123?usp=sharing");
/// assert_eq!(id, "1abc123");
///
/// let id = folder_id_from_arg("1abc123");
/// assert_eq!(id, "1abc123");
/// ```
pub fn folder_id_from_arg(arg: &str) -> String {
    let trimmed = arg.trim();

    DRIVE_URL_REGEXES
        .iter()
        .find_map(|re| re.captures(trimmed).and_then(|c| c.get(1)))
        .map(|id| id.as_str().to_string())
        .unwrap_or_else(|| arg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_url_with_user() {
        let url = "https://drive.google.com/drive/u/2/folders/1abc123XYZ";
        assert_eq!(folder_id_from_arg(url), "1abc123XYZ");
    }

    #[test]
    fn test_open_url() {
        let url = "https://drive.google.com/open?id=1abc123XYZ";
        assert_eq!(folder_id_from_arg(url), "1abc123XYZ");
    }

    #[test]
    fn test_raw_id_is_passed_through() {
        assert_eq!(folder_id_from_arg("abc-123_XYZ"), "abc-123_XYZ");
        assert_eq!(folder_id_from_arg("not/an id"), "not/an id");
        assert_eq!(folder_id_from_arg(""), "");
    }
}
