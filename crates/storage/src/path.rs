//! Workspace path normalization.
//!
//! Workspace paths double as storage keys, so both share one set of rules:
//! slash-separated on every platform, never escaping the root.

use crate::error::{ErrorKind, Result};

/// Normalize a workspace path into a storage key.
///
/// Empty segments and `.` are dropped and `..` pops the previous segment,
/// but may never climb above the root. Null bytes are rejected. Backslashes
/// are ordinary characters.
///
/// ```
/// use wsync_storage::validate_key;
/// assert_eq!(validate_key("/site/../assets//./app.js/").unwrap(), "assets/app.js");
/// assert!(validate_key("../etc/passwd").is_err());
/// assert!(validate_key("a\0b").is_err());
/// ```
pub fn validate(key: impl AsRef<str>) -> Result<String> {
    let raw = key.as_ref();
    if raw.contains('\0') {
        exn::bail!(ErrorKind::InvalidKey(raw.to_string()));
    }
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                if segments.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidKey(raw.to_string()));
                }
            },
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        exn::bail!(ErrorKind::InvalidKey(raw.to_string()));
    }
    Ok(segments.join("/"))
}

/// Last non-empty segment of a path, or `""` for the root.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').find(|segment| !segment.is_empty()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a/b/c.txt", "a/b/c.txt")]
    #[case("/a/b/c.txt", "a/b/c.txt")]
    #[case("a//b/./c.txt", "a/b/c.txt")]
    #[case("a/b/..", "a")]
    #[case("dir///", "dir")]
    #[case("back\\slash", "back\\slash")]
    fn test_valid(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate(input).unwrap(), expected);
    }

    #[rstest]
    #[case("../etc/passwd")]
    #[case("a/../../b")]
    #[case("a\0b")]
    #[case("")]
    #[case("/")]
    #[case("./.")]
    fn test_invalid(#[case] input: &str) {
        let err = validate(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(_)));
    }

    #[rstest]
    #[case("/a/b/c.txt", "c.txt")]
    #[case("d.txt", "d.txt")]
    #[case("a/b/", "b")]
    #[case("/", "")]
    fn test_file_name(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(file_name(path), expected);
    }
}
