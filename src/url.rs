//! URL path splitting and segment matching.

/// Split a request path into segments on `/`, discarding the leading empty
/// segment.
///
/// Returns `None` for an empty path or a path that does not start with `/`;
/// the dispatcher treats that as a bad request. Note that `"/"` splits into
/// one empty segment, not zero segments.
pub fn split_url_path(path: &str) -> Option<Vec<String>> {
    let rest = path.strip_prefix('/')?;
    Some(rest.split('/').map(str::to_owned).collect())
}

/// Compare a segment list against a pattern, where a `"*"` pattern segment
/// matches any single segment. The lengths must match exactly.
pub fn url_parts_match(parts: &[String], pattern: &[&str]) -> bool {
    if parts.len() != pattern.len() {
        return false;
    }
    parts
        .iter()
        .zip(pattern)
        .all(|(part, pattern)| *pattern == "*" || part == pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_url_path_splits_on_slashes() {
        let data: &[(&str, Option<&[&str]>)] = &[
            ("", None),
            ("meh", None),
            // First character must be '/'.
            (" /meh", None),
            ("/", Some(&[""])),
            ("//", Some(&["", ""])),
            ("///", Some(&["", "", ""])),
            ("/default.css", Some(&["default.css"])),
            ("/u/", Some(&["u", ""])),
            ("/sign-in", Some(&["sign-in"])),
            ("/u/sign-out", Some(&["u", "sign-out"])),
            ("/api/projects", Some(&["api", "projects"])),
        ];

        for (input, want) in data {
            let output = split_url_path(input);
            let want = want.map(|segments| {
                segments.iter().map(|s| s.to_string()).collect::<Vec<_>>()
            });
            assert_eq!(output, want, "input: {input:?}");
        }
    }

    #[test]
    fn url_parts_match_requires_equal_length() {
        let parts = split_url_path("/u/sign-out").unwrap();
        assert!(url_parts_match(&parts, &["u", "sign-out"]));
        assert!(!url_parts_match(&parts, &["u"]));
        assert!(!url_parts_match(&parts, &["u", "sign-out", ""]));
    }

    #[test]
    fn url_parts_match_wildcard_matches_any_segment() {
        let parts = split_url_path("/api/projects/42").unwrap();
        assert!(url_parts_match(&parts, &["api", "projects", "*"]));
        assert!(url_parts_match(&parts, &["*", "*", "*"]));
        assert!(!url_parts_match(&parts, &["api", "users", "*"]));
    }
}
