/// Checks if a URL matches an exclusion pattern
///
/// Patterns are matched against the full normalized URL. A `*` matches any
/// run of characters (including none); every other character matches itself.
/// A pattern without any `*` matches URLs that contain it as a substring, so
/// `/private/` excludes every URL with that path segment.
///
/// # Examples
///
/// ```
/// use sumi_mirror::url::matches_exclusion;
///
/// assert!(matches_exclusion("*.pdf", "https://example.com/files/a.pdf"));
/// assert!(matches_exclusion("https://example.com/private/*", "https://example.com/private/x"));
/// assert!(matches_exclusion("/tmp/", "https://example.com/tmp/a.html"));
/// assert!(!matches_exclusion("*.pdf", "https://example.com/a.pdf.html"));
/// ```
pub fn matches_exclusion(pattern: &str, candidate: &str) -> bool {
    if !pattern.contains('*') {
        return !pattern.is_empty() && candidate.contains(pattern);
    }
    glob_match(pattern.as_bytes(), candidate.as_bytes())
}

/// Returns true if any pattern excludes the candidate
pub fn is_excluded(patterns: &[String], candidate: &str) -> bool {
    patterns.iter().any(|p| matches_exclusion(p, candidate))
}

/// Iterative `*` glob with backtracking to the most recent star
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut mark = 0;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some(p);
            mark = t;
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some(s) = star {
            p = s + 1;
            mark += 1;
            t = mark;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }

    p == pattern.len()
}
