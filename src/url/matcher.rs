/// Checks if a URL matches a scope pattern
///
/// Two pattern forms are supported:
/// 1. Substring: a pattern without `*` matches when it occurs anywhere in the URL
/// 2. Glob: `*` matches any run of characters (including none), and the pattern
///    must cover the whole URL
///
/// Matching is ASCII case-insensitive.
///
/// # Arguments
///
/// * `pattern` - The scope pattern from the configuration
/// * `candidate` - The absolute URL to check
///
/// # Examples
///
/// ```
/// use sitesift::url::matches_pattern;
///
/// assert!(matches_pattern("/admin", "https://site.test/admin/users"));
/// assert!(matches_pattern("*/news/*.html", "https://site.test/news/2024.html"));
/// assert!(!matches_pattern("*/news/*.html", "https://site.test/news/2024.pdf"));
/// ```
pub fn matches_pattern(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let candidate = candidate.to_ascii_lowercase();

    if !pattern.contains('*') {
        return candidate.contains(&pattern);
    }

    glob_match(pattern.as_bytes(), candidate.as_bytes())
}

/// Checks a URL against a list of patterns, returning the first one that matches
pub fn first_match<'a>(patterns: &'a [String], candidate: &str) -> Option<&'a str> {
    patterns
        .iter()
        .find(|pattern| matches_pattern(pattern, candidate))
        .map(String::as_str)
}

/// Iterative glob matcher with single-star backtracking
fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some(p);
            resume = t;
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some(star_pos) = star {
            p = star_pos + 1;
            resume += 1;
            t = resume;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&b| b == b'*')
}
