//! Destination filenames for downloaded resources

use percent_encoding::percent_decode_str;
use sanitize_filename::{sanitize_with_options, Options};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use url::Url;

/// Upper bound for a generated filename, extension included
const MAX_FILENAME_CHARS: usize = 120;

/// Derives a filesystem-safe filename from a resource URL
///
/// The last path segment is used (`index` for directory URLs), percent-decoded
/// so `my%20file.pdf` yields a real space before cleanup. Path-unsafe
/// characters become `_`, whitespace runs collapse to a single `_`, a query
/// string adds a short stable hash so `a.jpg?w=1` and `a.jpg?w=2` differ, and
/// the result is capped in length with the extension preserved.
pub fn derive_filename(url: &Url) -> String {
    let raw = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .unwrap_or("index");
    let decoded = percent_decode_str(raw).decode_utf8_lossy();

    let sanitized = sanitize_with_options(
        &decoded,
        Options {
            truncate: false,
            replacement: "_",
            ..Options::default()
        },
    );
    let collapsed = collapse_whitespace(&sanitized);
    let base = if collapsed.trim_matches(&['.', '_'][..]).is_empty() {
        "resource".to_string()
    } else {
        collapsed
    };

    let (stem, ext) = split_extension(&base);
    let stem = match url.query() {
        Some(query) if !query.is_empty() => format!("{}-{}", stem, short_hash(query)),
        _ => stem.to_string(),
    };

    cap_length(&stem, ext)
}

/// Tracks which destination paths have been handed out
///
/// Two different URLs that derive the same filename never share a file: the
/// later one gets a `-1`, `-2`, ... suffix. A URL that is claimed twice gets
/// its original path back.
#[derive(Debug, Default)]
pub struct FilenameRegistry {
    claims: HashMap<PathBuf, String>,
}

impl FilenameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a destination path for `url` inside `dir`
    pub fn claim(&mut self, dir: &Path, filename: &str, url: &str) -> PathBuf {
        let (stem, ext) = split_extension(filename);
        let mut counter = 0u32;

        loop {
            let candidate_name = if counter == 0 {
                filename.to_string()
            } else {
                join_extension(&format!("{}-{}", stem, counter), ext)
            };
            let candidate = dir.join(candidate_name);

            match self.claims.get(&candidate) {
                Some(owner) if owner == url => return candidate,
                Some(_) => {}
                None if !candidate.exists() => {
                    self.claims.insert(candidate.clone(), url.to_string());
                    return candidate;
                }
                None => {}
            }

            counter += 1;
        }
    }
}

fn collapse_whitespace(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Splits `name.ext` into stem and extension; dotfiles have no extension
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

fn join_extension(stem: &str, ext: Option<&str>) -> String {
    match ext {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem.to_string(),
    }
}

fn short_hash(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(&digest[..4])
}

fn cap_length(stem: &str, ext: Option<&str>) -> String {
    let ext_chars = ext.map_or(0, |e| e.chars().count() + 1);
    let budget = MAX_FILENAME_CHARS.saturating_sub(ext_chars).max(1);
    let stem: String = stem.chars().take(budget).collect();
    join_extension(&stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_plain_filename() {
        assert_eq!(derive_filename(&url("http://s.test/img/logo.png")), "logo.png");
    }

    #[test]
    fn test_directory_url_becomes_index() {
        assert_eq!(derive_filename(&url("http://s.test/files/")), "index");
    }

    #[test]
    fn test_unsafe_characters_and_whitespace() {
        assert_eq!(
            derive_filename(&url("http://s.test/a/my%20%20file:v1.pdf")),
            "my_file_v1.pdf"
        );
        assert_eq!(
            derive_filename(&url("http://s.test/docs/%E4%BA%A7%E5%93%81%20%E6%89%8B%E5%86%8C.pdf")),
            "产品_手册.pdf"
        );
    }

    #[test]
    fn test_encoded_separators_stay_inside_the_name() {
        let name = derive_filename(&url("http://s.test/a/..%2F..%2Fetc%2Fpasswd"));
        assert!(!name.contains('/'));
        assert!(!name.contains('\\'));
        assert!(name.ends_with("passwd"));
    }

    #[test]
    fn test_query_adds_stable_hash() {
        let a = derive_filename(&url("http://s.test/thumb.jpg?w=100"));
        let b = derive_filename(&url("http://s.test/thumb.jpg?w=200"));
        let a_again = derive_filename(&url("http://s.test/thumb.jpg?w=100"));

        assert_ne!(a, b);
        assert_eq!(a, a_again);
        assert!(a.starts_with("thumb-"));
        assert!(a.ends_with(".jpg"));
    }

    #[test]
    fn test_length_cap_keeps_extension() {
        let long = format!("http://s.test/{}.docx", "x".repeat(300));
        let name = derive_filename(&url(&long));
        assert_eq!(name.chars().count(), MAX_FILENAME_CHARS);
        assert!(name.ends_with(".docx"));
    }

    #[test]
    fn test_collisions_get_suffixes() {
        let dir = TempDir::new().unwrap();
        let mut registry = FilenameRegistry::new();

        let first = registry.claim(dir.path(), "logo.png", "http://a.test/logo.png");
        let second = registry.claim(dir.path(), "logo.png", "http://b.test/logo.png");
        let third = registry.claim(dir.path(), "logo.png", "http://c.test/logo.png");
        let first_again = registry.claim(dir.path(), "logo.png", "http://a.test/logo.png");

        assert_eq!(first, dir.path().join("logo.png"));
        assert_eq!(second, dir.path().join("logo-1.png"));
        assert_eq!(third, dir.path().join("logo-2.png"));
        assert_eq!(first_again, first);
    }

    #[test]
    fn test_existing_file_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"old").unwrap();

        let mut registry = FilenameRegistry::new();
        let claimed = registry.claim(dir.path(), "report.pdf", "http://s.test/report.pdf");
        assert_eq!(claimed, dir.path().join("report-1.pdf"));
    }
}
