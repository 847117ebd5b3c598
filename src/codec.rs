//! Repository URL to display name and on-disk directory name

use rand::Rng;
use url::Url;

/// Longest directory name kept verbatim (a single path component)
pub const MAX_DIR_NAME_LEN: usize = 255;

/// Characters kept from each end of an overlong directory name
const TRUNCATED_EDGE_LEN: usize = 122;

const SUFFIX_LEN: usize = 8;
const SUFFIX_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Host substrings and their display prefixes, checked in order.
/// gist.github.com must be matched before github.com.
const PROVIDER_PREFIXES: &[(&str, &str)] = &[
    ("gist.github.com", "gist"),
    ("github.com", "gh"),
    ("gitlab.com", "gl"),
];

const FALLBACK_PREFIX: &str = "git";

/// Strip a trailing `.git` from a repository URL
pub fn normalize_repo_url(url: &str) -> &str {
    url.strip_suffix(".git").unwrap_or(url)
}

/// Human-readable `{prefix}/{path}` form of a repository URL
pub fn display_name(repo_url: &str) -> String {
    let url = normalize_repo_url(repo_url);

    // Unparseable URLs (no scheme, scp-like) have no host; the whole string is the path
    let (host, path) = match Url::parse(url) {
        Ok(parsed) => (
            parsed.host_str().unwrap_or_default().to_lowercase(),
            raw_path(url),
        ),
        Err(_) => (String::new(), url),
    };

    let prefix = PROVIDER_PREFIXES
        .iter()
        .find(|(needle, _)| host.contains(needle))
        .map(|(_, prefix)| *prefix)
        .unwrap_or(FALLBACK_PREFIX);

    format!("{}/{}", prefix, path.trim_matches('/'))
}

/// Path of a parsed URL exactly as written: no percent-encoding and
/// no dot-segment removal
fn raw_path(url: &str) -> &str {
    let rest = match url.find("://") {
        Some(i) => {
            let after_scheme = &url[i + 3..];
            let authority_end = after_scheme
                .find(|c| matches!(c, '/' | '?' | '#'))
                .unwrap_or(after_scheme.len());
            &after_scheme[authority_end..]
        }
        None => url.split_once(':').map(|(_, rest)| rest).unwrap_or(url),
    };
    let path_end = rest.find(|c| matches!(c, '?' | '#')).unwrap_or(rest.len());
    &rest[..path_end]
}

/// Filesystem-safe directory name for a repository URL
///
/// Every character other than ASCII alphanumerics, `-` and `.` becomes `_`.
/// Names longer than [`MAX_DIR_NAME_LEN`] are shortened to both ends joined
/// with `_` plus a random suffix, so two long URLs sharing a prefix and a
/// suffix still get different directories.
pub fn directory_name(repo_url: &str) -> String {
    let dir_name: String = display_name(repo_url)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if dir_name.len() <= MAX_DIR_NAME_LEN {
        return dir_name;
    }

    // All characters are ASCII at this point, so byte slicing is safe
    let head = &dir_name[..TRUNCATED_EDGE_LEN];
    let tail = &dir_name[dir_name.len() - TRUNCATED_EDGE_LEN..];
    let truncated = format!("{}_{}_{}", head, tail, random_suffix());
    tracing::warn!(
        "Directory name for {} truncated to {}",
        repo_url,
        truncated
    );
    truncated
}

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARS[rng.gen_range(0..SUFFIX_CHARS.len())] as char)
        .collect()
}
