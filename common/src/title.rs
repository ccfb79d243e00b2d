use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref UNDERSCORES: Regex = Regex::new("_+").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Title prefixes of non-article namespaces. Links and redirects into these
/// are expected to be unresolvable and are not reported as broken.
pub const EXCLUDED_PREFIXES: &[&str] = &[
    "Category:",
    "Wikipedia:",
    "Portal:",
    "Help:",
    "Template:",
    "File:",
    ":Template:",
    "Draft:",
    "Wikipedia talk:",
    "Talk:",
];

/// Normalise a page title: uppercase the first letter and collapse runs of
/// underscores into a single space.
pub fn normalize(title: &str) -> String {
    let mut chars = title.chars();
    let capitalised = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => return String::new(),
    };
    UNDERSCORES.replace_all(&capitalised, " ").into_owned()
}

/// Collapse runs of whitespace into a single space and trim both ends.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Check whether a title falls into one of the excluded namespace prefixes.
pub fn is_excluded<S: AsRef<str>>(title: &str, prefixes: &[S]) -> bool {
    prefixes.iter().any(|prefix| title.starts_with(prefix.as_ref()))
}

/// Check whether page text opens with the redirect marker, ignoring case.
pub fn is_redirect_text(text: &str, marker: &str) -> bool {
    text.get(..marker.len())
        .map(|head| head.eq_ignore_ascii_case(marker))
        .unwrap_or(false)
}
