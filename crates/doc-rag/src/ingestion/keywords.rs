//! Keyword derivation from object-storage paths

/// Derive keywords from the path hierarchy of `file_path`
///
/// Accepts a full URL or a bare path. Scheme, authority, query and fragment
/// are ignored; segments up to and including the container are dropped, any
/// other segment equal to the container name is dropped too, and the last
/// segment loses its extension. Segments are kept as written (no decoding).
///
/// `https://acct/rag-docs/manuals/setup.md` with container `rag-docs`
/// gives `["manuals", "setup"]`.
pub fn extract_keywords(file_path: &str, container: &str) -> Vec<String> {
    let path = strip_url_parts(file_path);

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let start = segments
        .iter()
        .position(|s| *s == container)
        .map_or(0, |i| i + 1);

    let mut keywords: Vec<String> = segments[start..]
        .iter()
        .filter(|s| **s != container)
        .map(|s| s.to_string())
        .collect();

    if let Some(last) = keywords.last_mut() {
        *last = strip_extension(last).to_string();
    }
    keywords.retain(|k| !k.is_empty());
    keywords
}

fn strip_url_parts(file_path: &str) -> &str {
    let without_scheme = match file_path.find("://") {
        Some(i) => {
            let rest = &file_path[i + 3..];
            rest.find('/').map_or("", |j| &rest[j..])
        }
        None => file_path,
    };
    let end = without_scheme
        .find(|c| c == '?' || c == '#')
        .unwrap_or(without_scheme.len());
    &without_scheme[..end]
}

fn strip_extension(segment: &str) -> &str {
    match segment.rfind('.') {
        Some(0) | None => segment,
        Some(i) => &segment[..i],
    }
}
