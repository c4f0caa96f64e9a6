//! Path helpers shared by the registration services and the providers.
//!
//! Drive and folder paths are `/`-separated strings relative to a drive
//! root. Stored paths carry no trailing slash and no empty, `.` or `..`
//! segments; an empty string addresses the drive root.

const MAX_PATH_LEN: usize = 1024;

/// Normalize a user-supplied path. Returns `None` for paths that could
/// escape their root or carry control characters.
pub fn normalize_path(path: &str) -> Option<String> {
    if path.len() > MAX_PATH_LEN {
        return None;
    }
    if path
        .bytes()
        .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    {
        return None;
    }

    let leading = path.starts_with('/');
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if leading && !joined.is_empty() {
        Some(format!("/{}", joined))
    } else if leading {
        Some("/".to_string())
    } else {
        Some(joined)
    }
}

/// Join two already-normalized paths.
pub fn join_path(base: &str, child: &str) -> String {
    let rooted = base.starts_with('/');
    let base = base.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    match (base.is_empty(), child.is_empty()) {
        (true, _) if rooted => format!("/{}", child),
        (_, true) => base.to_string(),
        (true, false) => child.to_string(),
        (false, false) => format!("{}/{}", base, child),
    }
}

/// Last segment of a path, or the whole path when it has no separator.
pub fn last_segment(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

/// Whether two normalized paths overlap: one equals the other or is an
/// ancestor of it by whole segments.
pub fn paths_overlap(a: &str, b: &str) -> bool {
    let a = a.trim_matches('/');
    let b = b.trim_matches('/');
    if a.is_empty() || b.is_empty() || a == b {
        return true;
    }
    let is_ancestor = |parent: &str, child: &str| {
        child.starts_with(parent) && child[parent.len()..].starts_with('/')
    };
    is_ancestor(a, b) || is_ancestor(b, a)
}

/// Validate a single folder name.
pub fn is_valid_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name.trim() == name
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.bytes().any(|b| b.is_ascii_control() || b == b'\\')
}
