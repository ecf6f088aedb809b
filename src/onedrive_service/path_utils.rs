//! Path and URL helpers for Graph drive paths

/// Prefix the Graph API puts in front of every `parentReference.path`
pub const DRIVE_ROOT_PREFIX: &str = "/drive/root:";

/// Strip the API prefix from a parent path: `/drive/root:/Documents` -> `/Documents`
pub fn strip_drive_root(api_path: &str) -> &str {
    api_path.strip_prefix(DRIVE_ROOT_PREFIX).unwrap_or(api_path)
}

/// API-rooted path for an absolute mount path: `/` -> `/drive/root:`
pub fn to_api_path(path: &str) -> String {
    if path == "/" || path.is_empty() {
        DRIVE_ROOT_PREFIX.to_string()
    } else {
        format!("{}{}", DRIVE_ROOT_PREFIX, path)
    }
}

/// Percent-encode each segment of an absolute path, keeping the separators.
pub fn escape_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Graph URL for the children of the item at an absolute mount path
pub fn children_url(path: &str) -> String {
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        "/me/drive/root/children".to_string()
    } else {
        format!("/me/drive/root:{}:/children", escape_path(path))
    }
}

/// Graph URL for the item at an absolute mount path
pub fn item_url(path: &str) -> String {
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        "/me/drive/root".to_string()
    } else {
        format!("/me/drive/root:{}", escape_path(path))
    }
}

/// Split an absolute path into (parent path, leaf name).
///
/// A trailing slash is ignored. The parent of a top-level entry is `/`.
pub fn split_parent(path: &str) -> Option<(&str, &str)> {
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    };
    let split = path.rfind('/')?;
    let (parent, leaf) = (&path[..split], &path[split + 1..]);
    if leaf.is_empty() {
        return None;
    }
    Some((if parent.is_empty() { "/" } else { parent }, leaf))
}

/// Join an absolute directory path and a leaf name
pub fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}
