// SPDX-License-Identifier: MIT OR Apache-2.0
//! Path safety for anything derived from envelope content.

use std::path::{Component, Path, PathBuf};

use taskmesh_core::error::TaskMeshError;

/// Reject `raw` if it is absolute or contains a `..` component, then
/// return it joined under `base`.
///
/// This must be applied uniformly to every path that originates from
/// envelope content: artifact `files[].path`, `produces[].files[].path`,
/// human-gateway `provided_files[].path`, and payload finalization
/// destinations all go through this function, never a raw `Path::join`.
///
/// # Errors
///
/// Returns [`TaskMeshError::UnsafePath`] if `raw` is absolute or escapes
/// `base`.
pub fn safe_relpath(base: &Path, raw: &str) -> Result<PathBuf, TaskMeshError> {
    let candidate = Path::new(raw);
    if candidate.is_absolute() {
        return Err(TaskMeshError::UnsafePath(format!(
            "absolute path not allowed: {raw:?}"
        )));
    }
    for component in candidate.components() {
        match component {
            Component::ParentDir => {
                return Err(TaskMeshError::UnsafePath(format!(
                    "'..' component not allowed: {raw:?}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(TaskMeshError::UnsafePath(format!(
                    "absolute path not allowed: {raw:?}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }
    Ok(base.join(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_relative_path() {
        let base = Path::new("/root/work");
        let joined = safe_relpath(base, "a/b/out.txt").unwrap();
        assert_eq!(joined, Path::new("/root/work/a/b/out.txt"));
    }

    #[test]
    fn rejects_absolute_path() {
        let base = Path::new("/root/work");
        assert!(safe_relpath(base, "/etc/passwd").is_err());
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        let base = Path::new("/root/work");
        assert!(safe_relpath(base, "../../etc/passwd").is_err());
        assert!(safe_relpath(base, "a/../../b").is_err());
    }

    proptest::proptest! {
        #[test]
        fn never_accepts_dotdot_anywhere(segments in proptest::collection::vec("[a-zA-Z0-9_.]{1,8}", 1..6)) {
            let raw = segments.join("/");
            let base = Path::new("/root/work");
            let result = safe_relpath(base, &raw);
            if raw.split('/').any(|seg| seg == "..") {
                prop_assert!(result.is_err());
            }
        }
    }
}
