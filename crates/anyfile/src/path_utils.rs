// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::path::{Component, Path, PathBuf};

/// Turns a file name into a storage path for the current platform.
///
/// Backslashes are treated as separators, `.` components are dropped and `..`
/// components cancel the preceding normal component. A `..` that has nothing to
/// cancel is kept for relative paths and dropped at the root of absolute ones.
///
/// # Limitations
///
/// This function is purely lexical and does **not** resolve symbolic links, so
/// `link/..` collapses to the starting directory even if `link` points elsewhere.
#[must_use]
pub fn sanitize_path(name: &str) -> PathBuf {
    let cleaned = name.replace('\\', "/");
    let path = Path::new(&cleaned);
    let rooted = path.has_root();

    let mut result = PathBuf::with_capacity(cleaned.len());
    let mut depth: usize = 0;

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => result.push(prefix.as_os_str()),
            Component::RootDir => result.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    let _ = result.pop();
                    depth -= 1;
                } else if !rooted {
                    result.push("..");
                }
            }
            Component::Normal(c) => {
                result.push(c);
                depth += 1;
            }
        }
    }

    if result.as_os_str().is_empty() {
        result.push(".");
    }

    result
}
