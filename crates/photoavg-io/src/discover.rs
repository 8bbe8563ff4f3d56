//! Recursive discovery of source photographs.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::RunError;

/// Extensions treated as source images, compared case-insensitively.
pub const EXTENSIONS: [&str; 2] = ["jpg", "jpeg"];

/// Whether `path` has one of the [`EXTENSIONS`].
#[must_use]
pub fn is_source_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| EXTENSIONS.contains(&ext.as_str()))
}

/// Every source image below `root`, canonicalized and sorted.
///
/// Hidden directories (such as the default `.avg_cache`) are not
/// descended into.
///
/// # Errors
///
/// Returns [`RunError::Discover`] if a directory cannot be read and
/// [`RunError::Canonicalize`] if a found path cannot be resolved.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>, RunError> {
    let mut paths = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

    for entry in walker {
        let entry = entry.map_err(|source| RunError::Discover {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() || !is_source_image(entry.path()) {
            continue;
        }

        let path = entry
            .path()
            .canonicalize()
            .map_err(|source| RunError::Canonicalize {
                path: entry.path().to_path_buf(),
                source,
            })?;
        paths.push(path);
    }

    paths.sort();
    tracing::info!(root = %root.display(), count = paths.len(), "discovered source images");
    Ok(paths)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn extension_match_is_case_insensitive() {
        assert!(is_source_image(Path::new("a.jpg")));
        assert!(is_source_image(Path::new("b.JPEG")));
        assert!(!is_source_image(Path::new("c.png")));
        assert!(!is_source_image(Path::new("jpg")));
    }

    #[test]
    fn discovers_nested_images_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("2017/01")).unwrap();
        fs::create_dir_all(dir.path().join(".avg_cache")).unwrap();
        for name in ["2017/01/b.JPG", "2017/a.jpeg", "notes.txt", ".avg_cache/x.jpg"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let found = discover(dir.path()).unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert_eq!(
            found,
            vec![root.join("2017/01/b.JPG"), root.join("2017/a.jpeg")]
        );
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover(&dir.path().join("missing")),
            Err(RunError::Discover { .. })
        ));
    }
}
