//! Collision-free destination filenames for downloads

use std::path::{Path, PathBuf};

/// Resolve a destination path that doesn't collide with an existing entry.
///
/// Returns `path` unchanged if nothing exists there, otherwise probes
/// `base(1).ext`, `base(2).ext`, … and returns the first free candidate.
/// The check is not atomic with the later file creation, which is fine for
/// a single interactive client but racy against concurrent writers.
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let mut counter: u32 = 1;
    loop {
        let mut candidate = path.with_file_name(format!("{stem}({counter})"));
        if let Some(ext) = path.extension() {
            candidate.set_extension(ext);
        }
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_free_path_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        assert_eq!(unique_path(&path), path);
    }

    #[test]
    fn test_collision_appends_counter() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        File::create(&path).unwrap();
        assert_eq!(unique_path(&path), dir.path().join("a(1).txt"));
    }

    #[test]
    fn test_counter_advances_past_taken_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        File::create(&path).unwrap();
        File::create(dir.path().join("a(1).txt")).unwrap();
        assert_eq!(unique_path(&path), dir.path().join("a(2).txt"));
    }

    #[test]
    fn test_no_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes");
        File::create(&path).unwrap();
        assert_eq!(unique_path(&path), dir.path().join("notes(1)"));
    }
}
