//! Collision-avoiding names for received files
//!
//! A name that already exists in the target directory gets a ` (N)` suffix
//! before its extension, where `N` counts the entries that already share the
//! stem: the exact name plus every `stem (…)ext` entry. This is a count, not
//! a max+1 search, so a deleted middle entry can lead to a reused suffix.

use std::fs;
use std::io;
use std::path::Path;

/// Split a file name into stem and extension (dot included).
///
/// Leading dots belong to the stem, so `.bashrc` has no extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    let leading = name.len() - name.trim_start_matches('.').len();
    match name[leading..].rfind('.') {
        Some(i) => name.split_at(leading + i),
        None => (name, ""),
    }
}

/// Count entries that already claim `requested` or one of its `stem (…)ext`
/// variants.
pub fn same_name_count<'a, I>(entries: I, requested: &str) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    let (stem, ext) = split_extension(requested);
    let open = format!("{stem} (");
    let close = format!("){ext}");
    entries
        .into_iter()
        .filter(|entry| {
            *entry == requested || (entry.starts_with(&open) && entry.ends_with(&close))
        })
        .count()
}

/// Pick the on-disk name for `requested` inside `directory`.
///
/// The listing is read fresh on every call.
pub fn make_unique(directory: &Path, requested: &str) -> io::Result<String> {
    let mut names = Vec::new();
    for entry in fs::read_dir(directory)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }

    let count = same_name_count(names.iter().map(String::as_str), requested);
    if count == 0 {
        return Ok(requested.to_string());
    }
    let (stem, ext) = split_extension(requested);
    Ok(format!("{stem} ({count}){ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("photo.jpg"), ("photo", ".jpg"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".bashrc"), (".bashrc", ""));
        assert_eq!(split_extension("..hidden.txt"), ("..hidden", ".txt"));
        assert_eq!(split_extension("trailing."), ("trailing", "."));
    }

    #[test]
    fn test_unused_name_is_kept() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "other.txt");
        assert_eq!(make_unique(tmp.path(), "data.txt").unwrap(), "data.txt");
    }

    #[test]
    fn test_collisions_count_up() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "data.txt");
        assert_eq!(make_unique(tmp.path(), "data.txt").unwrap(), "data (1).txt");

        touch(tmp.path(), "data (1).txt");
        assert_eq!(make_unique(tmp.path(), "data.txt").unwrap(), "data (2).txt");

        // Unrelated stems and extensions do not count
        touch(tmp.path(), "data (1).csv");
        touch(tmp.path(), "database.txt");
        assert_eq!(make_unique(tmp.path(), "data.txt").unwrap(), "data (2).txt");
    }

    #[test]
    fn test_count_not_max_after_deletion() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "log");
        touch(tmp.path(), "log (1)");
        touch(tmp.path(), "log (2)");
        fs::remove_file(tmp.path().join("log (1)")).unwrap();

        // two same-stem entries remain, so the next suffix is (2) again
        assert_eq!(make_unique(tmp.path(), "log").unwrap(), "log (2)");
    }

    #[test]
    fn test_suffix_pattern_without_exact_name() {
        let names = ["img (1).png", "img (7).png"];
        assert_eq!(same_name_count(names, "img.png"), 2);
    }
}
