mod macros;
mod lazy_result;

pub use macros::*;
pub use lazy_result::*;

/// Returns `true` for names that are hidden by convention (leading `.`).
pub fn is_hidden(file_name: &str) -> bool {
    file_name.starts_with('.')
}

/// Splits `file_name` into its entry name and its last extension, if any.
///
/// ```rust
/// use sitebake::util::split_extension;
///
/// assert_eq!(split_extension("post.md"), ("post", Some("md")));
/// assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", Some("gz")));
/// assert_eq!(split_extension("README"), ("README", None));
/// assert_eq!(split_extension("trailing."), ("trailing", Some("")));
/// ```
pub fn split_extension(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_names() {
        assert!(is_hidden(".DS_Store"));
        assert!(is_hidden(".git"));
        assert!(!is_hidden("index.yaml"));
    }

    #[test]
    fn dotfile_has_no_extension() {
        assert_eq!(split_extension(".env"), (".env", None));
    }
}
