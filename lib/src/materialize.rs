use std::fs;
use std::path::{Component, Path};

use crate::error::{Chainable, Fault, Result};
use crate::fstree::FsTree;
use crate::value::{Sink, Value};

/// Marks a page tree key as a literal file name.
pub const OVERRIDE_SIGIL: char = '$';

/// The file a non-literal page is written to, inside a directory named by
/// its key.
pub const PAGE_FILE: &str = "index.html";

fn invalid(message: &str, key: &str, dir: &Path) -> crate::error::Error {
    fault! {
        Fault::InvalidPageTreeValue, message,
        "key" => key,
        "directory" => dir.display(),
    }
}

fn is_plain_relative(name: &str) -> bool {
    !name.is_empty() && Path::new(name).components().all(|c| matches!(c, Component::Normal(_)))
}

/// Writes the page tree `pages` under `root`, returning the number of pages.
///
/// A dictionary value recurses into a directory named by its key. A string
/// value is a page: under a key like `$robots.txt` it is written to the file
/// `robots.txt` in the current directory, and under any other key like
/// `about` it is written to `about/index.html`. Directories are created as
/// needed; existing files not in the tree are left alone.
pub fn materialize<P: AsRef<Path>>(root: P, pages: &Value) -> Result<usize> {
    let root = root.as_ref();
    match pages.as_dict() {
        Some(_) => write_dir(root, pages),
        None => Err(fault! {
            Fault::InvalidPageTreeValue, "page tree must be a dictionary",
            "found" => pages.kind(),
        }),
    }
}

fn write_dir(dir: &Path, pages: &Value) -> Result<usize> {
    let Some(dict) = pages.as_dict() else {
        return Ok(0);
    };

    let mut count = 0;
    for (key, value) in dict {
        if !is_plain_relative(key) {
            return Err(invalid("page name must be a plain relative path", key, dir));
        }

        let file = match (key.strip_prefix(OVERRIDE_SIGIL), value) {
            (_, Value::Dict(_)) => {
                count += write_dir(&dir.join(&**key), value)?;
                continue;
            }
            (Some(name), Value::String(_)) if is_plain_relative(name) => dir.join(name),
            (Some(_), Value::String(_)) => {
                return Err(invalid("literal file name is empty or not a plain path", key, dir));
            }
            (None, Value::String(_)) => dir.join(&**key).join(PAGE_FILE),
            (_, other) => {
                let message = format!("pages must be strings or dictionaries, found {}", other.kind());
                return Err(invalid(&message, key, dir));
            }
        };

        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).chain_with(|| error! {
                "failed to create output directory",
                "path" => parent.display(),
            })?;
        }

        tracing::debug!(path = %file.display(), "writing page");
        file.write_value(value)?;
        count += 1;
    }

    Ok(count)
}

/// Copies every file under `from` into `to`, dotfiles included, preserving
/// relative paths. Returns the number of files copied; a missing `from`
/// copies none.
pub fn copy_static<F: AsRef<Path>, T: AsRef<Path>>(from: F, to: T) -> Result<usize> {
    let (from, to) = (from.as_ref(), to.as_ref());
    if !from.is_dir() {
        return Ok(0);
    }

    let tree = FsTree::build_with_hidden(from)?;
    let mut count = 0;
    for file in tree.iter_depth_first(tree.root_id()).files() {
        let target = to.join(file.relative_path());
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::copy(&file.path, &target).chain_with(|| error! {
            "failed to copy static file",
            "from" => file.path.display(),
            "to" => target.display(),
        })?;

        count += 1;
    }

    tracing::debug!(count, from = %from.display(), "copied static files");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::dict;
    use crate::testing::write;
    use crate::value::Renderable;

    #[test]
    fn pages_and_literal_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let pages = Value::from(dict! {
            "about" => "<p>about</p>",
            "$robots.txt" => "User-agent: *",
            "$index.html" => "home",
            "blog" => dict! {
                "first" => "one",
                "$feed.xml" => "<rss/>",
            },
        });

        assert_eq!(materialize(&out, &pages).unwrap(), 5);
        assert_eq!(fs::read_to_string(out.join("about/index.html")).unwrap(), "<p>about</p>");
        assert_eq!(fs::read_to_string(out.join("robots.txt")).unwrap(), "User-agent: *");
        assert_eq!(fs::read_to_string(out.join("index.html")).unwrap(), "home");
        assert_eq!(fs::read_to_string(out.join("blog/first/index.html")).unwrap(), "one");
        assert_eq!(fs::read_to_string(out.join("blog/feed.xml")).unwrap(), "<rss/>");
    }

    #[test]
    fn sigil_keys_with_dicts_are_directories() {
        let dir = tempfile::tempdir().unwrap();
        let pages = Value::from(dict!["$raw" => dict!["x" => "y"]]);

        assert_eq!(materialize(dir.path(), &pages).unwrap(), 1);
        assert!(dir.path().join("$raw/x/index.html").is_file());
    }

    #[test]
    fn rejects_invalid_trees() {
        let dir = tempfile::tempdir().unwrap();
        let cases = vec![
            Value::from("not a dict"),
            Value::from(dict!["n" => 1]),
            Value::from(dict!["list" => vec!["a"]]),
            Value::from(dict!["lazy" => Renderable::new(|| Ok("x".into()))]),
            Value::from(dict!["$" => "empty"]),
            Value::from(dict!["../escape" => "x"]),
            Value::from(dict!["$../escape" => "x"]),
            Value::from(dict!["/abs" => "x"]),
            Value::from(dict!["" => "x"]),
        ];

        for pages in cases {
            let error = materialize(dir.path(), &pages).unwrap_err();
            assert_eq!(error.fault(), Some(Fault::InvalidPageTreeValue), "{pages:?}");
        }
    }

    #[test]
    fn static_copy_is_additive_and_exact() {
        let dir = tempfile::tempdir().unwrap();
        let (from, to) = (dir.path().join("static"), dir.path().join("out"));
        let bytes: Vec<u8> = (0..=255).collect();

        fs::create_dir_all(from.join("img")).unwrap();
        fs::write(from.join("img/logo.bin"), &bytes).unwrap();
        write(&from, "style.css", "body {}");
        write(&to, "keep.html", "kept");

        assert_eq!(copy_static(&from, &to).unwrap(), 2);
        assert_eq!(fs::read(to.join("img/logo.bin")).unwrap(), bytes);
        assert_eq!(fs::read_to_string(to.join("style.css")).unwrap(), "body {}");
        assert_eq!(fs::read_to_string(to.join("keep.html")).unwrap(), "kept");
    }

    #[test]
    fn static_copy_includes_dotfiles() {
        let dir = tempfile::tempdir().unwrap();
        let (from, to) = (dir.path().join("static"), dir.path().join("out"));
        write(&from, "docs/.htaccess", "Deny from all");
        write(&from, ".well-known/security.txt", "Contact: me");

        assert_eq!(copy_static(&from, &to).unwrap(), 2);
        assert_eq!(fs::read_to_string(to.join("docs/.htaccess")).unwrap(), "Deny from all");
        assert_eq!(fs::read_to_string(to.join(".well-known/security.txt")).unwrap(), "Contact: me");
    }

    #[test]
    fn missing_static_folder_copies_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(copy_static(dir.path().join("static"), dir.path().join("out")).unwrap(), 0);
        assert!(!dir.path().join("out").exists());
    }
}
