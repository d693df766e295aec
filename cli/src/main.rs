use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use sitebake::error::Result;
use sitebake::script::default_host;
use sitebake::Site;

mod flags {
    use std::path::PathBuf;

    xflags::xflags! {
        /// Bake the site in a directory into static files.
        cmd sitebake {
            /// The site directory. Defaults to the current directory.
            optional path: PathBuf
            /// Print the aggregated data as JSON instead of building.
            optional --show-data
            /// Log build progress to stderr.
            optional -v, --verbose
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "sitebake=debug" } else { "sitebake=warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Runs one invocation against the site at `root`, returning what to print.
fn run(root: &Path, show_data: bool) -> Result<String> {
    let site = Site::open(root, default_host()?)?;
    if show_data {
        let data = site.data()?;
        return Ok(serde_json::to_string_pretty(&data)?);
    }

    Ok(site.build()?.to_string())
}

pub fn main() -> ExitCode {
    let flags = flags::Sitebake::from_env_or_exit();
    init_logging(flags.verbose);

    let root = flags.path.unwrap_or_else(|| PathBuf::from("."));
    match run(&root, flags.show_data) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use sitebake::error::Fault;

    fn write(root: &Path, path: &str, contents: &str) {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn scaffold(root: &Path) {
        write(root, "data/index.yaml", "title: Bakery\n");
        write(root, "data/posts/first.md", "Fresh *bread*.");
        write(root, "data/posts/first.yaml", "title: First\n");
        write(root, "data/menu.lua", r#"return { "rye", "sourdough" }"#);
        write(root, "processors/process.csv.lua", r#"
            return function(path)
                local rows = {}
                for line in io.lines(path) do rows[#rows + 1] = line end
                return rows
            end
        "#);

        write(root, "data/prices.csv", "rye,4\nsourdough,6\n");
        write(root, "helpers.lua", r#"return { shout = function(s) return string.upper(s) end }"#);
        write(root, "templates/post.html", "{% extends 'base' %}{% block body %}{{ content }}{% endblock %}");
        write(root, "templates/base.html", "<title>{{ title | shout }}</title>{% block body %}{% endblock %}");
        write(root, "site.lua", r#"
            return function(data, templates)
                local pages = { ["$index.html"] = templates.base({ title = data.title }) }
                pages.posts = {}
                for slug, post in pairs(data.posts) do
                    pages.posts[slug] = templates.post(post)
                end
                pages["$menu.txt"] = table.concat(data.menu, ",") .. ";" .. table.concat(data.prices, ";")
                return pages
            end
        "#);

        write(root, "static/favicon.ico", "icon");
    }

    #[test]
    fn builds_a_lua_site() {
        let dir = tempfile::tempdir().unwrap();
        scaffold(dir.path());

        let summary = run(dir.path(), false).unwrap();
        let out = dir.path().join("out");
        assert_eq!(summary, format!("Saved 3 pages and 1 static files to {}", out.display()));

        let index = fs::read_to_string(out.join("index.html")).unwrap();
        assert_eq!(index, "<title>BAKERY</title>");

        let post = fs::read_to_string(out.join("posts/first/index.html")).unwrap();
        assert_eq!(post.trim(), "<title>FIRST</title><p>Fresh <em>bread</em>.</p>");

        let menu = fs::read_to_string(out.join("menu.txt")).unwrap();
        assert_eq!(menu, "rye,sourdough;rye,4;sourdough,6");
        assert!(out.join("favicon.ico").is_file());
    }

    #[test]
    fn shows_data_as_json() {
        let dir = tempfile::tempdir().unwrap();
        scaffold(dir.path());

        let json = run(dir.path(), true).unwrap();
        let data: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(data["title"], "Bakery");
        assert_eq!(data["posts"]["first"]["title"], "First");
        assert_eq!(data["menu"][1], "sourdough");
        assert!(data["posts"]["first"]["content"].as_str().unwrap().contains("<em>bread</em>"));
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn rejects_non_sites() {
        let dir = tempfile::tempdir().unwrap();
        let error = run(dir.path(), false).unwrap_err();
        assert_eq!(error.fault(), Some(Fault::NotASiteDirectory));
    }
}
