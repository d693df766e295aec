//! Template composition.
//!
//! A templates folder is mirrored into a [`TemplateSet`]: subfolders become
//! nested sets, template files become invocable [`Template`]s. Every
//! template is also registered as a _partial_ in one namespace shared by the
//! whole set, named by its path from the templates root with the extension
//! stripped. `templates/blog/post.html` is the partial `blog/post`, and any
//! template may `{% include "blog/post" %}`.
//!
//! Building happens in two phases. The folder is walked into a layout while
//! every partial is collected; then the engine is built once from the
//! complete partial table and frozen behind an `Arc` shared by every
//! `Template`. Includes resolve at render time, so walk order never matters.

mod engine;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::collections::BTreeMap;

use crate::error::{Fault, Result};
use crate::fstree::{EntryId, FsTree};
use crate::value::{Dict, Source, Value};

pub use engine::Engine;

/// File extensions recognized as templates. Other files are ignored.
pub const TEMPLATE_EXTS: &[&str] = &["html", "htm", "jinja", "j2", "hbs", "handlebars"];

/// A named function made available to every template, both as a function
/// (`{{ name(x) }}`) and as a filter (`{{ x | name }}`).
#[derive(Clone)]
pub struct Helper {
    pub name: Arc<str>,
    pub func: Arc<dyn Fn(Vec<Value>) -> Result<Value> + Send + Sync>,
}

impl Helper {
    pub fn new<F>(name: impl Into<Arc<str>>, func: F) -> Self
        where F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static
    {
        Helper { name: name.into(), func: Arc::new(func) }
    }

    pub fn call(&self, args: Vec<Value>) -> Result<Value> {
        (self.func)(args)
    }
}

impl fmt::Debug for Helper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Helper").field("name", &self.name).finish_non_exhaustive()
    }
}

/// A folder of templates.
///
/// A set may also own a template: `blog.html` beside the folder `blog/` is
/// the set's own template, still registered as the partial `blog`.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    nodes: BTreeMap<Arc<str>, TemplateNode>,
    own: Option<Template>,
}

#[derive(Debug, Clone)]
pub enum TemplateNode {
    Set(TemplateSet),
    Template(Template),
}

/// A single template, renderable with any [`Value`] as its context.
#[derive(Debug, Clone)]
pub struct Template {
    name: Arc<str>,
    engine: Arc<Engine>,
}

/// The global partial namespace, populated before the engine is frozen.
#[derive(Debug, Default)]
struct Partials {
    sources: BTreeMap<Arc<str>, Arc<str>>,
}

impl Partials {
    fn insert(&mut self, name: Arc<str>, source: Arc<str>, path: &Path) -> Result<()> {
        if self.sources.contains_key(&name) {
            return Err(fault! {
                Fault::DuplicatePartial, "partial name is already registered",
                "partial" => name,
                "path" => path.display(),
            });
        }

        self.sources.insert(name, source);
        Ok(())
    }
}

/// The shape of a template set before the engine exists.
#[derive(Debug, Default)]
struct Layout {
    nodes: BTreeMap<Arc<str>, LayoutNode>,
    own: Option<Arc<str>>,
}

#[derive(Debug)]
enum LayoutNode {
    Set(Layout),
    Template(Arc<str>),
}

impl Layout {
    /// Partial names are unique by the time a node is inserted, so a key
    /// can only be shared by a folder and a template, which then merge.
    fn insert(&mut self, key: &str, node: LayoutNode) {
        let merged = match (self.nodes.remove(key), node) {
            (Some(LayoutNode::Set(mut layout)), LayoutNode::Template(name))
            | (Some(LayoutNode::Template(name)), LayoutNode::Set(mut layout)) => {
                layout.own = Some(name);
                LayoutNode::Set(layout)
            }
            (_, node) => node,
        };

        self.nodes.insert(key.into(), merged);
    }

    fn walk(
        &mut self,
        tree: &FsTree,
        dir: EntryId,
        prefix: &str,
        partials: &mut Partials,
    ) -> Result<()> {
        for &child in &tree[dir].children {
            let entry = &tree[child];
            if entry.is_dir() {
                let mut layout = Layout::default();
                let prefix = format!("{prefix}{}/", entry.file_name);
                layout.walk(tree, child, &prefix, partials)?;
                self.insert(&entry.file_name, LayoutNode::Set(layout));
                continue;
            }

            match entry.file_ext() {
                Some(ext) if TEMPLATE_EXTS.contains(&ext) => {
                    let name: Arc<str> = format!("{prefix}{}", entry.file_stem()).into();
                    tracing::debug!(partial = %name, path = %entry.path.display(), "template");
                    partials.insert(name.clone(), entry.read_text()?, &entry.path)?;
                    self.insert(entry.file_stem(), LayoutNode::Template(name));
                }
                _ => tracing::debug!(path = %entry.path.display(), "ignoring non-template"),
            }
        }

        Ok(())
    }

    fn freeze(self, engine: &Arc<Engine>) -> TemplateSet {
        let template = |name| Template { name, engine: engine.clone() };
        let nodes = self.nodes.into_iter()
            .map(|(key, node)| {
                let node = match node {
                    LayoutNode::Set(layout) => TemplateNode::Set(layout.freeze(engine)),
                    LayoutNode::Template(name) => TemplateNode::Template(template(name)),
                };

                (key, node)
            })
            .collect();

        TemplateSet { nodes, own: self.own.map(template) }
    }
}

impl TemplateSet {
    /// Mirrors `folder` into a template set whose templates can call
    /// `helpers` and see `globals` as `G`.
    pub fn build<P: AsRef<Path>>(folder: P, helpers: &[Helper], globals: &Dict) -> Result<Self> {
        let folder = folder.as_ref();
        if !folder.is_dir() {
            return Err(fault! {
                Fault::NotADirectory, "templates folder is not a directory",
                "path" => folder.display(),
            });
        }

        let tree = FsTree::build(folder)?;
        let mut partials = Partials::default();
        let mut layout = Layout::default();
        layout.walk(&tree, tree.root_id(), "", &mut partials)?;

        let engine = Arc::new(Engine::new(partials.sources, helpers, globals)?);
        Ok(layout.freeze(&engine))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &TemplateNode)> {
        self.nodes.iter()
    }

    /// Looks up a node by its `/`-separated path from this set.
    pub fn get(&self, path: &str) -> Option<&TemplateNode> {
        let (first, rest) = match path.split_once('/') {
            Some((first, rest)) => (first, Some(rest)),
            None => (path, None),
        };

        match (self.nodes.get(first)?, rest) {
            (node, None) => Some(node),
            (TemplateNode::Set(set), Some(rest)) => set.get(rest),
            (TemplateNode::Template(_), Some(_)) => None,
        }
    }

    /// Looks up a template by its `/`-separated path from this set. A path
    /// naming a set yields the set's own template, if it has one.
    pub fn template(&self, path: &str) -> Option<&Template> {
        match self.get(path)? {
            TemplateNode::Template(template) => Some(template),
            TemplateNode::Set(set) => set.own_template(),
        }
    }

    /// The template sharing this set's name, like `blog.html` for `blog/`.
    pub fn own_template(&self) -> Option<&Template> {
        self.own.as_ref()
    }

    /// Every partial name reachable from this set, in order.
    pub fn partial_names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<Arc<str>> = self.own.iter().map(|t| t.name.clone()).collect();
        for node in self.nodes.values() {
            match node {
                TemplateNode::Set(set) => names.extend(set.partial_names()),
                TemplateNode::Template(template) => names.push(template.name.clone()),
            }
        }

        names
    }
}

impl Template {
    /// The template's partial name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn render(&self, context: &Value) -> Result<String> {
        self.engine.render(&self.name, context)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use crate::dict;
    use crate::value::Renderable;

    fn write(root: &Path, path: &str, contents: &str) {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn build(root: &Path) -> Result<TemplateSet> {
        TemplateSet::build(root, &[], &Dict::new())
    }

    #[test]
    fn partial_names_are_root_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "blog/post.hbs", "<h1>{{ title }}</h1>");
        write(dir.path(), "page.html", "{% include \"blog/post\" %}!");
        write(dir.path(), "notes.txt", "not a template");

        let set = build(dir.path()).unwrap();
        assert_eq!(set.partial_names(), vec![Arc::from("blog/post"), Arc::from("page")]);
        assert!(matches!(set.get("blog"), Some(TemplateNode::Set(_))));
        assert!(set.get("notes").is_none());
        assert_eq!(set.template("blog/post").unwrap().name(), "blog/post");

        let context = Value::from(dict!["title" => "Hi"]);
        let page = set.template("page").unwrap().render(&context).unwrap();
        assert_eq!(page, "<h1>Hi</h1>!");
    }

    #[test]
    fn includes_resolve_regardless_of_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.html", "[{% include \"z/last\" %}]");
        write(dir.path(), "z/last.html", "last");

        let set = build(dir.path()).unwrap();
        assert_eq!(set.template("a").unwrap().render(&Value::from(dict![])).unwrap(), "[last]");
    }

    #[test]
    fn duplicate_partials_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "blog/post.html", "a");
        write(dir.path(), "blog/post.hbs", "b");

        let error = build(dir.path()).unwrap_err();
        assert_eq!(error.fault(), Some(Fault::DuplicatePartial));
    }

    #[test]
    fn folder_and_template_can_share_a_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "blog/post.html", "<p>{{ title }}</p>");
        write(dir.path(), "blog.html", "<ul>{% include \"blog/post\" %}</ul>");
        write(dir.path(), "home.html", "{% include \"blog\" %}");

        let set = build(dir.path()).unwrap();
        let names: Vec<Arc<str>> = vec!["blog".into(), "blog/post".into(), "home".into()];
        assert_eq!(set.partial_names(), names);

        let blog = match set.get("blog") {
            Some(TemplateNode::Set(blog)) => blog,
            other => panic!("expected a set, found {other:?}"),
        };

        assert_eq!(blog.own_template().map(|t| t.name()), Some("blog"));
        assert!(blog.template("post").is_some());

        let context = Value::from(dict!["title" => "T"]);
        assert_eq!(set.template("blog").unwrap().render(&context).unwrap(), "<ul><p>T</p></ul>");
        assert_eq!(set.template("home").unwrap().render(&context).unwrap(), "<ul><p>T</p></ul>");
    }

    #[test]
    fn output_is_escaped_but_lazy_values_are_not() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "show.html", "{{ raw }}|{{ body }}|{{ body() }}");

        let set = build(dir.path()).unwrap();
        let context = Value::from(dict! {
            "raw" => "<b>",
            "body" => Renderable::new(|| Ok("<i>x</i>".into())),
        });

        let output = set.template("show").unwrap().render(&context).unwrap();
        assert_eq!(output, "&lt;b&gt;|<i>x</i>|<i>x</i>");
    }

    #[test]
    fn helpers_are_functions_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "t.html", "{{ shout(name) }} {{ name | shout }} {{ G.title }}");

        let shout = Helper::new("shout", |args| {
            let text = args.first().and_then(|v| v.as_str()).unwrap_or_default();
            Ok(Value::from(text.to_uppercase()))
        });

        let globals = dict!["title" => "Site"];
        let set = TemplateSet::build(dir.path(), &[shout], &globals).unwrap();
        let context = Value::from(dict!["name" => "ada"]);
        let output = set.template("t").unwrap().render(&context).unwrap();
        assert_eq!(output, "ADA ADA Site");
    }

    #[test]
    fn missing_folder_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let error = build(&dir.path().join("nope")).unwrap_err();
        assert_eq!(error.fault(), Some(Fault::NotADirectory));
    }
}
