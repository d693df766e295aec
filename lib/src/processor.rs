use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::{Chainable, Fault, Result};
use crate::fstree::FsTree;
use crate::script::ScriptHost;
use crate::value::{Format, Json, Renderable, Source, Toml, Value, Yaml};

/// Turns one content file into a value.
pub trait Processor: Send + Sync + Debug {
    fn process(&self, path: &Path) -> Result<Value>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DataFormat {
    Yaml,
    Json,
    Toml,
}

/// The processors every build has, consulted after the custom registry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Builtin {
    /// Structured data: the parsed document.
    Data(DataFormat),
    /// Markdown: `{ content: <lazy html> }`.
    Prose,
    /// A script in the host's language: whatever it evaluates to.
    Script,
}

impl Builtin {
    pub fn for_extension(ext: &str, script_ext: &str) -> Option<Builtin> {
        let builtin = match ext {
            "yaml" | "yml" => Builtin::Data(DataFormat::Yaml),
            "json" => Builtin::Data(DataFormat::Json),
            "toml" => Builtin::Data(DataFormat::Toml),
            "md" | "markdown" | "mdown" => Builtin::Prose,
            _ if ext == script_ext => Builtin::Script,
            _ => return None,
        };

        Some(builtin)
    }

    fn run(self, path: &Path, host: &dyn ScriptHost) -> Result<Value> {
        fn parse<F: Format>(path: &Path) -> Result<Value> {
            let text = path.read_text()?;
            F::parse(&text).chain_with(|| fault! {
                Fault::MalformedData, "failed to parse structured data",
                "path" => path.display(),
            })
        }

        match self {
            Builtin::Data(DataFormat::Yaml) => parse::<Yaml>(path),
            Builtin::Data(DataFormat::Json) => parse::<Json>(path),
            Builtin::Data(DataFormat::Toml) => parse::<Toml>(path),
            Builtin::Prose => {
                let content = Renderable::markdown(path.read_text()?);
                Ok(Value::from(crate::dict!["content" => content]))
            }
            Builtin::Script => host.eval(path),
        }
    }
}

/// Maps file extensions to processors for one build.
///
/// Custom processors are discovered once from a processors folder and the
/// registry is immutable afterwards. A custom processor supersedes the
/// built-in for its extension.
#[derive(Debug)]
pub struct Registry {
    handlers: FxHashMap<Arc<str>, Arc<dyn Processor>>,
    host: Arc<dyn ScriptHost>,
}

impl Registry {
    /// A registry with only the built-in processors.
    pub fn new(host: Arc<dyn ScriptHost>) -> Self {
        Registry { handlers: FxHashMap::default(), host }
    }

    /// Discovers custom processors in `folder`.
    ///
    /// A file named `process.<ext>[.<ext>...].<script-ext>` is loaded through
    /// `host` and registered for each listed `<ext>`. Files are visited in
    /// name order, so a later file wins a shared extension. A missing folder
    /// yields a registry with only the built-ins.
    pub fn discover<P: AsRef<Path>>(folder: P, host: Arc<dyn ScriptHost>) -> Result<Self> {
        let folder = folder.as_ref();
        let mut registry = Registry::new(host);
        if !folder.is_dir() {
            return Ok(registry);
        }

        let tree = FsTree::build(folder)?;
        for &child in &tree.root().children {
            let entry = &tree[child];
            if !entry.is_file() {
                continue;
            }

            let segments: Vec<&str> = entry.file_name.split('.').collect();
            let extensions = match segments.as_slice() {
                ["process", exts @ .., last] if *last == registry.host.extension() => exts,
                _ => continue,
            };

            if extensions.is_empty() {
                tracing::warn!(path = %entry.path.display(), "processor declares no extensions");
                continue;
            }

            let processor = registry.host.processor(&entry.path).chain_with(|| error! {
                "failed to load processor",
                "path" => entry.path.display(),
            })?;

            for ext in extensions {
                tracing::debug!(ext, path = %entry.path.display(), "registering processor");
                registry.handlers.insert((*ext).into(), processor.clone());
            }
        }

        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// The custom processor registered for `ext`, if any.
    pub fn get(&self, ext: &str) -> Option<&Arc<dyn Processor>> {
        self.handlers.get(ext)
    }

    pub fn host(&self) -> &Arc<dyn ScriptHost> {
        &self.host
    }

    /// Processes the file at `path` with the processor for its extension.
    pub fn dispatch(&self, path: &Path) -> Result<Value> {
        let ext = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
        if let Some(processor) = self.handlers.get(ext) {
            return processor.process(path).chain_with(|| error! {
                "custom processor failed",
                "path" => path.display(),
            });
        }

        match Builtin::for_extension(ext, self.host.extension()) {
            Some(builtin) => builtin.run(path, &*self.host),
            None => Err(fault! {
                Fault::UnsupportedFormat, "no processor for file",
                "path" => path.display(),
                if !ext.is_empty() => "extension" => ext,
            }),
        }
    }
}
