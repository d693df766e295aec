use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::aggregate::aggregate;
use crate::error::{Chainable, Fault, Result};
use crate::materialize::{copy_static, materialize};
use crate::processor::Registry;
use crate::script::ScriptHost;
use crate::time;
use crate::templating::{Helper, TemplateSet};
use crate::value::{Dict, Format, Toml, Value};

pub const DATA_DIR: &str = "data";
pub const TEMPLATES_DIR: &str = "templates";
pub const PROCESSORS_DIR: &str = "processors";
pub const STATIC_DIR: &str = "static";
pub const OUTPUT_DIR: &str = "out";
pub const SITE_SCRIPT: &str = "site";
pub const HELPERS_SCRIPT: &str = "helpers";
pub const SETTINGS_FILE: &str = "sitebake.toml";

/// The paths of a site directory, resolved against its root.
#[derive(Debug, Clone)]
pub struct SiteLayout {
    pub root: PathBuf,
    pub data: PathBuf,
    pub templates: PathBuf,
    pub site_script: PathBuf,
    pub processors: PathBuf,
    pub static_dir: PathBuf,
    pub helpers: PathBuf,
    pub settings: PathBuf,
}

impl SiteLayout {
    /// The layout of the site at `root` whose scripts use `script_ext`.
    pub fn new<P: AsRef<Path>>(root: P, script_ext: &str) -> Self {
        let root = root.as_ref().to_path_buf();
        SiteLayout {
            data: root.join(DATA_DIR),
            templates: root.join(TEMPLATES_DIR),
            site_script: root.join(format!("{SITE_SCRIPT}.{script_ext}")),
            processors: root.join(PROCESSORS_DIR),
            static_dir: root.join(STATIC_DIR),
            helpers: root.join(format!("{HELPERS_SCRIPT}.{script_ext}")),
            settings: root.join(SETTINGS_FILE),
            root,
        }
    }

    /// Resolves the layout at `root` and checks that the required paths
    /// exist, failing with [`Fault::NotASiteDirectory`] on the first that
    /// doesn't.
    pub fn check<P: AsRef<Path>>(root: P, script_ext: &str) -> Result<Self> {
        let layout = SiteLayout::new(root, script_ext);
        let required = [
            (&layout.data, true),
            (&layout.templates, true),
            (&layout.site_script, false),
        ];

        for (path, is_dir) in required {
            let found = if is_dir { path.is_dir() } else { path.is_file() };
            if !found {
                return Err(fault! {
                    Fault::NotASiteDirectory, "site directory is missing a required path",
                    "root" => layout.root.display(),
                    "missing" => path.display(),
                });
            }
        }

        Ok(layout)
    }
}

/// Options read from `sitebake.toml`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct Settings {
    /// Output directory relative to the site root.
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Values every template sees as `G`.
    #[serde(default)]
    pub globals: Dict,
}

impl Settings {
    /// Reads settings from `path`, or returns the defaults if it is absent.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Ok(Settings::default());
        }

        Toml::read(path).chain_with(|| fault! {
            Fault::MalformedData, "invalid settings file",
            "path" => path.display(),
        })
    }
}

/// The outcome of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub pages: usize,
    pub static_files: usize,
    pub output: PathBuf,
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Saved {} pages and {} static files to {}",
            self.pages, self.static_files, self.output.display())
    }
}

/// A checked site directory, ready to build.
#[derive(Debug)]
pub struct Site {
    layout: SiteLayout,
    settings: Settings,
    host: Arc<dyn ScriptHost>,
}

impl Site {
    pub fn open<P: AsRef<Path>>(root: P, host: Arc<dyn ScriptHost>) -> Result<Self> {
        let layout = SiteLayout::check(root, host.extension())?;
        let settings = Settings::read(&layout.settings)?;
        Ok(Site { layout, settings, host })
    }

    pub fn layout(&self) -> &SiteLayout {
        &self.layout
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn output_dir(&self) -> PathBuf {
        let output = self.settings.output.as_deref().unwrap_or(Path::new(OUTPUT_DIR));
        self.layout.root.join(output)
    }

    /// The processor registry for this site.
    pub fn registry(&self) -> Result<Registry> {
        Registry::discover(&self.layout.processors, self.host.clone())
    }

    /// The aggregated content of `data/`.
    pub fn data(&self) -> Result<Value> {
        aggregate(&self.registry()?, &self.layout.data)
    }

    fn helpers(&self) -> Result<Vec<Helper>> {
        if !self.layout.helpers.is_file() {
            return Ok(vec![]);
        }

        self.host.helpers(&self.layout.helpers).chain_with(|| error! {
            "failed to load template helpers",
            "path" => self.layout.helpers.display(),
        })
    }

    /// Runs the full pipeline and writes the site to the output directory.
    pub fn build(&self) -> Result<BuildReport> {
        let helpers = self.helpers()?;
        let registry = self.registry()?;
        tracing::info!(processors = registry.len(), helpers = helpers.len(), "starting build");

        let (data, templates) = rayon::join(
            || time!("aggregation", aggregate(&registry, &self.layout.data)),
            || time!("template composition", {
                TemplateSet::build(&self.layout.templates, &helpers, &self.settings.globals)
            }),
        );

        let (data, templates) = (data?, templates?);
        let assembler = self.host.assembler(&self.layout.site_script)?;
        let pages = time!("assembly", assembler.assemble(&data, &templates))
            .chain_with(|| error! {
                "site script failed",
                "path" => self.layout.site_script.display(),
            })?;

        let output = self.output_dir();
        let pages = time!("materialization", materialize(&output, &pages))?;
        let static_files = copy_static(&self.layout.static_dir, &output)?;
        tracing::info!(pages, static_files, output = %output.display(), "build finished");

        Ok(BuildReport { pages, static_files, output })
    }
}
