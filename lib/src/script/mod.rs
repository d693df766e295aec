//! The seam between the pipeline and user-supplied scripts.
//!
//! Data scripts, custom processors, template helpers, and the site assembler
//! are all loaded through a [`ScriptHost`]. The shipped host embeds Lua
//! ([`LuaHost`], behind the `plugins` feature).

#[cfg(feature = "plugins")]
mod lua;

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::processor::Processor;
use crate::templating::{Helper, TemplateSet};
use crate::value::Value;

#[cfg(feature = "plugins")]
pub use lua::LuaHost;

/// Evaluates user scripts on behalf of the build.
pub trait ScriptHost: Send + Sync + Debug {
    /// The file extension of scripts this host runs, without the dot.
    fn extension(&self) -> &str;

    /// Runs the script at `path` and returns its result as data.
    fn eval(&self, path: &Path) -> Result<Value>;

    /// Loads the script at `path`, which must evaluate to a processor.
    fn processor(&self, path: &Path) -> Result<Arc<dyn Processor>>;

    /// Loads the script at `path`, which must evaluate to a table of named
    /// helper functions.
    fn helpers(&self, path: &Path) -> Result<Vec<Helper>>;

    /// Loads the site script at `path`, which must evaluate to a function of
    /// `(data, templates)` returning the page tree.
    fn assembler(&self, path: &Path) -> Result<Box<dyn Assemble>>;
}

/// Produces the page tree from the aggregated data and the template set.
pub trait Assemble: Send + Sync {
    fn assemble(&self, data: &Value, templates: &TemplateSet) -> Result<Value>;
}

impl<F> Assemble for F
    where F: Fn(&Value, &TemplateSet) -> Result<Value> + Send + Sync
{
    fn assemble(&self, data: &Value, templates: &TemplateSet) -> Result<Value> {
        self(data, templates)
    }
}

/// The script host compiled into this build of the crate.
pub fn default_host() -> Result<Arc<dyn ScriptHost>> {
    #[cfg(feature = "plugins")]
    return Ok(Arc::new(LuaHost::new()?));

    #[cfg(not(feature = "plugins"))]
    return err!("sitebake was built without script support; enable the `plugins` feature");
}
