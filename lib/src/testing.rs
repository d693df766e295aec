//! A script host for tests that don't need a real interpreter.
//!
//! Scripts use the `fake` extension and hold JSON: evaluating one parses it.
//! A processor loaded from `process.*.fake` returns `{ raw: <file text>, by:
//! <processor file name> }`. Helper files map helper names to `"upper"` or
//! `"lower"`. The assembler is a closure set on the host, or the site
//! script's JSON when none is set.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::processor::Processor;
use crate::script::{Assemble, ScriptHost};
use crate::templating::{Helper, TemplateSet};
use crate::value::{Format, Json, Source, Value};

type AssembleFn = dyn Fn(&Value, &TemplateSet) -> Result<Value> + Send + Sync;

#[derive(Default, Clone)]
pub struct FakeHost {
    assembler: Option<Arc<AssembleFn>>,
}

impl std::fmt::Debug for FakeHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeHost").finish_non_exhaustive()
    }
}

impl FakeHost {
    pub fn assembling<F>(f: F) -> Self
        where F: Fn(&Value, &TemplateSet) -> Result<Value> + Send + Sync + 'static
    {
        FakeHost { assembler: Some(Arc::new(f)) }
    }
}

#[derive(Debug)]
struct FakeProcessor {
    name: String,
}

impl Processor for FakeProcessor {
    fn process(&self, path: &Path) -> Result<Value> {
        Ok(Value::from(crate::dict! {
            "raw" => path.read_text()?,
            "by" => self.name.as_str(),
        }))
    }
}

impl ScriptHost for FakeHost {
    fn extension(&self) -> &str {
        "fake"
    }

    fn eval(&self, path: &Path) -> Result<Value> {
        Json::parse(&path.read_text()?).map_err(Into::into)
    }

    fn processor(&self, path: &Path) -> Result<Arc<dyn Processor>> {
        let name = path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Arc::new(FakeProcessor { name }))
    }

    fn helpers(&self, path: &Path) -> Result<Vec<Helper>> {
        let table = self.eval(path)?;
        let helpers = table.as_dict()
            .into_iter()
            .flatten()
            .map(|(name, op)| {
                let upper = op.as_str() == Some("upper");
                Helper::new(name.clone(), move |args: Vec<Value>| {
                    let text = args.first().map(|v| v.to_string()).unwrap_or_default();
                    Ok(Value::from(if upper { text.to_uppercase() } else { text.to_lowercase() }))
                })
            })
            .collect();

        Ok(helpers)
    }

    fn assembler(&self, path: &Path) -> Result<Box<dyn Assemble>> {
        if let Some(f) = self.assembler.clone() {
            return Ok(Box::new(move |data: &Value, templates: &TemplateSet| f(data, templates)));
        }

        let pages = self.eval(path)?;
        Ok(Box::new(move |_: &Value, _: &TemplateSet| Ok(pages.clone())))
    }
}

/// Writes `contents` to `root/path`, creating parent directories.
pub fn write(root: &Path, path: &str, contents: &str) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}
