use std::{fs, sync::Arc};
use std::path::Path;
use std::fmt::Debug;

use crate::error::{Result, Chainable};
use crate::fstree::Entry;

/// Something text can be read from.
pub trait Source: Debug {
    fn read_text(self) -> Result<Arc<str>>;
}

impl Source for &Path {
    fn read_text(self) -> Result<Arc<str>> {
        let text = fs::read_to_string(self).chain(error! {
            "failed to read file as text",
            "file path" => self.display()
        })?;

        Ok(text.into())
    }
}

impl Source for &Entry {
    fn read_text(self) -> Result<Arc<str>> {
        self.path.as_ref().read_text()
    }
}
