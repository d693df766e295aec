use std::{fs, io};
use std::path::{Path, PathBuf};
use std::fmt::Debug;

use crate::error::{Result, Chainable};
use crate::value::Value;

/// Something text values can be written to.
pub trait Sink: Debug {
    fn write<V: Into<Value>>(&self, value: V) -> Result<()> {
        self.write_value(&value.into())
    }

    fn write_value(&self, value: &Value) -> Result<()>;
}

impl Sink for fs::File {
    fn write_value(&self, value: &Value) -> Result<()> {
        use io::Write;

        let text = match value {
            Value::Null => return Ok(()),
            Value::String(s) => s.clone(),
            Value::Lazy(r) => r.force()?,
            _ => return err! {
                "only text can be written to a file",
                "value kind" => value.kind(),
            }
        };

        let mut file = io::BufWriter::new(self);
        file.write_all(text.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

impl Sink for &Path {
    fn write_value(&self, value: &Value) -> Result<()> {
        fs::File::create(self)
            .chain(error! {
                "failed to open/create file for writing",
                "file path" => self.display()
            })?
            .write_value(value)
    }
}

impl Sink for PathBuf {
    fn write_value(&self, value: &Value) -> Result<()> {
        self.as_path().write_value(value)
    }
}
