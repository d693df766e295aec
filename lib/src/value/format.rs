use std::borrow::Cow;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::{ErrorDetail, Result};
use crate::value::{Dict, Renderable, Source, Value};

pub trait Format: Sized {
    /// The data format's error type.
    type Error: serde::de::Error + ErrorDetail + 'static;

    /// Parses `string` as the data format `Self` as a `T` or returns an error
    /// if the `string` is an invalid `T`.
    fn from_str<T: DeserializeOwned>(string: &str) -> Result<T, Self::Error>;

    /// Parses `string` into a [`Value`]. Formats with richer documents than
    /// serde's data model can express override this.
    fn parse(string: &str) -> Result<Value, Self::Error> {
        Self::from_str(string)
    }

    fn read<I: Source, T: DeserializeOwned>(input: I) -> Result<T> {
        let input = input.read_text()?;
        Ok(Self::from_str(&input)?)
    }
}

macro_rules! impl_format {
    ($name:ident : $func:expr, $E:ty) => (
        #[derive(Debug, Copy, Clone)]
        pub struct $name;

        impl Format for $name {
            type Error = $E;

            fn from_str<T: DeserializeOwned>(s: &str) -> Result<T, $E> {
                $func(s)
            }
        }
    );
}

impl_format!(Toml: toml::from_str, toml::de::Error);
impl_format!(Json: serde_json::from_str, serde_json::Error);

/// YAML, with `!markdown`-tagged strings parsed as lazy Markdown.
///
/// An empty document parses as an empty dictionary.
#[derive(Debug, Copy, Clone)]
pub struct Yaml;

impl Format for Yaml {
    type Error = serde_yaml::Error;

    fn from_str<T: DeserializeOwned>(s: &str) -> Result<T, Self::Error> {
        serde_yaml::from_str(s)
    }

    fn parse(string: &str) -> Result<Value, Self::Error> {
        let mut document = Self::from_str::<serde_yaml::Value>(&local_markdown_tags(string))?;
        document.apply_merge()?;
        match document {
            serde_yaml::Value::Null => Ok(Value::Dict(Arc::default())),
            document => from_yaml(document),
        }
    }
}

/// Rewrites the core-schema spellings of the markdown tag, `!!markdown` and
/// `!<tag:yaml.org,2002:markdown>`, as `!markdown`. The parser drops tags
/// that aren't local, so they'd otherwise be lost.
fn local_markdown_tags(source: &str) -> Cow<'_, str> {
    const SPELLINGS: [&str; 2] = ["!<tag:yaml.org,2002:markdown>", "!!markdown"];
    const OPEN: &[char] = &[' ', '\t', '\n', '\r', ',', '[', '{', ':', '-'];
    const CLOSE: &[char] = &[' ', '\t', '\n', '\r', ',', ']', '}'];

    if !SPELLINGS.iter().any(|spelling| source.contains(spelling)) {
        return Cow::Borrowed(source);
    }

    let mut text = source.to_string();
    for spelling in SPELLINGS {
        let mut from = 0;
        while let Some(offset) = text[from..].find(spelling) {
            let (start, end) = (from + offset, from + offset + spelling.len());
            let opens = text[..start].chars().next_back().map_or(true, |c| OPEN.contains(&c));
            let closes = text[end..].chars().next().map_or(true, |c| CLOSE.contains(&c));
            if opens && closes {
                text.replace_range(start..end, "!markdown");
                from = start + "!markdown".len();
            } else {
                from = end;
            }
        }
    }

    Cow::Owned(text)
}

fn from_yaml(value: serde_yaml::Value) -> Result<Value, serde_yaml::Error> {
    use serde::de::Error;
    use serde_yaml::Value as YamlValue;

    Ok(match value {
        YamlValue::Null => Value::Null,
        YamlValue::Bool(b) => Value::from(b),
        YamlValue::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => Value::from(i),
            (_, Some(u), _) => Value::from(u),
            (_, _, Some(f)) => Value::from(f),
            _ => Value::Null,
        },
        YamlValue::String(s) => Value::from(s),
        YamlValue::Sequence(seq) => seq.into_iter()
            .map(from_yaml)
            .collect::<Result<Vec<_>, _>>()?
            .into(),
        YamlValue::Mapping(map) => {
            let mut dict: Dict = Dict::new();
            for (key, value) in map {
                let key: Arc<str> = match key {
                    YamlValue::String(s) => s.into(),
                    YamlValue::Number(n) => n.to_string().into(),
                    YamlValue::Bool(b) => b.to_string().into(),
                    other => return Err(Error::custom(format!(
                        "unsupported mapping key {other:?}; keys must be scalars"
                    ))),
                };

                dict.insert(key, from_yaml(value)?);
            }

            Value::from(dict)
        }
        YamlValue::Tagged(tagged) if tagged.tag == "markdown" => match tagged.value {
            YamlValue::String(s) => Value::Lazy(Renderable::markdown(s)),
            _ => return Err(Error::custom("`!markdown` must tag a string")),
        },
        YamlValue::Tagged(tagged) => from_yaml(tagged.value)?,
    })
}
