use std::sync::Arc;
use std::collections::BTreeMap;

use minijinja::{AutoEscape, Environment, Error, ErrorKind};
use minijinja::value::{Rest, Value};

use crate::error::Result;
use crate::templating::Helper;
use crate::value::{self, Dict};

/// A frozen minijinja environment holding every partial of a template set.
#[derive(Debug)]
pub struct Engine {
    env: Environment<'static>,
}

fn to_template_error(error: crate::error::Error) -> Error {
    Error::new(ErrorKind::InvalidOperation, error.to_string())
}

impl Engine {
    pub(crate) fn new(
        partials: BTreeMap<Arc<str>, Arc<str>>,
        helpers: &[Helper],
        globals: &Dict,
    ) -> Result<Self> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env.set_formatter(|out, state, value| {
            if let Some(lazy) = value.downcast_object_ref::<value_object::Lazy>() {
                let text = lazy.0.force().map_err(to_template_error)?;
                return out.write_str(&text)
                    .map_err(|e| Error::new(ErrorKind::WriteFailure, e.to_string()));
            }

            minijinja::escape_formatter(out, state, value)
        });

        for (name, source) in partials {
            env.add_template_owned(name.to_string(), source.to_string())?;
        }

        env.add_global("G", Value::from(value::Value::Dict(Arc::new(globals.clone()))));
        env.add_function("now", ext::now);
        env.add_filter("deslug", ext::deslug);
        env.add_filter("date", ext::date);
        env.add_filter("split", ext::split);

        for helper in helpers {
            tracing::debug!(name = %helper.name, "registering template helper");
            let (function, filter) = (helper.clone(), helper.clone());
            env.add_function(helper.name.to_string(), move |args: Rest<Value>| {
                call_helper(&function, args)
            });

            env.add_filter(helper.name.to_string(), move |args: Rest<Value>| {
                call_helper(&filter, args)
            });
        }

        Ok(Engine { env })
    }

    pub fn render(&self, name: &str, context: &value::Value) -> Result<String> {
        let context = match context {
            value::Value::Null => Value::from(value::Value::Dict(Arc::default())),
            context => Value::from(context.clone()),
        };

        let template = self.env.get_template(name)?;
        Ok(template.render(context)?)
    }
}

fn call_helper(helper: &Helper, args: Rest<Value>) -> Result<Value, Error> {
    let args = args.0.iter().map(value::Value::from).collect();
    helper.call(args)
        .map(Value::from)
        .map_err(|e| Error::new(
            ErrorKind::InvalidOperation,
            format!("helper `{}` failed:\n{e}", helper.name)
        ))
}

mod ext {
    use chrono::{NaiveDate, NaiveTime, NaiveDateTime, DateTime, Utc};
    use minijinja::{value::Value, Error, ErrorKind};

    pub fn deslug(value: &str) -> String {
        value.replace('-', " ")
    }

    pub fn date(value: Value, fmt: &str) -> Result<Value, Error> {
        if let Ok(ts) = i64::try_from(value.clone()) {
            let datetime = DateTime::from_timestamp(ts, 0)
                .ok_or_else(|| Error::new(
                    ErrorKind::InvalidOperation,
                    "invalid timestamp provided to `date`"
                ))?;

            return Ok(datetime.format(fmt).to_string().into());
        }

        let kind = value.kind();
        let attr = value.get_attr("$__toml_private_datetime");
        let string = attr.as_ref()
            .ok()
            .filter(|v| !v.is_undefined())
            .map_or_else(|| value.as_str(), |v| v.as_str())
            .ok_or_else(|| Error::new(
                ErrorKind::InvalidOperation,
                format!("`date` must be applied to a string or integer, found {kind}")
            ))?;

        let datetime = string.parse::<NaiveDate>().map(|d| d.format(fmt).to_string())
            .or_else(|_| string.parse::<NaiveTime>().map(|t| t.format(fmt).to_string()))
            .or_else(|_| string.parse::<NaiveDateTime>().map(|dt| dt.format(fmt).to_string()))
            .or_else(|_| string.parse::<DateTime<Utc>>().map(|dt| dt.format(fmt).to_string()))
            .map_err(|e| Error::new(
                ErrorKind::InvalidOperation,
                format!("failed to parse {string}: {e}")
            ))?;

        Ok(datetime.into())
    }

    pub fn split(value: &str, pat: &str, n: Option<usize>) -> Value {
        match n {
            Some(n) => value.split(pat).nth(n).map(Value::from).unwrap_or(Value::UNDEFINED),
            None => value.split(pat).map(Value::from).collect::<Vec<_>>().into(),
        }
    }

    pub fn now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs())
    }
}

mod value_object {
    use std::fmt;
    use std::sync::Arc;

    use minijinja::{Error, ErrorKind, State};
    use minijinja::value::{Enumerator, Object, ObjectRepr, Value};

    use crate::value;

    #[derive(Debug)]
    pub struct Dict(pub Arc<value::Dict>);

    #[derive(Debug)]
    pub struct Array(pub Arc<Vec<value::Value>>);

    /// A lazy renderable. Prints unescaped and can be called for its text.
    #[derive(Debug)]
    pub struct Lazy(pub value::Renderable);

    impl Object for Dict {
        fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
            self.0.get(key.as_str()?)
                .cloned()
                .map(Value::from)
        }

        fn enumerate(self: &Arc<Self>) -> Enumerator {
            Enumerator::Values(self.0.keys().map(|k| Value::from(&**k)).collect())
        }
    }

    impl Object for Array {
        fn repr(self: &Arc<Self>) -> ObjectRepr {
            ObjectRepr::Seq
        }

        fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
            self.0.get(key.as_usize()?)
                .cloned()
                .map(Value::from)
        }

        fn enumerate(self: &Arc<Self>) -> Enumerator {
            Enumerator::Seq(self.0.len())
        }
    }

    impl Object for Lazy {
        fn repr(self: &Arc<Self>) -> ObjectRepr {
            ObjectRepr::Plain
        }

        fn call(self: &Arc<Self>, _: &State<'_, '_>, _: &[Value]) -> Result<Value, Error> {
            let text = self.0.force()
                .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;

            Ok(Value::from_safe_string(text.to_string()))
        }

        fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result
            where Self: Sized + 'static
        {
            let text = self.0.force().map_err(|_| fmt::Error)?;
            f.write_str(&text)
        }
    }

    impl From<value::Value> for Value {
        fn from(value: value::Value) -> Self {
            use crate::value::{Num, Value as V};

            match value {
                V::Null => Value::from(()),
                V::Bool(b) => Value::from(b),
                V::Num(Num::Int(n)) => Value::from(n),
                V::Num(Num::UInt(n)) => Value::from(n),
                V::Num(Num::Float(n)) => Value::from(n),
                V::String(s) => Value::from(&*s),
                V::Array(a) => Value::from_object(Array(a)),
                V::Dict(d) => Value::from_object(Dict(d)),
                V::Lazy(r) => Value::from_object(Lazy(r)),
            }
        }
    }

    impl From<&Value> for value::Value {
        fn from(value: &Value) -> Self {
            use minijinja::value::ValueKind;

            if let Some(lazy) = value.downcast_object_ref::<Lazy>() {
                return value::Value::Lazy(lazy.0.clone());
            } else if let Some(dict) = value.downcast_object_ref::<Dict>() {
                return value::Value::Dict(dict.0.clone());
            } else if let Some(array) = value.downcast_object_ref::<Array>() {
                return value::Value::Array(array.0.clone());
            }

            match value.kind() {
                ValueKind::Undefined | ValueKind::None => value::Value::Null,
                ValueKind::Bool => value.is_true().into(),
                ValueKind::Number => match i64::try_from(value.clone()) {
                    Ok(n) => n.into(),
                    Err(_) => f64::try_from(value.clone())
                        .map(value::Value::from)
                        .unwrap_or(value::Value::Null),
                },
                ValueKind::Seq | ValueKind::Iterable => match value.try_iter() {
                    Ok(iter) => iter.map(|v| value::Value::from(&v)).collect(),
                    Err(_) => value::Value::Null,
                },
                ValueKind::Map => {
                    let mut dict: value::Dict = value::Dict::new();
                    if let Ok(keys) = value.try_iter() {
                        for key in keys {
                            let item = value.get_item(&key).unwrap_or(Value::UNDEFINED);
                            dict.insert(key.to_string().into(), value::Value::from(&item));
                        }
                    }

                    value::Value::from(dict)
                }
                _ => match value.as_str() {
                    Some(s) => s.into(),
                    None => value.to_string().into(),
                },
            }
        }
    }
}

impl_error_detail_with_std_error!(minijinja::Error);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict;

    fn engine(partials: &[(&str, &str)]) -> Engine {
        let partials = partials.iter()
            .map(|(k, v)| (Arc::from(*k), Arc::from(*v)))
            .collect();

        Engine::new(partials, &[], &Dict::new()).unwrap()
    }

    #[test]
    fn iterates_dicts_and_arrays() {
        let engine = engine(&[(
            "list",
            "{% for k in d %}{{ k }}={{ d[k] }};{% endfor %}{% for x in a %}{{ x }}{% endfor %}{{ a|length }}",
        )]);

        let context = value::Value::from(dict! {
            "d" => dict!["a" => 1, "b" => "two"],
            "a" => vec![1, 2, 3],
        });

        assert_eq!(engine.render("list", &context).unwrap(), "a=1;b=two;1233");
    }

    #[test]
    fn builtin_filters() {
        let engine = engine(&[(
            "t",
            "{{ slug | deslug }}|{{ 86400 | date(\"%Y-%m-%d\") }}|{{ \"2024-03-01\" | date(\"%d.%m\") }}|{{ \"a,b,c\" | split(\",\", 1) }}",
        )]);

        let context = value::Value::from(dict!["slug" => "hello-world"]);
        assert_eq!(engine.render("t", &context).unwrap(), "hello world|1970-01-02|01.03|b");
    }

    #[test]
    fn helper_errors_surface() {
        let failing = Helper::new("boom", |_| Err(error!("kaboom")));
        let partials = [(Arc::from("t"), Arc::from("{{ boom() }}"))].into_iter().collect();
        let engine = Engine::new(partials, &[failing], &Dict::new()).unwrap();

        let error = engine.render("t", &value::Value::Null).unwrap_err();
        assert!(error.to_string().contains("kaboom"));
    }

    #[test]
    fn helper_arguments_round_trip_values() {
        let echo = Helper::new("kinds", |args| {
            Ok(args.iter().map(|v| v.kind()).collect::<Vec<_>>().join(",").into())
        });

        let partials = [(Arc::from("t"), Arc::from("{{ kinds(1, 2.5, 'x', none, d, [1], body) }}"))]
            .into_iter()
            .collect();

        let engine = Engine::new(partials, &[echo], &Dict::new()).unwrap();
        let context = value::Value::from(dict! {
            "d" => dict!["k" => true],
            "body" => value::Renderable::markdown("x"),
        });

        assert_eq!(
            engine.render("t", &context).unwrap(),
            "number,number,string,null,dict,array,lazy"
        );
    }
}
