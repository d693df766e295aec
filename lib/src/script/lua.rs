use std::fmt;
use std::path::Path;
use std::sync::Arc;

use mlua::{Function, Lua, MetaMethod, MultiValue, RegistryKey, Table, UserData, UserDataMethods};
use mlua::Value as LuaValue;

use crate::error::{Chainable, Result};
use crate::processor::Processor;
use crate::script::{Assemble, ScriptHost};
use crate::templating::{Helper, Template, TemplateNode, TemplateSet};
use crate::value::{Dict, Num, Renderable, Source, Value};

/// Runs site scripts in one embedded Lua 5.4 interpreter.
///
/// Scripts see a global `sitebake` table. `sitebake.markdown(text)` returns a
/// lazy Markdown renderable, which Lua can call, `tostring`, or concatenate.
pub struct LuaHost {
    lua: Lua,
}

/// A Lua function kept alive in the registry.
#[derive(Clone)]
struct LuaFunction {
    lua: Lua,
    key: Arc<RegistryKey>,
    name: Arc<str>,
}

#[derive(Clone)]
struct LuaRenderable(Renderable);

#[derive(Debug)]
struct LuaProcessor(LuaFunction);

struct LuaAssembler(LuaFunction);

impl LuaHost {
    pub fn new() -> Result<Self> {
        let lua = Lua::new();
        let api = lua.create_table()?;
        api.set("markdown", lua.create_function(|_, text: String| {
            Ok(LuaRenderable(Renderable::markdown(text)))
        })?)?;

        lua.globals().set("sitebake", api)?;
        Ok(LuaHost { lua })
    }

    fn load(&self, path: &Path) -> Result<LuaValue> {
        let source = path.read_text()?;
        let value = self.lua.load(&*source)
            .set_name(format!("@{}", path.display()))
            .eval::<LuaValue>()
            .chain_with(|| error! {
                "failed to evaluate script",
                "path" => path.display(),
            })?;

        Ok(value)
    }

    fn load_function(&self, path: &Path) -> Result<LuaFunction> {
        match self.load(path)? {
            LuaValue::Function(f) => Ok(LuaFunction::new(&self.lua, f, &path.display().to_string())?),
            other => err! {
                "script must evaluate to a function",
                "path" => path.display(),
                "found" => other.type_name(),
            }
        }
    }
}

impl fmt::Debug for LuaHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LuaHost").finish_non_exhaustive()
    }
}

impl ScriptHost for LuaHost {
    fn extension(&self) -> &str {
        "lua"
    }

    fn eval(&self, path: &Path) -> Result<Value> {
        let value = self.load(path)?;
        Ok(from_lua(&self.lua, value)?)
    }

    fn processor(&self, path: &Path) -> Result<Arc<dyn Processor>> {
        Ok(Arc::new(LuaProcessor(self.load_function(path)?)))
    }

    fn helpers(&self, path: &Path) -> Result<Vec<Helper>> {
        let table = match self.load(path)? {
            LuaValue::Table(table) => table,
            other => return err! {
                "helpers script must evaluate to a table of functions",
                "path" => path.display(),
                "found" => other.type_name(),
            }
        };

        let mut helpers = vec![];
        for pair in table.pairs::<String, Function>() {
            let (name, function) = pair.chain_with(|| error! {
                "helpers must map names to functions",
                "path" => path.display(),
            })?;

            let function = LuaFunction::new(&self.lua, function, &name)?;
            helpers.push(Helper::new(name, move |args| function.call_with_values(&args)));
        }

        Ok(helpers)
    }

    fn assembler(&self, path: &Path) -> Result<Box<dyn Assemble>> {
        Ok(Box::new(LuaAssembler(self.load_function(path)?)))
    }
}

impl LuaFunction {
    fn new(lua: &Lua, function: Function, name: &str) -> mlua::Result<Self> {
        Ok(LuaFunction {
            lua: lua.clone(),
            key: Arc::new(lua.create_registry_value(function)?),
            name: name.into(),
        })
    }

    fn call(&self, args: impl mlua::IntoLuaMulti) -> Result<LuaValue> {
        let function: Function = self.lua.registry_value(&self.key)?;
        function.call::<LuaValue>(args).chain_with(|| error! {
            "lua function failed",
            "function" => &self.name,
        })
    }

    fn call_with_values(&self, args: &[Value]) -> Result<Value> {
        let args = args.iter()
            .map(|v| to_lua(&self.lua, v))
            .collect::<mlua::Result<Vec<_>>>()?;

        let output = self.call(MultiValue::from_vec(args))?;
        Ok(from_lua(&self.lua, output)?)
    }
}

impl fmt::Debug for LuaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LuaFunction").field(&self.name).finish()
    }
}

impl Processor for LuaProcessor {
    fn process(&self, path: &Path) -> Result<Value> {
        let output = self.0.call(path.display().to_string())?;
        Ok(from_lua(&self.0.lua, output)?)
    }
}

impl Assemble for LuaAssembler {
    fn assemble(&self, data: &Value, templates: &TemplateSet) -> Result<Value> {
        let lua = &self.0.lua;
        let data = to_lua(lua, data)?;
        let templates = templates_to_lua(lua, templates)?;
        let output = self.0.call((data, templates))?;
        Ok(from_lua(lua, output)?)
    }
}

impl LuaRenderable {
    fn text(&self) -> mlua::Result<String> {
        self.0.force()
            .map(|text| text.to_string())
            .map_err(|e| mlua::Error::runtime(e.to_string()))
    }
}

impl UserData for LuaRenderable {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Call, |_, this, _: MultiValue| this.text());
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| this.text());
        methods.add_meta_function(MetaMethod::Concat, |_, (a, b): (LuaValue, LuaValue)| {
            Ok(format!("{}{}", concat_text(&a)?, concat_text(&b)?))
        });
    }
}

fn concat_text(value: &LuaValue) -> mlua::Result<String> {
    match value {
        LuaValue::String(s) => Ok(s.to_string_lossy().to_string()),
        LuaValue::Integer(i) => Ok(i.to_string()),
        LuaValue::Number(n) => Ok(n.to_string()),
        LuaValue::UserData(ud) => ud.borrow::<LuaRenderable>()?.text(),
        other => Err(mlua::Error::runtime(format!("cannot concatenate a {}", other.type_name()))),
    }
}

fn from_lua(lua: &Lua, value: LuaValue) -> mlua::Result<Value> {
    let value = match value {
        LuaValue::Nil => Value::Null,
        LuaValue::Boolean(b) => Value::from(b),
        LuaValue::Integer(i) => Value::from(i),
        LuaValue::Number(n) => Value::from(n),
        LuaValue::String(s) => Value::from(s.to_string_lossy().to_string()),
        LuaValue::Table(table) => table_to_value(lua, table)?,
        LuaValue::Function(f) => {
            let function = LuaFunction::new(lua, f, "<data>")?;
            Value::Lazy(Renderable::new(move || {
                let output = function.call(())?;
                Ok(from_lua(&function.lua, output)?.to_string())
            }))
        }
        LuaValue::UserData(ud) => match ud.borrow::<LuaRenderable>() {
            Ok(renderable) => Value::Lazy(renderable.0.clone()),
            Err(_) => return Err(mlua::Error::runtime("unsupported userdata in data")),
        },
        other => return Err(mlua::Error::runtime(format!(
            "a lua {} cannot be used as data", other.type_name()
        ))),
    };

    Ok(value)
}

/// Tables with a sequence part become arrays; all others become dicts.
fn table_to_value(lua: &Lua, table: Table) -> mlua::Result<Value> {
    let len = table.raw_len();
    if len > 0 {
        return (1..=len)
            .map(|i| from_lua(lua, table.raw_get::<LuaValue>(i)?))
            .collect::<mlua::Result<Vec<_>>>()
            .map(Value::from);
    }

    let mut dict: Dict = Dict::new();
    for pair in table.pairs::<LuaValue, LuaValue>() {
        let (key, value) = pair?;
        let key: Arc<str> = match key {
            LuaValue::String(s) => s.to_string_lossy().to_string().into(),
            LuaValue::Integer(i) => i.to_string().into(),
            LuaValue::Number(n) => n.to_string().into(),
            other => return Err(mlua::Error::runtime(format!(
                "a lua {} cannot be used as a key", other.type_name()
            ))),
        };

        dict.insert(key, from_lua(lua, value)?);
    }

    Ok(Value::from(dict))
}

fn to_lua(lua: &Lua, value: &Value) -> mlua::Result<LuaValue> {
    let value = match value {
        Value::Null => LuaValue::Nil,
        Value::Bool(b) => LuaValue::Boolean(*b),
        Value::Num(Num::Int(i)) => LuaValue::Integer(*i),
        Value::Num(Num::UInt(u)) => match i64::try_from(*u) {
            Ok(i) => LuaValue::Integer(i),
            Err(_) => LuaValue::Number(*u as f64),
        },
        Value::Num(Num::Float(f)) => LuaValue::Number(*f),
        Value::String(s) => LuaValue::String(lua.create_string(&**s)?),
        Value::Array(array) => {
            let table = lua.create_table_with_capacity(array.len(), 0)?;
            for (i, value) in array.iter().enumerate() {
                table.raw_set(i + 1, to_lua(lua, value)?)?;
            }

            LuaValue::Table(table)
        }
        Value::Dict(dict) => {
            let table = lua.create_table_with_capacity(0, dict.len())?;
            for (key, value) in dict.iter() {
                table.raw_set(&**key, to_lua(lua, value)?)?;
            }

            LuaValue::Table(table)
        }
        Value::Lazy(renderable) => {
            LuaValue::UserData(lua.create_userdata(LuaRenderable(renderable.clone()))?)
        }
    };

    Ok(value)
}

/// Template sets become nested tables; templates become functions of their
/// context returning the rendered string.
fn render_fn(lua: &Lua, template: &Template) -> mlua::Result<Function> {
    let template = template.clone();
    lua.create_function(move |lua, context: LuaValue| {
        let context = from_lua(lua, context)?;
        template.render(&context).map_err(|e| mlua::Error::runtime(e.to_string()))
    })
}

/// A set with its own template is a table that can also be called:
/// `templates.blog(ctx)` renders `blog.html`, `templates.blog.post(ctx)`
/// renders `blog/post.html`.
fn templates_to_lua(lua: &Lua, set: &TemplateSet) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    for (name, node) in set.iter() {
        match node {
            TemplateNode::Set(set) => table.raw_set(&**name, templates_to_lua(lua, set)?)?,
            TemplateNode::Template(template) => table.raw_set(&**name, render_fn(lua, template)?)?,
        }
    }

    if let Some(template) = set.own_template() {
        let template = template.clone();
        let call = lua.create_function(move |lua, (_, context): (Table, LuaValue)| {
            let context = from_lua(lua, context)?;
            template.render(&context).map_err(|e| mlua::Error::runtime(e.to_string()))
        })?;

        let meta = lua.create_table()?;
        meta.raw_set("__call", call)?;
        table.set_metatable(Some(meta))?;
    }

    Ok(table)
}

impl_error_detail_with_std_error!(mlua::Error);
