//! Host functions visible to behavior bodies.
//!
//! Every world change a body asks for is queued as a [`WorldMutation`]; the
//! world applies the queue only after the call returns without error.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use mlua::{Error as LuaError, Lua, Result as LuaResult, Table, Value, Variadic};
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::values::{describe_value, lua_to_state, value_to_f64, write_state};
use super::{ObjectView, WorldMutation};
use crate::world::kinds::ObjectKind;

pub(crate) struct ScriptContext {
    caller: Option<String>,
    pending: Vec<WorldMutation>,
    views: BTreeMap<String, ObjectView>,
    rng: StdRng,
    spawn_serial: u64,
}

impl ScriptContext {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            caller: None,
            pending: Vec::new(),
            views: BTreeMap::new(),
            rng: StdRng::seed_from_u64(seed),
            spawn_serial: 0,
        }
    }

    pub(crate) fn begin_call(&mut self, caller: &str) {
        self.caller = Some(caller.to_string());
        self.pending.clear();
    }

    pub(crate) fn finish_call(&mut self) -> Vec<WorldMutation> {
        self.caller = None;
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn set_views(&mut self, views: BTreeMap<String, ObjectView>) {
        self.views = views;
    }

    pub(crate) fn view(&self, name: &str) -> Option<&ObjectView> {
        self.views.get(name)
    }

    fn caller(&self) -> LuaResult<String> {
        self.caller
            .clone()
            .ok_or_else(|| LuaError::RuntimeError("host function called outside a behavior".into()))
    }

    fn push(&mut self, mutation: WorldMutation) {
        self.pending.push(mutation);
    }

    fn is_known(&self, name: &str) -> bool {
        self.views.contains_key(name)
            || self.pending.iter().any(
                |mutation| matches!(mutation, WorldMutation::Spawn { name: spawned, .. } if spawned == name),
            )
    }

    fn reserve_name(&mut self, kind: ObjectKind) -> String {
        loop {
            self.spawn_serial += 1;
            let name = format!("{}_{}", kind.label(), self.spawn_serial);
            if !self.is_known(&name) {
                return name;
            }
        }
    }
}

pub(crate) fn view_table<'lua>(lua: &'lua Lua, view: &ObjectView) -> LuaResult<Table<'lua>> {
    let table = lua.create_table()?;
    write_state(lua, &table, &view.state)?;
    table.set("name", view.name.as_str())?;
    table.set("kind", view.kind.as_str())?;
    Ok(table)
}

fn number_arg(value: Option<&Value>, function: &str, index: usize) -> LuaResult<f64> {
    value.and_then(value_to_f64).ok_or_else(|| {
        LuaError::RuntimeError(format!("{function}: argument {index} must be a number"))
    })
}

fn name_arg(value: Option<&Value>, function: &str) -> LuaResult<String> {
    match value {
        Some(Value::String(text)) => Ok(text.to_str()?.to_string()),
        Some(Value::Table(table)) => table.get::<_, String>("name"),
        _ => Err(LuaError::RuntimeError(format!(
            "{function}: expected an object name"
        ))),
    }
}

pub(crate) fn install_host_api(lua: &Lua, context: Rc<RefCell<ScriptContext>>) -> LuaResult<()> {
    let globals = lua.globals();

    let say_context = context.clone();
    globals.set(
        "say",
        lua.create_function(move |_, args: Variadic<Value>| {
            let text = args.iter().map(describe_value).collect::<Vec<_>>().join(" ");
            let mut ctx = say_context.borrow_mut();
            let object = ctx.caller()?;
            ctx.push(WorldMutation::Message { object, text });
            Ok(())
        })?,
    )?;

    let print_context = context.clone();
    globals.set(
        "print",
        lua.create_function(move |_, args: Variadic<Value>| {
            let text = args.iter().map(describe_value).collect::<Vec<_>>().join("\t");
            let caller = print_context.borrow().caller.clone().unwrap_or_default();
            log::debug!(target: "coderip::script", "[{caller}] {text}");
            Ok(())
        })?,
    )?;

    let key_context = context.clone();
    globals.set(
        "give_key",
        lua.create_function(move |_, (kind, count): (String, Option<u32>)| {
            key_context.borrow_mut().push(WorldMutation::GrantKey {
                kind,
                count: count.unwrap_or(1),
            });
            Ok(())
        })?,
    )?;

    let spawn_context = context.clone();
    globals.set(
        "spawn",
        lua.create_function(move |_, args: Variadic<Value>| -> LuaResult<String> {
            let label = match args.first() {
                Some(Value::String(text)) => text.to_str()?.to_string(),
                _ => return Err(LuaError::RuntimeError("spawn: expected a kind name".into())),
            };
            let kind = ObjectKind::from_label(&label)
                .ok_or_else(|| LuaError::RuntimeError(format!("spawn: unknown kind '{label}'")))?;
            let x = number_arg(args.get(1), "spawn", 2)?;
            let y = number_arg(args.get(2), "spawn", 3)?;
            let mut ctx = spawn_context.borrow_mut();
            let name = ctx.reserve_name(kind);
            ctx.push(WorldMutation::Spawn {
                name: name.clone(),
                kind,
                x,
                y,
            });
            Ok(name)
        })?,
    )?;

    let destroy_context = context.clone();
    globals.set(
        "destroy",
        lua.create_function(move |_, args: Variadic<Value>| {
            let name = name_arg(args.first(), "destroy")?;
            let mut ctx = destroy_context.borrow_mut();
            if !ctx.is_known(&name) {
                return Ok(false);
            }
            ctx.push(WorldMutation::Destroy { name });
            Ok(true)
        })?,
    )?;

    let find_context = context.clone();
    globals.set(
        "find",
        lua.create_function(move |lua_ctx, name: String| -> LuaResult<Value> {
            let ctx = find_context.borrow();
            match ctx.view(&name) {
                Some(view) => Ok(Value::Table(view_table(lua_ctx, view)?)),
                None => Ok(Value::Nil),
            }
        })?,
    )?;

    let objects_context = context.clone();
    globals.set(
        "objects",
        lua.create_function(move |lua_ctx, kind: Option<String>| -> LuaResult<Value> {
            let ctx = objects_context.borrow();
            let list = lua_ctx.create_table()?;
            let matching = ctx.views.values().filter(|view| {
                kind.as_deref()
                    .map_or(true, |kind| view.kind.eq_ignore_ascii_case(kind))
            });
            for (index, view) in matching.enumerate() {
                list.set(index + 1, view_table(lua_ctx, view)?)?;
            }
            Ok(Value::Table(list))
        })?,
    )?;

    let move_context = context.clone();
    globals.set(
        "move",
        lua.create_function(move |_, args: Variadic<Value>| {
            let name = name_arg(args.first(), "move")?;
            let x = number_arg(args.get(1), "move", 2)?;
            let y = number_arg(args.get(2), "move", 3)?;
            move_context
                .borrow_mut()
                .push(WorldMutation::Move { name, x, y });
            Ok(())
        })?,
    )?;

    let field_context = context.clone();
    globals.set(
        "set_field",
        lua.create_function(move |_, args: Variadic<Value>| {
            let name = name_arg(args.first(), "set_field")?;
            let key = match args.get(1) {
                Some(Value::String(text)) => text.to_str()?.to_string(),
                _ => {
                    return Err(LuaError::RuntimeError(
                        "set_field: expected a field name".into(),
                    ))
                }
            };
            let value = args.get(2).and_then(lua_to_state);
            field_context
                .borrow_mut()
                .push(WorldMutation::SetField { name, key, value });
            Ok(())
        })?,
    )?;

    let random_context = context.clone();
    globals.set(
        "random",
        lua.create_function(move |_, (low, high): (f64, Option<f64>)| {
            let (low, high) = match high {
                Some(high) => (low, high),
                None => (0.0, low),
            };
            if !(high - low).is_finite() {
                return Err(LuaError::RuntimeError(format!(
                    "random: bounds must be finite, got {low}..{high}"
                )));
            }
            if low > high {
                return Err(LuaError::RuntimeError(format!(
                    "random: empty range {low}..{high}"
                )));
            }
            let mut ctx = random_context.borrow_mut();
            if low.fract() == 0.0 && high.fract() == 0.0 {
                Ok(ctx.rng.gen_range(low as i64..=high as i64) as f64)
            } else {
                Ok(ctx.rng.gen_range(low..=high))
            }
        })?,
    )?;

    globals.set(
        "dist",
        lua.create_function(|_, (x1, y1, x2, y2): (f64, f64, f64, f64)| {
            Ok((x2 - x1).hypot(y2 - y1))
        })?,
    )?;

    let win_context = context;
    globals.set(
        "win",
        lua.create_function(move |_, ()| {
            let mut ctx = win_context.borrow_mut();
            let object = ctx.caller()?;
            ctx.push(WorldMutation::Win { object });
            Ok(())
        })?,
    )?;

    Ok(())
}
