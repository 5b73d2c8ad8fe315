//! Lua interpreter boundary for behavior bodies.
//!
//! A body is stored as a bare chunk. Each call wraps it in a function taking
//! `self` plus positional arguments, runs it against a copy of the object's
//! state, and hands the new state and the queued world mutations back to the
//! caller. Nothing a failed call did survives it.

mod bindings;
mod values;

pub use values::{ObjectState, StateValue};

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::{Context, Result};
use mlua::{
    Error as LuaError, Function, HookTriggers, Lua, LuaOptions, MultiValue, Result as LuaResult,
    StdLib, Table, Value,
};
use serde::Serialize;

use crate::error::ExecutionFailure;
use crate::world::kinds::ObjectKind;
use bindings::{install_host_api, view_table, ScriptContext};
use values::{lua_to_state, state_to_lua, write_state};

/// Instructions between two budget checks.
const HOOK_INTERVAL: u32 = 1000;

/// Loaders and environment access, plus `pcall`/`xpcall`: a caught budget
/// error would let a body keep looping forever.
const REMOVED_GLOBALS: &[&str] = &[
    "pcall",
    "xpcall",
    "dofile",
    "loadfile",
    "load",
    "loadstring",
    "require",
    "module",
    "collectgarbage",
    "getfenv",
    "setfenv",
];

/// Read-only snapshot of a live object, as seen by `find` and `objects`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectView {
    pub name: String,
    pub kind: String,
    pub state: ObjectState,
}

/// A world change requested by a behavior, applied after the call.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldMutation {
    Spawn {
        name: String,
        kind: ObjectKind,
        x: f64,
        y: f64,
    },
    Destroy {
        name: String,
    },
    Move {
        name: String,
        x: f64,
        y: f64,
    },
    SetField {
        name: String,
        key: String,
        value: Option<StateValue>,
    },
    GrantKey {
        kind: String,
        count: u32,
    },
    Message {
        object: String,
        text: String,
    },
    Win {
        object: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptArg {
    Value(StateValue),
    /// Passed to the body as a snapshot table of the named object.
    Object(String),
}

#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub object: &'a str,
    pub kind: &'a str,
    pub function: &'a str,
    pub body: &'a str,
    pub state: &'a ObjectState,
    pub args: &'a [ScriptArg],
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvocationOutcome {
    pub state: ObjectState,
    pub mutations: Vec<WorldMutation>,
    pub result: Option<StateValue>,
}

pub struct ScriptHost {
    lua: Lua,
    context: Rc<RefCell<ScriptContext>>,
    remaining: Rc<Cell<u32>>,
    budget_checks: u32,
}

impl std::fmt::Debug for ScriptHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHost")
            .field("budget_checks", &self.budget_checks)
            .finish_non_exhaustive()
    }
}

impl ScriptHost {
    /// `instruction_budget` bounds every call; `seed` drives `random()`.
    pub fn new(seed: u64, instruction_budget: u32) -> Result<Self> {
        let lua = Lua::new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH,
            LuaOptions::default(),
        )
        .context("initialising Lua runtime with restricted libraries")?;
        let globals = lua.globals();
        for name in REMOVED_GLOBALS {
            globals
                .set(*name, Value::Nil)
                .with_context(|| format!("removing Lua global {name}"))?;
        }
        drop(globals);

        let context = Rc::new(RefCell::new(ScriptContext::new(seed)));
        install_host_api(&lua, context.clone()).context("installing host functions")?;

        let remaining = Rc::new(Cell::new(0u32));
        let hook_remaining = remaining.clone();
        lua.set_hook(
            HookTriggers::new().every_nth_instruction(HOOK_INTERVAL),
            move |_lua, _debug| {
                let left = hook_remaining.get();
                if left == 0 {
                    return Err(LuaError::RuntimeError(
                        "instruction budget exhausted".to_string(),
                    ));
                }
                hook_remaining.set(left - 1);
                Ok(())
            },
        );

        Ok(Self {
            lua,
            context,
            remaining,
            budget_checks: (instruction_budget / HOOK_INTERVAL).max(1),
        })
    }

    /// Replace the snapshot that `find` and `objects` read from.
    pub fn set_views(&self, views: BTreeMap<String, ObjectView>) {
        self.context.borrow_mut().set_views(views);
    }

    pub fn invoke(&self, call: Invocation<'_>) -> Result<InvocationOutcome, ExecutionFailure> {
        self.context.borrow_mut().begin_call(call.object);
        self.remaining.set(self.budget_checks);
        let result = self.run(&call);
        let mutations = self.context.borrow_mut().finish_call();
        match result {
            Ok((state, value)) => Ok(InvocationOutcome {
                state,
                mutations,
                result: value,
            }),
            Err(err) => {
                let failure = ExecutionFailure {
                    object: call.object.to_string(),
                    function: call.function.to_string(),
                    message: summarize_error(&err),
                };
                log::debug!("{failure}; dropped {} queued mutations", mutations.len());
                Err(failure)
            }
        }
    }

    fn run(&self, call: &Invocation<'_>) -> LuaResult<(ObjectState, Option<StateValue>)> {
        let source = wrap_body(call.body);
        let function: Function = self
            .lua
            .load(source.as_str())
            .set_name(format!("{}.{}", call.object, call.function))
            .eval()?;

        let this = self.lua.create_table()?;
        write_state(&self.lua, &this, call.state)?;
        this.set("name", call.object)?;
        this.set("kind", call.kind)?;

        let mut values = vec![Value::Table(this.clone())];
        for arg in call.args {
            values.push(self.arg_to_lua(arg)?);
        }
        let returned: Value = function.call(MultiValue::from_vec(values))?;
        let state = read_state(&this)?;
        Ok((state, lua_to_state(&returned)))
    }

    fn arg_to_lua<'lua>(&'lua self, arg: &ScriptArg) -> LuaResult<Value<'lua>> {
        match arg {
            ScriptArg::Value(value) => state_to_lua(&self.lua, value),
            ScriptArg::Object(name) => {
                let context = self.context.borrow();
                match context.view(name) {
                    Some(view) => Ok(Value::Table(view_table(&self.lua, view)?)),
                    None => Ok(Value::Nil),
                }
            }
        }
    }
}

/// The body sees `self`, `...` and `arg0`..`arg3`.
fn wrap_body(body: &str) -> String {
    format!("return function(self, ...) local arg0, arg1, arg2, arg3 = ...\n{body}\nend")
}

fn read_state(table: &Table) -> LuaResult<ObjectState> {
    let mut state = ObjectState::new();
    for pair in table.clone().pairs::<Value, Value>() {
        let (key, value) = pair?;
        let Value::String(key) = key else {
            continue;
        };
        let key = key.to_str()?;
        if key == "name" || key == "kind" {
            continue;
        }
        if let Some(value) = lua_to_state(&value) {
            state.insert(key.to_string(), value);
        }
    }
    Ok(state)
}

fn summarize_error(err: &LuaError) -> String {
    let text = match err {
        LuaError::CallbackError { cause, .. } => cause.to_string(),
        other => other.to_string(),
    };
    text.lines().next().unwrap_or_default().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> ScriptHost {
        ScriptHost::new(7, 50_000).expect("lua host")
    }

    fn state(fields: &[(&str, StateValue)]) -> ObjectState {
        fields
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    fn call<'a>(body: &'a str, state: &'a ObjectState, args: &'a [ScriptArg]) -> Invocation<'a> {
        Invocation {
            object: "Vault",
            kind: "Vault",
            function: "open",
            body,
            state,
            args,
        }
    }

    #[test]
    fn writes_to_self_come_back_as_state() {
        let host = host();
        let before = state(&[("hp", StateValue::Int(3))]);
        let outcome = host
            .invoke(call("self.hp = self.hp - 1\nself.label = 'door'", &before, &[]))
            .unwrap();
        assert_eq!(outcome.state.get("hp"), Some(&StateValue::Int(2)));
        assert_eq!(
            outcome.state.get("label"),
            Some(&StateValue::Text("door".into()))
        );
        assert!(!outcome.state.contains_key("name"));
    }

    #[test]
    fn positional_args_are_visible_both_ways() {
        let host = host();
        let before = ObjectState::new();
        let args = [
            ScriptArg::Value(StateValue::Int(5)),
            ScriptArg::Value(StateValue::Text("x".into())),
        ];
        let outcome = host
            .invoke(call("local a, b = ...\nreturn arg0 + a .. arg1 .. b", &before, &args))
            .unwrap();
        assert_eq!(outcome.result, Some(StateValue::Text("10xx".into())));
    }

    #[test]
    fn host_calls_are_queued_in_order() {
        let host = host();
        let before = state(&[("x", StateValue::Int(10)), ("y", StateValue::Int(20))]);
        let outcome = host
            .invoke(call(
                "local name = spawn('Coin', self.x, self.y + 5)\nsay('made', name)\ngive_key('yellow', 2)",
                &before,
                &[],
            ))
            .unwrap();
        assert_eq!(
            outcome.mutations,
            vec![
                WorldMutation::Spawn {
                    name: "Coin_1".into(),
                    kind: ObjectKind::Coin,
                    x: 10.0,
                    y: 25.0,
                },
                WorldMutation::Message {
                    object: "Vault".into(),
                    text: "made Coin_1".into(),
                },
                WorldMutation::GrantKey {
                    kind: "yellow".into(),
                    count: 2,
                },
            ]
        );
    }

    #[test]
    fn failed_call_discards_state_and_mutations() {
        let host = host();
        let before = state(&[("hp", StateValue::Int(3))]);
        let failure = host
            .invoke(call("self.hp = 0\nsay('boom')\nerror('broken')", &before, &[]))
            .unwrap_err();
        assert_eq!(failure.object, "Vault");
        assert_eq!(failure.function, "open");
        assert!(failure.message.contains("broken"));

        let outcome = host.invoke(call("say('fine')", &before, &[])).unwrap();
        assert_eq!(outcome.mutations.len(), 1);
    }

    #[test]
    fn syntax_errors_are_execution_failures() {
        let host = host();
        let before = ObjectState::new();
        let failure = host
            .invoke(call("if true then", &before, &[]))
            .unwrap_err();
        assert!(!failure.message.is_empty());
    }

    #[test]
    fn runaway_loops_hit_the_budget() {
        let host = host();
        let before = ObjectState::new();
        let failure = host.invoke(call("while true do end", &before, &[])).unwrap_err();
        assert!(failure.message.contains("instruction budget exhausted"));

        let outcome = host.invoke(call("return 1", &before, &[])).unwrap();
        assert_eq!(outcome.result, Some(StateValue::Int(1)));
    }

    #[test]
    fn budget_errors_cannot_be_caught() {
        let host = ScriptHost::new(7, 20_000).expect("lua host");
        let before = ObjectState::new();
        let failure = host
            .invoke(call(
                "while true do pcall(function() while true do end end) end",
                &before,
                &[],
            ))
            .unwrap_err();
        assert!(failure.message.contains("pcall"));

        let outcome = host
            .invoke(call("return pcall == nil and xpcall == nil", &before, &[]))
            .unwrap();
        assert_eq!(outcome.result, Some(StateValue::Bool(true)));
    }

    #[test]
    fn random_rejects_non_finite_bounds() {
        let host = host();
        let before = ObjectState::new();
        for body in [
            "return random(0/0, 1)",
            "return random(-math.huge, 0.5)",
            "return random(math.huge)",
            "return random(-1e308, 1e308)",
        ] {
            let failure = host.invoke(call(body, &before, &[])).unwrap_err();
            assert!(
                failure.message.contains("random: bounds must be finite"),
                "{body}: {}",
                failure.message
            );
        }
        let outcome = host.invoke(call("return random(2, 2)", &before, &[])).unwrap();
        assert_eq!(outcome.result, Some(StateValue::Int(2)));
    }

    #[test]
    fn loaders_are_removed() {
        let host = host();
        let before = ObjectState::new();
        let outcome = host
            .invoke(call(
                "return dofile == nil and loadstring == nil and require == nil and io == nil and os == nil",
                &before,
                &[],
            ))
            .unwrap();
        assert_eq!(outcome.result, Some(StateValue::Bool(true)));
    }

    #[test]
    fn find_and_objects_read_the_snapshot() {
        let host = host();
        let mut views = BTreeMap::new();
        for (name, kind, y) in [("Coin_1", "Coin", 5), ("Letter", "Letter", 9)] {
            views.insert(
                name.to_string(),
                ObjectView {
                    name: name.to_string(),
                    kind: kind.to_string(),
                    state: state(&[("y", StateValue::Int(y))]),
                },
            );
        }
        host.set_views(views);
        let before = ObjectState::new();
        let outcome = host
            .invoke(call(
                "local coins = objects('Coin')\nreturn #coins .. find('Letter').y .. tostring(find('Ghost'))",
                &before,
                &[],
            ))
            .unwrap();
        assert_eq!(outcome.result, Some(StateValue::Text("19nil".into())));
    }

    #[test]
    fn object_args_arrive_as_tables() {
        let host = host();
        let mut views = BTreeMap::new();
        views.insert(
            "Match_1".to_string(),
            ObjectView {
                name: "Match_1".into(),
                kind: "Match".into(),
                state: ObjectState::new(),
            },
        );
        host.set_views(views);
        let before = ObjectState::new();
        let args = [ScriptArg::Object("Match_1".into())];
        let outcome = host
            .invoke(call("destroy(arg0.name)\nreturn arg0.kind", &before, &args))
            .unwrap();
        assert_eq!(outcome.result, Some(StateValue::Text("Match".into())));
        assert_eq!(
            outcome.mutations,
            vec![WorldMutation::Destroy {
                name: "Match_1".into()
            }]
        );
    }

    #[test]
    fn seeded_random_is_reproducible_and_bounded() {
        let before = ObjectState::new();
        let body = "return random(1, 6) * 10 + random(1, 6)";
        let first = host().invoke(call(body, &before, &[])).unwrap().result;
        let second = host().invoke(call(body, &before, &[])).unwrap().result;
        assert_eq!(first, second);
        let value = first.and_then(|value| value.as_f64()).unwrap();
        assert!((11.0..=66.0).contains(&value));
    }

    #[test]
    fn unknown_spawn_kind_fails_the_call() {
        let host = host();
        let before = ObjectState::new();
        let failure = host
            .invoke(call("spawn('Dragon', 1, 2)", &before, &[]))
            .unwrap_err();
        assert!(failure.message.contains("unknown kind 'Dragon'"));
    }
}
