use std::collections::BTreeMap;
use std::fmt;

use mlua::{Lua, Result as LuaResult, Table, Value};
use serde::{Deserialize, Serialize};

/// A primitive field of an object's state, as exchanged with Lua.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Int(i64),
    Number(f64),
    Text(String),
}

pub type ObjectState = BTreeMap<String, StateValue>;

impl StateValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Int(value) => Some(*value as f64),
            StateValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Lua truthiness: only `false` is false (absent fields are nil).
    pub fn is_truthy(&self) -> bool {
        !matches!(self, StateValue::Bool(false))
    }

    /// Parse a command-line word: integers, numbers, booleans, else text.
    pub fn parse_word(word: &str) -> Self {
        if let Ok(value) = word.parse::<i64>() {
            return StateValue::Int(value);
        }
        if let Ok(value) = word.parse::<f64>() {
            return StateValue::Number(value);
        }
        match word {
            "true" => StateValue::Bool(true),
            "false" => StateValue::Bool(false),
            _ => StateValue::Text(word.to_string()),
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Bool(value) => write!(f, "{value}"),
            StateValue::Int(value) => write!(f, "{value}"),
            StateValue::Number(value) => write!(f, "{value}"),
            StateValue::Text(value) => f.write_str(value),
        }
    }
}

pub(crate) fn state_to_lua<'lua>(lua: &'lua Lua, value: &StateValue) -> LuaResult<Value<'lua>> {
    Ok(match value {
        StateValue::Bool(value) => Value::Boolean(*value),
        StateValue::Int(value) => Value::Integer(*value as mlua::Integer),
        StateValue::Number(value) => Value::Number(*value),
        StateValue::Text(value) => Value::String(lua.create_string(value)?),
    })
}

/// Convert a Lua value back into state. Nil, tables and functions have no
/// state form and yield `None`.
pub(crate) fn lua_to_state(value: &Value) -> Option<StateValue> {
    match value {
        Value::Boolean(value) => Some(StateValue::Bool(*value)),
        Value::Integer(value) => Some(StateValue::Int(*value as i64)),
        Value::Number(value) => Some(number_to_state(*value)),
        Value::String(text) => text
            .to_str()
            .ok()
            .map(|text| StateValue::Text(text.to_string())),
        _ => None,
    }
}

fn number_to_state(value: f64) -> StateValue {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        StateValue::Int(value as i64)
    } else {
        StateValue::Number(value)
    }
}

pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => text.to_str().ok().map(|s| s.to_string()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn describe_value(value: &Value) -> String {
    if let Some(text) = value_to_string(value) {
        return text;
    }
    match value {
        Value::Nil => "nil".to_string(),
        Value::Table(_) => "<table>".to_string(),
        Value::Function(_) => "<function>".to_string(),
        _ => format!("<{}>", value.type_name()),
    }
}

pub(crate) fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Number(n) => Some(*n),
        Value::String(text) => text.to_str().ok()?.trim().parse().ok(),
        _ => None,
    }
}

/// Fill `table` with every field of `state`.
pub(crate) fn write_state<'lua>(
    lua: &'lua Lua,
    table: &Table<'lua>,
    state: &ObjectState,
) -> LuaResult<()> {
    for (key, value) in state {
        table.set(key.as_str(), state_to_lua(lua, value)?)?;
    }
    Ok(())
}
