//! Object kinds and the capability table applied when an object is built.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::registry::PermissionLevel;
use crate::script_host::StateValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    PasswordDoor,
    PiggyBank,
    Coin,
    Letter,
    Match,
    Gyro,
    Vault,
}

pub const ALL_KINDS: [ObjectKind; 7] = [
    ObjectKind::PasswordDoor,
    ObjectKind::PiggyBank,
    ObjectKind::Coin,
    ObjectKind::Letter,
    ObjectKind::Match,
    ObjectKind::Gyro,
    ObjectKind::Vault,
];

/// A behavior installed on every object of a kind.
#[derive(Debug, Clone, Copy)]
pub struct BehaviorTemplate {
    pub name: &'static str,
    pub permission: PermissionLevel,
    pub body: &'static str,
    pub description: Option<&'static str>,
}

/// What a kind brings to a freshly built object.
#[derive(Debug, Clone)]
pub struct KindProfile {
    pub width: f64,
    pub height: f64,
    pub defaults: BTreeMap<String, StateValue>,
    pub behaviors: &'static [BehaviorTemplate],
    /// Key kind that unlocks this kind's behaviors, if any fits.
    pub key: Option<&'static str>,
}

impl ObjectKind {
    pub fn label(self) -> &'static str {
        match self {
            ObjectKind::PasswordDoor => "PasswordDoor",
            ObjectKind::PiggyBank => "PiggyBank",
            ObjectKind::Coin => "Coin",
            ObjectKind::Letter => "Letter",
            ObjectKind::Match => "Match",
            ObjectKind::Gyro => "Gyro",
            ObjectKind::Vault => "Vault",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        ALL_KINDS
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(label))
    }

    pub fn profile(self) -> KindProfile {
        let (width, height) = match self {
            ObjectKind::PasswordDoor => (100.0, 150.0),
            ObjectKind::PiggyBank => (60.0, 50.0),
            ObjectKind::Coin => (20.0, 20.0),
            ObjectKind::Letter => (150.0, 200.0),
            ObjectKind::Match => (10.0, 60.0),
            ObjectKind::Gyro => (50.0, 50.0),
            ObjectKind::Vault => (80.0, 80.0),
        };
        let mut defaults = BTreeMap::new();
        defaults.insert("rotation".to_string(), StateValue::Number(0.0));
        defaults.insert("draggable".to_string(), StateValue::Bool(false));
        match self {
            ObjectKind::PasswordDoor => {
                defaults.insert("hp".to_string(), StateValue::Int(1_000_000));
                defaults.insert("password".to_string(), StateValue::Text("1211".to_string()));
            }
            ObjectKind::Coin => {
                defaults.insert("velocity".to_string(), StateValue::Number(2.0));
            }
            ObjectKind::Letter => {
                defaults.insert(
                    "text".to_string(),
                    StateValue::Text("Fire keeps you warm and lets you see clearly. The pass".into()),
                );
                defaults.insert("hidden".to_string(), StateValue::Text("word is 1211".into()));
                defaults.insert("revealed".to_string(), StateValue::Int(0));
            }
            ObjectKind::Vault => {
                defaults.insert("opened".to_string(), StateValue::Bool(false));
            }
            ObjectKind::PiggyBank | ObjectKind::Match | ObjectKind::Gyro => {}
        }
        KindProfile {
            width,
            height,
            defaults,
            behaviors: behaviors(self),
            key: match self {
                ObjectKind::Coin => None,
                _ => Some("yellow"),
            },
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn behaviors(kind: ObjectKind) -> &'static [BehaviorTemplate] {
    match kind {
        ObjectKind::PasswordDoor => DOOR,
        ObjectKind::PiggyBank => PIGGY_BANK,
        ObjectKind::Coin => COIN,
        ObjectKind::Letter => LETTER,
        ObjectKind::Match => MATCH,
        ObjectKind::Gyro => GYRO,
        ObjectKind::Vault => VAULT,
    }
}

const DOOR: &[BehaviorTemplate] = &[
    BehaviorTemplate {
        name: "onClick",
        permission: PermissionLevel::Sealed,
        body: r#"if tostring(arg0) == self.password then
  give_key("yellow", 5)
  say("Correct password! You received 5 yellow keys.")
else
  say("Wrong password!")
end"#,
        description: Some("<func>On click</func>: <func>check</func> the <attr>password</attr>"),
    },
    BehaviorTemplate {
        name: "onCollide",
        permission: PermissionLevel::Sealed,
        body: r#"self.hp = self.hp - 1
if self.hp <= 0 then
  say("The door breaks apart!")
  win()
end"#,
        description: Some("<func>On collide</func>: <attr>HP</attr> <func>decreases</func> by 1"),
    },
];

const PIGGY_BANK: &[BehaviorTemplate] = &[BehaviorTemplate {
    name: "onClick",
    permission: PermissionLevel::Editable,
    body: r#"local coin_x = self.x + random(-30, 30)
local coin_y = self.y + self.height / 2 + random(20, 50)
spawn("Coin", coin_x, coin_y)
say("A coin drops out of the piggy bank!")"#,
    description: Some("<func>On click</func>: <func>spawn</func> one <class>Coin</class>"),
}];

const COIN: &[BehaviorTemplate] = &[BehaviorTemplate {
    name: "onTick",
    permission: PermissionLevel::Readable,
    body: "self.y = self.y + self.velocity",
    description: Some("<func>Every tick</func>: <func>fall</func> by <attr>velocity</attr>"),
}];

const LETTER: &[BehaviorTemplate] = &[BehaviorTemplate {
    name: "onCollide",
    permission: PermissionLevel::Sealed,
    body: r#"local other = arg0
if other and other.kind == "Match" and self.revealed < string.len(self.hidden) then
  self.revealed = self.revealed + 1
  say("The letter reveals: " .. string.sub(self.hidden, 1, self.revealed))
  destroy(other.name)
end"#,
    description: Some("<func>On collide</func>: <func>reveal</func> <attr>hidden text</attr>"),
}];

const MATCH: &[BehaviorTemplate] = &[BehaviorTemplate {
    name: "onClick",
    permission: PermissionLevel::Editable,
    body: "self.draggable = true",
    description: Some("<func>On click</func>: set <attr>draggable</attr>"),
}];

const GYRO: &[BehaviorTemplate] = &[BehaviorTemplate {
    name: "onClick",
    permission: PermissionLevel::Editable,
    body: r#"self.rotation = self.rotation + math.pi / 2
say("The gyro turns 90 degrees.")"#,
    description: Some("<func>On click</func>: <attr>rotation</attr> <func>increases</func> by 90 degrees"),
}];

const VAULT: &[BehaviorTemplate] = &[BehaviorTemplate {
    name: "open",
    permission: PermissionLevel::Sealed,
    body: r#"local x = tonumber(arg0) or 0
if (x>0) then
  self.opened = true
  say("The vault swings open.")
end"#,
    description: Some("<func>open</func> when the <attr>dial</attr> is positive"),
}];
