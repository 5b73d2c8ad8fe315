//! Live objects, their behaviors, and the loop that runs them.
//!
//! Objects live in an arena keyed by id with a name index next to it.
//! Behaviors never touch the arena directly: everything they request is
//! queued and applied once the call (or the whole tick) has finished.

pub mod kinds;
pub mod scenario;

use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::Result;

use crate::config::WorldConfig;
use crate::disclosure::{project, FunctionInfo};
use crate::discovery::{DiscoveryRecord, DiscoveryStore};
use crate::error::{ExecutionFailure, WorldError};
use crate::events::{WorldEvent, WorldObserver};
use crate::inventory::Inventory;
use crate::registry::{BehaviorEntry, BehaviorRegistry, PermissionLevel};
use crate::script_host::{
    Invocation, ObjectState, ObjectView, ScriptArg, ScriptHost, StateValue, WorldMutation,
};
use kinds::ObjectKind;

pub type ObjectId = u64;

const GEOMETRY_KEYS: [&str; 4] = ["x", "y", "width", "height"];

#[derive(Debug, Clone)]
pub struct ObjectEntity {
    pub id: ObjectId,
    pub name: String,
    pub kind: ObjectKind,
    pub state: ObjectState,
    pub behaviors: BehaviorRegistry,
}

impl ObjectEntity {
    fn number(&self, key: &str) -> f64 {
        self.state
            .get(key)
            .and_then(StateValue::as_f64)
            .unwrap_or(0.0)
    }

    pub fn x(&self) -> f64 {
        self.number("x")
    }

    pub fn y(&self) -> f64 {
        self.number("y")
    }

    pub fn width(&self) -> f64 {
        self.number("width")
    }

    pub fn height(&self) -> f64 {
        self.number("height")
    }

    pub fn is_draggable(&self) -> bool {
        self.state
            .get("draggable")
            .is_some_and(StateValue::is_truthy)
    }

    /// Centre-anchored overlap test with strict edges.
    pub fn collides_with(&self, other: &ObjectEntity) -> bool {
        let (half_w, half_h) = (self.width() / 2.0, self.height() / 2.0);
        let (other_w, other_h) = (other.width() / 2.0, other.height() / 2.0);
        self.x() - half_w < other.x() + other_w
            && self.x() + half_w > other.x() - other_w
            && self.y() - half_h < other.y() + other_h
            && self.y() + half_h > other.y() - other_h
    }

    fn outside(&self, width: f64, height: f64) -> bool {
        let (half_w, half_h) = (self.width() / 2.0, self.height() / 2.0);
        self.x() + half_w < 0.0
            || self.x() - half_w > width
            || self.y() + half_h < 0.0
            || self.y() - half_h > height
    }

    pub fn view(&self) -> ObjectView {
        ObjectView {
            name: self.name.clone(),
            kind: self.kind.label().to_string(),
            state: self.state.clone(),
        }
    }
}

/// What one `tick` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub collisions: usize,
    pub failures: usize,
    pub removed: Vec<String>,
}

#[derive(Debug)]
pub struct World {
    width: f64,
    height: f64,
    objects: BTreeMap<ObjectId, ObjectEntity>,
    by_name: BTreeMap<String, ObjectId>,
    next_id: ObjectId,
    discoveries: DiscoveryStore,
    inventory: Inventory,
    host: ScriptHost,
    observer: Option<Rc<dyn WorldObserver>>,
    pending: Vec<WorldMutation>,
    won: bool,
    ticks: u64,
}

impl World {
    /// An empty world; see [`scenario::populate_stage_one`] for the demo room.
    pub fn new(config: &WorldConfig) -> Result<Self> {
        Ok(Self {
            width: config.width,
            height: config.height,
            objects: BTreeMap::new(),
            by_name: BTreeMap::new(),
            next_id: 1,
            discoveries: DiscoveryStore::new(),
            inventory: Inventory::new(),
            host: ScriptHost::new(config.seed, config.instruction_budget)?,
            observer: None,
            pending: Vec::new(),
            won: false,
            ticks: 0,
        })
    }

    pub fn set_observer(&mut self, observer: Rc<dyn WorldObserver>) {
        self.observer = Some(observer);
    }

    pub(crate) fn emit(&self, event: WorldEvent) {
        log::debug!("world event: {event:?}");
        if let Some(observer) = self.observer.as_ref() {
            observer.on_event(&event);
        }
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn has_won(&self) -> bool {
        self.won
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub(crate) fn inventory_mut(&mut self) -> &mut Inventory {
        &mut self.inventory
    }

    pub fn discoveries(&self) -> &DiscoveryStore {
        &self.discoveries
    }

    pub fn object(&self, name: &str) -> Option<&ObjectEntity> {
        self.by_name.get(name).and_then(|id| self.objects.get(id))
    }

    fn object_mut(&mut self, name: &str) -> Option<&mut ObjectEntity> {
        let id = *self.by_name.get(name)?;
        self.objects.get_mut(&id)
    }

    /// Live objects in creation order.
    pub fn objects(&self) -> impl Iterator<Item = &ObjectEntity> {
        self.objects.values()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Build an object from its kind's profile. Without a name the kind
    /// label is used, suffixed with a number when taken.
    pub fn add_object(
        &mut self,
        kind: ObjectKind,
        name: Option<&str>,
        x: f64,
        y: f64,
    ) -> Result<String, WorldError> {
        let name = match name {
            Some(name) if self.contains(name) => {
                return Err(WorldError::NameTaken(name.to_string()))
            }
            Some(name) => name.to_string(),
            None => self.free_name(kind),
        };
        let profile = kind.profile();
        let mut state = profile.defaults;
        state.insert("x".to_string(), StateValue::Number(x));
        state.insert("y".to_string(), StateValue::Number(y));
        state.insert("width".to_string(), StateValue::Number(profile.width));
        state.insert("height".to_string(), StateValue::Number(profile.height));

        let mut behaviors = BehaviorRegistry::new();
        for template in profile.behaviors {
            behaviors.register(
                template.name,
                template.body,
                Some(template.permission),
                template.description,
            );
        }

        let id = self.next_id;
        self.next_id += 1;
        self.objects.insert(
            id,
            ObjectEntity {
                id,
                name: name.clone(),
                kind,
                state,
                behaviors,
            },
        );
        self.by_name.insert(name.clone(), id);
        Ok(name)
    }

    fn free_name(&self, kind: ObjectKind) -> String {
        let label = kind.label();
        if !self.contains(label) {
            return label.to_string();
        }
        (1..)
            .map(|index| format!("{label}_{index}"))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or_else(|| label.to_string())
    }

    /// Insert or overwrite a behavior on a live object.
    pub fn register(
        &mut self,
        object: &str,
        name: &str,
        body: &str,
        permission: Option<PermissionLevel>,
        description: Option<&str>,
    ) -> Result<(), WorldError> {
        let entity = self
            .object_mut(object)
            .ok_or_else(|| WorldError::UnknownObject(object.to_string()))?;
        entity
            .behaviors
            .register(name, body, permission, description);
        Ok(())
    }

    pub fn get(&self, object: &str, name: &str) -> Option<&BehaviorEntry> {
        self.object(object)?.behaviors.get(name)
    }

    pub(crate) fn behaviors_mut(&mut self, object: &str) -> Option<&mut BehaviorRegistry> {
        self.object_mut(object).map(|entity| &mut entity.behaviors)
    }

    pub fn project(&self, object: &str) -> Option<Vec<FunctionInfo>> {
        self.object(object).map(|entity| project(&entity.behaviors))
    }

    /// Project an object and remember the result as its discovery record.
    pub fn inspect(&mut self, object: &str) -> Result<&DiscoveryRecord, WorldError> {
        let id = *self
            .by_name
            .get(object)
            .ok_or_else(|| WorldError::UnknownObject(object.to_string()))?;
        let entity = &self.objects[&id];
        Ok(self
            .discoveries
            .refresh(&entity.name, entity.kind.label(), &entity.behaviors))
    }

    /// Re-project a discovered object and ask observers to redraw it.
    /// Objects never inspected have no card and are left alone.
    pub(crate) fn refresh_discovery(&mut self, object: &str) {
        if !self.discoveries.contains(object) {
            return;
        }
        let Some(id) = self.by_name.get(object).copied() else {
            return;
        };
        let entity = &self.objects[&id];
        let functions = self
            .discoveries
            .refresh(&entity.name, entity.kind.label(), &entity.behaviors)
            .functions
            .clone();
        self.emit(WorldEvent::Rerender {
            object: object.to_string(),
            functions,
        });
    }

    /// Run one behavior now and apply whatever it queued.
    pub fn invoke(
        &mut self,
        object: &str,
        function: &str,
        args: &[ScriptArg],
    ) -> Result<Option<StateValue>, ExecutionFailure> {
        let result = self.invoke_queued(object, function, args);
        self.apply_pending();
        result
    }

    fn invoke_queued(
        &mut self,
        object: &str,
        function: &str,
        args: &[ScriptArg],
    ) -> Result<Option<StateValue>, ExecutionFailure> {
        let outcome = match self.object(object) {
            None => Err(ExecutionFailure {
                object: object.to_string(),
                function: function.to_string(),
                message: "object does not exist".to_string(),
            }),
            Some(entity) => match entity.behaviors.get(function) {
                None => Err(ExecutionFailure {
                    object: object.to_string(),
                    function: function.to_string(),
                    message: "function does not exist".to_string(),
                }),
                Some(entry) => {
                    self.host.set_views(self.views());
                    self.host.invoke(Invocation {
                        object: &entity.name,
                        kind: entity.kind.label(),
                        function,
                        body: &entry.body,
                        state: &entity.state,
                        args,
                    })
                }
            },
        };

        match outcome {
            Ok(outcome) => {
                if let Some(entity) = self.object_mut(object) {
                    let mut state = outcome.state;
                    for key in GEOMETRY_KEYS {
                        if !state.contains_key(key) {
                            if let Some(value) = entity.state.get(key) {
                                state.insert(key.to_string(), value.clone());
                            }
                        }
                    }
                    entity.state = state;
                }
                self.pending.extend(outcome.mutations);
                Ok(outcome.result)
            }
            Err(failure) => {
                log::warn!("{failure}");
                self.emit(WorldEvent::ExecutionFailure(failure.clone()));
                Err(failure)
            }
        }
    }

    fn views(&self) -> BTreeMap<String, ObjectView> {
        self.objects
            .values()
            .map(|entity| (entity.name.clone(), entity.view()))
            .collect()
    }

    fn apply_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for mutation in pending {
            self.apply_mutation(mutation);
        }
    }

    fn apply_mutation(&mut self, mutation: WorldMutation) {
        match mutation {
            WorldMutation::Spawn { name, kind, x, y } => {
                match self.add_object(kind, Some(&name), x, y) {
                    Ok(name) => self.emit(WorldEvent::ObjectSpawned {
                        object: name,
                        kind: kind.label().to_string(),
                    }),
                    Err(err) => log::warn!("spawn skipped: {err}"),
                }
            }
            WorldMutation::Destroy { name } => {
                self.destroy(&name);
            }
            WorldMutation::Move { name, x, y } => {
                if let Some(entity) = self.object_mut(&name) {
                    entity.state.insert("x".to_string(), StateValue::Number(x));
                    entity.state.insert("y".to_string(), StateValue::Number(y));
                }
            }
            WorldMutation::SetField { name, key, value } => {
                if let Some(entity) = self.object_mut(&name) {
                    match value {
                        Some(value) => {
                            entity.state.insert(key, value);
                        }
                        None if GEOMETRY_KEYS.contains(&key.as_str()) => {}
                        None => {
                            entity.state.remove(&key);
                        }
                    }
                }
            }
            WorldMutation::GrantKey { kind, count } => {
                self.inventory.add_keys(&kind, count);
                self.emit(WorldEvent::KeysGranted { kind, count });
            }
            WorldMutation::Message { object, text } => {
                self.emit(WorldEvent::Message { object, text });
            }
            WorldMutation::Win { object } => {
                if !self.won {
                    self.won = true;
                    log::info!("victory raised by {object}");
                    self.emit(WorldEvent::Victory { object });
                }
            }
        }
    }

    /// Remove an object; its discovery record goes with it.
    pub fn destroy(&mut self, name: &str) -> bool {
        let Some(id) = self.by_name.remove(name) else {
            return false;
        };
        self.objects.remove(&id);
        self.discoveries.invalidate(name);
        self.emit(WorldEvent::ObjectRemoved {
            object: name.to_string(),
        });
        true
    }

    /// Run `onClick` with the given arguments. A no-op once the game is won
    /// or when the object has no click behavior.
    pub fn click(&mut self, object: &str, args: &[StateValue]) -> Result<(), WorldError> {
        let entity = self
            .object(object)
            .ok_or_else(|| WorldError::UnknownObject(object.to_string()))?;
        if self.won || !entity.behaviors.contains("onClick") {
            return Ok(());
        }
        let args: Vec<ScriptArg> = args.iter().cloned().map(ScriptArg::Value).collect();
        let _ = self.invoke(object, "onClick", &args);
        Ok(())
    }

    pub fn drag(&mut self, object: &str, x: f64, y: f64) -> Result<(), WorldError> {
        let won = self.won;
        let entity = self
            .object_mut(object)
            .ok_or_else(|| WorldError::UnknownObject(object.to_string()))?;
        if !entity.is_draggable() {
            return Err(WorldError::NotDraggable(object.to_string()));
        }
        if !won {
            entity.state.insert("x".to_string(), StateValue::Number(x));
            entity.state.insert("y".to_string(), StateValue::Number(y));
        }
        Ok(())
    }

    /// Advance one step: `onTick` for every object, `onCollide` for every
    /// overlapping pair (both ways), then queued mutations, then culling of
    /// objects that left the world.
    pub fn tick(&mut self) -> TickSummary {
        let mut summary = TickSummary::default();
        if self.won {
            return summary;
        }
        self.ticks += 1;

        let names: Vec<String> = self.objects.values().map(|e| e.name.clone()).collect();
        for name in &names {
            let has_tick = self
                .object(name)
                .is_some_and(|entity| entity.behaviors.contains("onTick"));
            if has_tick && self.invoke_queued(name, "onTick", &[]).is_err() {
                summary.failures += 1;
            }
        }

        let ids: Vec<ObjectId> = self.objects.keys().copied().collect();
        for (index, first) in ids.iter().enumerate() {
            for second in &ids[index + 1..] {
                let (Some(a), Some(b)) = (self.objects.get(first), self.objects.get(second)) else {
                    continue;
                };
                if !a.collides_with(b) {
                    continue;
                }
                summary.collisions += 1;
                let (a_name, b_name) = (a.name.clone(), b.name.clone());
                for (target, other) in [(&a_name, &b_name), (&b_name, &a_name)] {
                    let has_collide = self
                        .object(target)
                        .is_some_and(|entity| entity.behaviors.contains("onCollide"));
                    if has_collide
                        && self
                            .invoke_queued(target, "onCollide", &[ScriptArg::Object(other.clone())])
                            .is_err()
                    {
                        summary.failures += 1;
                    }
                }
            }
        }

        self.apply_pending();

        let (width, height) = (self.width, self.height);
        let gone: Vec<String> = self
            .objects
            .values()
            .filter(|entity| entity.outside(width, height))
            .map(|entity| entity.name.clone())
            .collect();
        for name in gone {
            self.destroy(&name);
            summary.removed.push(name);
        }
        summary
    }
}
