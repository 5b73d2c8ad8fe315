use std::{cell::RefCell, fmt, rc::Rc};

use serde::Serialize;

use crate::disclosure::FunctionInfo;
use crate::error::{ExecutionFailure, PatchRejection};

/// Outcome of one directive, success or the specific rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchReport {
    pub object: String,
    pub function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<PatchRejection>,
}

impl PatchReport {
    pub fn applied(object: &str, function: &str) -> Self {
        Self {
            object: object.to_string(),
            function: function.to_string(),
            rejection: None,
        }
    }

    pub fn rejected(object: &str, function: &str, rejection: PatchRejection) -> Self {
        Self {
            object: object.to_string(),
            function: function.to_string(),
            rejection: Some(rejection),
        }
    }

    pub fn is_applied(&self) -> bool {
        self.rejection.is_none()
    }

    pub fn acknowledgment(&self) -> String {
        match &self.rejection {
            None => format!("patched {}.{}", self.object, self.function),
            Some(rejection) => format!(
                "patch to {}.{} rejected: {rejection}",
                self.object, self.function
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorldEvent {
    Message {
        object: String,
        text: String,
    },
    ExecutionFailure(ExecutionFailure),
    Patch(PatchReport),
    /// A discovered object's card should be redrawn from this projection.
    Rerender {
        object: String,
        functions: Vec<FunctionInfo>,
    },
    ObjectSpawned {
        object: String,
        kind: String,
    },
    /// Drop any UI kept for this object.
    ObjectRemoved {
        object: String,
    },
    Unlocked {
        object: String,
        function: String,
        key: String,
    },
    KeysGranted {
        kind: String,
        count: u32,
    },
    Victory {
        object: String,
    },
}

/// Receives world events. Every method has a no-op default.
pub trait WorldObserver {
    fn on_event(&self, _event: &WorldEvent) {}
}

impl fmt::Debug for dyn WorldObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WorldObserver")
    }
}

#[derive(Clone, Default)]
pub struct RecordingObserver {
    events: Rc<RefCell<Vec<WorldEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WorldEvent> {
        self.events.borrow().clone()
    }

    /// Return and forget everything recorded so far.
    pub fn drain(&self) -> Vec<WorldEvent> {
        self.events.borrow_mut().drain(..).collect()
    }
}

impl WorldObserver for RecordingObserver {
    fn on_event(&self, event: &WorldEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_observer_keeps_order_and_drains() {
        let observer = RecordingObserver::new();
        observer.on_event(&WorldEvent::ObjectRemoved {
            object: "Coin_1".into(),
        });
        observer.on_event(&WorldEvent::Patch(PatchReport::applied("Gyro", "onClick")));
        assert_eq!(observer.events().len(), 2);

        let drained = observer.drain();
        assert_eq!(
            drained[0],
            WorldEvent::ObjectRemoved {
                object: "Coin_1".into()
            }
        );
        assert!(observer.events().is_empty());
    }

    #[test]
    fn acknowledgments_name_object_and_function() {
        assert_eq!(
            PatchReport::applied("Vault", "open").acknowledgment(),
            "patched Vault.open"
        );
        let report = PatchReport::rejected(
            "Vault",
            "open",
            PatchRejection::FragmentNotFound {
                object: "Vault".into(),
                function: "open".into(),
            },
        );
        assert!(!report.is_applied());
        assert!(report.acknowledgment().starts_with("patch to Vault.open rejected:"));
    }

    #[test]
    fn events_serialize_with_event_tag() {
        let json = serde_json::to_value(WorldEvent::Victory {
            object: "PasswordDoor".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "victory");

        let json = serde_json::to_value(WorldEvent::ObjectSpawned {
            object: "Coin_1".into(),
            kind: "Coin".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "object_spawned");
        assert_eq!(json["kind"], "Coin");

        let json = serde_json::to_value(WorldEvent::KeysGranted {
            kind: "yellow".into(),
            count: 5,
        })
        .unwrap();
        assert_eq!(json["event"], "keys_granted");
        assert_eq!(json["kind"], "yellow");
        assert_eq!(json["count"], 5);
    }
}
