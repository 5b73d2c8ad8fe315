pub mod config;
pub mod dialogue;
pub mod disclosure;
pub mod discovery;
pub mod entitlement;
pub mod error;
pub mod events;
pub mod game;
pub mod inventory;
pub mod patch;
pub mod registry;
pub mod script_host;
pub mod world;

pub use config::GameConfig;
pub use game::{Game, TurnOutcome};
pub use registry::PermissionLevel;
pub use world::World;
