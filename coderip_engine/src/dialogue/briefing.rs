//! System briefing sent ahead of every agent call.

use coderip_analysis::syntax::summarize_body;
use coderip_protocol::{DirectiveGrammar, GrammarVariant};

use crate::disclosure::{DescriptionView, FunctionInfo};
use crate::registry::PermissionLevel;
use crate::world::World;

const WORLD_CHANGING_CALLS: &[&str] = &["spawn", "destroy", "move", "set_field", "win"];

const NOTHING_DISCOVERED: &str =
    "Nothing has been discovered yet. Wait for the player to inspect an object.";

/// Build the briefing from the live world. Every discovered object is
/// projected again so permission changes since the last turn show up.
pub fn build_briefing(persona: &str, grammar: &DirectiveGrammar, world: &World) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "You are {persona}, an assistant helping the player escape a room whose \
         objects are driven by Lua code.\n\n"
    ));
    out.push_str("# What you can do\n");
    out.push_str("1. Read the code the player has discovered.\n");
    out.push_str("2. Explain how the objects behave.\n");
    out.push_str("3. Change editable functions by writing directives.\n\n");

    out.push_str("# Directive usage\n");
    out.push_str(&format!("{}\n", grammar.usage()));
    match grammar.variant() {
        GrammarVariant::Diff => out.push_str(
            "- The old fragment must match the current body exactly; only its first \
             occurrence is replaced.\n- Large changes can be split over several directives.\n",
        ),
        GrammarVariant::Replace => out.push_str(
            "- The body replaces the whole function; the description is optional \
             markup with <func>, <class> and <attr> tags.\n",
        ),
    }
    out.push_str(
        "- Write directives directly in the reply, not inside a code block.\n\
         - Every directive is acknowledged with success or the reason it was rejected.\n\n",
    );

    out.push_str("# Rules\n");
    out.push_str(&format!(
        "1. Only {} functions (level {}) can be changed.\n",
        PermissionLevel::Editable,
        PermissionLevel::Editable.level()
    ));
    out.push_str(&format!(
        "2. Bodies are visible from level {} ({}).\n",
        PermissionLevel::Readable.level(),
        PermissionLevel::Readable
    ));
    out.push_str(&format!(
        "3. Names are visible from level {} ({}); sealed names show only their first letter.\n",
        PermissionLevel::NamedOnly.level(),
        PermissionLevel::NamedOnly
    ));
    out.push_str("4. Agree on a change with the player before making it.\n\n");

    out.push_str("# Goal\nHelp the player open the password door, by its password or by wearing its hp down to zero.\n\n");

    out.push_str("# Discovered code\n");
    let mut any = false;
    for name in world.discoveries().names() {
        let Some(entity) = world.object(name) else {
            continue;
        };
        let Some(functions) = world.project(name) else {
            continue;
        };
        any = true;
        out.push_str(&format!("\n## {} ({})\n", entity.name, entity.kind.label()));
        for info in &functions {
            write_function(&mut out, info);
        }
    }
    if !any {
        out.push_str(NOTHING_DISCOVERED);
        out.push('\n');
    }

    let keys = world.inventory().keys();
    if !keys.is_empty() {
        out.push_str("\n# Player keys\n");
        for (kind, count) in keys {
            out.push_str(&format!("- {kind}: {count}\n"));
        }
    }
    out
}

fn write_function(out: &mut String, info: &FunctionInfo) {
    out.push_str(&format!(
        "\nfunction: {}\npermission: {} ({})\n",
        info.display_name,
        info.permission.level(),
        info.permission
    ));
    match &info.description {
        Some(DescriptionView::Markup { markup, .. }) => {
            out.push_str(&format!("description: {markup}\n"))
        }
        Some(DescriptionView::Missing) => out.push_str("description: (none)\n"),
        None => {}
    }
    if let Some(body) = &info.body {
        out.push_str(&format!("body:\n```lua\n{body}\n```\n"));
        if let Ok(summary) = summarize_body(body) {
            if !summary.calls.is_empty() {
                out.push_str(&format!("calls: {}\n", summary.calls.join(", ")));
            }
            if !summary.writes.is_empty() {
                let fields: Vec<&str> = summary.writes.iter().map(String::as_str).collect();
                out.push_str(&format!("writes: self.{}\n", fields.join(", self.")));
            }
            if summary.calls_any(WORLD_CHANGING_CALLS) {
                out.push_str("note: this function changes other objects\n");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::world::kinds::ObjectKind;

    fn grammar() -> DirectiveGrammar {
        DirectiveGrammar::new("Patch", GrammarVariant::Diff)
    }

    #[test]
    fn empty_world_says_nothing_is_discovered() {
        let world = World::new(&WorldConfig::default()).unwrap();
        let briefing = build_briefing("Alex", &grammar(), &world);
        assert!(briefing.starts_with("You are Alex"));
        assert!(briefing.contains("Patch(\"ObjectName\""));
        assert!(briefing.contains(NOTHING_DISCOVERED));
        assert!(briefing.contains("# Directive usage\n"));
        assert!(!briefing.contains("# Player keys"));
    }

    #[test]
    fn only_inspected_objects_are_listed_and_sealed_bodies_stay_hidden() {
        let mut world = World::new(&WorldConfig::default()).unwrap();
        world.add_object(ObjectKind::Vault, None, 10.0, 10.0).unwrap();
        world.add_object(ObjectKind::Gyro, None, 50.0, 50.0).unwrap();
        world.inspect("Vault").unwrap();

        let briefing = build_briefing("Alex", &grammar(), &world);
        assert!(briefing.contains("## Vault (Vault)"));
        assert!(briefing.contains("function: o***"));
        assert!(!briefing.contains("tonumber"));
        assert!(!briefing.contains("## Gyro"));
    }

    #[test]
    fn readable_bodies_are_fenced_with_their_calls() {
        let mut world = World::new(&WorldConfig::default()).unwrap();
        world.add_object(ObjectKind::PiggyBank, None, 10.0, 10.0).unwrap();
        world.inspect("PiggyBank").unwrap();

        let briefing = build_briefing("Alex", &grammar(), &world);
        assert!(briefing.contains("function: onClick"));
        assert!(briefing.contains("```lua\n"));
        assert!(briefing.contains("calls: "));
        assert!(briefing.contains("spawn"));
        assert!(briefing.contains("note: this function changes other objects"));
    }
}
