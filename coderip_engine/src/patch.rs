//! Validation and application of directives against live objects.

use coderip_analysis::syntax::validate_body;
use coderip_protocol::{Directive, DirectiveEdit, DirectiveGrammar, RejectedSpan};

use crate::error::PatchRejection;
use crate::events::{PatchReport, WorldEvent};
use crate::registry::PermissionLevel;
use crate::world::World;

/// Everything one agent message did to the world.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedMessage {
    pub reports: Vec<PatchReport>,
    pub malformed: Vec<RejectedSpan>,
}

impl AppliedMessage {
    pub fn applied_count(&self) -> usize {
        self.reports.iter().filter(|report| report.is_applied()).count()
    }
}

/// Check a directive and commit it if every check passes.
///
/// Checks run in order and stop at the first failure: object, function,
/// editability, fragment presence (diff only), then syntax of the new body
/// when `validate_syntax` is set. A rejected directive leaves the registry
/// unchanged.
pub fn apply_directive(world: &mut World, directive: &Directive, validate_syntax: bool) -> PatchReport {
    let object = directive.object.as_str();
    let function = directive.function.as_str();
    let report = match commit(world, directive, validate_syntax) {
        Ok(()) => {
            log::info!("patched {object}.{function}");
            world.refresh_discovery(object);
            PatchReport::applied(object, function)
        }
        Err(rejection) => {
            log::info!("rejected patch to {object}.{function}: {rejection}");
            PatchReport::rejected(object, function, rejection)
        }
    };
    world.emit(WorldEvent::Patch(report.clone()));
    report
}

fn commit(world: &mut World, directive: &Directive, validate_syntax: bool) -> Result<(), PatchRejection> {
    let object = &directive.object;
    let function = &directive.function;
    let registry = world
        .behaviors_mut(object)
        .ok_or_else(|| PatchRejection::UnknownObject {
            object: object.clone(),
        })?;
    let entry = registry
        .get(function)
        .ok_or_else(|| PatchRejection::UnknownFunction {
            object: object.clone(),
            function: function.clone(),
        })?;
    if entry.permission != PermissionLevel::Editable {
        return Err(PatchRejection::PermissionDenied {
            object: object.clone(),
            function: function.clone(),
            level: entry.permission,
        });
    }

    let (body, description) = match &directive.edit {
        DirectiveEdit::Diff { old_code, new_code } => {
            if old_code.is_empty() || !entry.body.contains(old_code.as_str()) {
                return Err(PatchRejection::FragmentNotFound {
                    object: object.clone(),
                    function: function.clone(),
                });
            }
            (entry.body.replacen(old_code.as_str(), new_code, 1), None)
        }
        DirectiveEdit::Replace { body, description } => (body.clone(), Some(description.clone())),
    };

    if validate_syntax {
        if let Err(error) = validate_body(&body) {
            return Err(PatchRejection::InvalidSyntax {
                object: object.clone(),
                function: function.clone(),
                message: error.to_string(),
            });
        }
    }

    registry.replace_body(function, body);
    if let Some(description) = description {
        registry.replace_description(function, description);
    }
    Ok(())
}

/// Extract every directive from `text` and apply them in order.
pub fn apply_agent_text(
    world: &mut World,
    grammar: &DirectiveGrammar,
    text: &str,
    validate_syntax: bool,
) -> AppliedMessage {
    let extraction = grammar.extract(text);
    for rejected in &extraction.rejected {
        log::debug!(
            "skipped malformed directive at byte {}: {}",
            rejected.offset,
            rejected.error
        );
    }
    let reports = extraction
        .directives
        .iter()
        .map(|spanned| apply_directive(world, &spanned.directive, validate_syntax))
        .collect();
    AppliedMessage {
        reports,
        malformed: extraction.rejected,
    }
}
