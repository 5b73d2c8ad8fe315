//! Patch directive grammar shared by the engine and its tooling.
//!
//! A directive is a call-like token embedded in free-form agent text:
//!
//! ```text
//! Patch("PiggyBank", "onClick", ```old fragment```, ```new fragment```)
//! ```
//!
//! Object and function names may be quoted with `"`, `'` or `` ` ``. Code
//! payloads use a triple-backtick fence so they can carry any quote
//! character; a plain quote is accepted when the payload does not contain it.
//! The extractor walks the text left to right and keeps going past malformed
//! spans, so one broken directive never hides the ones after it.

mod grammar;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Keyword used when the deployment does not configure its own.
pub const DEFAULT_KEYWORD: &str = "Patch";

/// Delimiter reserved for code payloads.
pub const CODE_FENCE: &str = "```";

/// Quote characters accepted around names and descriptions.
pub const NAME_QUOTES: [char; 3] = ['"', '\'', '`'];

/// Meaning of the third and fourth directive arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrammarVariant {
    /// `(object, function, old_code, new_code)`: substring replacement.
    #[default]
    Diff,
    /// `(object, function, new_body, description?)`: whole-body replacement.
    Replace,
}

impl GrammarVariant {
    pub fn from_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "diff" => Some(GrammarVariant::Diff),
            "replace" => Some(GrammarVariant::Replace),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GrammarVariant::Diff => "diff",
            GrammarVariant::Replace => "replace",
        }
    }
}

/// The requested change carried by a directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum DirectiveEdit {
    Diff {
        old_code: String,
        new_code: String,
    },
    Replace {
        body: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        description: Option<String>,
    },
}

/// A parsed patch request. Lives only for one apply attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub object: String,
    pub function: String,
    pub edit: DirectiveEdit,
}

impl Directive {
    pub fn diff(
        object: impl Into<String>,
        function: impl Into<String>,
        old_code: impl Into<String>,
        new_code: impl Into<String>,
    ) -> Self {
        Self {
            object: object.into(),
            function: function.into(),
            edit: DirectiveEdit::Diff {
                old_code: old_code.into(),
                new_code: new_code.into(),
            },
        }
    }

    pub fn replace(
        object: impl Into<String>,
        function: impl Into<String>,
        body: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            object: object.into(),
            function: function.into(),
            edit: DirectiveEdit::Replace {
                body: body.into(),
                description,
            },
        }
    }

    pub fn variant(&self) -> GrammarVariant {
        match self.edit {
            DirectiveEdit::Diff { .. } => GrammarVariant::Diff,
            DirectiveEdit::Replace { .. } => GrammarVariant::Replace,
        }
    }
}

/// A directive together with the byte span it occupied in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpannedDirective {
    pub directive: Directive,
    pub start: usize,
    pub end: usize,
}

/// A keyword occurrence that looked like a directive but did not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedSpan {
    pub offset: usize,
    pub error: ProtocolError,
}

/// Everything found in one message, in order of appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub directives: Vec<SpannedDirective>,
    pub rejected: Vec<RejectedSpan>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty() && self.rejected.is_empty()
    }

    pub fn into_directives(self) -> Vec<Directive> {
        self.directives
            .into_iter()
            .map(|spanned| spanned.directive)
            .collect()
    }
}

/// Reasons a directive span could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("expected '(' after the directive keyword at byte {0}")]
    MissingOpenParen(usize),
    #[error("expected {expected} at byte {offset}")]
    Expected {
        expected: &'static str,
        offset: usize,
    },
    #[error("unterminated {what} starting at byte {offset}")]
    Unterminated { what: &'static str, offset: usize },
    #[error("argument {index} must not be empty")]
    EmptyArgument { index: usize },
    #[error("unexpected extra argument at byte {0}")]
    TrailingArgument(usize),
}

/// Directive scanner configured for one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveGrammar {
    keyword: String,
    variant: GrammarVariant,
}

impl Default for DirectiveGrammar {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORD, GrammarVariant::default())
    }
}

impl DirectiveGrammar {
    pub fn new(keyword: impl Into<String>, variant: GrammarVariant) -> Self {
        Self {
            keyword: keyword.into(),
            variant,
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn variant(&self) -> GrammarVariant {
        self.variant
    }

    /// Scan `text` left to right for directives.
    pub fn extract(&self, text: &str) -> Extraction {
        let mut extraction = Extraction::default();
        if self.keyword.is_empty() {
            return extraction;
        }

        let mut resume_at = 0usize;
        for (start, _) in text.match_indices(self.keyword.as_str()) {
            if start < resume_at || !grammar::is_keyword_boundary(text, start, self.keyword.len()) {
                continue;
            }
            match grammar::parse_directive(text, start, self.keyword.len(), self.variant) {
                Ok((directive, end)) => {
                    extraction.directives.push(SpannedDirective {
                        directive,
                        start,
                        end,
                    });
                    resume_at = end;
                }
                Err(error) => extraction.rejected.push(RejectedSpan {
                    offset: start,
                    error,
                }),
            }
        }
        extraction
    }

    /// Parse a single directive that must start exactly at `start`.
    pub fn parse_at(&self, text: &str, start: usize) -> Result<(Directive, usize), ProtocolError> {
        let Some(rest) = text.get(start..) else {
            return Err(ProtocolError::Expected {
                expected: "directive keyword",
                offset: start,
            });
        };
        if !rest.starts_with(self.keyword.as_str()) {
            return Err(ProtocolError::Expected {
                expected: "directive keyword",
                offset: start,
            });
        }
        grammar::parse_directive(text, start, self.keyword.len(), self.variant)
    }

    /// Example line shown to the agent in its briefing.
    pub fn usage(&self) -> String {
        match self.variant {
            GrammarVariant::Diff => format!(
                "{}(\"ObjectName\", \"functionName\", {fence}old code fragment{fence}, {fence}new code fragment{fence})",
                self.keyword,
                fence = CODE_FENCE
            ),
            GrammarVariant::Replace => format!(
                "{}(\"ObjectName\", \"functionName\", {fence}complete new body{fence}, \"optional new description\")",
                self.keyword,
                fence = CODE_FENCE
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff_grammar() -> DirectiveGrammar {
        DirectiveGrammar::new("Patch", GrammarVariant::Diff)
    }

    fn replace_grammar() -> DirectiveGrammar {
        DirectiveGrammar::new("Patch", GrammarVariant::Replace)
    }

    #[test]
    fn extracts_single_diff_directive_with_fenced_code() {
        let text = "Sure, let me fix that.\nPatch(\"Vault\", \"open\", ```if (x>0)```, ```if (x>=0)```)\nDone!";
        let extraction = diff_grammar().extract(text);
        assert!(extraction.rejected.is_empty());
        assert_eq!(
            extraction.into_directives(),
            vec![Directive::diff("Vault", "open", "if (x>0)", "if (x>=0)")]
        );
    }

    #[test]
    fn names_accept_every_quote_style() {
        let text = "Patch('Gyro', `onClick`, \"a\", \"b\") and Patch(`Gyro`, 'onClick', 'c', 'd')";
        let directives = diff_grammar().extract(text).into_directives();
        assert_eq!(directives.len(), 2);
        assert_eq!(directives[0], Directive::diff("Gyro", "onClick", "a", "b"));
        assert_eq!(directives[1], Directive::diff("Gyro", "onClick", "c", "d"));
    }

    #[test]
    fn fenced_code_keeps_embedded_quotes_and_newlines() {
        let text = "Patch(\"PiggyBank\", \"onClick\", ```lua\nsay(\"one coin\")\n```, ```\nfor i = 1, 10 do\n  say('coin ' .. i)\nend\n```)";
        let directives = diff_grammar().extract(text).into_directives();
        assert_eq!(
            directives,
            vec![Directive::diff(
                "PiggyBank",
                "onClick",
                "say(\"one coin\")",
                "for i = 1, 10 do\n  say('coin ' .. i)\nend"
            )]
        );
    }

    #[test]
    fn plain_quoted_code_may_span_lines() {
        let text = "Patch(\"Gyro\", \"onClick\", \"self.rotation = 0\nsay('x')\", \"self.rotation = 1\")";
        let directives = diff_grammar().extract(text).into_directives();
        assert_eq!(
            directives,
            vec![Directive::diff(
                "Gyro",
                "onClick",
                "self.rotation = 0\nsay('x')",
                "self.rotation = 1"
            )]
        );
    }

    #[test]
    fn malformed_span_is_skipped_and_later_directives_survive() {
        let text = "First Patch(\"Gyro\", \"onClick\" oops) then Patch(\"Gyro\", \"onClick\", ```a```, ```b```)";
        let extraction = diff_grammar().extract(text);
        assert_eq!(extraction.rejected.len(), 1);
        assert_eq!(extraction.rejected[0].offset, text.find("Patch").unwrap());
        assert_eq!(extraction.directives.len(), 1);
        assert_eq!(
            extraction.directives[0].directive,
            Directive::diff("Gyro", "onClick", "a", "b")
        );
    }

    #[test]
    fn keyword_inside_identifier_is_ignored() {
        let text = "call MyPatch(\"a\", \"b\", ```c```, ```d```) or Patches please";
        let extraction = diff_grammar().extract(text);
        assert!(extraction.is_empty());
    }

    #[test]
    fn mention_without_parenthesis_is_reported_not_applied() {
        let text = "I will use Patch to change it: Patch (\"Gyro\", \"onClick\", ```a```, ```b```)";
        let extraction = diff_grammar().extract(text);
        assert_eq!(extraction.directives.len(), 1);
        assert_eq!(extraction.rejected.len(), 1);
        assert!(matches!(
            extraction.rejected[0].error,
            ProtocolError::MissingOpenParen(_)
        ));
    }

    #[test]
    fn diff_variant_requires_four_arguments() {
        let text = "Patch(\"Gyro\", \"onClick\", ```a```)";
        let extraction = diff_grammar().extract(text);
        assert!(extraction.directives.is_empty());
        assert_eq!(extraction.rejected.len(), 1);
    }

    #[test]
    fn diff_variant_rejects_empty_old_code() {
        let text = "Patch(\"Gyro\", \"onClick\", ``````, ```b```)";
        let extraction = diff_grammar().extract(text);
        assert_eq!(
            extraction.rejected[0].error,
            ProtocolError::EmptyArgument { index: 3 }
        );
    }

    #[test]
    fn replace_variant_description_is_optional() {
        let text = "Patch(\"Gyro\", \"onClick\", ```self.rotation = 0```)\nPatch(\"Gyro\", \"onClick\", ```self.rotation = 1```, \"<func>reset</func> the <attr>rotation</attr>\")";
        let directives = replace_grammar().extract(text).into_directives();
        assert_eq!(
            directives,
            vec![
                Directive::replace("Gyro", "onClick", "self.rotation = 0", None),
                Directive::replace(
                    "Gyro",
                    "onClick",
                    "self.rotation = 1",
                    Some("<func>reset</func> the <attr>rotation</attr>".to_string())
                ),
            ]
        );
    }

    #[test]
    fn replace_variant_rejects_a_fifth_argument() {
        let text = "Patch(\"Gyro\", \"onClick\", ```a```, \"desc\", \"extra\")";
        let extraction = replace_grammar().extract(text);
        assert!(extraction.directives.is_empty());
        assert!(matches!(
            extraction.rejected[0].error,
            ProtocolError::TrailingArgument(_)
        ));
    }

    #[test]
    fn unterminated_fence_is_rejected() {
        let text = "Patch(\"Gyro\", \"onClick\", ```a, ```b)";
        let extraction = diff_grammar().extract(text);
        assert!(extraction.directives.is_empty());
        assert!(!extraction.rejected.is_empty());
    }

    #[test]
    fn parse_at_reports_end_offset() {
        let text = "xx Patch(\"A\", \"f\", ```a```, ```b```) yy";
        let (directive, end) = diff_grammar().parse_at(text, 3).expect("directive parsed");
        assert_eq!(directive.object, "A");
        assert_eq!(&text[end..], " yy");
    }

    #[test]
    fn custom_keyword_and_multibyte_text() {
        let grammar = DirectiveGrammar::new("AlexEdit", GrammarVariant::Diff);
        let text = "好的，我来修改：AlexEdit(\"存钱罐\", \"onClick\", ```a```, ```b```) 完成";
        let directives = grammar.extract(text).into_directives();
        assert_eq!(directives, vec![Directive::diff("存钱罐", "onClick", "a", "b")]);
    }

    #[test]
    fn directive_serializes_with_style_tag() {
        let directive = Directive::replace("Gyro", "onClick", "return 1", None);
        let json = serde_json::to_value(&directive).expect("serializes");
        assert_eq!(json["edit"]["style"], "replace");
        assert_eq!(json["edit"]["body"], "return 1");
        assert!(json["edit"].get("description").is_none());
    }

    #[test]
    fn variant_labels_round_trip() {
        for variant in [GrammarVariant::Diff, GrammarVariant::Replace] {
            assert_eq!(GrammarVariant::from_label(variant.label()), Some(variant));
        }
        assert_eq!(GrammarVariant::from_label(" Replace "), Some(GrammarVariant::Replace));
        assert_eq!(GrammarVariant::from_label("regex"), None);
    }
}
