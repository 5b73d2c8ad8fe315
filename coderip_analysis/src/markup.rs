//! Descriptor tokens embedded in function descriptions.
//!
//! Descriptions are plain text with tagged spans such as
//! `<func>onClick</func>` or `<attr>hp</attr>`. Extraction walks the markup
//! left to right and ignores everything that is not a matched span.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TAGGED_SPAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(func|class|attr)>(.*?)</(func|class|attr)>").expect("valid span regex")
});

static ANY_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?(func|class|attr)>").expect("valid tag regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenCategory {
    Function,
    Class,
    Attribute,
}

impl TokenCategory {
    pub fn tag(self) -> &'static str {
        match self {
            TokenCategory::Function => "func",
            TokenCategory::Class => "class",
            TokenCategory::Attribute => "attr",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "func" => Some(TokenCategory::Function),
            "class" => Some(TokenCategory::Class),
            "attr" => Some(TokenCategory::Attribute),
            _ => None,
        }
    }
}

impl fmt::Display for TokenCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TokenCategory::Function => "function",
            TokenCategory::Class => "class",
            TokenCategory::Attribute => "attribute",
        };
        f.write_str(label)
    }
}

/// A collectible word lifted out of description markup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DescriptorToken {
    pub category: TokenCategory,
    pub text: String,
}

impl DescriptorToken {
    pub fn new(category: TokenCategory, text: impl Into<String>) -> Self {
        Self {
            category,
            text: text.into(),
        }
    }
}

impl fmt::Display for DescriptorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>{}", self.category.tag(), self.text)
    }
}

/// Extract every matched span in order of appearance.
///
/// Spans whose closing tag differs from the opening one, or whose text is
/// blank, are skipped. Duplicates are kept; collection dedupes.
pub fn extract_tokens(markup: &str) -> Vec<DescriptorToken> {
    TAGGED_SPAN
        .captures_iter(markup)
        .filter_map(|caps| {
            let open = caps.get(1)?.as_str();
            let close = caps.get(3)?.as_str();
            if open != close {
                return None;
            }
            let category = TokenCategory::from_tag(open)?;
            let text = caps.get(2)?.as_str().trim();
            if text.is_empty() {
                return None;
            }
            Some(DescriptorToken::new(category, text))
        })
        .collect()
}

/// Strip the tags, keeping the words, for display.
pub fn plain_text(markup: &str) -> String {
    ANY_TAG.replace_all(markup, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOOR: &str = "A stubborn door. Calling <func>onCollide</func> lowers its \
        <attr>hp</attr>; a <class>Coin</class> might help. Also <attr>hp</attr>.";

    #[test]
    fn extracts_spans_in_order_with_duplicates() {
        let tokens = extract_tokens(DOOR);
        assert_eq!(
            tokens,
            vec![
                DescriptorToken::new(TokenCategory::Function, "onCollide"),
                DescriptorToken::new(TokenCategory::Attribute, "hp"),
                DescriptorToken::new(TokenCategory::Class, "Coin"),
                DescriptorToken::new(TokenCategory::Attribute, "hp"),
            ]
        );
    }

    #[test]
    fn extraction_is_idempotent() {
        assert_eq!(extract_tokens(DOOR), extract_tokens(DOOR));
    }

    #[test]
    fn mismatched_and_empty_spans_are_ignored() {
        let tokens = extract_tokens("<func>open</attr> then <class> </class> and <attr>x</attr>");
        assert_eq!(
            tokens,
            vec![DescriptorToken::new(TokenCategory::Attribute, "x")]
        );
    }

    #[test]
    fn plain_text_keeps_words() {
        assert_eq!(
            plain_text("Hits <func>onCollide</func> on <class>Letter</class>."),
            "Hits onCollide on Letter."
        );
    }

    #[test]
    fn token_display_uses_tag() {
        let token = DescriptorToken::new(TokenCategory::Function, "onTick");
        assert_eq!(token.to_string(), "<func>onTick");
        assert_eq!(TokenCategory::Attribute.to_string(), "attribute");
    }
}
