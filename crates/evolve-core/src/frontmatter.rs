use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontMatterError {
    #[error("front-matter is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("front-matter must be a mapping of fields")]
    NotAMapping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrontMatterValue {
    Scalar(String),
    List(Vec<String>),
}

impl FrontMatterValue {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(value) => Some(value.as_str()),
            Self::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::Scalar(_) => None,
            Self::List(items) => Some(items.as_slice()),
        }
    }

    fn from_yaml(value: Value) -> Self {
        match value {
            Value::Sequence(items) => Self::List(items.into_iter().map(render_scalar).collect()),
            other => Self::Scalar(render_scalar(other)),
        }
    }
}

impl fmt::Display for FrontMatterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(value) => f.write_str(value),
            Self::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

pub type FrontMatter = BTreeMap<String, FrontMatterValue>;

/// The raw text between the opening and closing `---` fences, or `None` when
/// the file does not start with a closed block.
fn front_matter_block(content: &str) -> Option<&str> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some(&rest[..offset]);
        }
        offset += line.len();
    }
    None
}

/// Parses the YAML metadata block at the top of a markdown file.
///
/// `Ok(None)` means the file has no front-matter at all. Sequences become
/// [`FrontMatterValue::List`]; every other value is kept as its scalar text,
/// with `null` as the empty string.
pub fn parse_front_matter(content: &str) -> Result<Option<FrontMatter>, FrontMatterError> {
    let Some(block) = front_matter_block(content) else {
        return Ok(None);
    };

    let mapping = match serde_yaml::from_str::<Value>(block)? {
        Value::Null => return Ok(Some(FrontMatter::new())),
        Value::Mapping(mapping) => mapping,
        _ => return Err(FrontMatterError::NotAMapping),
    };

    let fields = mapping
        .into_iter()
        .map(|(key, value)| (render_scalar(key), FrontMatterValue::from_yaml(value)))
        .collect();
    Ok(Some(fields))
}

fn render_scalar(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(value) => value.to_string(),
        Value::Number(value) => value.to_string(),
        Value::String(value) => value,
        Value::Tagged(tagged) => render_scalar(tagged.value),
        nested => serde_yaml::to_string(&nested)
            .map(|text| text.trim_end().to_owned())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalars_inline_and_block_lists() {
        let content = r#"---
name: "pb-start"
title: Start a feature
model_hint: sonnet
last_reviewed: 2026-01-15
tags: [workflow, "planning"]
related_commands:
  - pb-plan
  - pb-review
# comment
---
# Body
"#;

        let fields = parse_front_matter(content)
            .expect("valid yaml")
            .expect("front matter");
        assert_eq!(
            fields.get("name").and_then(FrontMatterValue::as_scalar),
            Some("pb-start")
        );
        assert_eq!(
            fields.get("last_reviewed").and_then(FrontMatterValue::as_scalar),
            Some("2026-01-15")
        );
        assert_eq!(
            fields.get("tags").and_then(FrontMatterValue::as_list),
            Some(&["workflow".to_owned(), "planning".to_owned()][..])
        );
        assert_eq!(
            fields
                .get("related_commands")
                .map(ToString::to_string)
                .as_deref(),
            Some("[pb-plan, pb-review]")
        );
        assert!(!fields.contains_key("# Body"));
    }

    #[test]
    fn missing_or_unclosed_block_is_none() {
        assert!(parse_front_matter("# Title\nbody\n").expect("no yaml").is_none());
        assert!(
            parse_front_matter("---\nname: x\nno closing\n")
                .expect("no yaml")
                .is_none()
        );
    }

    #[test]
    fn null_values_and_empty_blocks_are_empty() {
        let fields = parse_front_matter("---\nsummary:\nname: a\n---\n")
            .expect("valid yaml")
            .expect("front matter");
        assert_eq!(
            fields.get("summary"),
            Some(&FrontMatterValue::Scalar(String::new()))
        );

        let empty = parse_front_matter("---\n---\nbody\n")
            .expect("valid yaml")
            .expect("front matter");
        assert!(empty.is_empty());
    }

    #[test]
    fn numbers_and_booleans_keep_their_text() {
        let fields = parse_front_matter("---\nversion: 2\ndeprecated: false\n---\n")
            .expect("valid yaml")
            .expect("front matter");
        assert_eq!(fields["version"], FrontMatterValue::Scalar("2".to_owned()));
        assert_eq!(
            fields["deprecated"],
            FrontMatterValue::Scalar("false".to_owned())
        );
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(matches!(
            parse_front_matter("---\nname: [unclosed\n---\n"),
            Err(FrontMatterError::Yaml(_))
        ));
        assert!(matches!(
            parse_front_matter("---\n- just\n- a list\n---\n"),
            Err(FrontMatterError::NotAMapping)
        ));
    }
}
