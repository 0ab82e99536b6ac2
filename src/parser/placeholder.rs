use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no value provided for placeholder {prefix}{name}{suffix}")]
pub struct MissingPlaceholder {
    pub name: String,
    pub prefix: String,
    pub suffix: String,
}

/// Replaces `${name}` references in script text before it is parsed.
#[derive(Debug, Clone)]
pub struct PlaceholderReplacer {
    values: BTreeMap<String, String>,
    prefix: String,
    suffix: String,
}

impl PlaceholderReplacer {
    pub fn new(values: BTreeMap<String, String>, prefix: &str, suffix: &str) -> Self {
        Self {
            values,
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        }
    }

    pub fn with_value(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }

    pub fn replace(&self, text: &str) -> Result<String, MissingPlaceholder> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(open) = rest.find(&self.prefix) {
            let after_prefix = &rest[open + self.prefix.len()..];
            let Some(close) = after_prefix.find(&self.suffix) else {
                break;
            };
            let name = &after_prefix[..close];
            let value = self.values.get(name).ok_or_else(|| MissingPlaceholder {
                name: name.to_string(),
                prefix: self.prefix.clone(),
                suffix: self.suffix.clone(),
            })?;
            out.push_str(&rest[..open]);
            out.push_str(value);
            rest = &after_prefix[close + self.suffix.len()..];
        }

        out.push_str(rest);
        Ok(out)
    }
}
