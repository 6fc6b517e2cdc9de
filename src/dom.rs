//! The already-parsed configuration tree the Compiler works from.
//!
//! The operator's XML config file is read and parsed elsewhere (out of
//! scope, per the purpose and scope of this crate); this module only
//! defines the minimal in-memory shape that a parsed `Monitoring` document
//! is handed to the compiler as. It deliberately carries no dependency on
//! any XML parsing crate.

use std::collections::HashMap;

/// One element of the parsed configuration tree: a tag name, its
/// attributes, child elements (in document order) and optional text
/// content (used by `Custom` elements, whose body is the script/command to
/// run remotely).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: HashMap<String, String>,
    pub children: Vec<Element>,
    pub text: Option<String>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Element {
            tag: tag.into(),
            attrs: HashMap::new(),
            children: Vec::new(),
            text: None,
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }
}

/// The log level declared on the `Monitoring` root, defaulting to `Info`
/// for anything other than the literal `debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Debug,
}

impl LogLevel {
    pub fn from_attr(value: Option<&str>) -> Self {
        match value {
            Some("debug") => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loglevel_defaults_to_info() {
        assert_eq!(LogLevel::from_attr(None), LogLevel::Info);
        assert_eq!(LogLevel::from_attr(Some("bogus")), LogLevel::Info);
        assert_eq!(LogLevel::from_attr(Some("debug")), LogLevel::Debug);
    }
}
