//! TOML run-configuration file for `monctl`, the ambient analogue of the
//! still-out-of-scope XML reader: a convenience way to describe a fleet of
//! hosts without hand-building [`crate::dom::Element`] trees in code.
//!
//! Grounded on the teacher's own `ConfigBuilder::parse_file`/
//! `parse_toml_str` (`examples/chinifabio-renoir/src/config.rs`): a
//! `serde`-derived struct, `toml::from_str`, and a `Serialization` error
//! variant wrapping the parse error.

use serde::Deserialize;

use crate::dom::Element;
use crate::error::CollectorError;

#[derive(Debug, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub loglevel: Option<String>,
    #[serde(default)]
    pub host: Vec<HostConfig>,
}

#[derive(Debug, Deserialize)]
pub struct HostConfig {
    pub address: String,
    pub port: Option<u16>,
    pub interval: Option<u32>,
    pub priority: Option<i64>,
    pub python: Option<String>,
    #[serde(default)]
    pub metric: Vec<MetricConfig>,
    #[serde(default)]
    pub custom: Vec<CustomConfig>,
}

#[derive(Debug, Deserialize)]
pub struct MetricConfig {
    pub family: String,
    pub measure: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CustomConfig {
    pub label: String,
    pub measure: String,
    #[serde(default)]
    pub diff: bool,
    pub body: String,
}

impl RunConfig {
    pub fn parse(content: &str) -> Result<Self, CollectorError> {
        toml::from_str(content).map_err(|e| CollectorError::Configuration(e.to_string()))
    }

    pub fn read_file(path: impl AsRef<std::path::Path>) -> Result<Self, CollectorError> {
        let content = std::fs::read_to_string(path).map_err(CollectorError::Io)?;
        Self::parse(&content)
    }

    /// Translate into the `Host` element list `compiler::compile` expects.
    pub fn to_hosts(&self) -> Vec<Element> {
        self.host.iter().map(HostConfig::to_element).collect()
    }
}

impl HostConfig {
    fn to_element(&self) -> Element {
        let mut el = Element::new("Host").with_attr("address", self.address.clone());
        if let Some(port) = self.port {
            el = el.with_attr("port", port.to_string());
        }
        if let Some(interval) = self.interval {
            el = el.with_attr("interval", interval.to_string());
        }
        if let Some(priority) = self.priority {
            el = el.with_attr("priority", priority.to_string());
        }
        if let Some(python) = &self.python {
            el = el.with_attr("python", python.clone());
        }
        for metric in &self.metric {
            let mut child = Element::new(metric.family.clone());
            if let Some(measure) = &metric.measure {
                child = child.with_attr("measure", measure.clone());
            }
            el = el.with_child(child);
        }
        for custom in &self.custom {
            let child = Element::new("Custom")
                .with_attr("label", custom.label.clone())
                .with_attr("measure", custom.measure.clone())
                .with_attr("diff", if custom.diff { "1" } else { "0" })
                .with_text(custom.body.clone());
            el = el.with_child(child);
        }
        el
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hosts_and_metrics_from_toml() {
        let toml = r#"
            loglevel = "debug"

            [[host]]
            address = "h1"
            port = 2222

            [[host.metric]]
            family = "CPU"
            measure = "user,system"
        "#;
        let cfg = RunConfig::parse(toml).unwrap();
        assert_eq!(cfg.loglevel.as_deref(), Some("debug"));
        assert_eq!(cfg.host.len(), 1);

        let hosts = cfg.to_hosts();
        assert_eq!(hosts[0].attr("address"), Some("h1"));
        assert_eq!(hosts[0].attr("port"), Some("2222"));
        assert_eq!(hosts[0].children[0].tag, "CPU");
        assert_eq!(hosts[0].children[0].attr("measure"), Some("user,system"));
    }

    #[test]
    fn parses_custom_metrics() {
        let toml = r#"
            [[host]]
            address = "h1"

            [[host.custom]]
            label = "Boot"
            measure = "tail"
            diff = true
            body = "uptime"
        "#;
        let cfg = RunConfig::parse(toml).unwrap();
        let hosts = cfg.to_hosts();
        let custom = &hosts[0].children[0];
        assert_eq!(custom.tag, "Custom");
        assert_eq!(custom.attr("diff"), Some("1"));
        assert_eq!(custom.text.as_deref(), Some("uptime"));
    }

    #[test]
    fn malformed_toml_is_a_configuration_error() {
        let err = RunConfig::parse("not valid toml [[[").unwrap_err();
        assert!(matches!(err, CollectorError::Configuration(_)));
    }
}
