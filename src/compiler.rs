//! The declarative configuration to per-host agent-spec compiler (component
//! C). Translates a parsed `Monitoring` DOM plus an optional target-host
//! hint into the list of agent specs to install and, per host, the ordered
//! list of column labels the operator actually asked for.
//!
//! Grounded on `MonCollector/collector.py`'s `MonitoringCollector.getconfig`.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use indexmap::IndexSet;

use crate::catalog;
use crate::dom::Element;
use crate::error::{CollectorError, Result};

pub const TARGET_SENTINEL: &str = "[target]";
const DEFAULT_PORT: u16 = 22;
const DEFAULT_INTERVAL: u32 = 1;
const DEFAULT_PRIORITY: i64 = 0;
const DEFAULT_PYTHON: &str = "/usr/bin/python";
const FALLBACK_MODULE: &str = "cpu-stat";

/// A method a custom metric is collected with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CustomMethod {
    Tail,
    Call,
}

impl CustomMethod {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "tail" => Some(CustomMethod::Tail),
            "call" => Some(CustomMethod::Call),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CustomMethod::Tail => "tail",
            CustomMethod::Call => "call",
        }
    }
}

/// The ordered descriptors collected per custom method, keyed the way the
/// generated agent config's `[custom]` section is (`tail=`, `call=`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomDescriptors {
    pub tail: Vec<String>,
    pub call: Vec<String>,
}

impl CustomDescriptors {
    fn push(&mut self, method: CustomMethod, descriptor: String) {
        match method {
            CustomMethod::Tail => self.tail.push(descriptor),
            CustomMethod::Call => self.call.push(descriptor),
        }
    }
}

/// A fully-resolved plan for one remote agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    pub host: String,
    pub port: u16,
    pub python: String,
    pub interval: u32,
    pub priority: i64,
    /// Comma-separated agent module names. Never empty.
    pub metric: String,
    pub custom: CustomDescriptors,
}

/// Per-host ordered list of column labels the operator selected, in the
/// exact form `Family_Measurement` or `Custom:<descriptor>`.
pub type WantedColumns = HashMap<String, Vec<String>>;

/// Compile the parsed DOM into agent specs and the wanted-columns map.
///
/// `hosts` is the ordered list of `Host` elements under the `Monitoring`
/// root (DOM traversal above this level is the caller's job).
pub fn compile(hosts: &[Element], target_hint: Option<&str>) -> Result<(Vec<AgentSpec>, WantedColumns)> {
    let mut specs = Vec::with_capacity(hosts.len());
    let mut wanted = WantedColumns::new();

    for host in hosts {
        let (spec, labels) = compile_host(host, target_hint)?;
        wanted.insert(spec.host.clone(), labels);
        specs.push(spec);
    }

    Ok((specs, wanted))
}

fn compile_host(host: &Element, target_hint: Option<&str>) -> Result<(AgentSpec, Vec<String>)> {
    let hostname = resolve_hostname(host, target_hint)?;

    let mut labels: Vec<String> = Vec::new();
    let mut modules: IndexSet<String> = IndexSet::new();
    let mut custom = CustomDescriptors::default();
    let mut metrics_count = 0usize;

    for child in &host.children {
        if catalog::is_known_family(&child.tag) {
            metrics_count += 1;
            expand_family(&child.tag, child.attr("measure"), &mut labels, &mut modules);
        } else if child.tag == "Custom" {
            metrics_count += 1;
            let (label, method, descriptor) = encode_custom(child)?;
            labels.push(label);
            custom.push(method, descriptor);
        }
    }

    if metrics_count == 0 {
        for family in catalog::DEFAULT_FAMILIES {
            expand_family(family, None, &mut labels, &mut modules);
        }
    }

    let metric = if modules.is_empty() {
        FALLBACK_MODULE.to_string()
    } else {
        modules.into_iter().collect::<Vec<_>>().join(",")
    };

    let spec = AgentSpec {
        host: hostname,
        port: attr_or(host, "port", DEFAULT_PORT)?,
        python: host.attr("python").unwrap_or(DEFAULT_PYTHON).to_string(),
        interval: attr_or(host, "interval", DEFAULT_INTERVAL)?,
        priority: attr_or(host, "priority", DEFAULT_PRIORITY)?,
        metric,
        custom,
    };

    Ok((spec, labels))
}

fn resolve_hostname(host: &Element, target_hint: Option<&str>) -> Result<String> {
    let address = host
        .attr("address")
        .ok_or_else(|| CollectorError::Configuration("Host element missing required 'address' attribute".into()))?;

    if address == TARGET_SENTINEL {
        target_hint
            .map(|hint| hint.to_string())
            .ok_or_else(|| {
                CollectorError::Configuration(
                    "can't use [target] keyword with no target hint specified".into(),
                )
            })
    } else {
        Ok(address.to_string())
    }
}

fn expand_family(
    family: &str,
    measure_attr: Option<&str>,
    labels: &mut Vec<String>,
    modules: &mut IndexSet<String>,
) {
    let measurements = measure_attr.unwrap_or_else(|| catalog::default_measurements(family));
    for measurement in measurements.split(',') {
        if measurement.is_empty() {
            continue;
        }
        labels.push(format!("{family}_{measurement}"));
        if let Some(module) = catalog::module_for(family, measurement) {
            modules.insert(module.to_string());
        }
    }
}

fn encode_custom(el: &Element) -> Result<(String, CustomMethod, String)> {
    let label = el
        .attr("label")
        .ok_or_else(|| CollectorError::Configuration("Custom element missing required 'label' attribute".into()))?;
    let body = el.text.as_deref().unwrap_or("");
    let diff = el.attr("diff").unwrap_or("0");
    let method = el
        .attr("measure")
        .and_then(CustomMethod::parse)
        .ok_or_else(|| {
            CollectorError::Configuration(format!(
                "Custom element '{label}' has missing or invalid 'measure' attribute (must be 'tail' or 'call')"
            ))
        })?;

    let descriptor = format!("{}:{}:{}", BASE64.encode(label), BASE64.encode(body), diff);
    Ok((format!("Custom:{descriptor}"), method, descriptor))
}

fn attr_or<T>(host: &Element, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match host.attr(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| {
            CollectorError::Configuration(format!("Host attribute '{key}' has invalid value '{raw}'"))
        }),
    }
}
