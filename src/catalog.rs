//! Static mapping from declared `(family, measurement)` pairs to agent
//! module names, plus the default measurements and default family set used
//! when the operator is silent about what to collect.
//!
//! Grounded on `MonCollector/collector.py`'s `get_agent_name` and the
//! `default`/`default_metric` tables in `getconfig`.

/// The module an agent must load to produce a given `(family, measurement)`
/// pair, or `None` if the pair is unrecognized. An unrecognized pair still
/// produces a `WantedColumns` label (see `compiler`); it just contributes
/// nothing to the module set.
pub fn module_for(family: &str, measurement: &str) -> Option<&'static str> {
    match (family, measurement) {
        ("CPU", "idle" | "user" | "system" | "iowait" | "nice") => Some("cpu-stat"),
        ("System", "la1" | "la5" | "la15") => Some("cpu-la"),
        ("System", "csw" | "int" | "numproc" | "numthreads") => Some("cpu-stat"),
        ("Memory", "free" | "used" | "cached" | "buff") => Some("mem"),
        ("Disk", "read" | "write") => Some("disk"),
        ("Net", "recv" | "send") => Some("net"),
        ("Net", "tx" | "rx") => Some("net-tx-rx"),
        ("Net", "retransmit") => Some("net-retrans"),
        ("Net", "estab" | "closewait" | "timewait") => Some("net-tcp"),
        _ => None,
    }
}

/// Is `family` one of the recognized family tags at all? Used by the
/// compiler to decide whether an element is a metric family, a `Custom`
/// element, or something to ignore.
pub fn is_known_family(family: &str) -> bool {
    matches!(family, "CPU" | "System" | "Memory" | "Disk" | "Net")
}

/// The comma-separated default measurement list for a family, used when the
/// operator names the family without a `measure` attribute.
pub fn default_measurements(family: &str) -> &'static str {
    match family {
        "System" => "csw,int",
        "CPU" => "user,system,iowait",
        "Memory" => "free,used",
        "Disk" => "read,write",
        "Net" => "recv,send",
        _ => "",
    }
}

/// The families assumed when a host declares no metrics at all.
pub const DEFAULT_FAMILIES: [&str; 4] = ["CPU", "Memory", "Disk", "Net"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_modules_resolve() {
        assert_eq!(module_for("CPU", "user"), Some("cpu-stat"));
        assert_eq!(module_for("System", "la1"), Some("cpu-la"));
        assert_eq!(module_for("System", "csw"), Some("cpu-stat"));
        assert_eq!(module_for("Net", "tx"), Some("net-tx-rx"));
        assert_eq!(module_for("Net", "retransmit"), Some("net-retrans"));
        assert_eq!(module_for("Net", "estab"), Some("net-tcp"));
    }

    #[test]
    fn unknown_pair_resolves_to_none() {
        assert_eq!(module_for("CPU", "bogus"), None);
        assert_eq!(module_for("Bogus", "user"), None);
    }

    #[test]
    fn default_families_and_measurements_match_reference() {
        assert_eq!(DEFAULT_FAMILIES, ["CPU", "Memory", "Disk", "Net"]);
        assert_eq!(default_measurements("CPU"), "user,system,iowait");
        assert_eq!(default_measurements("System"), "csw,int");
    }
}
