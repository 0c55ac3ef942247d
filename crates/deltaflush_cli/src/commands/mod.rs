//! CLI command implementations.

pub mod config;
pub mod simulate;

use deltaflush_core::FlushPolicyKind;

/// Parses a policy name as accepted on the command line.
pub fn parse_policy(name: &str) -> Result<FlushPolicyKind, String> {
    match name {
        "explicit" => Ok(FlushPolicyKind::Explicit),
        "host-driven" | "host_driven" | "host" => Ok(FlushPolicyKind::HostDriven),
        other => Err(format!(
            "unknown policy '{other}' (expected 'explicit' or 'host-driven')"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_names() {
        assert_eq!(parse_policy("explicit"), Ok(FlushPolicyKind::Explicit));
        assert_eq!(parse_policy("host-driven"), Ok(FlushPolicyKind::HostDriven));
        assert_eq!(parse_policy("host_driven"), Ok(FlushPolicyKind::HostDriven));
        assert!(parse_policy("periodic").is_err());
    }
}
