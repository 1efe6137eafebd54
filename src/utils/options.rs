//! Option value conversion and merging utilities.

use crate::config::{OptionMap, OptionValue};

/// Convert an option map to command-line arguments, in key order
/// - Bool(true) -> --key
/// - Bool(false) -> (omitted)
/// - String(s) -> --key=s
/// - Number(n) -> --key=n
pub fn options_to_args(options: &OptionMap) -> Vec<String> {
    options
        .iter()
        .filter_map(|(key, value)| match value {
            OptionValue::Bool(true) => Some(format!("--{}", key)),
            OptionValue::Bool(false) => None,
            other => Some(format!("--{}={}", key, other)),
        })
        .collect()
}

/// Merge `overrides` over `defaults` key by key
pub fn merge_options(defaults: &OptionMap, overrides: &OptionMap) -> OptionMap {
    let mut merged = defaults.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(yaml: &str) -> OptionMap {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_options_to_args() {
        let args = options_to_args(&map("verbose: true\nquiet: false\ncc: bbr\nmtu: 1400"));
        assert_eq!(args, vec!["--cc=bbr", "--mtu=1400", "--verbose"]);
    }

    #[test]
    fn test_override_wins() {
        let merged = merge_options(&map("cc: cubic\nmtu: 1400"), &map("cc: bbr\npacing: true"));
        assert_eq!(merged["cc"], OptionValue::String("bbr".to_string()));
        assert_eq!(merged["mtu"].to_string(), "1400");
        assert_eq!(merged.len(), 3);
    }
}
