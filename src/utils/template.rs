//! `{name}` placeholder expansion for command lines.

use std::collections::BTreeMap;

/// Placeholder values by name
pub type Vars = BTreeMap<&'static str, String>;

/// Replace every `{name}` in `text` that has a value in `vars`.
///
/// Unknown placeholders and unbalanced braces are left untouched.
pub fn expand(text: &str, vars: &Vars) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        match vars.get(key) {
            Some(value) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Expand each argument of a command line
pub fn expand_all(args: &[String], vars: &Vars) -> Vec<String> {
    args.iter().map(|arg| expand(arg, vars)).collect()
}

/// Whether any of `args` mentions `{name}`
pub fn mentions(args: &[String], name: &str) -> bool {
    let needle = format!("{{{}}}", name);
    args.iter().any(|arg| arg.contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Vars {
        let mut vars = Vars::new();
        vars.insert("server_ip", "10.255.0.2".to_string());
        vars.insert("port", "20000".to_string());
        vars
    }

    #[test]
    fn test_expand_known_placeholders() {
        assert_eq!(expand("{server_ip}:{port}", &vars()), "10.255.0.2:20000");
        assert_eq!(expand("--listen={port}/udp", &vars()), "--listen=20000/udp");
    }

    #[test]
    fn test_unknown_and_unbalanced_left_alone() {
        assert_eq!(expand("{nope} {port}", &vars()), "{nope} 20000");
        assert_eq!(expand("json {\"a\": 1", &vars()), "json {\"a\": 1");
        assert_eq!(expand("no braces", &vars()), "no braces");
    }

    #[test]
    fn test_mentions() {
        let args = vec!["-c".to_string(), "{config}".to_string()];
        assert!(mentions(&args, "config"));
        assert!(!mentions(&args, "port"));
    }
}
