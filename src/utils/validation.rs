//! Name and reference validation helpers.

/// Names become directory names under `test_results/`
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name cannot be empty".to_string());
    }
    if name == "." || name == ".." {
        return Err(format!("'{}' is not a usable name", name));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(format!(
            "'{}' contains '{}'; only letters, digits, '.', '_' and '-' are allowed",
            name, bad
        ));
    }
    Ok(())
}

/// Resolve a host reference (`first`, `last` or `h<index>`) for `nodes` hosts
pub fn resolve_host_ref(reference: &str, nodes: usize) -> Result<usize, String> {
    let index = match reference {
        "first" => 0,
        "last" => nodes.saturating_sub(1),
        other => other
            .strip_prefix('h')
            .and_then(|digits| digits.parse::<usize>().ok())
            .ok_or_else(|| format!("host reference '{}' is not 'first', 'last' or h<index>", other))?,
    };
    if index >= nodes {
        return Err(format!("host {} does not exist in a {}-node topology", reference, nodes));
    }
    Ok(index)
}
