//! Program and file path resolution.
//!
//! Suite files refer to programs either by bare name (looked up on `PATH`
//! by the substrate) or by path. Paths starting with `~` expand to the home
//! directory; other relative paths resolve against the suite directory.

use std::env;
use std::path::{Path, PathBuf};

/// Errors that can occur during path resolution
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("cannot expand {path}: HOME is not set")]
    NoHomeDir { path: String },
}

fn home_dir(path: &str) -> Result<PathBuf, PathError> {
    env::var("HOME").map(PathBuf::from).map_err(|_| PathError::NoHomeDir {
        path: path.to_string(),
    })
}

/// Resolve a program reference.
///
/// ```ignore
/// resolve_program("iperf3", root)          -> "iperf3"
/// resolve_program("./bin/quic-server", root) -> "{root}/bin/quic-server"
/// resolve_program("~/bin/tcp-echo", root)  -> "/home/user/bin/tcp-echo"
/// resolve_program("/usr/bin/ping", root)   -> "/usr/bin/ping"
/// ```
pub fn resolve_program(name_or_path: &str, root: &Path) -> Result<String, PathError> {
    if !name_or_path.contains('/') && !name_or_path.starts_with('~') {
        return Ok(name_or_path.to_string());
    }
    Ok(resolve_file(name_or_path, root)?.to_string_lossy().into_owned())
}

/// Resolve a file reference against the suite directory
pub fn resolve_file(reference: &str, root: &Path) -> Result<PathBuf, PathError> {
    if reference == "~" {
        return home_dir(reference);
    }
    if let Some(rest) = reference.strip_prefix("~/") {
        return Ok(home_dir(reference)?.join(rest));
    }
    let path = Path::new(reference);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(root.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_names_untouched() {
        assert_eq!(resolve_program("iperf3", Path::new("/suite")).unwrap(), "iperf3");
    }

    #[test]
    fn test_relative_paths_use_root() {
        assert_eq!(
            resolve_program("./bin/quic-server", Path::new("/suite")).unwrap(),
            "/suite/./bin/quic-server"
        );
        assert_eq!(
            resolve_file("configs/tcp.toml", Path::new("/suite")).unwrap(),
            PathBuf::from("/suite/configs/tcp.toml")
        );
        assert_eq!(
            resolve_file("/etc/quic.toml", Path::new("/suite")).unwrap(),
            PathBuf::from("/etc/quic.toml")
        );
    }

    #[test]
    fn test_home_expansion() {
        if let Ok(home) = env::var("HOME") {
            let resolved = resolve_program("~/bin/echo", Path::new("/suite")).unwrap();
            assert_eq!(resolved, format!("{}/bin/echo", home.trim_end_matches('/')));
        }
    }
}
