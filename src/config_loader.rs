use crate::config::GeneralConfig;
use crate::error::ConfigError;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::path::{Path, PathBuf};

/// Top-level sections of a suite document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    General,
    Topology,
    Protocol,
    Tool,
    TestCase,
}

impl Section {
    /// Key of the section in the suite document
    pub fn key(&self) -> &'static str {
        match self {
            Section::General => "general",
            Section::Topology => "topologies",
            Section::Protocol => "protocols",
            Section::Tool => "tools",
            Section::TestCase => "tests",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Section::General => "general section",
            Section::Topology => "topology",
            Section::Protocol => "protocol",
            Section::Tool => "tool",
            Section::TestCase => "test case",
        };
        f.write_str(label)
    }
}

/// Source of structured documents.
///
/// The engine never parses the declarative format itself: it asks a source
/// for the document behind a name and deserializes the returned value.
pub trait DocumentSource: Send + Sync {
    /// Look up the document named `name` in `section`.
    fn resolve(&self, name: &str, section: Section) -> Result<Value, ConfigError>;

    /// Names defined in `section`, in declaration order.
    fn names(&self, section: Section) -> Vec<String>;

    /// Directory that relative references (config files, programs) resolve against.
    fn root(&self) -> &Path;
}

/// Suite backed by a single YAML document
#[derive(Debug, Clone)]
pub struct YamlSource {
    root: PathBuf,
    document: Mapping,
}

impl YamlSource {
    /// Load and parse a suite from a YAML file
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading suite from: {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Mapping = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self { root, document })
    }

    /// Parse a suite from YAML text, resolving relative references against `root`
    pub fn from_yaml(text: &str, root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let document: Mapping = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Ok(Self {
            root: root.into(),
            document,
        })
    }

    fn section(&self, section: Section) -> Option<&Mapping> {
        self.document.get(section.key()).and_then(Value::as_mapping)
    }
}

impl DocumentSource for YamlSource {
    fn resolve(&self, name: &str, section: Section) -> Result<Value, ConfigError> {
        if section == Section::General {
            return Ok(self.document.get(section.key()).cloned().unwrap_or(Value::Null));
        }

        let value = self
            .section(section)
            .and_then(|entries| entries.get(name))
            .cloned()
            .ok_or_else(|| ConfigError::Missing {
                section,
                name: name.to_string(),
            })?;
        debug!("Resolved {} '{}'", section, name);
        Ok(value)
    }

    fn names(&self, section: Section) -> Vec<String> {
        self.section(section)
            .map(|entries| {
                entries
                    .keys()
                    .filter_map(|key| key.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

/// Resolve a named document and deserialize it into `T`
pub fn load<T: DeserializeOwned>(
    source: &dyn DocumentSource,
    name: &str,
    section: Section,
) -> Result<T, ConfigError> {
    let value = source.resolve(name, section)?;
    serde_yaml::from_value(value).map_err(|source| ConfigError::Malformed {
        section,
        name: name.to_string(),
        source,
    })
}

/// Load and validate the general section, falling back to defaults when absent
pub fn load_general(source: &dyn DocumentSource) -> Result<GeneralConfig, ConfigError> {
    let value = source.resolve("general", Section::General)?;
    let general = if value.is_null() {
        GeneralConfig::default()
    } else {
        serde_yaml::from_value(value).map_err(|source| ConfigError::Malformed {
            section: Section::General,
            name: "general".to_string(),
            source,
        })?
    };

    general.validate()?;
    Ok(general)
}
