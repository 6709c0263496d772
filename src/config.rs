use crate::aggregate::{DuplicatePolicy, WrapOptions};
use crate::pattern::{FilenamePattern, PatternError, Preset};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from pose-wrap.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct WrapConfig {
    pub output: OutputConfig,
    pub pattern: PatternConfig,
    pub merge: MergeConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub suffix: String,
    pub compact_keypoints: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct PatternConfig {
    pub preset: Preset,
    /// Custom regex; takes priority over `preset`.
    pub regex: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct MergeConfig {
    pub duplicates: DuplicatePolicy,
    pub sort_inputs: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            suffix: ".json".to_string(),
            compact_keypoints: true,
        }
    }
}

/// Problems with the configuration. All of them abort the run before any
/// input is read.
#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    Pattern(PatternError),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "cannot read config file {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "invalid config file {}: {source}", path.display())
            }
            ConfigError::Pattern(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Pattern(e) => Some(e),
        }
    }
}

impl From<PatternError> for ConfigError {
    fn from(e: PatternError) -> Self {
        ConfigError::Pattern(e)
    }
}

/// Load the config file at `path`.
///
/// A missing file yields the defaults unless `required` is set (the user
/// named the file explicitly).
pub fn load(path: &Path, required: bool) -> Result<WrapConfig, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(WrapConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl WrapConfig {
    /// Compile the active filename pattern. A custom regex wins over the preset.
    pub fn filename_pattern(&self) -> Result<FilenamePattern, ConfigError> {
        match &self.pattern.regex {
            Some(source) => Ok(FilenamePattern::custom(source)?),
            None => Ok(FilenamePattern::from_preset(self.pattern.preset)),
        }
    }

    pub fn wrap_options(&self) -> WrapOptions {
        WrapOptions {
            output_dir: self.output.dir.clone(),
            suffix: self.output.suffix.clone(),
            compact_keypoints: self.output.compact_keypoints,
            duplicates: self.merge.duplicates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_optional_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load(&dir.path().join("pose-wrap.toml"), false).unwrap();

        assert_eq!(config.output.dir, PathBuf::from("."));
        assert_eq!(config.output.suffix, ".json");
        assert!(config.output.compact_keypoints);
        assert_eq!(config.pattern.preset, Preset::Filename);
        assert!(config.pattern.regex.is_none());
        assert_eq!(config.merge.duplicates, DuplicatePolicy::Reject);
        assert!(!config.merge.sort_inputs);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("nope.toml"), true).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pose-wrap.toml");
        std::fs::write(
            &path,
            "[pattern]\npreset = \"dirname\"\n\n[merge]\nduplicates = \"overwrite\"\n",
        )
        .unwrap();

        let config = load(&path, true).unwrap();

        assert_eq!(config.pattern.preset, Preset::Dirname);
        assert_eq!(config.merge.duplicates, DuplicatePolicy::Overwrite);
        assert_eq!(config.output.suffix, ".json");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pose-wrap.toml");
        std::fs::write(&path, "[output]\ndirectory = \"out\"\n").unwrap();

        assert!(matches!(load(&path, true), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn unknown_preset_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pose-wrap.toml");
        std::fs::write(&path, "[pattern]\npreset = \"basename\"\n").unwrap();

        assert!(matches!(load(&path, true), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn regex_takes_priority_over_preset() {
        let mut config = WrapConfig::default();
        config.pattern.preset = Preset::Extracted;
        config.pattern.regex = Some(
            r"(?P<id>\w+)-(?P<camera>\w+)-(?P<width>\d+)-(?P<height>\d+)-(?P<frame>\d+)".to_string(),
        );

        let pattern = config.filename_pattern().unwrap();

        assert_eq!(pattern.preset(), None);
    }

    #[test]
    fn bad_regex_is_a_config_error() {
        let mut config = WrapConfig::default();
        config.pattern.regex = Some(r"(?P<id>.+)".to_string());

        assert!(matches!(
            config.filename_pattern(),
            Err(ConfigError::Pattern(PatternError::MissingGroups(_)))
        ));
    }

    #[test]
    fn wrap_options_follow_config() {
        let mut config = WrapConfig::default();
        config.output.dir = PathBuf::from("out");
        config.output.suffix = ".openpose.json".to_string();
        config.output.compact_keypoints = false;
        config.merge.duplicates = DuplicatePolicy::Overwrite;

        let options = config.wrap_options();

        assert_eq!(options.output_dir, PathBuf::from("out"));
        assert_eq!(options.suffix, ".openpose.json");
        assert!(!options.compact_keypoints);
        assert_eq!(options.duplicates, DuplicatePolicy::Overwrite);
    }
}
