use std::path::Path;

use serde::{Deserialize, Serialize};

/// Configuration for a marketplace.
///
/// This struct holds settings that control listing pagination, application
/// validation, and what happens to pending applications when a role is
/// closed early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// Page size used when a listing request doesn't ask for one.
    default_page_size: usize,

    /// Upper bound on the page size a listing request may ask for.
    max_page_size: usize,

    /// Longest accepted application message, in characters, after trimming.
    max_message_length: usize,

    /// What happens to pending applications when the creator closes a
    /// requirement, or completes or cancels the collaboration.
    pub pending_on_close: PendingPolicy,
}

/// Treatment of pending applications on a creator-initiated close.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingPolicy {
    /// Reject them and notify each applicant.
    #[default]
    Reject,
    /// Leave them pending. The creator may still reject them by hand.
    Keep,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            max_message_length: default_max_message_length(),
            pending_on_close: PendingPolicy::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// Page size used when none is requested.
    #[must_use]
    pub const fn default_page_size(&self) -> usize {
        self.default_page_size
    }

    /// Largest page size a request may ask for.
    #[must_use]
    pub const fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    /// Longest accepted application message, in characters.
    #[must_use]
    pub const fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    /// Sets the default page size.
    ///
    /// Zero is bumped to one, and the maximum is raised to match if needed.
    pub fn set_default_page_size(&mut self, size: usize) {
        self.default_page_size = size.max(1);
        self.max_page_size = self.max_page_size.max(self.default_page_size);
    }

    /// Sets the maximum page size.
    ///
    /// Zero is bumped to one, and the default is lowered to match if needed.
    pub fn set_max_page_size(&mut self, size: usize) {
        self.max_page_size = size.max(1);
        self.default_page_size = self.default_page_size.min(self.max_page_size);
    }

    /// Sets the message length limit. Zero is bumped to one.
    pub fn set_max_message_length(&mut self, length: usize) {
        self.max_message_length = length.max(1);
    }

    /// Resolves a requested page size against the configured bounds.
    #[must_use]
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size)
    }
}

const fn default_page_size() -> usize {
    20
}

const fn default_max_page_size() -> usize {
    100
}

const fn default_max_message_length() -> usize {
    2000
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default = "default_page_size")]
        default_page_size: usize,

        #[serde(default = "default_max_page_size")]
        max_page_size: usize,

        /// Measured in characters after trimming surrounding whitespace.
        #[serde(default = "default_max_message_length")]
        max_message_length: usize,

        #[serde(default)]
        pending_on_close: PendingPolicy,
    },
}

impl From<Versions> for super::Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                default_page_size,
                max_page_size,
                max_message_length,
                pending_on_close,
            } => {
                let mut config = Self {
                    pending_on_close,
                    ..Self::default()
                };
                // the maximum goes last so it caps the default
                config.set_default_page_size(default_page_size);
                config.set_max_page_size(max_page_size);
                config.set_max_message_length(max_message_length);
                config
            }
        }
    }
}

impl From<super::Config> for Versions {
    fn from(config: super::Config) -> Self {
        Self::V1 {
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
            max_message_length: config.max_message_length,
            pending_on_close: config.pending_on_close,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use test_case::test_case;

    use super::*;

    #[test]
    fn load_reads_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"_version = \"1\"\ndefault_page_size = 10\nmax_page_size = 50\nmax_message_length = 500\npending_on_close = \"keep\"\n",
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.default_page_size(), 10);
        assert_eq!(config.max_page_size(), 50);
        assert_eq!(config.max_message_length(), 500);
        assert_eq!(config.pending_on_close, PendingPolicy::Keep);
    }

    #[test]
    fn load_missing_file_returns_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.toml");

        let error = Config::load(&missing).unwrap_err();
        assert!(error.starts_with("Failed to read config file:"));
    }

    #[test]
    fn load_invalid_toml_returns_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"_version = \"1\"\nmax_page_size = \"lots\"\n")
            .unwrap();

        let error = Config::load(file.path()).unwrap_err();
        assert!(error.starts_with("Failed to parse config file:"));
    }

    #[test]
    fn empty_file_returns_default() {
        let expected = Config::default();
        let actual: Config = toml::from_str(r#"_version = "1""#).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        let mut config = Config::default();
        config.set_max_message_length(280);
        config.pending_on_close = PendingPolicy::Keep;

        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test_case("default_page_size = 500\nmax_page_size = 50\n", 50, 50; "maximum wins")]
    #[test_case("default_page_size = 150\n", 100, 100; "default maximum still caps")]
    #[test_case("default_page_size = 30\nmax_page_size = 40\n", 30, 40; "consistent sizes kept")]
    fn inconsistent_page_sizes_are_reconciled(sizes: &str, default: usize, max: usize) {
        let config: Config = toml::from_str(&format!("_version = \"1\"\n{sizes}")).unwrap();
        assert_eq!(config.default_page_size(), default);
        assert_eq!(config.max_page_size(), max);
    }

    #[test_case(None, 20; "default")]
    #[test_case(Some(5), 5; "explicit")]
    #[test_case(Some(0), 1; "zero is bumped")]
    #[test_case(Some(1000), 100; "clamped to maximum")]
    fn page_size_is_bounded(requested: Option<usize>, expected: usize) {
        assert_eq!(Config::default().page_size(requested), expected);
    }
}
