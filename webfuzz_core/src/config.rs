use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReportFormat {
    #[default]
    Text,
    Html,
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Html => "html",
            ReportFormat::Json => "json",
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ReportSettings {
    #[serde(default)]
    pub format: ReportFormat,
    /// Reports are printed to stdout when unset.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_wordlist_dir")]
    pub wordlist_dir: PathBuf,
    #[serde(default = "default_health_check_attempts")]
    pub health_check_attempts: u32,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    /// No timeout beyond the HTTP transport's own when unset.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// Seed for the built-in generators. Random when unset.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub report: ReportSettings,
}

pub fn default_wordlist_dir() -> PathBuf {
    PathBuf::from("wordlists")
}

pub fn default_health_check_attempts() -> u32 {
    50
}

pub fn default_health_check_interval_ms() -> u64 {
    100
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wordlist_dir: default_wordlist_dir(),
            health_check_attempts: default_health_check_attempts(),
            health_check_interval_ms: default_health_check_interval_ms(),
            request_timeout_ms: None,
            seed: None,
            report: ReportSettings::default(),
        }
    }
}

impl Settings {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let settings: Settings = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(settings)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// The configured seed, or a fresh random one.
    pub fn seed_or_random(&self) -> u64 {
        self.seed.unwrap_or_else(rand::random)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings.wordlist_dir, PathBuf::from("wordlists"));
        assert_eq!(settings.health_check_attempts, 50);
        assert_eq!(settings.health_check_interval(), Duration::from_millis(100));
        assert!(settings.request_timeout().is_none());
        assert_eq!(settings.report.format, ReportFormat::Text);
    }

    #[test]
    fn loads_all_fields_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
wordlist-dir = "lists"
health-check-attempts = 5
health-check-interval-ms = 20
request-timeout-ms = 1500
seed = 99

[report]
format = "html"
output-dir = "out"
"#
        )
        .unwrap();

        let settings = Settings::load_from_file(file.path()).unwrap();
        assert_eq!(settings.wordlist_dir, PathBuf::from("lists"));
        assert_eq!(settings.health_check_attempts, 5);
        assert_eq!(settings.request_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(settings.seed, Some(99));
        assert_eq!(settings.report.format, ReportFormat::Html);
        assert_eq!(settings.report.output_dir, Some(PathBuf::from("out")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Settings>("threads = 4").is_err());
    }
}
