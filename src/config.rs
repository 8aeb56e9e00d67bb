//! Configuration: CLI parsing results, config-file loading, and the merge/validation that
//! produces the [`BalanceConfig`] the rest of the crate runs with.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cli::Cli;
use crate::error::BalanceError;
use crate::size::parse_size;

/// Defaults named the way the spec names them, kept in one place.
pub struct Defaults;

impl Defaults {
    pub const PERCENTAGE: f64 = 2.0;
    pub const PARALLEL: usize = 0; // auto
    pub const ERROR_THRESHOLD: u32 = 5;
}

/// The fully merged, validated configuration the coordinator runs with.
#[derive(Clone, Debug)]
pub struct BalanceConfig {
    pub mount_point: PathBuf,
    pub percentage: f64,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub parallel: usize,
    pub source_drives: Vec<String>,
    pub dest_drives: Vec<String>,
    pub dry_run: bool,
    pub verbose: u8,
    pub quiet: bool,
    pub abort_on_error: bool,
    pub error_threshold: u32,
    pub error_log: Option<PathBuf>,
}

/// Intermediate shape of a config file's `[settings]` table. List-or-scalar fields are
/// lifted to singleton lists by [`StringOrList`].
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub settings: ConfigFileSettings,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConfigFileSettings {
    pub mount_point: Option<PathBuf>,
    pub percentage: Option<f64>,
    #[serde(default)]
    pub include: StringOrList,
    #[serde(default)]
    pub exclude: StringOrList,
    pub min_size: Option<SizeValue>,
    pub max_size: Option<SizeValue>,
    pub parallel: Option<usize>,
    #[serde(default)]
    pub source_drives: StringOrList,
    #[serde(default)]
    pub dest_drives: StringOrList,
    pub dry_run: Option<bool>,
    pub verbose: Option<bool>,
    pub quiet: Option<bool>,
    pub abort_on_error: Option<bool>,
    pub error_threshold: Option<u32>,
    pub error_log: Option<PathBuf>,
}

/// A config value that may be a scalar string or a list of strings; single strings are lifted
/// to singleton lists.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    #[default]
    Absent,
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    fn into_vec(self) -> Vec<String> {
        match self {
            StringOrList::Absent => Vec::new(),
            StringOrList::One(s) => vec![s],
            StringOrList::Many(v) => v,
        }
    }
}

/// A size config value that may be a bare integer (bytes) or a unit string like `"100M"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SizeValue {
    Bytes(u64),
    Text(String),
}

impl SizeValue {
    fn resolve(self) -> Result<u64, BalanceError> {
        match self {
            SizeValue::Bytes(b) => Ok(b),
            SizeValue::Text(s) => parse_size(&s),
        }
    }
}

/// Default config search order: first existing file wins.
pub fn default_config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("./mergerfs-balance.toml"),
        PathBuf::from("./.mergerfs-balance.toml"),
    ];
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("mergerfs-balance/config.toml"));
    } else if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join(".config/mergerfs-balance/config.toml"));
    }
    paths.push(PathBuf::from("/etc/mergerfs-balance.toml"));
    paths.push(PathBuf::from("/etc/mergerfs-balance/config.toml"));
    paths
}

/// Find the first existing config file in the default search order.
pub fn find_default_config() -> Option<PathBuf> {
    default_config_search_paths().into_iter().find(|p| p.is_file())
}

/// Load and parse a config file's `[settings]` table.
pub fn load_config_file(path: &Path) -> Result<ConfigFile, BalanceError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        BalanceError::Validation(format!("reading config file {}: {e}", path.display()))
    })?;
    toml::from_str(&text).map_err(|e| {
        BalanceError::Validation(format!("parsing config file {}: {e}", path.display()))
    })
}

/// Merge CLI args with an optional config file into a validated [`BalanceConfig`].
///
/// Precedence: for each scalar field, the CLI value wins only when it differs from its
/// clap default (i.e. the user actually passed the flag); otherwise the config-file value
/// (if any) applies, falling back to the built-in default. `include`/`exclude` are
/// concatenated, config first then CLI.
pub fn merge(cli: Cli, file: Option<ConfigFile>) -> Result<BalanceConfig, BalanceError> {
    let settings = file.map(|f| f.settings).unwrap_or_default();

    let mount_point = cli
        .mount_point
        .or(settings.mount_point)
        .ok_or_else(|| BalanceError::Validation("mount_point is required".to_string()))?;

    let percentage = cli.percentage.or(settings.percentage).unwrap_or(Defaults::PERCENTAGE);

    let mut include = settings.include.into_vec();
    include.extend(cli.include);
    let mut exclude = settings.exclude.into_vec();
    exclude.extend(cli.exclude);

    let min_size = match cli.min_size {
        Some(s) => Some(parse_size(&s)?),
        None => settings.min_size.map(SizeValue::resolve).transpose()?,
    };
    let max_size = match cli.max_size {
        Some(s) => Some(parse_size(&s)?),
        None => settings.max_size.map(SizeValue::resolve).transpose()?,
    };

    let parallel = cli.parallel.or(settings.parallel).unwrap_or(Defaults::PARALLEL);

    let source_drives = if !cli.source.is_empty() {
        cli.source.iter().map(|p| p.to_string_lossy().into_owned()).collect()
    } else {
        settings.source_drives.into_vec()
    };
    let dest_drives = if !cli.dest.is_empty() {
        cli.dest.iter().map(|p| p.to_string_lossy().into_owned()).collect()
    } else {
        settings.dest_drives.into_vec()
    };

    let dry_run = cli.dry_run || settings.dry_run.unwrap_or(false);
    let verbose = if cli.verbose > 0 {
        cli.verbose
    } else {
        settings.verbose.unwrap_or(false) as u8
    };
    let quiet = cli.quiet || settings.quiet.unwrap_or(false);
    let abort_on_error = cli.abort_on_error || settings.abort_on_error.unwrap_or(false);
    let error_threshold = cli
        .error_threshold
        .or(settings.error_threshold)
        .unwrap_or(Defaults::ERROR_THRESHOLD);
    let error_log = cli.error_log.or(settings.error_log);

    let config = BalanceConfig {
        mount_point,
        percentage,
        include,
        exclude,
        min_size,
        max_size,
        parallel,
        source_drives,
        dest_drives,
        dry_run,
        verbose,
        quiet,
        abort_on_error,
        error_threshold,
        error_log,
    };
    config.validate()?;
    Ok(config)
}

impl BalanceConfig {
    pub fn validate(&self) -> Result<(), BalanceError> {
        if !self.mount_point.exists() {
            return Err(BalanceError::Validation(format!(
                "mount point does not exist: {}",
                self.mount_point.display()
            )));
        }
        if let (Some(min), Some(max)) = (self.min_size, self.max_size)
            && min > max
        {
            return Err(BalanceError::Validation(format!(
                "min_size ({min}) is greater than max_size ({max})"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli(mount: &str) -> Cli {
        Cli {
            mount_point: Some(PathBuf::from(mount)),
            percentage: None,
            include: vec![],
            exclude: vec![],
            min_size: None,
            max_size: None,
            parallel: None,
            source: vec![],
            dest: vec![],
            dry_run: false,
            verbose: 0,
            quiet: false,
            config: None,
            abort_on_error: false,
            error_threshold: None,
            error_log: None,
        }
    }

    #[test]
    fn min_size_greater_than_max_size_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cli = base_cli(dir.path().to_str().unwrap());
        cli.min_size = Some("100M".to_string());
        cli.max_size = Some("10M".to_string());
        let result = merge(cli, None);
        assert!(result.is_err());
    }

    #[test]
    fn missing_mount_point_is_validation_error() {
        let mut cli = base_cli("/definitely/not/a/real/path/xyz");
        cli.mount_point = Some(PathBuf::from("/definitely/not/a/real/path/xyz"));
        let result = merge(cli, None);
        assert!(result.is_err());
    }

    #[test]
    fn include_exclude_concatenate_config_first_then_cli() {
        let dir = tempfile::tempdir().unwrap();
        let mut cli = base_cli(dir.path().to_str().unwrap());
        cli.include = vec!["cli-pat".to_string()];
        let file = ConfigFile {
            settings: ConfigFileSettings {
                include: StringOrList::One("file-pat".to_string()),
                ..Default::default()
            },
        };
        let config = merge(cli, Some(file)).unwrap();
        assert_eq!(config.include, vec!["file-pat".to_string(), "cli-pat".to_string()]);
    }

    #[test]
    fn cli_percentage_overrides_file_when_passed() {
        let dir = tempfile::tempdir().unwrap();
        let mut cli = base_cli(dir.path().to_str().unwrap());
        cli.percentage = Some(5.0);
        let file = ConfigFile {
            settings: ConfigFileSettings {
                percentage: Some(1.0),
                ..Default::default()
            },
        };
        let config = merge(cli, Some(file)).unwrap();
        assert_eq!(config.percentage, 5.0);
    }

    #[test]
    fn file_percentage_applies_when_cli_not_passed() {
        let dir = tempfile::tempdir().unwrap();
        let cli = base_cli(dir.path().to_str().unwrap());
        let file = ConfigFile {
            settings: ConfigFileSettings {
                percentage: Some(1.0),
                ..Default::default()
            },
        };
        let config = merge(cli, Some(file)).unwrap();
        assert_eq!(config.percentage, 1.0);
    }

    #[test]
    fn default_percentage_when_neither_set() {
        let dir = tempfile::tempdir().unwrap();
        let cli = base_cli(dir.path().to_str().unwrap());
        let config = merge(cli, None).unwrap();
        assert_eq!(config.percentage, Defaults::PERCENTAGE);
    }
}
