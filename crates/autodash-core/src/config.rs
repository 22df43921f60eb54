// Configuration loading and parsing (dashboard.toml, services.toml, credentials.toml).

use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable that overrides `credentials.toml`.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub dashboard: DashboardConfig,
    pub nhtsa: NhtsaConfig,
    pub openai: OpenAiConfig,
    pub credentials: CredentialsConfig,
    /// Database file, resolved against the base directory.
    pub db_path: PathBuf,
    pub self_update: SelfUpdateConfig,
}

// ---------------------------------------------------------------------------
// dashboard.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct DashboardFile {
    listings: ListingRanges,
    catalog: BTreeMap<String, Vec<String>>,
    locations: LocationsSection,
}

#[derive(Debug, Clone, Deserialize)]
struct LocationsSection {
    cities: Vec<String>,
}

/// Everything the listing generator needs.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub listings: ListingRanges,
    /// Make -> models. A BTreeMap keeps draws reproducible for a seeded RNG.
    pub catalog: BTreeMap<String, Vec<String>>,
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ListingRanges {
    pub min_year: u16,
    pub max_year: u16,
    pub min_price: u32,
    pub max_price: u32,
    pub default_count: usize,
    pub max_count: usize,
}

// ---------------------------------------------------------------------------
// services.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct ServicesFile {
    nhtsa: NhtsaConfig,
    openai: OpenAiConfig,
    database: DatabaseSection,
    self_update: SelfUpdateConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NhtsaConfig {
    pub decode_url: String,
    pub format: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub model: String,
    pub review_max_tokens: u32,
    pub enhance_max_tokens: u32,
    pub enhance_temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelfUpdateConfig {
    pub target: PathBuf,
    pub backup_dir: PathBuf,
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub openai_api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/dashboard.toml`,
/// `config/services.toml`, and (optionally) `config/credentials.toml`,
/// all relative to the given `base_dir`.
///
/// Does not copy defaults or consult the environment; `load_config()` does both.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- dashboard.toml (required) ---
    let dashboard_path = config_dir.join("dashboard.toml");
    let dashboard_file: DashboardFile = parse_file(&dashboard_path)?;
    let dashboard = DashboardConfig {
        listings: dashboard_file.listings,
        catalog: dashboard_file.catalog,
        locations: dashboard_file.locations.cities,
    };

    // --- services.toml (required) ---
    let services_path = config_dir.join("services.toml");
    let services: ServicesFile = parse_file(&services_path)?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        parse_file(&credentials_path)?
    } else {
        CredentialsConfig::default()
    };

    let self_update = SelfUpdateConfig {
        target: resolve(base_dir, &services.self_update.target),
        backup_dir: resolve(base_dir, &services.self_update.backup_dir),
    };

    let config = Config {
        dashboard,
        nhtsa: services.nhtsa,
        openai: services.openai,
        credentials,
        db_path: resolve(base_dir, Path::new(&services.database.path)),
        self_update,
    };

    validate(&config)?;

    Ok(config)
}

/// Seed `config/` from the `*.toml` templates in `defaults/`.
///
/// Existing files are never touched, so user edits survive upgrades. Other
/// files in `defaults/` (such as `credentials.toml.example`) are left for
/// the user to copy by hand. Returns the files that were created.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.is_dir() {
        if config_dir.is_dir() {
            debug!("No defaults/ in {}, using config/ as is", base_dir.display());
            return Ok(Vec::new());
        }
        return Err(seed_error(format!(
            "neither defaults/ nor config/ directory found in {}; \
             run autodash from the project root",
            base_dir.display()
        )));
    }

    std::fs::create_dir_all(&config_dir)
        .map_err(|e| seed_error(format!("failed to create {}: {e}", config_dir.display())))?;

    let mut templates: Vec<PathBuf> = std::fs::read_dir(&defaults_dir)
        .map_err(|e| seed_error(format!("failed to read {}: {e}", defaults_dir.display())))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    templates.sort();

    let mut created = Vec::new();
    for template in templates {
        let Some(file_name) = template.file_name() else {
            continue;
        };
        let target = config_dir.join(file_name);
        if seed_file(&template, &target)? {
            info!("Created {} from {}", target.display(), template.display());
            created.push(target);
        }
    }

    Ok(created)
}

/// Copy `template` to `target` unless `target` already exists.
fn seed_file(template: &Path, target: &Path) -> Result<bool, ConfigError> {
    // create_new: never truncate a file the user may have edited.
    let mut dest = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => {
            return Err(seed_error(format!(
                "failed to create {}: {e}",
                target.display()
            )))
        }
    };

    let content = std::fs::read(template)
        .map_err(|e| seed_error(format!("failed to read {}: {e}", template.display())))?;
    dest.write_all(&content)
        .map_err(|e| seed_error(format!("failed to write {}: {e}", target.display())))?;
    Ok(true)
}

fn seed_error(message: String) -> ConfigError {
    ConfigError::DefaultsCopyError { message }
}

/// Convenience wrapper: loads config relative to the current working directory.
///
/// Reads `.env` (if any), copies default config files, loads them, and lets
/// `OPENAI_API_KEY` override the credentials file.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    let _ = dotenvy::dotenv();
    ensure_config_files(&cwd)?;
    let mut config = load_config_from(&cwd)?;
    apply_api_key_override(&mut config, std::env::var(API_KEY_ENV).ok());
    Ok(config)
}

/// Replace the configured API key with `env_value` when it is set and non-blank.
pub fn apply_api_key_override(config: &mut Config, env_value: Option<String>) {
    if let Some(key) = env_value.filter(|k| !k.trim().is_empty()) {
        config.credentials.openai_api_key = Some(key.trim().to_string());
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn parse_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = read_file(path)?;
    toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    let ranges = &config.dashboard.listings;

    if ranges.min_year > ranges.max_year {
        return Err(invalid(
            "listings.min_year",
            format!(
                "must not exceed max_year ({} > {})",
                ranges.min_year, ranges.max_year
            ),
        ));
    }

    if ranges.min_price >= ranges.max_price {
        return Err(invalid(
            "listings.min_price",
            format!(
                "must be less than max_price ({} >= {})",
                ranges.min_price, ranges.max_price
            ),
        ));
    }

    if ranges.max_count == 0 {
        return Err(invalid("listings.max_count", "must be greater than 0"));
    }

    if !(1..=ranges.max_count).contains(&ranges.default_count) {
        return Err(invalid(
            "listings.default_count",
            format!(
                "must be between 1 and {} inclusive, got {}",
                ranges.max_count, ranges.default_count
            ),
        ));
    }

    if config.dashboard.catalog.is_empty() {
        return Err(invalid("catalog", "must list at least one make"));
    }

    for (make, models) in &config.dashboard.catalog {
        if models.is_empty() {
            return Err(invalid(
                &format!("catalog.{make}"),
                "must list at least one model",
            ));
        }
    }

    if config.dashboard.locations.is_empty() {
        return Err(invalid("locations.cities", "must list at least one location"));
    }

    let temp = config.openai.enhance_temperature;
    if !(0.0..=2.0).contains(&temp) {
        return Err(invalid(
            "openai.enhance_temperature",
            format!("must be between 0.0 and 2.0 inclusive, got {temp}"),
        ));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// Workspace root, located from this crate's manifest directory.
    fn project_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .ancestors()
            .find(|p| p.join("defaults").is_dir())
            .map(Path::to_path_buf)
            .expect("cannot locate defaults/ above the crate directory")
    }

    /// Fresh temp dir with `config/` holding copies of both required defaults.
    fn scratch_with_defaults(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let config_dir = tmp.join("config");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&config_dir).unwrap();

        let root = project_root();
        fs::copy(
            root.join("defaults/dashboard.toml"),
            config_dir.join("dashboard.toml"),
        )
        .unwrap();
        fs::copy(
            root.join("defaults/services.toml"),
            config_dir.join("services.toml"),
        )
        .unwrap();
        tmp
    }

    fn rewrite(tmp: &Path, file: &str, from: &str, to: &str) {
        let path = tmp.join("config").join(file);
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains(from), "{file} should contain `{from}`");
        fs::write(&path, text.replace(from, to)).unwrap();
    }

    fn expect_validation_field(tmp: &Path, expected: &str) {
        let err = load_config_from(tmp).unwrap_err();
        match &err {
            ConfigError::ValidationError { field, .. } => assert_eq!(field, expected),
            other => panic!("expected ValidationError, got: {other}"),
        }
    }

    #[test]
    fn load_valid_config_from_defaults() {
        let tmp = scratch_with_defaults("autodash_config_defaults");
        let config = load_config_from(&tmp).expect("should load valid config");

        let ranges = config.dashboard.listings;
        assert_eq!(ranges.min_year, 1980);
        assert_eq!(ranges.max_year, 2025);
        assert_eq!(ranges.min_price, 1000);
        assert_eq!(ranges.max_price, 100_000);
        assert_eq!(ranges.default_count, 5);
        assert_eq!(ranges.max_count, 100);

        assert!(config.dashboard.catalog.contains_key("Toyota"));
        assert_eq!(
            config.dashboard.catalog["Tesla"],
            vec!["Model S", "Model 3", "Model X", "Model Y"]
        );
        assert_eq!(config.dashboard.locations.len(), 5);
        assert!(config.dashboard.locations.contains(&"Chicago".to_string()));

        assert_eq!(
            config.nhtsa.decode_url,
            "https://vpic.nhtsa.dot.gov/api/vehicles/DecodeVinValuesExtended/"
        );
        assert_eq!(config.nhtsa.format, "json");
        assert_eq!(config.openai.model, "gpt-4");
        assert!((config.openai.enhance_temperature - 0.7).abs() < f32::EPSILON);

        assert_eq!(config.db_path, tmp.join("autodash.db"));
        assert_eq!(config.self_update.backup_dir, tmp.join("backups"));
        assert!(config.credentials.openai_api_key.is_none());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn credentials_toml_with_api_key() {
        let tmp = scratch_with_defaults("autodash_config_creds");
        fs::write(
            tmp.join("config/credentials.toml"),
            "openai_api_key = \"sk-test-key\"\n",
        )
        .unwrap();

        let config = load_config_from(&tmp).expect("should load with credentials.toml");
        assert_eq!(
            config.credentials.openai_api_key.as_deref(),
            Some("sk-test-key")
        );

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn env_key_overrides_credentials_file() {
        let tmp = scratch_with_defaults("autodash_config_env_override");
        let mut config = load_config_from(&tmp).unwrap();
        config.credentials.openai_api_key = Some("from-file".into());

        apply_api_key_override(&mut config, Some("  from-env  ".into()));
        assert_eq!(config.credentials.openai_api_key.as_deref(), Some("from-env"));

        apply_api_key_override(&mut config, Some("   ".into()));
        assert_eq!(config.credentials.openai_api_key.as_deref(), Some("from-env"));

        apply_api_key_override(&mut config, None);
        assert_eq!(config.credentials.openai_api_key.as_deref(), Some("from-env"));

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_inverted_year_range() {
        let tmp = scratch_with_defaults("autodash_config_years");
        rewrite(&tmp, "dashboard.toml", "min_year = 1980", "min_year = 2030");
        expect_validation_field(&tmp, "listings.min_year");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_equal_price_bounds() {
        let tmp = scratch_with_defaults("autodash_config_prices");
        rewrite(&tmp, "dashboard.toml", "max_price = 100000", "max_price = 1000");
        expect_validation_field(&tmp, "listings.min_price");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_default_count_above_max() {
        let tmp = scratch_with_defaults("autodash_config_count");
        rewrite(&tmp, "dashboard.toml", "default_count = 5", "default_count = 500");
        expect_validation_field(&tmp, "listings.default_count");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_make_without_models() {
        let tmp = scratch_with_defaults("autodash_config_empty_make");
        rewrite(
            &tmp,
            "dashboard.toml",
            r#"Honda = ["Civic", "Accord", "CR-V", "Fit"]"#,
            "Honda = []",
        );
        expect_validation_field(&tmp, "catalog.Honda");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let tmp = scratch_with_defaults("autodash_config_temperature");
        rewrite(
            &tmp,
            "services.toml",
            "enhance_temperature = 0.7",
            "enhance_temperature = 3.5",
        );
        expect_validation_field(&tmp, "openai.enhance_temperature");
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn file_not_found_for_missing_services_toml() {
        let tmp = scratch_with_defaults("autodash_config_missing_services");
        fs::remove_file(tmp.join("config/services.toml")).unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::FileNotFound { path } => assert!(path.ends_with("services.toml")),
            other => panic!("expected FileNotFound, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn parse_error_for_invalid_toml() {
        let tmp = scratch_with_defaults("autodash_config_invalid_toml");
        fs::write(tmp.join("config/dashboard.toml"), "this is not valid [[[ toml").unwrap();

        let err = load_config_from(&tmp).unwrap_err();
        match &err {
            ConfigError::ParseError { path, .. } => assert!(path.ends_with("dashboard.toml")),
            other => panic!("expected ParseError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_copies_missing_and_skips_examples() {
        let tmp = std::env::temp_dir().join("autodash_config_ensure");
        let _ = fs::remove_dir_all(&tmp);
        let defaults_dir = tmp.join("defaults");
        fs::create_dir_all(&defaults_dir).unwrap();

        let root = project_root();
        fs::copy(
            root.join("defaults/dashboard.toml"),
            defaults_dir.join("dashboard.toml"),
        )
        .unwrap();
        fs::copy(
            root.join("defaults/services.toml"),
            defaults_dir.join("services.toml"),
        )
        .unwrap();
        fs::write(
            defaults_dir.join("credentials.toml.example"),
            "openai_api_key = \"sk-...\"\n",
        )
        .unwrap();
        fs::write(defaults_dir.join("README.md"), "# defaults\n").unwrap();

        // Pre-existing user edits must survive.
        fs::create_dir_all(tmp.join("config")).unwrap();
        fs::write(tmp.join("config/dashboard.toml"), "# custom\n").unwrap();

        let copied = ensure_config_files(&tmp).expect("should succeed");
        assert_eq!(copied.len(), 1);
        assert!(copied[0].ends_with("services.toml"));
        assert!(!tmp.join("config/credentials.toml.example").exists());
        assert!(!tmp.join("config/README.md").exists());

        // A second run has nothing left to create.
        assert!(ensure_config_files(&tmp).unwrap().is_empty());
        assert_eq!(
            fs::read_to_string(tmp.join("config/dashboard.toml")).unwrap(),
            "# custom\n"
        );

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn ensure_config_files_errors_when_both_dirs_missing() {
        let tmp = std::env::temp_dir().join("autodash_config_both_missing");
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let err = ensure_config_files(&tmp).unwrap_err();
        match &err {
            ConfigError::DefaultsCopyError { message } => {
                assert!(message.contains("neither defaults/ nor config/"));
            }
            other => panic!("expected DefaultsCopyError, got: {other}"),
        }

        let _ = fs::remove_dir_all(&tmp);
    }
}
