//! Capture settings.
//!
//! Settings come from a plain text file of `key = value` lines:
//!
//! ```text
//! # capture everything to a file next to the executable
//! capscope.capture_enabled    = true
//! capscope.capture_file       = "frame.cpsc"
//! capscope.capture_file_flush = false
//! ```
//!
//! Anything after `#` is a comment. Values are a single token; one pair of surrounding quotes
//! is stripped. [`find_settings_file`] locates the file, [`load_settings_file`] turns it into
//! a key/value map and [`CaptureSettings::from_map`] interprets the keys this crate knows.
//! Unknown keys are ignored so one file can configure several tools.

use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use crate::{
    capture::DEFAULT_POOL_LIMIT,
    format::{FileSink, NullSink, TraceSink},
    Error, Result,
};

/// Prefix of every key this crate reads.
pub const SETTINGS_PREFIX: &str = "capscope.";

/// File name looked up in each search directory.
pub const SETTINGS_FILENAME: &str = "capscope_settings.txt";

/// Environment variable naming a settings file or a directory containing one.
pub const SETTINGS_ENV_VAR: &str = "CAPSCOPE_SETTINGS_PATH";

const KEY_CAPTURE_ENABLED: &str = "capscope.capture_enabled";
const KEY_CAPTURE_FILE: &str = "capscope.capture_file";
const KEY_CAPTURE_FILE_FLUSH: &str = "capscope.capture_file_flush";
const KEY_SCRATCH_POOL_LIMIT: &str = "capscope.scratch_pool_limit";

fn remove_quotes(value: &str) -> &str {
    let value = value
        .strip_prefix(['"', '\''])
        .unwrap_or(value);
    value.strip_suffix(['"', '\'']).unwrap_or(value)
}

/// Parses settings text, keeping keys that start with `filter` (all keys when empty).
///
/// Lines without `=`, without a key or without a value are skipped. Later occurrences of a key
/// replace earlier ones.
#[must_use]
pub fn parse_settings(text: &str, filter: &str) -> HashMap<String, String> {
    let mut settings = HashMap::new();
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or_default();
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let Some(value) = value.split_whitespace().next() else {
            continue;
        };
        if key.is_empty() || key.contains(char::is_whitespace) || !key.starts_with(filter) {
            continue;
        }
        settings.insert(key.to_string(), remove_quotes(value).to_string());
    }
    settings
}

/// Reads the settings file at `path`, keeping keys that start with `filter`.
///
/// # Errors
/// Returns [`Error::Io`] if the file cannot be read.
pub fn load_settings_file(path: impl AsRef<Path>, filter: &str) -> Result<HashMap<String, String>> {
    let text = fs::read_to_string(path.as_ref())?;
    let settings = parse_settings(&text, filter);
    log::debug!(
        "loaded {} settings from {}",
        settings.len(),
        path.as_ref().display()
    );
    Ok(settings)
}

/// Searches the default locations for a settings file.
///
/// In order: [`SETTINGS_ENV_VAR`] (a file, or a directory holding [`SETTINGS_FILENAME`]),
/// `$XDG_DATA_HOME/capscope/` (falling back to `$HOME/.local/share/capscope/`) and the
/// working directory.
#[must_use]
pub fn find_settings_file() -> Option<PathBuf> {
    find_settings_file_with(|name| env::var_os(name).map(PathBuf::from))
}

/// [`find_settings_file`] with a custom environment lookup.
pub fn find_settings_file_with(lookup: impl Fn(&str) -> Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = lookup(SETTINGS_ENV_VAR).filter(|p| !p.as_os_str().is_empty()) {
        let candidate = if path.is_dir() {
            path.join(SETTINGS_FILENAME)
        } else {
            path
        };
        if candidate.is_file() {
            log::debug!("using settings file {} from {SETTINGS_ENV_VAR}", candidate.display());
            return Some(candidate);
        }
    }

    let data_home = lookup("XDG_DATA_HOME")
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| lookup("HOME").map(|home| home.join(".local").join("share")));
    if let Some(data_home) = data_home {
        let candidate = data_home.join("capscope").join(SETTINGS_FILENAME);
        if candidate.is_file() {
            log::debug!("using settings file {}", candidate.display());
            return Some(candidate);
        }
    }

    let candidate = PathBuf::from(SETTINGS_FILENAME);
    candidate.is_file().then_some(candidate)
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" => Ok(false),
        _ => Err(Error::Settings(format!("{key} = {value}: expected a boolean"))),
    }
}

fn parse_usize(key: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| Error::Settings(format!("{key} = {value}: expected an unsigned integer")))
}

/// Interpreted capture settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Whether calls are encoded at all. Objects are wrapped either way.
    pub capture_enabled: bool,
    /// Trace file destination; `None` discards records.
    pub capture_file: Option<PathBuf>,
    /// Flush the trace file after every record.
    pub capture_file_flush: bool,
    /// Recycled scratch buffers retained per thread.
    pub scratch_pool_limit: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            capture_enabled: true,
            capture_file: None,
            capture_file_flush: false,
            scratch_pool_limit: DEFAULT_POOL_LIMIT,
        }
    }
}

impl CaptureSettings {
    /// Builds settings from a resolved key/value map, using defaults for absent keys.
    ///
    /// # Errors
    /// Returns [`Error::Settings`] for values that do not parse.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let mut settings = Self::default();
        if let Some(value) = map.get(KEY_CAPTURE_ENABLED) {
            settings.capture_enabled = parse_bool(KEY_CAPTURE_ENABLED, value)?;
        }
        if let Some(value) = map.get(KEY_CAPTURE_FILE) {
            settings.capture_file = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        if let Some(value) = map.get(KEY_CAPTURE_FILE_FLUSH) {
            settings.capture_file_flush = parse_bool(KEY_CAPTURE_FILE_FLUSH, value)?;
        }
        if let Some(value) = map.get(KEY_SCRATCH_POOL_LIMIT) {
            settings.scratch_pool_limit = parse_usize(KEY_SCRATCH_POOL_LIMIT, value)?;
        }
        Ok(settings)
    }

    /// Locates and loads the settings file, falling back to defaults when there is none.
    ///
    /// # Errors
    /// Returns an error if a located file cannot be read or holds invalid values.
    pub fn load() -> Result<Self> {
        match find_settings_file() {
            Some(path) => Self::from_map(&load_settings_file(path, SETTINGS_PREFIX)?),
            None => Ok(Self::default()),
        }
    }

    /// Opens the sink these settings describe.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the capture file cannot be created.
    pub fn create_sink(&self) -> Result<Box<dyn TraceSink>> {
        match (&self.capture_file, self.capture_enabled) {
            (Some(path), true) => Ok(Box::new(FileSink::create(path, self.capture_file_flush)?)),
            _ => Ok(Box::new(NullSink)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_settings() {
        let text = "\
# leading comment
capscope.capture_enabled = false   # trailing comment
capscope.capture_file='frame one.cpsc'
  capscope.capture_file_flush =  \"true\"
other.tool = 1
not a setting
capscope.empty =
";
        let settings = parse_settings(text, SETTINGS_PREFIX);
        assert_eq!(settings.len(), 3);
        assert_eq!(settings["capscope.capture_enabled"], "false");
        // Values are single tokens.
        assert_eq!(settings["capscope.capture_file"], "frame");
        assert_eq!(settings["capscope.capture_file_flush"], "true");

        let all = parse_settings(text, "");
        assert_eq!(all["other.tool"], "1");
    }

    #[test]
    fn test_from_map() {
        let map: HashMap<_, _> = [
            ("capscope.capture_file", "out.cpsc"),
            ("capscope.scratch_pool_limit", "8"),
            ("capscope.capture_file_flush", "ON"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let settings = CaptureSettings::from_map(&map).unwrap();
        assert!(settings.capture_enabled);
        assert_eq!(settings.capture_file, Some(PathBuf::from("out.cpsc")));
        assert!(settings.capture_file_flush);
        assert_eq!(settings.scratch_pool_limit, 8);
    }

    #[test]
    fn test_from_map_rejects_bad_values() {
        let map = HashMap::from([("capscope.capture_enabled".to_string(), "maybe".to_string())]);
        assert!(matches!(
            CaptureSettings::from_map(&map),
            Err(Error::Settings(message)) if message.contains("maybe")
        ));

        let map = HashMap::from([("capscope.scratch_pool_limit".to_string(), "-1".to_string())]);
        assert!(matches!(CaptureSettings::from_map(&map), Err(Error::Settings(_))));
    }

    #[test]
    fn test_load_and_find_from_env_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "capscope.capture_enabled = 0").unwrap();
        drop(file);

        let dir_path = dir.path().to_path_buf();
        let found = find_settings_file_with(|name| {
            (name == SETTINGS_ENV_VAR).then(|| dir_path.clone())
        })
        .unwrap();
        assert_eq!(found, path);

        let settings = CaptureSettings::from_map(&load_settings_file(&found, SETTINGS_PREFIX).unwrap())
            .unwrap();
        assert!(!settings.capture_enabled);
    }

    #[test]
    fn test_find_in_data_home() {
        let dir = tempfile::tempdir().unwrap();
        let settings_dir = dir.path().join(".local").join("share").join("capscope");
        fs::create_dir_all(&settings_dir).unwrap();
        fs::write(settings_dir.join(SETTINGS_FILENAME), "capscope.capture_enabled = 1\n").unwrap();

        let home = dir.path().to_path_buf();
        let found = find_settings_file_with(|name| (name == "HOME").then(|| home.clone()));
        assert_eq!(found, Some(settings_dir.join(SETTINGS_FILENAME)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_settings_file(dir.path().join("absent.txt"), SETTINGS_PREFIX),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_create_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.cpsc");
        let settings = CaptureSettings {
            capture_file: Some(path.clone()),
            ..CaptureSettings::default()
        };
        let mut sink = settings.create_sink().unwrap();
        sink.flush().unwrap();
        assert!(path.is_file());

        let disabled = CaptureSettings {
            capture_enabled: false,
            capture_file: Some(dir.path().join("never.cpsc")),
            ..CaptureSettings::default()
        };
        disabled.create_sink().unwrap();
        assert!(!dir.path().join("never.cpsc").exists());
    }
}
