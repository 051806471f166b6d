//! INI file configuration adapter.

use crate::domain::error::EngineError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    ini: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let mut ini = Ini::new();
        ini.load(path.as_ref())
            .map_err(|reason| EngineError::ConfigParse {
                file: path.as_ref().display().to_string(),
                reason,
            })?;
        Ok(Self { ini })
    }

    pub fn from_string(content: &str) -> Result<Self, EngineError> {
        let mut ini = Ini::new();
        ini.read(content.to_string())
            .map_err(|reason| EngineError::ConfigParse {
                file: "<inline>".to_string(),
                reason,
            })?;
        Ok(Self { ini })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.ini.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.ini.getint(section, key).ok().flatten().unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.ini
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini
            .get(section, key)
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[session]
symbol = MNQ
timezone = America/New_York
timeframe_minutes = 5

[trade]
tick_size = 0.25
side_mode = both

[risk]
account_sizing = yes
max_contracts = 3
"#;

    #[test]
    fn from_string_reads_sections() {
        let config = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(config.get_string("session", "symbol"), Some("MNQ".into()));
        assert_eq!(
            config.get_string("session", "timezone"),
            Some("America/New_York".into())
        );
        assert_eq!(config.get_int("session", "timeframe_minutes", 0), 5);
        assert_eq!(config.get_double("trade", "tick_size", 0.0), 0.25);
        assert!(config.get_bool("risk", "account_sizing", false));
        assert_eq!(config.get_int("risk", "max_contracts", 1), 3);
    }

    #[test]
    fn missing_keys_yield_none_or_default() {
        let config = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(config.get_string("session", "nonexistent"), None);
        assert_eq!(config.get_string("nonexistent", "symbol"), None);
        assert_eq!(config.get_int("session", "nonexistent", 42), 42);
        assert_eq!(config.get_double("trade", "nonexistent", 1.5), 1.5);
        assert!(config.get_bool("risk", "nonexistent", true));
    }

    #[test]
    fn malformed_numbers_fall_back_to_default() {
        let config =
            FileConfigAdapter::from_string("[session]\ntimeframe_minutes = five\n").unwrap();
        assert_eq!(config.get_int("session", "timeframe_minutes", 5), 5);
        assert_eq!(config.get_double("session", "timeframe_minutes", 5.0), 5.0);
    }

    #[test]
    fn bool_spellings() {
        let config = FileConfigAdapter::from_string(
            "[flags]\na = on\nb = off\nc = 1\nd = NO\ne = maybe\n",
        )
        .unwrap();
        assert!(config.get_bool("flags", "a", false));
        assert!(!config.get_bool("flags", "b", true));
        assert!(config.get_bool("flags", "c", false));
        assert!(!config.get_bool("flags", "d", true));
        assert!(config.get_bool("flags", "e", true));
    }

    #[test]
    fn from_file_round_trip() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{SAMPLE}").unwrap();
        let config = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(config.get_string("session", "symbol"), Some("MNQ".into()));
    }

    #[test]
    fn from_file_missing_path_errors() {
        let err = FileConfigAdapter::from_file("/nonexistent/oprtrader.ini").unwrap_err();
        assert!(matches!(err, EngineError::ConfigParse { .. }));
    }
}
