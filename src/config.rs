use std::path::PathBuf;
use std::str::FromStr;

/// Server settings, read from `SEATBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5480,
            bind: "0.0.0.0".into(),
            data_dir: PathBuf::from("./data"),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable values fall back to the default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: parsed(&lookup, "SEATBOOK_PORT").unwrap_or(defaults.port),
            bind: lookup("SEATBOOK_BIND").unwrap_or(defaults.bind),
            data_dir: lookup("SEATBOOK_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            max_connections: parsed(&lookup, "SEATBOOK_MAX_CONNECTIONS")
                .filter(|&n| n > 0)
                .unwrap_or(defaults.max_connections),
            compact_threshold: parsed(&lookup, "SEATBOOK_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            metrics_port: parsed(&lookup, "SEATBOOK_METRICS_PORT"),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("seatbook.wal")
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("ignoring invalid {key}={raw:?}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let c = config(&[]);
        assert_eq!(c, Config::default());
        assert_eq!(c.wal_path(), PathBuf::from("./data/seatbook.wal"));
    }

    #[test]
    fn reads_overrides() {
        let c = config(&[
            ("SEATBOOK_PORT", "6000"),
            ("SEATBOOK_BIND", "127.0.0.1"),
            ("SEATBOOK_DATA_DIR", "/var/lib/seatbook"),
            ("SEATBOOK_MAX_CONNECTIONS", "8"),
            ("SEATBOOK_COMPACT_THRESHOLD", "50"),
            ("SEATBOOK_METRICS_PORT", "9100"),
        ]);
        assert_eq!(c.port, 6000);
        assert_eq!(c.bind, "127.0.0.1");
        assert_eq!(c.wal_path(), PathBuf::from("/var/lib/seatbook/seatbook.wal"));
        assert_eq!(c.max_connections, 8);
        assert_eq!(c.compact_threshold, 50);
        assert_eq!(c.metrics_port, Some(9100));
    }

    #[test]
    fn invalid_values_fall_back() {
        let c = config(&[
            ("SEATBOOK_PORT", "http"),
            ("SEATBOOK_MAX_CONNECTIONS", "0"),
            ("SEATBOOK_METRICS_PORT", "-1"),
        ]);
        assert_eq!(c.port, 5480);
        assert_eq!(c.max_connections, 256);
        assert_eq!(c.metrics_port, None);
    }
}
