use std::path::PathBuf;

/// Where bookings are made durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Wal,
    Memory,
}

impl std::str::FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wal" => Ok(StorageKind::Wal),
            "memory" => Ok(StorageKind::Memory),
            other => Err(format!("unknown storage kind: {other} (expected wal or memory)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub storage: StorageKind,
    pub data_dir: PathBuf,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    /// Request header carrying the authenticated actor id.
    pub actor_header: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            storage: StorageKind::Wal,
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            metrics_port: None,
            actor_header: "x-actor-id".into(),
        }
    }
}

impl Config {
    /// Read `WINGSLOT_*` variables from the process environment.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unparseable numbers fall back
    /// to defaults; an unknown storage kind is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let defaults = Self::default();
        let storage = match lookup("WINGSLOT_STORAGE") {
            Some(s) => s.parse()?,
            None => defaults.storage,
        };
        Ok(Self {
            bind: lookup("WINGSLOT_BIND").unwrap_or(defaults.bind),
            port: lookup("WINGSLOT_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            storage,
            data_dir: lookup("WINGSLOT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            compact_threshold: lookup("WINGSLOT_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
            metrics_port: lookup("WINGSLOT_METRICS_PORT").and_then(|s| s.parse().ok()),
            actor_header: lookup("WINGSLOT_ACTOR_HEADER")
                .map(|h| h.to_ascii_lowercase())
                .unwrap_or(defaults.actor_header),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("bookings.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = from_pairs(&[]).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:8080");
        assert_eq!(cfg.storage, StorageKind::Wal);
        assert_eq!(cfg.wal_path(), PathBuf::from("./data/bookings.wal"));
        assert_eq!(cfg.metrics_port, None);
        assert_eq!(cfg.actor_header, "x-actor-id");
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = from_pairs(&[
            ("WINGSLOT_BIND", "127.0.0.1"),
            ("WINGSLOT_PORT", "9000"),
            ("WINGSLOT_STORAGE", "Memory"),
            ("WINGSLOT_METRICS_PORT", "9100"),
            ("WINGSLOT_ACTOR_HEADER", "X-User-Id"),
        ])
        .unwrap();
        assert_eq!(cfg.addr(), "127.0.0.1:9000");
        assert_eq!(cfg.storage, StorageKind::Memory);
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.actor_header, "x-user-id");
    }

    #[test]
    fn bad_numbers_fall_back() {
        let cfg = from_pairs(&[
            ("WINGSLOT_PORT", "not-a-port"),
            ("WINGSLOT_COMPACT_THRESHOLD", "-5"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.compact_threshold, 1000);
    }

    #[test]
    fn unknown_storage_is_an_error() {
        let err = from_pairs(&[("WINGSLOT_STORAGE", "postgres")]).unwrap_err();
        assert!(err.contains("unknown storage kind"));
    }
}
