use std::path::PathBuf;

const ENV_WORKSPACE: &str = "SCHOOLD_WORKSPACE";
const ENV_LOG: &str = "SCHOOLD_LOG";
const ENV_LOG_STYLE: &str = "SCHOOLD_LOG_STYLE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Workspace opened before the first request is read.
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
    pub log_style: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            workspace: non_empty(ENV_WORKSPACE).map(PathBuf::from),
            log_filter: non_empty(ENV_LOG).unwrap_or_else(|| "info".to_string()),
            log_style: non_empty(ENV_LOG_STYLE).unwrap_or_else(|| "never".to_string()),
        }
    }
}

/// stdout carries the response stream, so logs always go to stderr.
pub fn init_logging(config: &Config) {
    env_logger::Builder::new()
        .parse_filters(&config.log_filter)
        .parse_write_style(&config.log_style)
        .target(env_logger::Target::Stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let cfg = Config::from_lookup(lookup_from(&[]));
        assert_eq!(cfg.workspace, None);
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.log_style, "never");
    }

    #[test]
    fn blank_values_count_as_unset() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("SCHOOLD_WORKSPACE", "   "),
            ("SCHOOLD_LOG", "schoold=debug"),
        ]));
        assert_eq!(cfg.workspace, None);
        assert_eq!(cfg.log_filter, "schoold=debug");
    }

    #[test]
    fn workspace_is_read_as_path() {
        let cfg = Config::from_lookup(lookup_from(&[("SCHOOLD_WORKSPACE", "/tmp/school")]));
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/school")));
    }
}
