use std::env;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct ConfigFile {
    pub domains: Option<String>,
    pub paths: Option<String>,
    pub markers: Option<String>,
    pub base_paths: Option<String>,
    pub concurrency: Option<usize>,
    pub rate: Option<u32>,
    pub timeout: Option<u64>,
    pub max_content_read: Option<usize>,
    pub min_content_size: Option<u64>,
    pub http_status: Option<String>,
    pub content_types: Option<String>,
    pub disallowed_content_types: Option<String>,
    #[serde(alias = "disallowed_content_strings")]
    pub disallowed_strings: Option<String>,
    pub host_depth: Option<usize>,
    #[serde(alias = "env_append_words")]
    pub env_words: Option<String>,
    pub skip_root_folder_check: Option<bool>,
    pub dont_generate_paths: Option<bool>,
    pub dont_append_envs: Option<bool>,
    pub env_remove: Option<bool>,
    pub append_bypasses: Option<bool>,
    pub ignore_base_path_slash: Option<bool>,
    pub force_http: Option<bool>,
    pub disable_duplicate_check: Option<bool>,
    pub max_generated_words_per_host: Option<usize>,
    pub headers: Option<String>,
    pub proxy: Option<String>,
    pub fasthttp: Option<bool>,
    pub memory_ceiling: Option<u64>,
    pub output: Option<String>,
    pub output_format: Option<String>,
    pub no_color: Option<bool>,
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from))
        .or_else(|| {
            let drive = env::var_os("HOMEDRIVE")?;
            let path = env::var_os("HOMEPATH")?;
            Some(PathBuf::from(drive).join(path))
        })
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(home_dir()?.join(".dynfile").join("config.yml"))
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn expand_tilde_string(path: &str) -> String {
    expand_tilde(path).to_string_lossy().to_string()
}

pub fn load_config(path: &PathBuf, allow_missing: bool) -> Result<ConfigFile, String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_yaml::from_str::<ConfigFile>(&contents)
            .map_err(|e| format!("failed to parse config '{}': {e}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && allow_missing => {
            Ok(ConfigFile::default())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(format!("config file not found '{}'", path.display()))
        }
        Err(e) => Err(format!("failed to read config '{}': {e}", path.display())),
    }
}

pub fn default_config_yaml() -> String {
    r#"# dynfile config
#
# Location (default):
#   ~/.dynfile/config.yml
# Command line flags override every value below.

# Input lists (one entry per line)
# domains: ./domains.txt
# paths: ./paths.txt
# markers: ./markers.txt
# base_paths: ./base-paths.txt

# Performance
concurrency: 10
# rate defaults to concurrency
# rate: 10
timeout: 12
max_content_read: 5242880
# Producer pauses while process memory (MiB) is above this, 0 disables.
memory_ceiling: 900
fasthttp: false

# Rules (used when no marker is configured)
min_content_size: 0
http_status: ""
content_types: ""
disallowed_content_types: ""
disallowed_strings: ""

# Word generation
host_depth: 0
env_words: "prod,qa,dev,test,uat,stg,stage,sit,api"
skip_root_folder_check: false
dont_generate_paths: false
dont_append_envs: false
env_remove: false
append_bypasses: false
ignore_base_path_slash: false
max_generated_words_per_host: 0

# HTTP
force_http: false
disable_duplicate_check: false
# headers: "X-Api-Key: value,Referer: https://example.com/"
# proxy: http://127.0.0.1:8080

# Output
# output: ./findings.json
# output_format: json
no_color: false
"#
    .to_string()
}

pub fn ensure_default_config_file(path: &PathBuf) -> Result<(), String> {
    if path.exists() {
        return Ok(());
    }
    let parent = path
        .parent()
        .ok_or_else(|| format!("invalid config path '{}'", path.display()))?;
    std::fs::create_dir_all(parent).map_err(|e| {
        format!(
            "failed to create config directory '{}': {e}",
            parent.display()
        )
    })?;
    std::fs::write(path, default_config_yaml())
        .map_err(|e| format!("failed to write config file '{}': {e}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_yaml_parses() {
        let cfg: ConfigFile = serde_yaml::from_str(&default_config_yaml()).unwrap();
        assert_eq!(cfg.concurrency, Some(10));
        assert_eq!(cfg.timeout, Some(12));
        assert_eq!(cfg.memory_ceiling, Some(900));
        assert_eq!(
            cfg.env_words.as_deref(),
            Some("prod,qa,dev,test,uat,stg,stage,sit,api")
        );
        assert_eq!(cfg.rate, None);
        assert_eq!(cfg.paths, None);
    }

    #[test]
    fn aliases_are_accepted() {
        let cfg: ConfigFile =
            serde_yaml::from_str("disallowed_content_strings: \"Not Found\"\nenv_append_words: prod\n")
                .unwrap();
        assert_eq!(cfg.disallowed_strings.as_deref(), Some("Not Found"));
        assert_eq!(cfg.env_words.as_deref(), Some("prod"));
    }

    #[test]
    fn missing_config_is_optional_when_allowed() {
        let path = PathBuf::from("/nonexistent/dynfile/config.yml");
        assert!(load_config(&path, true).is_ok());
        assert!(load_config(&path, false).is_err());
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Some(home) = home_dir() {
            assert_eq!(expand_tilde("~/lists/paths.txt"), home.join("lists/paths.txt"));
        }
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }
}
