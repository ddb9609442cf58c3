use std::path::PathBuf;

use directories::BaseDirs;

fn env_home_dir() -> Option<PathBuf> {
    for var in ["HOME", "USERPROFILE"] {
        if let Some(home) = std::env::var_os(var) {
            if !home.is_empty() {
                return Some(PathBuf::from(home));
            }
        }
    }
    None
}

pub fn user_home_dir() -> Option<PathBuf> {
    if let Some(base) = BaseDirs::new() {
        return Some(base.home_dir().to_path_buf());
    }
    env_home_dir()
}

/// `$TOOLGATE_HOME`, or `~/.toolgate`. Created on first use.
pub fn toolgate_home_dir() -> Result<PathBuf, String> {
    if let Some(override_dir) = std::env::var_os("TOOLGATE_HOME") {
        let path = PathBuf::from(override_dir);
        if path.is_relative() {
            return Err("TOOLGATE_HOME must be an absolute path".to_string());
        }
        std::fs::create_dir_all(&path)
            .map_err(|e| format!("failed to create TOOLGATE_HOME directory: {e}"))?;
        return Ok(path);
    }

    let home = user_home_dir().ok_or_else(|| {
        "failed to resolve user home; set TOOLGATE_HOME or HOME/USERPROFILE".to_string()
    })?;
    let dir = home.join(".toolgate");
    std::fs::create_dir_all(&dir).map_err(|e| format!("failed to create ~/.toolgate: {e}"))?;
    Ok(dir)
}

pub fn toolgate_config_path() -> Result<PathBuf, String> {
    Ok(toolgate_home_dir()?.join("config.toml"))
}

pub fn display_cache_path() -> Result<PathBuf, String> {
    Ok(toolgate_home_dir()?.join("display-cache.db"))
}

pub fn executions_db_path() -> Result<PathBuf, String> {
    Ok(toolgate_home_dir()?.join("executions.db"))
}

/// Expand `~/`, and anchor relative paths under the toolgate home.
pub fn resolve_path(value: &str) -> Result<PathBuf, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("path override is empty".to_string());
    }
    if trimmed == "~" {
        if let Some(home) = user_home_dir() {
            return Ok(home);
        }
    }
    if let Some(rest) = trimmed.strip_prefix("~/") {
        if let Some(home) = user_home_dir() {
            return Ok(home.join(rest));
        }
    }
    let path = PathBuf::from(trimmed);
    if path.is_relative() {
        return Ok(toolgate_home_dir()?.join(path));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_paths_are_kept() {
        assert_eq!(
            resolve_path("/var/lib/toolgate/cache.db").unwrap(),
            PathBuf::from("/var/lib/toolgate/cache.db")
        );
    }

    #[test]
    fn empty_override_is_rejected() {
        assert!(resolve_path("   ").is_err());
    }
}
