use anyhow::{Context, Result};
use std::path::PathBuf;

/// Resolve the application home directory.
///
/// An explicit `requested` path wins: `~` and `~/...` expand against the
/// user's home, relative paths resolve against the current directory. When
/// absent, the platform home plus `default_subdir` is used:
/// - Windows: `%APPDATA%/<default_subdir>`
/// - Unix/macOS: `$HOME/<default_subdir>`
///
/// With `create` set, the directory is created before returning.
pub fn resolve_home_dir(
    requested: Option<String>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf> {
    let path = match requested {
        Some(raw) => expand_tilde(raw.trim())?,
        None => user_home()?.join(default_subdir),
    };

    let path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .context("cannot determine current directory")?
            .join(path)
    };

    if create {
        std::fs::create_dir_all(&path)
            .with_context(|| format!("cannot create home dir {}", path.display()))?;
    }

    Ok(path)
}

fn user_home() -> Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .context("APPDATA is not set")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .context("HOME is not set")
    }
}

fn expand_tilde(raw: &str) -> Result<PathBuf> {
    if raw == "~" {
        return user_home();
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        return Ok(user_home()?.join(rest));
    }
    Ok(PathBuf::from(raw))
}
