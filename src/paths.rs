use anyhow::Context;
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

const CONFIG_FILE: &str = "config.toml";

/// Location of `config.toml`. The file may not exist; nothing is created.
pub fn config_file() -> anyhow::Result<PathBuf> {
    locate(
        env::var_os("CHATHUB_HOME"),
        env::var_os("XDG_CONFIG_HOME"),
        env::var_os("HOME"),
    )
}

/// `$CHATHUB_HOME`, then `$XDG_CONFIG_HOME/chathub`, then `~/.config/chathub`.
/// Empty variables count as unset.
fn locate(
    chathub_home: Option<OsString>,
    xdg_config_home: Option<OsString>,
    home: Option<OsString>,
) -> anyhow::Result<PathBuf> {
    let set = |v: Option<OsString>| v.filter(|s| !s.is_empty()).map(PathBuf::from);

    let dir = match (set(chathub_home), set(xdg_config_home)) {
        (Some(base), _) => base,
        (None, Some(xdg)) => xdg.join("chathub"),
        (None, None) => set(home)
            .context("HOME is not set")?
            .join(".config")
            .join("chathub"),
    };
    Ok(dir.join(CONFIG_FILE))
}
