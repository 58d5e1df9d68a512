//! Elevated credential loading for the CLI: env var → secure prompt. Never written anywhere.

use anyhow::{Context, Result};
use colored::Colorize;
use log::info;

use crate::utils::config::PackagePaths;

fn from_env() -> Option<String> {
    let key = PackagePaths::get().env_var("SUDO_PASSWORD");
    let s = std::env::var(&key).ok()?;
    let s = s.trim_end_matches(['\r', '\n']).to_string();
    (!s.is_empty()).then(|| {
        info!("Elevated credential found in {}", key);
        s
    })
}

/// Read the elevated credential: env (`FILECAT_SUDO_PASSWORD`) → secure prompt.
pub fn prompt_credential() -> Result<String> {
    if let Some(s) = from_env() {
        return Ok(s);
    }
    let label = format!("[{}]", env!("CARGO_PKG_NAME")).cyan().bold();
    let pass = rpassword::prompt_password(format!("{} sudo password: ", label))
        .context("read sudo password")?;
    Ok(pass.trim_end_matches(['\r', '\n']).to_string())
}
