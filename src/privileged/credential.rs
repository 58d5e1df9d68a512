//! Elevated credential cache and the `sudo` runner. The credential lives only in this process's
//! memory and reaches `sudo` through its stdin; it is never put on a command line.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::ffi::OsStr;
use std::io::Write;
use std::process::{Child, Command, Output, Stdio};
use std::sync::{PoisonError, RwLock};

use crate::error::IndexError;
use crate::utils::config::ElevationConsts;

/// Process-wide cache for the elevated credential.
#[derive(Default)]
pub struct CredentialCache {
    secret: RwLock<Option<String>>,
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("set", &self.is_set())
            .finish()
    }
}

/// Overwrite the bytes before the allocation is released.
fn wipe(s: &mut String) {
    // SAFETY: zero bytes are valid UTF-8.
    unsafe { s.as_mut_vec().fill(0) };
    s.clear();
}

impl CredentialCache {
    /// Store `secret`; an empty string clears the cache.
    pub fn set(&self, secret: &str) {
        let mut guard = self.secret.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = guard.as_mut() {
            wipe(old);
        }
        *guard = (!secret.is_empty()).then(|| secret.to_string());
    }

    pub fn clear(&self) {
        self.set("");
    }

    pub fn is_set(&self) -> bool {
        self.secret
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn get(&self) -> Option<String> {
        self.secret
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for CredentialCache {
    fn drop(&mut self) {
        if let Some(s) = self
            .secret
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            wipe(s);
        }
    }
}

/// `sudo` transcript lines that mean the credential was wrong or missing.
const AUTH_FAILURE_MARKERS: &[&str] = &[
    "incorrect password",
    "sorry, try again",
    "password is required",
    "no password was provided",
    "authentication failure",
];

pub fn is_auth_failure(transcript: &str) -> bool {
    let t = transcript.to_lowercase();
    AUTH_FAILURE_MARKERS.iter().any(|m| t.contains(m))
}

/// Runs commands through `sudo`, feeding the cached credential on stdin when needed.
pub struct Elevation<'a> {
    cache: &'a CredentialCache,
}

impl<'a> Elevation<'a> {
    pub fn new(cache: &'a CredentialCache) -> Self {
        Self { cache }
    }

    fn sudo_cmd(program: &OsStr, args: &[&OsStr], with_stdin: bool) -> Command {
        let mut cmd = Command::new(ElevationConsts::SUDO);
        if with_stdin {
            // -S: read the credential from stdin; -p '': no prompt text in the transcript.
            cmd.args(["-S", "-p", ""]);
        } else {
            cmd.arg("-n");
        }
        cmd.arg("--").arg(program).args(args).env("LC_ALL", "C");
        cmd
    }

    /// Spawn `program args...` elevated with the credential written to its stdin. Stdout and
    /// stderr are piped for the caller. Errors with `ElevationFailed` when no credential is cached.
    pub fn spawn(&self, program: &OsStr, args: &[&OsStr]) -> Result<Child> {
        let secret = self
            .cache
            .get()
            .ok_or_else(|| IndexError::ElevationFailed("no credential set".to_string()))?;
        let mut child = Self::sudo_cmd(program, args, true)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn {}", ElevationConsts::SUDO))?;
        if let Some(mut stdin) = child.stdin.take() {
            let mut line = secret;
            line.push('\n');
            let res = stdin.write_all(line.as_bytes());
            wipe(&mut line);
            // A command that never reads stdin may close it early; its exit status tells the story.
            if let Err(e) = res {
                debug!("write credential to sudo: {}", e);
            }
        }
        Ok(child)
    }

    /// Run to completion. Tries the cached sudo timestamp first (`-n`), then the credential.
    /// An authentication failure clears the cache and yields `ElevationFailed`.
    pub fn run(&self, program: &OsStr, args: &[&OsStr]) -> Result<Output> {
        let quick = Self::sudo_cmd(program, args, false)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("run {}", ElevationConsts::SUDO))?;
        if quick.status.success() {
            return Ok(quick);
        }
        if !is_auth_failure(&String::from_utf8_lossy(&quick.stderr)) {
            return Ok(quick);
        }
        let out = self
            .spawn(program, args)?
            .wait_with_output()
            .context("wait for elevated command")?;
        if !out.status.success() {
            self.check_auth(&String::from_utf8_lossy(&out.stderr))?;
        }
        Ok(out)
    }

    /// Clear the credential and fail if `transcript` shows an authentication failure.
    pub fn check_auth(&self, transcript: &str) -> Result<()> {
        if is_auth_failure(transcript) {
            self.cache.clear();
            warn!("elevated credential rejected; cleared");
            return Err(IndexError::ElevationFailed(transcript.trim().to_string()).into());
        }
        Ok(())
    }

    /// `sudo -v`: refresh the timestamp so later `-n` calls skip the credential.
    pub fn warm_up(&self) -> Result<()> {
        let secret = self
            .cache
            .get()
            .ok_or_else(|| IndexError::ElevationFailed("no credential set".to_string()))?;
        let mut child = Command::new(ElevationConsts::SUDO)
            .args(["-S", "-p", "", "-v"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn {} -v", ElevationConsts::SUDO))?;
        if let Some(mut stdin) = child.stdin.take() {
            let mut line = secret;
            line.push('\n');
            let _ = stdin.write_all(line.as_bytes());
            wipe(&mut line);
        }
        let out = child.wait_with_output().context("wait for sudo -v")?;
        if !out.status.success() {
            self.check_auth(&String::from_utf8_lossy(&out.stderr))?;
            anyhow::bail!(
                "sudo -v failed: {}",
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        debug!("sudo timestamp refreshed");
        Ok(())
    }
}
