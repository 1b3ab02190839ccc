//! Local host name resolution for stamping the origin host on beans.

use crate::error::{Error, Result};

/// Source of the local host name.
pub trait HostResolver: Send + Sync {
    fn local_host_name(&self) -> Result<String>;
}

impl<F> HostResolver for F
where
    F: Fn() -> Result<String> + Send + Sync,
{
    fn local_host_name(&self) -> Result<String> {
        self()
    }
}

/// Asks the operating system for the machine's host name.
///
/// Environment variables are not consulted: an inherited `HOSTNAME` may name
/// some other machine. Use [`FixedHostResolver`] to override the name.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHostResolver;

impl HostResolver for SystemHostResolver {
    fn local_host_name(&self) -> Result<String> {
        let name = os_host_name()
            .map_err(|e| Error::HostResolution(format!("gethostname failed: {e}")))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::HostResolution(
                "operating system reported an empty host name".to_string(),
            ));
        }
        Ok(name.to_string())
    }
}

#[cfg(unix)]
fn os_host_name() -> std::io::Result<String> {
    let mut buf = [0u8; 256];
    // SAFETY: the pointer and length describe `buf`, which outlives the call.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // Truncated names may come back without a terminator.
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..len]).into_owned())
}

#[cfg(windows)]
fn os_host_name() -> std::io::Result<String> {
    // Set by the system for every process.
    std::env::var("COMPUTERNAME")
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::NotFound, e))
}

/// Always answers with the same name. For containers whose kernel host
/// name is meaningless to operators.
#[derive(Debug, Clone)]
pub struct FixedHostResolver(String);

impl FixedHostResolver {
    pub fn new(host_name: impl Into<String>) -> Self {
        Self(host_name.into())
    }
}

impl HostResolver for FixedHostResolver {
    fn local_host_name(&self) -> Result<String> {
        if self.0.trim().is_empty() {
            return Err(Error::HostResolution("configured host name is empty".to_string()));
        }
        Ok(self.0.clone())
    }
}
