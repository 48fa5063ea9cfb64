//! Process identity used for the static metric labels.
//!
//! Deployment coordinates come from the `REALM`, `REGION`, `AZ` and `DOMAIN`
//! environment variables (default `*`). The host is identified by its hostname
//! and the first non-loopback IPv4 address found on a local interface.

use std::env;
use std::net::IpAddr;

use serde::Serialize;
use tracing::debug;

/// Value used for unset deployment coordinates.
pub const ANY: &str = "*";

/// Fallback for hostname and address detection.
pub const LOCALHOST: &str = "localhost";

/// Static description of the running process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessIdentity {
    pub app_name: String,
    pub app_version: String,
    pub realm: String,
    pub region: String,
    pub az: String,
    pub domain: String,
    pub hostname: String,
    pub local_ip: String,
}

impl ProcessIdentity {
    /// Detect the identity of the current process.
    pub fn detect(app_name: impl Into<String>, app_version: impl Into<String>) -> Self {
        let identity = Self {
            app_name: app_name.into(),
            app_version: app_version.into(),
            realm: env_or_any("REALM"),
            region: env_or_any("REGION"),
            az: env_or_any("AZ"),
            domain: env_or_any("DOMAIN"),
            hostname: local_hostname(),
            local_ip: local_ipv4(),
        };
        debug!(
            hostname = %identity.hostname,
            local_ip = %identity.local_ip,
            realm = %identity.realm,
            region = %identity.region,
            "Detected process identity"
        );
        identity
    }

    /// The label value identifying this instance.
    pub fn instance(&self) -> &str {
        &self.hostname
    }
}

impl Default for ProcessIdentity {
    fn default() -> Self {
        Self {
            app_name: env!("CARGO_PKG_NAME").to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            realm: ANY.to_string(),
            region: ANY.to_string(),
            az: ANY.to_string(),
            domain: ANY.to_string(),
            hostname: LOCALHOST.to_string(),
            local_ip: LOCALHOST.to_string(),
        }
    }
}

fn env_or_any(name: &str) -> String {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| ANY.to_string())
}

/// Hostname of the local machine, or `localhost` if it cannot be read.
pub fn local_hostname() -> String {
    gethostname::gethostname()
        .into_string()
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| LOCALHOST.to_string())
}

/// First non-loopback IPv4 address of a local interface, or `localhost`.
pub fn local_ipv4() -> String {
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => first_ipv4(
            interfaces
                .iter()
                .filter(|iface| !iface.is_loopback())
                .map(if_addrs::Interface::ip),
        ),
        Err(e) => {
            debug!(error = %e, "Failed to enumerate network interfaces");
            LOCALHOST.to_string()
        }
    }
}

fn first_ipv4(addrs: impl IntoIterator<Item = IpAddr>) -> String {
    addrs
        .into_iter()
        .find_map(|addr| match addr {
            IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_unspecified() => Some(v4.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| LOCALHOST.to_string())
}
