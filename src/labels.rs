//! Label schema and process-wide base label values.
//!
//! Every observation of the cursor summary carries the same positional label
//! set. The first nine values describe the process and are fixed at startup
//! (apart from the entry identity, which an administrator may override); the
//! trailing values are supplied per span.
//!
//! ```text
//! entry_name entry_type realm region az domain instance app_version app_name [parent] operation status
//! └──────── base values, guarded by the registry mutex ────────────────────┘ └──── per span ─────────┘
//! ```

use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use tracing::info;

use crate::error::CursorError;
use crate::identity::ProcessIdentity;

/// Status label value for spans without an observed error.
pub const STATUS_OK: &str = "OK";

/// Status label value for spans with an observed error.
pub const STATUS_ERROR: &str = "ERROR";

/// Label key names.
pub mod keys {
    pub const ENTRY_NAME: &str = "entry_name";
    pub const ENTRY_TYPE: &str = "entry_type";
    pub const REALM: &str = "realm";
    pub const REGION: &str = "region";
    pub const AZ: &str = "az";
    pub const DOMAIN: &str = "domain";
    pub const INSTANCE: &str = "instance";
    pub const APP_VERSION: &str = "app_version";
    pub const APP_NAME: &str = "app_name";
    pub const PARENT: &str = "parent";
    pub const OPERATION: &str = "operation";
    pub const STATUS: &str = "status";
}

const BASE_LEN: usize = 9;

const V1_KEYS: [&str; 11] = [
    keys::ENTRY_NAME,
    keys::ENTRY_TYPE,
    keys::REALM,
    keys::REGION,
    keys::AZ,
    keys::DOMAIN,
    keys::INSTANCE,
    keys::APP_VERSION,
    keys::APP_NAME,
    keys::OPERATION,
    keys::STATUS,
];

const V2_KEYS: [&str; 12] = [
    keys::ENTRY_NAME,
    keys::ENTRY_TYPE,
    keys::REALM,
    keys::REGION,
    keys::AZ,
    keys::DOMAIN,
    keys::INSTANCE,
    keys::APP_VERSION,
    keys::APP_NAME,
    keys::PARENT,
    keys::OPERATION,
    keys::STATUS,
];

/// Which label set the cursor summary is exported with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelSchema {
    /// Operation and status only.
    V1,
    /// Adds the resolved parent of each operation.
    #[default]
    V2,
}

impl LabelSchema {
    /// Ordered label keys for this schema.
    pub fn keys(self) -> &'static [&'static str] {
        match self {
            LabelSchema::V1 => &V1_KEYS,
            LabelSchema::V2 => &V2_KEYS,
        }
    }

    pub fn has_parent(self) -> bool {
        matches!(self, LabelSchema::V2)
    }
}

impl FromStr for LabelSchema {
    type Err = CursorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" | "1" => Ok(LabelSchema::V1),
            "v2" | "2" => Ok(LabelSchema::V2),
            other => Err(CursorError::ConfigError(format!(
                "Unknown label schema '{other}', expected v1 or v2"
            ))),
        }
    }
}

/// Base label values shared by every span in the process.
#[derive(Debug)]
pub struct LabelRegistry {
    schema: LabelSchema,
    values: Mutex<[String; BASE_LEN]>,
}

impl LabelRegistry {
    /// Populate base values from the process identity.
    ///
    /// Entry name and type start empty until overridden.
    pub fn new(schema: LabelSchema, identity: &ProcessIdentity) -> Self {
        Self {
            schema,
            values: Mutex::new([
                String::new(),
                String::new(),
                identity.realm.clone(),
                identity.region.clone(),
                identity.az.clone(),
                identity.domain.clone(),
                identity.instance().to_string(),
                identity.app_version.clone(),
                identity.app_name.clone(),
            ]),
        }
    }

    pub fn schema(&self) -> LabelSchema {
        self.schema
    }

    pub fn keys(&self) -> &'static [&'static str] {
        self.schema.keys()
    }

    /// Replace the process-wide entry name and type.
    ///
    /// Meant for startup, once per instrumented entry.
    pub fn override_identity(&self, entry_name: &str, entry_type: &str) {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        let [name, ty, ..] = &mut *values;
        *name = entry_name.to_string();
        *ty = entry_type.to_string();
        info!(entry_name, entry_type, "Overrode cursor entry identity");
    }

    /// Snapshot of the base values.
    pub fn base_values(&self) -> Vec<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .to_vec()
    }

    /// Build the full label vector for one span.
    ///
    /// Non-empty `entry_name`/`entry_type` replace the registry's identity for
    /// this span only. `parent` is dropped under [`LabelSchema::V1`]. The
    /// returned vector is always freshly allocated and matches [`keys`](Self::keys)
    /// in length and order.
    pub fn merged_values(
        &self,
        parent: &str,
        operation: &str,
        entry_name: &str,
        entry_type: &str,
        success: bool,
    ) -> Vec<String> {
        let mut merged = Vec::with_capacity(self.keys().len());
        {
            let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
            let [name, ty, rest @ ..] = &*values;
            merged.push(pick(entry_name, name));
            merged.push(pick(entry_type, ty));
            merged.extend(rest.iter().cloned());
        }

        if self.schema.has_parent() {
            merged.push(parent.to_string());
        }
        merged.push(operation.to_string());
        merged.push(if success { STATUS_OK } else { STATUS_ERROR }.to_string());
        merged
    }
}

fn pick(preferred: &str, fallback: &str) -> String {
    if preferred.is_empty() {
        fallback.to_string()
    } else {
        preferred.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn identity() -> ProcessIdentity {
        ProcessIdentity {
            app_name: "orders".to_string(),
            app_version: "1.4.0".to_string(),
            realm: "prod".to_string(),
            region: "eu-west-1".to_string(),
            az: "eu-west-1a".to_string(),
            domain: "shop".to_string(),
            hostname: "node-7".to_string(),
            local_ip: "10.0.0.7".to_string(),
        }
    }

    #[test]
    fn test_schema_keys() {
        assert_eq!(LabelSchema::V1.keys().len(), 11);
        assert_eq!(LabelSchema::V2.keys().len(), 12);
        assert_eq!(LabelSchema::V2.keys()[9], keys::PARENT);
        assert!(!LabelSchema::V1.keys().contains(&keys::PARENT));
        assert_eq!(LabelSchema::default(), LabelSchema::V2);
    }

    #[test]
    fn test_schema_from_str() {
        assert_eq!("v1".parse::<LabelSchema>().unwrap(), LabelSchema::V1);
        assert_eq!(" V2 ".parse::<LabelSchema>().unwrap(), LabelSchema::V2);
        assert!("v3".parse::<LabelSchema>().is_err());
    }

    #[test]
    fn test_base_values_from_identity() {
        let registry = LabelRegistry::new(LabelSchema::V2, &identity());
        assert_eq!(
            registry.base_values(),
            vec!["", "", "prod", "eu-west-1", "eu-west-1a", "shop", "node-7", "1.4.0", "orders"]
        );
    }

    #[test]
    fn test_merged_values_v2() {
        let registry = LabelRegistry::new(LabelSchema::V2, &identity());
        let merged = registry.merged_values("caller", "op", "svc", "grpc", true);
        assert_eq!(merged.len(), registry.keys().len());
        assert_eq!(&merged[..2], ["svc", "grpc"]);
        assert_eq!(&merged[9..], ["caller", "op", STATUS_OK]);
    }

    #[test]
    fn test_merged_values_v1_drops_parent() {
        let registry = LabelRegistry::new(LabelSchema::V1, &identity());
        let merged = registry.merged_values("caller", "op", "", "", false);
        assert_eq!(merged.len(), registry.keys().len());
        assert_eq!(&merged[9..], ["op", STATUS_ERROR]);
    }

    #[test]
    fn test_override_identity_applies_when_span_identity_empty() {
        let registry = LabelRegistry::new(LabelSchema::V2, &identity());
        registry.override_identity("svc-a", "grpc");

        let merged = registry.merged_values("-", "op", "", "", true);
        assert_eq!(&merged[..2], ["svc-a", "grpc"]);

        let merged = registry.merged_values("-", "op", "svc-b", "", true);
        assert_eq!(&merged[..2], ["svc-b", "grpc"]);
    }

    #[test]
    fn test_merged_values_does_not_touch_base() {
        let registry = LabelRegistry::new(LabelSchema::V2, &identity());
        let before = registry.base_values();
        let mut merged = registry.merged_values("p", "op", "svc", "http", true);
        merged[2] = "mutated".to_string();
        assert_eq!(registry.base_values(), before);
    }

    #[test]
    fn test_merged_values_concurrent_no_bleed() {
        let registry = Arc::new(LabelRegistry::new(LabelSchema::V2, &identity()));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for j in 0..500 {
                        let parent = format!("parent-{i}");
                        let operation = format!("op-{i}-{j}");
                        let success = (i + j) % 2 == 0;
                        let merged = registry.merged_values(&parent, &operation, "", "", success);
                        assert_eq!(merged.len(), 12);
                        assert_eq!(merged[9], parent);
                        assert_eq!(merged[10], operation);
                        assert_eq!(merged[11], if success { STATUS_OK } else { STATUS_ERROR });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
