use std::fmt;

use opentelemetry_semantic_conventions::attribute::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_NAME};

use crate::attributes::Attributes;

/// Placeholder used when a resource does not name its service or environment.
pub const UNKNOWN: &str = "unknown";

/// Identity of one statistics bucket: the originating service and the
/// deployment environment it runs in.
///
/// Ordering is by service, then environment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    service: String,
    environment: String,
}

impl GroupKey {
    /// Creates a key from explicit values. Empty values become [`UNKNOWN`].
    pub fn new(service: impl Into<String>, environment: impl Into<String>) -> Self {
        GroupKey {
            service: or_unknown(service.into()),
            environment: or_unknown(environment.into()),
        }
    }

    /// The `service.name` of the group.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// The `deployment.environment.name` of the group.
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Derives the key from a resource attribute set.
    pub(crate) fn from_resource<A: Attributes + ?Sized>(attributes: &A) -> Self {
        let read = |key: &str| {
            attributes
                .get_str(key)
                .map(|v| v.into_owned())
                .unwrap_or_default()
        };
        GroupKey::new(read(SERVICE_NAME), read(DEPLOYMENT_ENVIRONMENT_NAME))
    }
}

impl Default for GroupKey {
    fn default() -> Self {
        GroupKey::new(UNKNOWN, UNKNOWN)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "env:{}, service:{}", self.environment, self.service)
    }
}

fn or_unknown(value: String) -> String {
    if value.is_empty() {
        UNKNOWN.to_string()
    } else {
        value
    }
}
