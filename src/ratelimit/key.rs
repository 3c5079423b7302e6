//! Composite client key generation and validation.

use crate::error::{Result, TurnstileError};

/// Separator between the client and resource parts of a key.
pub const KEY_SEPARATOR: char = ':';

/// Resource used when a request does not name one.
pub const DEFAULT_RESOURCE: &str = "default";

/// A key that uniquely identifies a (client, resource) pair.
///
/// Neither part may contain [`KEY_SEPARATOR`], so the rendered key is
/// unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    client_id: String,
    resource: String,
    rendered: String,
}

impl ClientKey {
    /// Create a new key from a client identifier and resource.
    pub fn new(client_id: &str, resource: &str) -> Result<Self> {
        if client_id.is_empty() {
            return Err(TurnstileError::InvalidRequest(
                "client_id is required".to_string(),
            ));
        }

        for (field, value) in [("client_id", client_id), ("resource", resource)] {
            if value.contains(KEY_SEPARATOR) {
                return Err(TurnstileError::InvalidRequest(format!(
                    "{} must not contain '{}'",
                    field, KEY_SEPARATOR
                )));
            }
        }

        Ok(Self {
            client_id: client_id.to_string(),
            resource: resource.to_string(),
            rendered: format!("{}{}{}", client_id, KEY_SEPARATOR, resource),
        })
    }

    /// The client part of the key.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The resource part of the key.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The rendered `client_id:resource` form used to index ledgers.
    pub fn as_str(&self) -> &str {
        &self.rendered
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.rendered)
    }
}
