// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Newtype wrappers for validated inputs.
//!
//! All types validate their invariants at creation time.

use std::fmt;

use crate::error::HardValidationError;

/// Validated TCP port.
/// Must be in range 1-65535 (0 is reserved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Port(u16);

impl Port {
    /// Create a new Port with validation.
    pub fn new(port: u16) -> Result<Self, HardValidationError> {
        if port == 0 {
            return Err(HardValidationError::InvalidPort {
                port,
                reason: "Port 0 is reserved and cannot be used".to_string(),
            });
        }
        Ok(Self(port))
    }

    /// Const constructor for the fixed backend ports.
    pub(crate) const fn fixed(port: u16) -> Self {
        assert!(port != 0);
        Self(port)
    }

    /// Get the inner port value.
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated control-plane tenant identifier.
/// Non-empty, alphanumeric with hyphens/underscores, max 64 chars.
/// A dot is not allowed because it separates user and tenant in the login name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantId(String);

impl TenantId {
    /// Create a new TenantId with validation.
    pub fn new(id: impl Into<String>) -> Result<Self, HardValidationError> {
        let id = id.into();

        if id.is_empty() {
            return Err(HardValidationError::InvalidFieldValue {
                field: "tenant",
                value: id,
                reason: "Tenant ID cannot be empty".to_string(),
            });
        }

        if id.len() > 64 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "tenant",
                value: id.clone(),
                reason: format!("Tenant ID too long: {} chars (max 64)", id.len()),
            });
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(HardValidationError::InvalidFieldValue {
                field: "tenant",
                value: id,
                reason: "Tenant ID must contain only ASCII letters, digits, hyphens, and underscores"
                    .to_string(),
            });
        }

        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_valid() {
        assert!(Port::new(5001).is_ok());
        assert!(Port::new(1).is_ok());
        assert!(Port::new(65535).is_ok());
    }

    #[test]
    fn test_port_invalid() {
        assert!(Port::new(0).is_err());
    }

    #[test]
    fn test_port_ordering() {
        let mut ports = [Port::new(9700).unwrap(), Port::new(5001).unwrap()];
        ports.sort();
        assert_eq!(ports[0].value(), 5001);
    }

    #[test]
    fn test_tenant_id_valid() {
        assert!(TenantId::new("bench").is_ok());
        assert!(TenantId::new("tenant_01-a").is_ok());
    }

    #[test]
    fn test_tenant_id_invalid() {
        assert!(TenantId::new("").is_err());
        assert!(TenantId::new("a".repeat(65)).is_err());
        assert!(TenantId::new("postgres.bench").is_err());
        assert!(TenantId::new("bench tenant").is_err());
    }
}
