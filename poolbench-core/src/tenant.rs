// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Control-plane client for tenant-routed poolers.
//!
//! `PUT /api/tenants/{tenant}` is an upsert: the first call creates the
//! tenant, later calls with the same id reconfigure it.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Serialize;

use crate::config::{ControlPlaneConfig, DatabaseConfig};
use crate::error::{BenchError, BenchResult, HardValidationError};
use crate::types::TenantId;

/// Pooling mode requested for the tenant's user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolMode {
    Transaction,
    Session,
}

impl PoolMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Session => "session",
        }
    }
}

/// Outcome of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantStatus {
    Created,
    Updated,
}

#[derive(Debug, Serialize)]
struct TenantRequest<'a> {
    tenant: TenantBody<'a>,
}

#[derive(Debug, Serialize)]
struct TenantBody<'a> {
    db_host: &'a str,
    db_port: u16,
    db_database: &'a str,
    ip_version: &'static str,
    require_user: bool,
    upstream_ssl: bool,
    enforce_ssl: bool,
    default_pool_size: u32,
    default_max_clients: u32,
    users: Vec<TenantUser<'a>>,
}

#[derive(Debug, Serialize)]
struct TenantUser<'a> {
    db_user: &'a str,
    db_user_alias: &'a str,
    db_password: &'a str,
    pool_size: u32,
    max_clients: u32,
    mode_type: &'static str,
}

/// Blocking HTTP client for the control-plane API.
#[derive(Debug)]
pub struct ControlPlaneClient {
    http: Client,
    base_url: String,
    token: String,
    tenant: TenantId,
    pool_size: u32,
    max_clients: u32,
}

impl ControlPlaneClient {
    /// Build a client from configuration. Fails if no API token is set.
    pub fn new(config: &ControlPlaneConfig) -> BenchResult<Self> {
        if config.api_token.trim().is_empty() {
            return Err(HardValidationError::MissingRequiredField {
                field: "api_token",
                context: "control_plane section (needed for tenant registration)".to_string(),
            }
            .into());
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BenchError::Registration {
                tenant: config.tenant.to_string(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: config.url.clone(),
            token: config.api_token.clone(),
            tenant: config.tenant.clone(),
            pool_size: config.pool_size,
            max_clients: config.max_clients,
        })
    }

    fn tenant_url(&self) -> String {
        format!("{}/api/tenants/{}", self.base_url, self.tenant)
    }

    /// Create or reconfigure the tenant so it routes to `database`.
    pub fn upsert_tenant(
        &self,
        database: &DatabaseConfig,
        mode: PoolMode,
    ) -> BenchResult<TenantStatus> {
        let body = TenantRequest {
            tenant: TenantBody {
                db_host: &database.host,
                db_port: database.port.value(),
                db_database: &database.name,
                ip_version: "auto",
                require_user: false,
                upstream_ssl: false,
                enforce_ssl: false,
                default_pool_size: self.pool_size,
                default_max_clients: self.max_clients,
                users: vec![TenantUser {
                    db_user: &database.user,
                    db_user_alias: &database.user,
                    db_password: &database.password,
                    pool_size: self.pool_size,
                    max_clients: self.max_clients,
                    mode_type: mode.as_str(),
                }],
            },
        };

        let url = self.tenant_url();
        tracing::info!(target: "poolbench::shell", "+ PUT {}", url);

        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .map_err(|e| self.registration_error(e.to_string()))?;

        let outcome = match response.status() {
            StatusCode::CREATED => TenantStatus::Created,
            s if s.is_success() => TenantStatus::Updated,
            s => {
                let text = response.text().unwrap_or_default();
                return Err(self.registration_error(format!("HTTP {}: {}", s, text.trim())));
            }
        };

        tracing::info!(
            tenant = %self.tenant,
            mode = mode.as_str(),
            outcome = ?outcome,
            "Tenant registered"
        );

        Ok(outcome)
    }

    fn registration_error(&self, reason: String) -> BenchError {
        BenchError::Registration {
            tenant: self.tenant.to_string(),
            reason,
        }
    }
}
