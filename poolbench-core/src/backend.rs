// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Registry of the pooler backends under test.
//!
//! Each pooler implements [`Pooler`]; [`Backend`] is the closed set of
//! variants the benchmark can target, resolved once per invocation.

use std::fmt;
use std::str::FromStr;

use crate::config::Config;
use crate::error::{BenchError, BenchResult};
use crate::shell::CommandSpec;
use crate::tenant::{ControlPlaneClient, PoolMode};
use crate::types::Port;

/// Capabilities every pooler exposes to the benchmark run.
pub trait Pooler {
    /// Name used on the command line.
    fn name(&self) -> &'static str;

    /// TCP port the pooler accepts clients on.
    fn listen_port(&self) -> Port;

    /// Login the load tool uses against this pooler.
    fn username(&self, config: &Config) -> String {
        config.database.user.clone()
    }

    /// Work needed before the first benchmark against a running pooler.
    fn pre_run_setup(&self, _config: &Config) -> BenchResult<()> {
        Ok(())
    }

    /// Command that launches the pooler. `index` picks one of several
    /// pre-generated configuration files where the pooler has them.
    fn start(&self, index: u32, config: &Config) -> CommandSpec;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PgBouncer;

impl Pooler for PgBouncer {
    fn name(&self) -> &'static str {
        "pgbouncer"
    }

    fn listen_port(&self) -> Port {
        Port::fixed(5001)
    }

    fn start(&self, index: u32, _config: &Config) -> CommandSpec {
        CommandSpec::argv([
            "pgbouncer/pgbouncer".to_string(),
            format!("configs/pgbouncer/{}.ini", index),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Odyssey;

impl Pooler for Odyssey {
    fn name(&self) -> &'static str {
        "odyssey"
    }

    fn listen_port(&self) -> Port {
        Port::fixed(5002)
    }

    fn start(&self, _index: u32, _config: &Config) -> CommandSpec {
        CommandSpec::argv(["odyssey/build/sources/odyssey", "configs/odyssey.conf"])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PgCat;

impl Pooler for PgCat {
    fn name(&self) -> &'static str {
        "pgcat"
    }

    fn listen_port(&self) -> Port {
        Port::fixed(5003)
    }

    fn start(&self, _index: u32, _config: &Config) -> CommandSpec {
        CommandSpec::argv(["pgcat/target/release/pgcat", "configs/pgcat.toml"])
    }
}

const SUPAVISOR_TRANSACTION_PORT: Port = Port::fixed(5004);
const SUPAVISOR_SESSION_PORT: Port = Port::fixed(5005);

/// Tenant-routed pooler. One process serves both modes on separate ports;
/// clients log in as `<user>.<tenant>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Supavisor {
    pub mode: PoolMode,
}

impl Pooler for Supavisor {
    fn name(&self) -> &'static str {
        match self.mode {
            PoolMode::Transaction => "supavisor-transaction",
            PoolMode::Session => "supavisor-session",
        }
    }

    fn listen_port(&self) -> Port {
        match self.mode {
            PoolMode::Transaction => SUPAVISOR_TRANSACTION_PORT,
            PoolMode::Session => SUPAVISOR_SESSION_PORT,
        }
    }

    fn username(&self, config: &Config) -> String {
        format!("{}.{}", config.database.user, config.control_plane.tenant)
    }

    fn pre_run_setup(&self, config: &Config) -> BenchResult<()> {
        let client = ControlPlaneClient::new(&config.control_plane)?;
        client.upsert_tenant(&config.database, self.mode)?;
        Ok(())
    }

    fn start(&self, _index: u32, config: &Config) -> CommandSpec {
        let db = &config.database;
        let cp = &config.control_plane;
        let database_url = format!(
            "ecto://{}:{}@{}:{}/{}",
            db.user, db.password, db.host, db.port, db.name
        );

        CommandSpec::argv(["mix", "phx.server"])
            .cwd(cp.dir.clone())
            .env("DATABASE_URL", database_url)
            .env("PORT", cp.http_port.to_string())
            .env("PROXY_PORT_TRANSACTION", SUPAVISOR_TRANSACTION_PORT.to_string())
            .env("PROXY_PORT_SESSION", SUPAVISOR_SESSION_PORT.to_string())
            .env("SECRET_KEY_BASE", cp.secret_key_base.clone())
            .env("API_JWT_SECRET", cp.jwt_secret.clone())
            .env("METRICS_JWT_SECRET", cp.jwt_secret.clone())
            .env("VAULT_ENC_KEY", cp.vault_enc_key.clone())
            .env("REGION", "local")
            .env("CLUSTER_POSTGRES", "true")
    }
}

/// The closed set of benchmarkable poolers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    PgBouncer(PgBouncer),
    Odyssey(Odyssey),
    PgCat(PgCat),
    Supavisor(Supavisor),
}

impl Backend {
    /// Every variant, in the order they are listed to operators.
    pub const ALL: [Backend; 5] = [
        Backend::PgBouncer(PgBouncer),
        Backend::Odyssey(Odyssey),
        Backend::PgCat(PgCat),
        Backend::Supavisor(Supavisor {
            mode: PoolMode::Transaction,
        }),
        Backend::Supavisor(Supavisor {
            mode: PoolMode::Session,
        }),
    ];

    /// Resolve a backend by name.
    ///
    /// # Errors
    /// `UnknownBackend` for anything outside [`Backend::ALL`].
    pub fn resolve(name: &str) -> BenchResult<Self> {
        Self::ALL
            .into_iter()
            .find(|backend| backend.name() == name)
            .ok_or_else(|| BenchError::UnknownBackend {
                name: name.to_string(),
                known: Self::names().join(", "),
            })
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|b| b.name()).collect()
    }

    fn as_pooler(&self) -> &dyn Pooler {
        match self {
            Self::PgBouncer(p) => p,
            Self::Odyssey(p) => p,
            Self::PgCat(p) => p,
            Self::Supavisor(p) => p,
        }
    }
}

impl Pooler for Backend {
    fn name(&self) -> &'static str {
        self.as_pooler().name()
    }

    fn listen_port(&self) -> Port {
        self.as_pooler().listen_port()
    }

    fn username(&self, config: &Config) -> String {
        self.as_pooler().username(config)
    }

    fn pre_run_setup(&self, config: &Config) -> BenchResult<()> {
        self.as_pooler().pre_run_setup(config)
    }

    fn start(&self, index: u32, config: &Config) -> CommandSpec {
        self.as_pooler().start(index, config)
    }
}

impl FromStr for Backend {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
