// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! CLI command modules.

use std::path::Path;

use poolbench_core::{Config, ConfigLoader};

use crate::error::CliError;

pub mod bench;
pub mod cleanup;
pub mod run;
pub mod validate;

/// Explicit file, else `poolbench.yaml` when present, else defaults.
pub(crate) fn load_config(path: Option<&Path>) -> Result<Config, CliError> {
    Ok(ConfigLoader::load_or_default(path)?)
}
