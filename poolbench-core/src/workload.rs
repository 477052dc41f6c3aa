// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Workload shape and load settings for a benchmark run.

use std::fmt;
use std::str::FromStr;

use crate::error::HardValidationError;

/// Query protocol the load tool speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Prepared,
    Extended,
    Simple,
}

impl Protocol {
    pub const ALL: [Protocol; 3] = [Self::Prepared, Self::Extended, Self::Simple];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Prepared => "prepared",
            Self::Extended => "extended",
            Self::Simple => "simple",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = HardValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| HardValidationError::InvalidFieldValue {
                field: "protocol",
                value: s.to_string(),
                reason: "expected one of: prepared, extended, simple".to_string(),
            })
    }
}

/// Query pattern sent by the load tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkloadShape {
    /// Custom script `pipeline.sql`.
    #[default]
    Pipeline,
    /// One large literal query fed on stdin.
    Large,
    /// Built-in read-only transaction.
    SelectOnly,
    /// Built-in TPC-B-like transaction, raw protocol traffic.
    Tpcb,
}

impl WorkloadShape {
    pub const ALL: [WorkloadShape; 4] = [Self::Pipeline, Self::Large, Self::SelectOnly, Self::Tpcb];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pipeline => "pipeline",
            Self::Large => "large",
            Self::SelectOnly => "select-only",
            Self::Tpcb => "tcpb",
        }
    }

    /// Extra load-tool arguments and stdin payload for this shape.
    pub fn payload(&self, large_size: usize) -> WorkloadPayload {
        match self {
            Self::Pipeline => WorkloadPayload {
                args: vec![format!("--file={}.sql", self.as_str())],
                stdin: Vec::new(),
            },
            Self::Large => WorkloadPayload {
                args: Vec::new(),
                stdin: format!("select '{}'", "a".repeat(large_size)).into_bytes(),
            },
            Self::SelectOnly => WorkloadPayload {
                args: vec!["--select-only".to_string()],
                stdin: Vec::new(),
            },
            Self::Tpcb => WorkloadPayload::default(),
        }
    }
}

impl fmt::Display for WorkloadShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadShape {
    type Err = HardValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| HardValidationError::InvalidFieldValue {
                field: "bench",
                value: s.to_string(),
                reason: "expected one of: pipeline, large, select-only, tcpb".to_string(),
            })
    }
}

/// Shape-specific part of the load-tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadPayload {
    pub args: Vec<String>,
    pub stdin: Vec<u8>,
}

/// Validated load settings. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkConfig {
    clients: u32,
    jobs: u32,
    duration_secs: u32,
    protocol: Protocol,
    shape: WorkloadShape,
    large_size: usize,
}

impl BenchmarkConfig {
    pub const DEFAULT_CLIENTS: u32 = 10;
    pub const DEFAULT_JOBS: u32 = 10;
    pub const DEFAULT_DURATION_SECS: u32 = 10;
    pub const DEFAULT_LARGE_SIZE: usize = 10_000;

    pub fn new(
        clients: u32,
        jobs: u32,
        duration_secs: u32,
        protocol: Protocol,
        shape: WorkloadShape,
        large_size: usize,
    ) -> Result<Self, HardValidationError> {
        positive("clients", clients)?;
        positive("jobs", jobs)?;
        positive("time", duration_secs)?;

        if shape == WorkloadShape::Large && large_size == 0 {
            return Err(HardValidationError::InvalidFieldValue {
                field: "large_size",
                value: "0".to_string(),
                reason: "large payload must be at least 1 byte".to_string(),
            });
        }

        Ok(Self {
            clients,
            // More workers than clients would sit idle.
            jobs: jobs.min(clients),
            duration_secs,
            protocol,
            shape,
            large_size,
        })
    }

    pub fn clients(&self) -> u32 {
        self.clients
    }

    pub fn jobs(&self) -> u32 {
        self.jobs
    }

    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn shape(&self) -> WorkloadShape {
        self.shape
    }

    pub fn large_size(&self) -> usize {
        self.large_size
    }

    pub fn payload(&self) -> WorkloadPayload {
        self.shape.payload(self.large_size)
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            clients: Self::DEFAULT_CLIENTS,
            jobs: Self::DEFAULT_JOBS,
            duration_secs: Self::DEFAULT_DURATION_SECS,
            protocol: Protocol::default(),
            shape: WorkloadShape::default(),
            large_size: Self::DEFAULT_LARGE_SIZE,
        }
    }
}

fn positive(field: &'static str, value: u32) -> Result<(), HardValidationError> {
    if value == 0 {
        return Err(HardValidationError::InvalidFieldValue {
            field,
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}
