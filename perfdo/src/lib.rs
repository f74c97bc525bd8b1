//! # perfdo - Staged CPU Profiling Pipeline
//!
//! perfdo drives `perf` and pmu-tools' `toplev.py` through up to ten ordered
//! analysis stages for one workload. A hexadecimal mask picks the stages; each
//! stage's commands are built from templates tuned to the detected CPU, run
//! through an executor, and leave log files named after the workload.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌─────────────────────────────┐
//! │    CLI     │──▶│  RunContext  │──▶│    PipelineOrchestrator     │
//! │ (+ --tune) │   │  (immutable) │   │  stage 0 .. 9, ascending    │
//! └────────────┘   └──────────────┘   └──────┬───────────────┬──────┘
//!                         ▲                  │ Invocation    │ Artifact
//! ┌────────────┐          │                  ▼               ▼
//! │ Capability │──────────┘         ┌────────────────┐ ┌───────────┐
//! │   probe    │                    │ CommandExecutor│ │  Ledger   │
//! │  (sysfs)   │                    │  sh -c / dry   │ │ → .json   │
//! └────────────┘                    └───────┬────────┘ └───────────┘
//!                                           ▼
//!                                  .<base>.cmd history
//! ```
//!
//! ## Module Structure
//!
//! - [`pipeline`]: stage mask, artifact naming, command builders and the orchestrator
//!   - `toplev`: topdown invocations (full, N-level, drilldown, no-multiplex)
//!   - `decoder`: LBR/PEBS post-processing with tee fan-out
//!   - `shell`: structured pipelines rendered to shell text
//! - [`executor`]: runs, prints or comments out commands; owns the command history
//! - [`capability`]: CPU family detection and per-family feature table
//! - [`context`]: settings, `--tune` patching and the per-run context
//! - [`commands`]: top-level commands and run-start validation
//! - [`export`]: JSON run manifest
//! - [`preflight`]: warnings about perf permissions and missing tools
//! - [`cli`]: command-line arguments
//! - [`domain`]: errors and the run identifier
//!
//! ## Stages
//!
//! | bit | stage |
//! |---|---|
//! | 0 | host/software inventory |
//! | 1 | per-application counting |
//! | 2 | system-wide counting |
//! | 3 | call-stack sampling |
//! | 4 | topdown, full detail |
//! | 5 | topdown, N levels |
//! | 6 | topdown auto-drilldown |
//! | 7 | topdown without multiplexing |
//! | 8 | LBR statistics |
//! | 9 | PEBS statistics |
//!
//! ## Typical Usage
//!
//! ```bash
//! # Default stages for a workload
//! perfdo profile -a './matmul 512'
//!
//! # Show the topdown commands without running them
//! perfdo profile --profile-mask 0xF0 --print-only
//!
//! # Deeper sampling, top-3 IP refinement
//! perfdo profile -a ./app --profile-mask 0x300 --tune :sample:3 :top:3
//! ```

pub mod capability;
pub mod cli;
pub mod commands;
pub mod context;
pub mod domain;
pub mod executor;
pub mod export;
pub mod pipeline;
pub mod preflight;
