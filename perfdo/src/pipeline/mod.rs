//! Profiling pipeline
//!
//! - [`mask`]: stage identifiers and the hex stage mask
//! - [`artifact`]: artifact naming and the per-run ledger
//! - [`events`]: `perf stat` event lists
//! - [`shell`]: structured shell pipelines with tee fan-out
//! - [`toplev`]: topdown invocations
//! - [`decoder`]: LBR/PEBS post-processing chains
//! - [`inventory`]: host and software setup logs
//! - [`orchestrator`]: runs the enabled stages in order

pub mod artifact;
pub mod decoder;
pub mod events;
pub mod inventory;
pub mod mask;
pub mod orchestrator;
pub mod shell;
pub mod toplev;

pub use artifact::{Artifact, ArtifactKind, ArtifactLedger, ArtifactNamer};
pub use decoder::DecoderPipeline;
pub use mask::{Stage, StageMask};
pub use orchestrator::{PipelineOrchestrator, RunReport};
pub use shell::Pipeline;
pub use toplev::{ToplevInvocation, ToplevStageBuilder, ToplevVariant};
