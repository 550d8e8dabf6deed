//! build-chromium - Chromium build pipeline driver.
//!
//! Runs the sync → configure → compile → package → upload pipeline over an
//! existing Chromium checkout, skipping work for revisions that already
//! compiled and archiving artifacts and logs to a remote server.
//!
//! The external tools (gclient, git, gn, ninja, ssh, scp) are driven through
//! [`process::ProcessRunner`], so the engine can be exercised without them.

pub mod archive;
pub mod changeset;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod sink;
pub mod timing;

pub use error::{BuildError, BuildResult};
pub use pipeline::{ActionSequencer, PipelineAction, PipelineState, RunOutcome, Stage};
