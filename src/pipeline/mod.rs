//! Pipeline entry points.
//!
//! - `detect_change`: decide whether the current offer is new
//! - `ChangeDetectionPipeline`: one full watch run

pub mod detect;
pub mod run;

pub use detect::{ChangeDecision, detect_change};
pub use run::{ChangeDetectionPipeline, RunOutcome, RunReport};
