//! Resolver orchestration
//!
//! Everything between a validated request and the external resolver
//! process: admission control, invocation, and multi-profile probing.

pub mod gate;
pub mod invoker;
pub mod process;
pub mod prober;

pub use gate::{ConcurrencyGate, GateStats};
pub use invoker::{Extraction, Extractor, Invocation, Mode, ResolverInvoker};
pub use process::{ProcessOutput, ProcessRunner, ProcessTracker, TokioProcessRunner};
pub use prober::{MultiProfileProber, ProbeOutcome};
