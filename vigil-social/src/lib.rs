//! Social network acquisition for Vigil.
//!
//! Only the X (Twitter) pipeline exists today. See [`x::Orchestrator`] for the
//! tiered fetch with fallback; each tier lives in its own submodule.
pub mod x;
