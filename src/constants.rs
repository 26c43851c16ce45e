//! Pipeline-wide constants shared by the unary and streaming flows.

/// Upstream attempts per caller request are bounded by `MAX_RETRIES + 1`.
pub const MAX_RETRIES: usize = 3;

/// A streaming request opens at most `MAX_CONTINUATIONS + 1` upstream streams.
pub const MAX_CONTINUATIONS: usize = 3;

/// Completion discriminator injected into the system instruction and stripped
/// from everything sent back to the caller. Matching is case-sensitive.
pub const DONE_MARKER: &str = "[done]";

/// Credentials expiring within this window are refreshed inside `acquire`.
pub const REFRESH_THRESHOLD_SECS: i64 = 120;

pub const DONE_INSTRUCTION: &str = "When you have completed your full response, you must output [done] on a separate line at the very end. Only output [done] when your answer is complete.";
