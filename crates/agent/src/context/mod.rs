//! Conversation context: loading recent history and fitting it to a token
//! budget.
//!
//! | Step | Module | Rule |
//! |------|--------|------|
//! | Load | [`assembler`] | newest `max_messages` (+1 to detect overflow), drop `system`, oldest first |
//! | Budget | [`token`] | conversational input gets more history than declarative input |
//! | Trim | [`trim`] | last two > important > recent ordinary |

pub mod assembler;
pub mod token;
pub mod trim;

pub use assembler::{ContextAssembler, ContextOptions};
pub use token::{TokenBudgets, determine_max_tokens, estimate_token_count};
pub use trim::{TrimReport, trim_context_by_tokens, trim_with_report};
