//! Chat channel adapters for hearth.
//!
//! A channel turns platform traffic into [`InboundMessage`]s and delivers
//! [`OutboundReply`]s back. Adapters never talk to agents directly; the
//! caller drives each message through the orchestrator.
//!
//! Available channels:
//! - **CLI** — interactive terminal chat (stdin/stdout)
//!
//! The HTTP transport lives in `hearth-gateway` and shares [`admit`].
//!
//! [`OutboundReply`]: hearth_core::channel::OutboundReply

pub mod cli;

pub use cli::CliChannel;

use hearth_core::channel::InboundMessage;
use hearth_core::error::ChannelError;
use tracing::warn;

/// Check an inbound message's attachments against `limit_bytes` before
/// anything is downloaded.
pub fn admit(message: &InboundMessage, limit_bytes: u64) -> Result<(), ChannelError> {
    for attachment in &message.attachments {
        if let Err(e) = attachment.check_size(limit_bytes) {
            warn!(
                channel = %message.channel,
                sender = %message.sender_id,
                url = %attachment.url,
                error = %e,
                "Rejected attachment"
            );
            return Err(e);
        }
    }
    Ok(())
}
