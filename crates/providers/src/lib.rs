//! Provider adapters for the chat core.
//!
//! Each supported provider family implements [`ProviderAdapter`]:
//! translate a [`ChatSession`] into that provider's wire format, stream
//! the response, and deliver normalized [`StreamChunk`]s over a channel.
//! Adapters never resolve tool calls; they surface them and finish.

pub mod anthropic;
pub mod error;
pub mod gemini;
pub mod local;
pub mod openai;
pub mod router;
pub mod sse;

use async_trait::async_trait;
use error::StreamError;
use shared::chat::{ChatSession, StreamChunk};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

pub use gemini::VISIT_WEBSITE_TOOL;

/// One provider family's streaming implementation.
///
/// Contract: chunks are sent in arrival order; `StreamChunk::Done` is
/// sent exactly once on normal termination; cancellation observed at
/// any await point returns [`StreamError::Aborted`] unwrapped.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn stream(
        &self,
        session: ChatSession,
        tx: UnboundedSender<StreamChunk>,
        cancel: CancellationToken,
    ) -> Result<(), StreamError>;
}
