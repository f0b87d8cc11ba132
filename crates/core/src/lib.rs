//! # hearth core
//!
//! Domain types, collaborator traits, and error definitions for the hearth
//! assistant backend. This crate has no framework dependencies: it defines
//! the model every other crate implements against.
//!
//! Each collaborator (generation service, durable store, chat channel, agent)
//! is a trait here; implementations live in their own crates, so tests can
//! substitute scripted stubs and the dependency graph points inward.

pub mod agent;
pub mod channel;
pub mod classification;
pub mod entity;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod store;
pub mod structured;
pub mod task;

pub use agent::{Agent, AgentCapability, AgentResult};
pub use channel::{Attachment, AttachmentKind, Channel, InboundMessage, OutboundReply};
pub use classification::{Classification, MessageKind, MessageType, Relevance};
pub use entity::{Entity, EntityQuery, EventKind, NewEntity, Priority, map_priority};
pub use error::{Error, PipelineStage, Result};
pub use event::{DomainEvent, EventBus};
pub use message::{ConversationContext, ConversationId, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use store::{ConversationStore, EntityStore, StoreResult};
pub use task::{AgentTask, RevisionRequest, TaskContext};
