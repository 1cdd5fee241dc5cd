/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # topic-rpc
//!
//! Request/reply services on top of a fire-and-forget publish/subscribe
//! transport.
//!
//! A transport that can only publish samples and deliver them later, in any
//! order, has no notion of a call. This crate supplies one: a
//! [`ClientEndpoint`](prelude::ClientEndpoint) records every request it
//! publishes under the identity the transport assigned to it, and hands
//! each reply, linked back to that identity, to the one caller waiting for
//! it. A [`ServerEndpoint`](prelude::ServerEndpoint) dispatches incoming
//! requests to a handler and publishes each answer linked to the request it
//! answers.
//!
//! ## Key Concepts
//!
//! - **Correlation table**: maps transport call identities to waiters, with
//!   at most one pending call per identity.
//! - **Discriminator map**: picks the union member that carries a payload
//!   when service topics use tagged-union types.
//! - **Transport** and **Marshaler** traits: the seams to the real
//!   middleware. [`MemoryBus`](prelude::MemoryBus) is an in-process
//!   transport; [`JsonMarshaler`](prelude::JsonMarshaler) encodes messages
//!   as JSON.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use topic_rpc::prelude::*;
//!
//! let bus = MemoryBus::new()?;
//! let config = ServiceConfig::plain("AddRequest", "AddReply");
//!
//! let _server = ServerEndpoint::new(
//!     bus.participant("server"),
//!     "Add",
//!     &config,
//!     Arc::new(JsonMarshaler),
//!     Arc::new(|request, responder: Responder| {
//!         let _ = responder.respond(Message::new("AddReply", request.into_body()));
//!     }),
//! )?;
//!
//! let client = ClientEndpoint::new(
//!     bus.participant("client"),
//!     "Add",
//!     &config,
//!     Arc::new(JsonMarshaler),
//!     Arc::new(|caller, reply| println!("{caller}: {reply:?}")),
//! )?;
//! client.call(CallerId(1), Message::new("AddRequest", serde_json::json!({ "a": 1, "b": 2 })))?;
//! ```

/// Endpoints, correlation state, configuration and the in-memory bus.
pub(crate) mod common;

/// Identities, generic messages, samples and errors.
pub(crate) mod message;

/// Transport and marshaling traits.
pub(crate) mod traits;

/// Configuration types and loaders.
pub mod config {
    pub use crate::common::config::{BridgeConfig, RemapConfig, ServiceConfig};
}

/// Error types.
pub mod error {
    pub use crate::message::{
        ConfigError, CorrelationError, EndpointError, MarshalError, TransportError,
    };
}

/// Commonly used items.
///
/// # Re-exports
///
/// *   [`crate::common::ClientEndpoint`] and [`crate::common::ServerEndpoint`]
/// *   [`crate::common::Responder`]: answers one accepted request.
/// *   [`crate::common::CorrelationTable`] and [`crate::common::DiscriminatorMap`]
/// *   [`crate::common::MemoryBus`] and [`crate::common::Participant`]
/// *   [`crate::traits::Transport`], [`crate::traits::TopicListener`] and
///     [`crate::traits::Marshaler`]
/// *   Identity, message and error types from [`crate::message`].
pub mod prelude {
    pub use crate::common::{
        BridgeConfig, ClientEndpoint, CorrelationStats, CorrelationTable, DiscriminatorMap,
        EndpointStats, MemoryBus, Participant, PendingCall, RemapConfig, ReplyCallback,
        RequestCallback, Responder, ServerEndpoint, ServiceConfig, ServiceTopicPair,
    };
    pub use crate::message::{
        CallHandle, CallIdentity, CallerId, ConfigError, CorrelationError, EndpointError,
        MarshalError, MatchEvent, MatchStatus, Message, MessageType, PeerId, Sample,
        TransportError, WriterGuid,
    };
    pub use crate::traits::{
        JsonMarshaler, Marshaler, PublicationId, SubscriptionId, TopicListener, TopicSpec,
        Transport,
    };
}
