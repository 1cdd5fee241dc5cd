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

//! Endpoints and the state they are built from.
//!
//! *   [`ClientEndpoint`] / [`ServerEndpoint`]: the two sides of a service.
//! *   [`CorrelationTable`]: call identity to waiter bookkeeping.
//! *   [`DiscriminatorMap`]: configured union members per payload type.
//! *   [`BridgeConfig`]: service configuration loading.
//! *   [`MemoryBus`]: an in-process transport.

pub use client::ClientEndpoint;
pub use config::{BridgeConfig, RemapConfig, ServiceConfig};
pub use correlation::{CorrelationStats, CorrelationTable, PendingCall};
pub use discriminator::DiscriminatorMap;
pub use endpoint::EndpointStats;
pub use memory_bus::{MemoryBus, Participant};
pub use server::{Responder, ServerEndpoint};
pub use topics::ServiceTopicPair;
pub use types::*;

/// Callback type aliases.
mod types;

/// Client endpoint.
mod client;
/// Configuration loading.
pub mod config;
/// Pending-call bookkeeping.
mod correlation;
/// Union member resolution.
mod discriminator;
/// Shared endpoint plumbing.
mod endpoint;
/// In-process transport.
mod memory_bus;
/// Server endpoint and responder.
mod server;
/// Service topic naming.
mod topics;
