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

use std::fmt::Debug;
use std::sync::Arc;

use crate::message::{CallIdentity, MatchEvent, Sample, TransportError};

/// Handle to a publication created on a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicationId(pub u64);

/// Handle to a subscription created on a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Topic binding requested from a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    /// Topic name.
    pub name: String,
    /// Data type name registered for the topic.
    pub type_name: String,
    /// Optional service instance name advertised with a publication.
    pub instance_name: Option<String>,
}

impl TopicSpec {
    /// Creates a topic spec without an instance name.
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            instance_name: None,
        }
    }

    /// Sets the service instance name.
    #[must_use]
    pub fn with_instance_name(mut self, instance_name: Option<String>) -> Self {
        self.instance_name = instance_name;
        self
    }
}

/// Receives asynchronous notifications from a transport.
///
/// Callbacks run on the transport's delivery path, possibly concurrently
/// with application calls on other threads. Implementations must not panic
/// and must not block for long: a slow listener stalls delivery for its
/// topic.
pub trait TopicListener: Send + Sync {
    /// A sample arrived on a subscribed topic.
    fn on_data(&self, sample: Sample);

    /// A remote endpoint was matched or unmatched.
    fn on_match(&self, _event: MatchEvent) {}
}

/// Fire-and-forget publish/subscribe transport.
///
/// `publish` either buffers the sample locally or fails synchronously; it
/// never waits for remote acknowledgement. A transport must not deliver to
/// a listener synchronously from inside `publish` on the publishing thread:
/// endpoints hold their correlation lock across `publish` so that a fast
/// reply cannot overtake the registration of its pending call.
pub trait Transport: Send + Sync + Debug {
    /// Creates a publication on `topic`. The listener receives match events.
    fn create_publication(
        &self,
        topic: &TopicSpec,
        listener: Arc<dyn TopicListener>,
    ) -> Result<PublicationId, TransportError>;

    /// Creates a subscription on `topic`. The listener receives samples and
    /// match events.
    fn create_subscription(
        &self,
        topic: &TopicSpec,
        listener: Arc<dyn TopicListener>,
    ) -> Result<SubscriptionId, TransportError>;

    /// Publishes `payload`, optionally linked to the sample it answers.
    ///
    /// Returns the identity assigned to the new sample.
    fn publish(
        &self,
        publication: PublicationId,
        payload: Vec<u8>,
        related: Option<CallIdentity>,
    ) -> Result<CallIdentity, TransportError>;

    /// Removes a publication. Unknown ids are ignored.
    fn remove_publication(&self, publication: PublicationId);

    /// Removes a subscription. Samples not yet handed to the listener when
    /// this returns are discarded. Unknown ids are ignored.
    fn remove_subscription(&self, subscription: SubscriptionId);
}
