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
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use topic_rpc::prelude::*;

/// A sample recorded by [`RecordingTransport::publish`].
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
    pub related: Option<CallIdentity>,
    pub identity: CallIdentity,
}

impl Published {
    pub fn body(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).expect("published payload is not JSON")
    }
}

struct Entity {
    spec: TopicSpec,
    listener: Arc<dyn TopicListener>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    next_sequence: u64,
    publications: HashMap<u64, Entity>,
    subscriptions: HashMap<u64, Entity>,
    published: Vec<Published>,
    events: Vec<String>,
    fail_publish: bool,
    fail_subscribe: bool,
}

/// Transport that records publications and never delivers on its own.
///
/// Tests push samples into subscriptions with [`deliver`](Self::deliver),
/// which makes interleavings explicit.
#[derive(Default)]
pub struct RecordingTransport {
    state: Mutex<State>,
}

impl fmt::Debug for RecordingTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RecordingTransport")
            .field("publications", &state.publications.len())
            .field("subscriptions", &state.subscriptions.len())
            .field("published", &state.published.len())
            .finish()
    }
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delivers `sample` to every subscription on `topic`.
    ///
    /// Listeners run on the calling thread with no transport lock held.
    /// Returns the number of listeners reached.
    pub fn deliver(&self, topic: &str, sample: Sample) -> usize {
        let listeners: Vec<Arc<dyn TopicListener>> = self
            .state
            .lock()
            .subscriptions
            .values()
            .filter(|entity| entity.spec.name == topic)
            .map(|entity| Arc::clone(&entity.listener))
            .collect();
        for listener in &listeners {
            listener.on_data(sample.clone());
        }
        listeners.len()
    }

    /// Delivers a match event to every publication and subscription on its
    /// topic.
    pub fn announce(&self, event: MatchEvent) {
        let listeners: Vec<Arc<dyn TopicListener>> = {
            let state = self.state.lock();
            state
                .publications
                .values()
                .chain(state.subscriptions.values())
                .filter(|entity| entity.spec.name == event.topic)
                .map(|entity| Arc::clone(&entity.listener))
                .collect()
        };
        for listener in listeners {
            listener.on_match(event.clone());
        }
    }

    pub fn published_on(&self, topic: &str) -> Vec<Published> {
        self.state
            .lock()
            .published
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }

    /// Lifecycle calls in the order they were made, e.g.
    /// `"remove_subscription Add_Reply"`.
    pub fn events(&self) -> Vec<String> {
        self.state.lock().events.clone()
    }

    pub fn topic_spec(&self, topic: &str) -> Option<TopicSpec> {
        let state = self.state.lock();
        state
            .publications
            .values()
            .chain(state.subscriptions.values())
            .find(|entity| entity.spec.name == topic)
            .map(|entity| entity.spec.clone())
    }

    pub fn live_entities(&self) -> usize {
        let state = self.state.lock();
        state.publications.len() + state.subscriptions.len()
    }

    pub fn fail_publish(&self, fail: bool) {
        self.state.lock().fail_publish = fail;
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.state.lock().fail_subscribe = fail;
    }
}

impl Transport for RecordingTransport {
    fn create_publication(
        &self,
        topic: &TopicSpec,
        listener: Arc<dyn TopicListener>,
    ) -> Result<PublicationId, TransportError> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.events.push(format!("create_publication {}", topic.name));
        state.publications.insert(
            id,
            Entity {
                spec: topic.clone(),
                listener,
            },
        );
        Ok(PublicationId(id))
    }

    fn create_subscription(
        &self,
        topic: &TopicSpec,
        listener: Arc<dyn TopicListener>,
    ) -> Result<SubscriptionId, TransportError> {
        let mut state = self.state.lock();
        if state.fail_subscribe {
            return Err(TransportError::Other("subscription refused".to_string()));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.events.push(format!("create_subscription {}", topic.name));
        state.subscriptions.insert(
            id,
            Entity {
                spec: topic.clone(),
                listener,
            },
        );
        Ok(SubscriptionId(id))
    }

    fn publish(
        &self,
        publication: PublicationId,
        payload: Vec<u8>,
        related: Option<CallIdentity>,
    ) -> Result<CallIdentity, TransportError> {
        let mut state = self.state.lock();
        if state.fail_publish {
            return Err(TransportError::Other("publish refused".to_string()));
        }
        let topic = state
            .publications
            .get(&publication.0)
            .map(|entity| entity.spec.name.clone())
            .ok_or(TransportError::UnknownPublication(publication.0))?;
        state.next_sequence += 1;
        let identity = CallIdentity::new(WriterGuid(publication.0), state.next_sequence);
        state.published.push(Published {
            topic,
            payload,
            related,
            identity,
        });
        Ok(identity)
    }

    fn remove_publication(&self, publication: PublicationId) {
        let mut state = self.state.lock();
        if let Some(entity) = state.publications.remove(&publication.0) {
            state.events.push(format!("remove_publication {}", entity.spec.name));
        }
    }

    fn remove_subscription(&self, subscription: SubscriptionId) {
        let mut state = self.state.lock();
        if let Some(entity) = state.subscriptions.remove(&subscription.0) {
            state.events.push(format!("remove_subscription {}", entity.spec.name));
        }
    }
}

/// Builds a sample as a transport would deliver it.
pub fn sample(
    body: &serde_json::Value,
    identity: CallIdentity,
    related: Option<CallIdentity>,
    peer: PeerId,
) -> Sample {
    Sample {
        payload: serde_json::to_vec(body).expect("test body serializes"),
        identity,
        related,
        peer,
    }
}

/// Identity for a sample published by a remote writer.
pub fn remote_identity(writer: u64, sequence: u64) -> CallIdentity {
    CallIdentity::new(WriterGuid(0xfeed_0000 + writer), sequence)
}
