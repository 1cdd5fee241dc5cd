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

//! In-process publish/subscribe transport.
//!
//! A [`MemoryBus`] hosts any number of [`Participant`]s. Each publication
//! and subscription owns an unbounded queue drained by its own Tokio task,
//! which is where listener callbacks run. Publishing only enqueues, so a
//! listener is never invoked on the publishing thread.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::message::{
    CallIdentity, MatchEvent, MatchStatus, PeerId, Sample, TransportError, WriterGuid,
};
use crate::traits::{PublicationId, SubscriptionId, TopicListener, TopicSpec, Transport};

enum Delivery {
    Data(Sample),
    Match(MatchEvent),
}

type DeliverySender = mpsc::UnboundedSender<Delivery>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityKind {
    Publication,
    Subscription,
}

/// Queue feeding one listener, plus the token that stops its task.
struct ListenerQueue {
    owner: PeerId,
    queue: DeliverySender,
    token: CancellationToken,
}

impl ListenerQueue {
    fn send(&self, delivery: Delivery) {
        if self.queue.send(delivery).is_err() {
            trace!(owner = %self.owner, "Listener task gone, delivery dropped");
        }
    }
}

struct Writer {
    queue: ListenerQueue,
    guid: WriterGuid,
    next_sequence: u64,
}

#[derive(Default)]
struct TopicState {
    type_name: String,
    writers: HashMap<u64, Writer>,
    readers: HashMap<u64, ListenerQueue>,
    published: usize,
}

struct EntityInfo {
    topic: String,
    owner: PeerId,
    kind: EntityKind,
}

struct BusInner {
    runtime: Handle,
    topics: DashMap<String, TopicState>,
    entities: DashMap<u64, EntityInfo>,
    next_entity: AtomicU64,
    next_participant: AtomicU64,
    participants: AtomicUsize,
    cancellation_token: CancellationToken,
}

/// Shared in-memory message bus.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBus")
            .field("topics", &self.inner.topics.len())
            .field("entities", &self.inner.entities.len())
            .field("participants", &self.inner.participants.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryBus {
    /// Creates a bus bound to the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`TransportError::NoRuntime`] when called outside a Tokio runtime.
    pub fn new() -> Result<Self, TransportError> {
        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        Ok(Self {
            inner: Arc::new(BusInner {
                runtime,
                topics: DashMap::new(),
                entities: DashMap::new(),
                next_entity: AtomicU64::new(1),
                next_participant: AtomicU64::new(1),
                participants: AtomicUsize::new(0),
                cancellation_token: CancellationToken::new(),
            }),
        })
    }

    /// Joins the bus as a new participant.
    #[must_use]
    pub fn participant(&self, name: impl Into<String>) -> Arc<Participant> {
        let id = PeerId(self.inner.next_participant.fetch_add(1, Ordering::Relaxed));
        let name = name.into();
        self.inner.participants.fetch_add(1, Ordering::Relaxed);
        info!(participant = %name, peer = %id, "Participant joined bus");
        Arc::new(Participant {
            bus: Arc::clone(&self.inner),
            id,
            name,
            closed: AtomicBool::new(false),
        })
    }

    /// Number of samples published on `topic` so far.
    #[must_use]
    pub fn published_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .get(topic)
            .map_or(0, |state| state.published)
    }

    /// Number of live subscriptions on `topic`.
    #[must_use]
    pub fn subscription_count(&self, topic: &str) -> usize {
        self.inner
            .topics
            .get(topic)
            .map_or(0, |state| state.readers.len())
    }

    /// Stops every delivery task on the bus.
    pub fn shutdown(&self) {
        info!("Shutting down memory bus");
        self.inner.cancellation_token.cancel();
    }
}

/// One participant on a [`MemoryBus`]; implements [`Transport`].
///
/// All publications and subscriptions a participant created are removed
/// when it is closed or dropped.
pub struct Participant {
    bus: Arc<BusInner>,
    id: PeerId,
    name: String,
    closed: AtomicBool,
}

impl fmt::Debug for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Participant")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl Participant {
    /// This participant's identity as seen by remote endpoints.
    #[must_use]
    pub const fn peer_id(&self) -> PeerId {
        self.id
    }

    /// Participant name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Removes every publication and subscription this participant owns.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let owned: Vec<(u64, EntityKind)> = self
            .bus
            .entities
            .iter()
            .filter(|entry| entry.owner == self.id)
            .map(|entry| (*entry.key(), entry.kind))
            .collect();
        for (id, kind) in owned {
            self.remove_entity(id, kind);
        }
        self.bus.participants.fetch_sub(1, Ordering::Relaxed);
        info!(participant = %self.name, peer = %self.id, "Participant left bus");
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) || self.bus.cancellation_token.is_cancelled() {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    /// Starts the task that feeds `listener` from a fresh queue.
    fn spawn_listener(&self, listener: Arc<dyn TopicListener>) -> ListenerQueue {
        let (queue, mut inbox) = mpsc::unbounded_channel();
        let token = self.bus.cancellation_token.child_token();
        let task_token = token.clone();
        self.bus.runtime.spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    () = task_token.cancelled() => break,

                    delivery = inbox.recv() => match delivery {
                        Some(Delivery::Data(sample)) => listener.on_data(sample),
                        Some(Delivery::Match(event)) => listener.on_match(event),
                        None => break,
                    },
                }
            }
        });
        ListenerQueue {
            owner: self.id,
            queue,
            token,
        }
    }

    fn create_entity(
        &self,
        topic: &TopicSpec,
        listener: Arc<dyn TopicListener>,
        kind: EntityKind,
    ) -> Result<u64, TransportError> {
        self.ensure_open()?;

        let mut state = self
            .bus
            .topics
            .entry(topic.name.clone())
            .or_insert_with(|| TopicState {
                type_name: topic.type_name.clone(),
                ..TopicState::default()
            });
        if state.type_name != topic.type_name {
            return Err(TransportError::TypeMismatch {
                topic: topic.name.clone(),
                existing: state.type_name.clone(),
                requested: topic.type_name.clone(),
            });
        }

        let id = self.bus.next_entity.fetch_add(1, Ordering::Relaxed);
        let queue = self.spawn_listener(listener);

        match kind {
            EntityKind::Publication => {
                let reader_count = state.readers.len();
                for (matched, reader) in state.readers.values().enumerate() {
                    reader.send(Delivery::Match(MatchEvent {
                        topic: topic.name.clone(),
                        status: MatchStatus::Matched,
                        peer: self.id,
                        current_count: state.writers.len() + 1,
                    }));
                    queue.send(Delivery::Match(MatchEvent {
                        topic: topic.name.clone(),
                        status: MatchStatus::Matched,
                        peer: reader.owner,
                        current_count: matched + 1,
                    }));
                }
                state.writers.insert(
                    id,
                    Writer {
                        queue,
                        guid: WriterGuid(id),
                        next_sequence: 1,
                    },
                );
                debug!(
                    participant = %self.name,
                    topic = %topic.name,
                    instance = ?topic.instance_name,
                    matched = reader_count,
                    "Publication created"
                );
            }
            EntityKind::Subscription => {
                let writer_count = state.writers.len();
                for (matched, writer) in state.writers.values().enumerate() {
                    writer.queue.send(Delivery::Match(MatchEvent {
                        topic: topic.name.clone(),
                        status: MatchStatus::Matched,
                        peer: self.id,
                        current_count: state.readers.len() + 1,
                    }));
                    queue.send(Delivery::Match(MatchEvent {
                        topic: topic.name.clone(),
                        status: MatchStatus::Matched,
                        peer: writer.queue.owner,
                        current_count: matched + 1,
                    }));
                }
                state.readers.insert(id, queue);
                debug!(
                    participant = %self.name,
                    topic = %topic.name,
                    matched = writer_count,
                    "Subscription created"
                );
            }
        }
        drop(state);

        self.bus.entities.insert(
            id,
            EntityInfo {
                topic: topic.name.clone(),
                owner: self.id,
                kind,
            },
        );
        Ok(id)
    }

    fn remove_entity(&self, id: u64, kind: EntityKind) {
        let Some((_, info)) = self
            .bus
            .entities
            .remove_if(&id, |_, info| info.owner == self.id && info.kind == kind)
        else {
            trace!(participant = %self.name, id, "Ignoring removal of unknown entity");
            return;
        };
        let Some(mut state) = self.bus.topics.get_mut(&info.topic) else {
            return;
        };

        match kind {
            EntityKind::Publication => {
                if let Some(writer) = state.writers.remove(&id) {
                    writer.queue.token.cancel();
                    let remaining = state.writers.len();
                    for reader in state.readers.values() {
                        reader.send(Delivery::Match(MatchEvent {
                            topic: info.topic.clone(),
                            status: MatchStatus::Unmatched,
                            peer: self.id,
                            current_count: remaining,
                        }));
                    }
                }
            }
            EntityKind::Subscription => {
                if let Some(reader) = state.readers.remove(&id) {
                    reader.token.cancel();
                    let remaining = state.readers.len();
                    for writer in state.writers.values() {
                        writer.queue.send(Delivery::Match(MatchEvent {
                            topic: info.topic.clone(),
                            status: MatchStatus::Unmatched,
                            peer: self.id,
                            current_count: remaining,
                        }));
                    }
                }
            }
        }
        debug!(participant = %self.name, topic = %info.topic, ?kind, "Entity removed");
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        self.close();
    }
}

impl Transport for Participant {
    fn create_publication(
        &self,
        topic: &TopicSpec,
        listener: Arc<dyn TopicListener>,
    ) -> Result<PublicationId, TransportError> {
        self.create_entity(topic, listener, EntityKind::Publication)
            .map(PublicationId)
    }

    fn create_subscription(
        &self,
        topic: &TopicSpec,
        listener: Arc<dyn TopicListener>,
    ) -> Result<SubscriptionId, TransportError> {
        self.create_entity(topic, listener, EntityKind::Subscription)
            .map(SubscriptionId)
    }

    fn publish(
        &self,
        publication: PublicationId,
        payload: Vec<u8>,
        related: Option<CallIdentity>,
    ) -> Result<CallIdentity, TransportError> {
        self.ensure_open()?;

        let topic = self
            .bus
            .entities
            .get(&publication.0)
            .filter(|info| info.owner == self.id && info.kind == EntityKind::Publication)
            .map(|info| info.topic.clone())
            .ok_or(TransportError::UnknownPublication(publication.0))?;

        let mut state = self
            .bus
            .topics
            .get_mut(&topic)
            .ok_or(TransportError::UnknownPublication(publication.0))?;
        let writer = state
            .writers
            .get_mut(&publication.0)
            .ok_or(TransportError::UnknownPublication(publication.0))?;

        let identity = CallIdentity::new(writer.guid, writer.next_sequence);
        writer.next_sequence += 1;

        let sample = Sample {
            payload,
            identity,
            related,
            peer: self.id,
        };
        for reader in state.readers.values() {
            reader.send(Delivery::Data(sample.clone()));
        }
        state.published += 1;

        trace!(participant = %self.name, %topic, %identity, related = ?related, "Sample published");
        Ok(identity)
    }

    fn remove_publication(&self, publication: PublicationId) {
        self.remove_entity(publication.0, EntityKind::Publication);
    }

    fn remove_subscription(&self, subscription: SubscriptionId) {
        self.remove_entity(subscription.0, EntityKind::Subscription);
    }
}
