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

//! State and plumbing shared by client and server endpoints.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, info, trace};

use super::config::ServiceConfig;
use super::discriminator::DiscriminatorMap;
use super::topics::ServiceTopicPair;
use crate::message::{
    CallIdentity, EndpointError, MarshalError, MatchEvent, MatchStatus, Message, MessageType,
    Sample,
};
use crate::traits::{Marshaler, PublicationId, SubscriptionId, TopicListener, TopicSpec, Transport};

/// Counters kept by every endpoint.
#[derive(Debug, Default)]
pub struct EndpointStats {
    /// Requests sent (client) or accepted (server).
    pub requests: AtomicUsize,
    /// Replies delivered (client) or published (server).
    pub replies: AtomicUsize,
    /// Messages dropped because they could not be marshaled.
    pub marshal_failures: AtomicUsize,
    /// Replies or responses with no pending call.
    pub correlation_misses: AtomicUsize,
    /// Requests whose responder was dropped without answering.
    pub abandoned: AtomicUsize,
    /// Remote endpoints currently matched on the published topic.
    pub matched_readers: AtomicUsize,
    /// Remote endpoints currently matched on the subscribed topic.
    pub matched_writers: AtomicUsize,
}

impl EndpointStats {
    /// Number of requests sent or accepted.
    #[must_use]
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    /// Number of replies delivered or published.
    #[must_use]
    pub fn replies(&self) -> usize {
        self.replies.load(Ordering::Relaxed)
    }

    /// Number of messages dropped on marshaling failure.
    #[must_use]
    pub fn marshal_failures(&self) -> usize {
        self.marshal_failures.load(Ordering::Relaxed)
    }

    /// Number of correlation misses.
    #[must_use]
    pub fn correlation_misses(&self) -> usize {
        self.correlation_misses.load(Ordering::Relaxed)
    }

    /// Number of requests abandoned by the handler.
    #[must_use]
    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::Relaxed)
    }

    /// Remote readers matched on the published topic.
    #[must_use]
    pub fn matched_readers(&self) -> usize {
        self.matched_readers.load(Ordering::Relaxed)
    }

    /// Remote writers matched on the subscribed topic.
    #[must_use]
    pub fn matched_writers(&self) -> usize {
        self.matched_writers.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndpointRole {
    Client,
    Server,
}

impl fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Server => f.write_str("server"),
        }
    }
}

/// Everything an endpoint owns apart from its correlation table.
pub(crate) struct EndpointCore {
    pub(crate) role: EndpointRole,
    pub(crate) service: String,
    pub(crate) topics: ServiceTopicPair,
    pub(crate) request_type: MessageType,
    pub(crate) reply_type: MessageType,
    pub(crate) discriminators: DiscriminatorMap,
    pub(crate) stats: EndpointStats,
    instance_name: Option<String>,
    marshaler: Arc<dyn Marshaler>,
    transport: Arc<dyn Transport>,
    publication: Mutex<Option<PublicationId>>,
    subscription: Mutex<Option<SubscriptionId>>,
    closed: AtomicBool,
}

impl fmt::Debug for EndpointCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointCore")
            .field("role", &self.role)
            .field("service", &self.service)
            .field("topics", &self.topics)
            .field("closed", &self.is_closed())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl EndpointCore {
    /// Resolves configuration. No transport resources are created yet.
    pub(crate) fn new(
        role: EndpointRole,
        transport: Arc<dyn Transport>,
        service: &str,
        config: &ServiceConfig,
        marshaler: Arc<dyn Marshaler>,
    ) -> Result<Self, EndpointError> {
        let discriminators =
            DiscriminatorMap::build(service, &config.remap, &config.request, &config.reply)?;
        Ok(Self {
            role,
            service: service.to_string(),
            topics: ServiceTopicPair::for_service(service),
            request_type: config.request.clone(),
            reply_type: config.reply.clone(),
            discriminators,
            stats: EndpointStats::default(),
            instance_name: config.service_instance_name.clone(),
            marshaler,
            transport,
            publication: Mutex::new(None),
            subscription: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    fn published_spec(&self) -> TopicSpec {
        let spec = match self.role {
            EndpointRole::Client => {
                TopicSpec::new(self.topics.request.clone(), self.request_type.name.clone())
            }
            EndpointRole::Server => {
                TopicSpec::new(self.topics.reply.clone(), self.reply_type.name.clone())
            }
        };
        spec.with_instance_name(self.instance_name.clone())
    }

    fn published_topic(&self) -> &str {
        match self.role {
            EndpointRole::Client => &self.topics.request,
            EndpointRole::Server => &self.topics.reply,
        }
    }

    fn subscribed_spec(&self) -> TopicSpec {
        match self.role {
            EndpointRole::Client => {
                TopicSpec::new(self.topics.reply.clone(), self.reply_type.name.clone())
            }
            EndpointRole::Server => {
                TopicSpec::new(self.topics.request.clone(), self.request_type.name.clone())
            }
        }
    }

    /// Creates the publication, then the subscription.
    ///
    /// If the subscription cannot be created the publication is removed
    /// again before the error is returned.
    pub(crate) fn attach(&self, listener: Arc<dyn TopicListener>) -> Result<(), EndpointError> {
        let published = self.published_spec();
        let publication = self
            .transport
            .create_publication(&published, Arc::clone(&listener))?;
        *self.publication.lock() = Some(publication);

        let subscribed = self.subscribed_spec();
        match self.transport.create_subscription(&subscribed, listener) {
            Ok(subscription) => {
                *self.subscription.lock() = Some(subscription);
                Ok(())
            }
            Err(e) => {
                if let Some(publication) = self.publication.lock().take() {
                    self.transport.remove_publication(publication);
                }
                Err(e.into())
            }
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> Result<(), EndpointError> {
        if self.is_closed() {
            return Err(EndpointError::Closed(self.service.clone()));
        }
        Ok(())
    }

    /// Wraps `message` into `ty` and marshals it.
    pub(crate) fn encode(&self, ty: &MessageType, message: Message) -> Result<Vec<u8>, MarshalError> {
        let shaped = self.discriminators.wrap(ty, message)?;
        self.marshaler.marshal_out(&shaped)
    }

    /// Unmarshals a payload of type `ty` and extracts its active branch.
    pub(crate) fn decode(&self, ty: &MessageType, payload: &[u8]) -> Result<Message, MarshalError> {
        let message = self.marshaler.marshal_in(ty, payload)?;
        self.discriminators.unwrap(ty, message)
    }

    pub(crate) fn publish(
        &self,
        payload: Vec<u8>,
        related: Option<CallIdentity>,
    ) -> Result<CallIdentity, EndpointError> {
        let publication = (*self.publication.lock())
            .ok_or_else(|| EndpointError::Closed(self.service.clone()))?;
        Ok(self.transport.publish(publication, payload, related)?)
    }

    pub(crate) fn record_marshal_failure(&self) {
        self.stats.marshal_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.stats.correlation_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_match(&self, event: &MatchEvent) {
        let counter = if event.topic == self.published_topic() {
            &self.stats.matched_readers
        } else {
            &self.stats.matched_writers
        };
        counter.store(event.current_count, Ordering::Relaxed);

        match event.status {
            MatchStatus::Matched => info!(
                service = %self.service,
                role = %self.role,
                topic = %event.topic,
                peer = %event.peer,
                current = event.current_count,
                "Remote endpoint matched"
            ),
            MatchStatus::Unmatched => info!(
                service = %self.service,
                role = %self.role,
                topic = %event.topic,
                peer = %event.peer,
                current = event.current_count,
                "Remote endpoint unmatched"
            ),
        }
    }

    /// Runs the teardown sequence once.
    ///
    /// Deliveries stop before pending calls are discarded, and pending calls
    /// are discarded before the publication is released. Returns `false` if
    /// the endpoint was already closed.
    pub(crate) fn shutdown(&self, discard_pending: impl FnOnce() -> usize) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        if let Some(subscription) = self.subscription.lock().take() {
            self.transport.remove_subscription(subscription);
        }

        let discarded = discard_pending();
        if discarded > 0 {
            info!(
                service = %self.service,
                role = %self.role,
                discarded,
                "Discarded pending calls on shutdown"
            );
        }

        if let Some(publication) = self.publication.lock().take() {
            self.transport.remove_publication(publication);
        }

        info!(service = %self.service, role = %self.role, "Endpoint shut down");
        true
    }
}

/// Endpoint internals that receive samples from the transport.
pub(crate) trait DeliveryHandler: Send + Sync + 'static {
    fn core(&self) -> &EndpointCore;

    fn on_sample(self: Arc<Self>, sample: Sample);
}

/// Listener registered with the transport on behalf of an endpoint.
///
/// Holds the endpoint weakly so the transport never keeps a dropped
/// endpoint alive.
pub(crate) struct EndpointListener<T> {
    target: Weak<T>,
}

impl<T: DeliveryHandler> EndpointListener<T> {
    pub(crate) fn new(target: &Arc<T>) -> Arc<Self> {
        Arc::new(Self {
            target: Arc::downgrade(target),
        })
    }
}

impl<T: DeliveryHandler> TopicListener for EndpointListener<T> {
    fn on_data(&self, sample: Sample) {
        let Some(target) = self.target.upgrade() else {
            debug!(identity = %sample.identity, "Endpoint dropped, discarding sample");
            return;
        };
        if target.core().is_closed() {
            debug!(
                service = %target.core().service,
                identity = %sample.identity,
                "Endpoint closed, discarding sample"
            );
            return;
        }
        let identity = sample.identity;
        trace!(
            service = %target.core().service,
            %identity,
            peer = %sample.peer,
            "Sample delivered"
        );

        // A panicking handler must not unwind into the transport's delivery path.
        let delivery = Arc::clone(&target);
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || delivery.on_sample(sample)));
        if let Err(payload) = outcome {
            error!(
                service = %target.core().service,
                role = %target.core().role,
                %identity,
                reason = %panic_message(&*payload),
                "Handler panicked, dropping sample"
            );
        }
    }

    fn on_match(&self, event: MatchEvent) {
        if let Some(target) = self.target.upgrade() {
            target.core().on_match(&event);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
