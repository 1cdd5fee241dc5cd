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

//! Server side of a service: accepts requests, publishes correlated replies.
//!
//! A pending request is keyed by the inbound request's own identity, and the
//! reply is published with that identity as its related identity.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use tracing::{debug, error, info, instrument, trace, warn};

use super::config::ServiceConfig;
use super::correlation::{CorrelationStats, CorrelationTable};
use super::endpoint::{
    DeliveryHandler, EndpointCore, EndpointListener, EndpointRole, EndpointStats,
};
use super::topics::ServiceTopicPair;
use super::types::RequestCallback;
use crate::message::{CallHandle, CallIdentity, EndpointError, Message, PeerId, Sample};
use crate::traits::{Marshaler, Transport};

/// Accepts requests from any number of remote clients and publishes each
/// reply linked to the request it answers.
///
/// Subscribes to `<service>_Request` and publishes on `<service>_Reply`.
/// Each accepted request is handed to the request callback together with a
/// [`Responder`]; the reply is published when the responder is used.
///
/// Dropping the endpoint shuts it down.
#[derive(Debug)]
pub struct ServerEndpoint {
    inner: Arc<ServerInner>,
}

pub(crate) struct ServerInner {
    core: EndpointCore,
    pending: CorrelationTable<PeerId>,
    on_request: RequestCallback,
}

impl std::fmt::Debug for ServerInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerInner")
            .field("core", &self.core)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

/// The single way to answer one accepted request.
///
/// [`respond`](Self::respond) consumes the responder, so a request is
/// answered at most once. Dropping it unanswered forgets the request.
#[derive(Debug)]
pub struct Responder {
    server: Option<Weak<ServerInner>>,
    service: String,
    handle: CallHandle,
    peer: PeerId,
}

impl Responder {
    /// Identity of the request being answered.
    #[must_use]
    pub const fn handle(&self) -> CallHandle {
        self.handle
    }

    /// Participant that sent the request.
    #[must_use]
    pub const fn peer(&self) -> PeerId {
        self.peer
    }

    /// Publishes `reply` as the answer to this request.
    ///
    /// Returns the identity of the published reply, or `None` if the
    /// request had already been forgotten.
    ///
    /// # Errors
    ///
    /// [`EndpointError::Closed`] if the server is gone, otherwise whatever
    /// [`ServerEndpoint::receive_response`] reports.
    pub fn respond(mut self, reply: Message) -> Result<Option<CallIdentity>, EndpointError> {
        let server = self
            .server
            .take()
            .and_then(|weak| weak.upgrade())
            .ok_or_else(|| EndpointError::Closed(self.service.clone()))?;
        server.receive_response(self.handle, reply)
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        let Some(server) = self.server.take().and_then(|weak| weak.upgrade()) else {
            return;
        };
        if server.pending.resolve_and_remove(&self.handle).is_some() {
            server.core.stats.abandoned.fetch_add(1, Ordering::Relaxed);
            warn!(
                service = %self.service,
                handle = %self.handle,
                peer = %self.peer,
                "Request dropped without a reply"
            );
        }
    }
}

impl ServerEndpoint {
    /// Creates a server for `service` and attaches it to `transport`.
    ///
    /// # Errors
    ///
    /// [`EndpointError::Config`] if the discriminator configuration does not
    /// resolve, [`EndpointError::Transport`] if the topics cannot be created.
    #[instrument(skip(transport, config, marshaler, on_request))]
    pub fn new(
        transport: Arc<dyn Transport>,
        service: &str,
        config: &ServiceConfig,
        marshaler: Arc<dyn Marshaler>,
        on_request: RequestCallback,
    ) -> Result<Self, EndpointError> {
        let core = EndpointCore::new(EndpointRole::Server, transport, service, config, marshaler)?;
        let inner = Arc::new(ServerInner {
            core,
            pending: CorrelationTable::new(),
            on_request,
        });
        inner.core.attach(EndpointListener::new(&inner))?;
        info!(service, topics = %inner.core.topics, "Server endpoint ready");
        Ok(Self { inner })
    }

    /// Publishes `reply` for the pending request `handle`.
    ///
    /// An unknown handle (already answered, forgotten, or never accepted)
    /// is logged and dropped, and `None` is returned.
    ///
    /// # Errors
    ///
    /// Fails if the endpoint is shut down, or if the reply cannot be
    /// marshaled or published. In the latter cases the request is consumed.
    pub fn receive_response(
        &self,
        handle: CallHandle,
        reply: Message,
    ) -> Result<Option<CallIdentity>, EndpointError> {
        self.inner.receive_response(handle, reply)
    }

    /// Forgets every pending request received from `peer`.
    ///
    /// Responses to those requests are dropped. Returns the number of
    /// requests forgotten.
    pub fn forget_peer(&self, peer: PeerId) -> usize {
        let removed = self.inner.pending.remove_all_for(&peer);
        debug!(service = %self.inner.core.service, %peer, removed, "Forgot peer");
        removed
    }

    /// Number of accepted requests not yet answered.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Whether the request `handle` is still awaiting its reply.
    #[must_use]
    pub fn is_pending(&self, handle: &CallHandle) -> bool {
        self.inner.pending.contains(handle)
    }

    /// Endpoint counters.
    #[must_use]
    pub fn stats(&self) -> &EndpointStats {
        &self.inner.core.stats
    }

    /// Correlation table counters.
    #[must_use]
    pub fn correlation_stats(&self) -> &CorrelationStats {
        self.inner.pending.stats()
    }

    /// Service name.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.inner.core.service
    }

    /// Topic names used by this endpoint.
    #[must_use]
    pub fn topics(&self) -> &ServiceTopicPair {
        &self.inner.core.topics
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.core.is_closed()
    }

    /// Stops request delivery, discards unanswered requests, then releases
    /// the reply publication. Idempotent.
    pub fn shutdown(&self) {
        let pending = &self.inner.pending;
        self.inner.core.shutdown(|| pending.drain().len());
    }
}

impl Drop for ServerEndpoint {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ServerInner {
    #[instrument(skip(self, reply), fields(service = %self.core.service))]
    fn receive_response(
        &self,
        handle: CallHandle,
        reply: Message,
    ) -> Result<Option<CallIdentity>, EndpointError> {
        let core = &self.core;
        core.ensure_open()?;

        let Some(peer) = self.pending.resolve_and_remove(&handle) else {
            core.record_miss();
            warn!(
                service = %core.service,
                %handle,
                reason = "no pending request",
                "Dropping response"
            );
            return Ok(None);
        };

        let payload = core.encode(&core.reply_type, reply).map_err(|e| {
            core.record_marshal_failure();
            warn!(service = %core.service, %handle, %peer, reason = %e, "Dropping response");
            e
        })?;

        let identity = core.publish(payload, Some(handle))?;
        core.stats.replies.fetch_add(1, Ordering::Relaxed);
        trace!(service = %core.service, %handle, %peer, %identity, "Reply published");
        Ok(Some(identity))
    }
}

impl DeliveryHandler for ServerInner {
    fn core(&self) -> &EndpointCore {
        &self.core
    }

    fn on_sample(self: Arc<Self>, sample: Sample) {
        let core = &self.core;
        let request = match core.decode(&core.request_type, &sample.payload) {
            Ok(request) => request,
            Err(e) => {
                core.record_marshal_failure();
                warn!(
                    service = %core.service,
                    identity = %sample.identity,
                    peer = %sample.peer,
                    reason = %e,
                    "Dropping request"
                );
                return;
            }
        };

        if let Err(e) = self.pending.register(sample.identity, sample.peer) {
            error!(service = %core.service, peer = %sample.peer, reason = %e, "Dropping request");
            return;
        }
        core.stats.requests.fetch_add(1, Ordering::Relaxed);

        let responder = Responder {
            server: Some(Arc::downgrade(&self)),
            service: core.service.clone(),
            handle: sample.identity,
            peer: sample.peer,
        };
        trace!(service = %core.service, handle = %sample.identity, "Dispatching request");
        (self.on_request)(request, responder);
    }
}
