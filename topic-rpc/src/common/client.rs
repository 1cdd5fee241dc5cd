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

//! Client side of a service: publishes requests, routes replies to callers.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, info, instrument, trace, warn};

use super::config::ServiceConfig;
use super::correlation::{CorrelationStats, CorrelationTable};
use super::endpoint::{
    DeliveryHandler, EndpointCore, EndpointListener, EndpointRole, EndpointStats,
};
use super::topics::ServiceTopicPair;
use super::types::ReplyCallback;
use crate::message::{CallIdentity, CallerId, EndpointError, Message, Sample};
use crate::traits::{Marshaler, Transport};

/// Issues requests for local callers and hands each reply to the caller
/// that issued the matching request.
///
/// Publishes on `<service>_Request` and subscribes to `<service>_Reply`.
/// Every client on a service sees every reply; replies to calls this client
/// did not issue are dropped.
///
/// Dropping the endpoint shuts it down.
#[derive(Debug)]
pub struct ClientEndpoint {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    core: EndpointCore,
    pending: CorrelationTable<CallerId>,
    on_reply: ReplyCallback,
}

impl std::fmt::Debug for ClientInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientInner")
            .field("core", &self.core)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl ClientEndpoint {
    /// Creates a client for `service` and attaches it to `transport`.
    ///
    /// # Errors
    ///
    /// [`EndpointError::Config`] if the discriminator configuration does not
    /// resolve, [`EndpointError::Transport`] if the topics cannot be created.
    #[instrument(skip(transport, config, marshaler, on_reply))]
    pub fn new(
        transport: Arc<dyn Transport>,
        service: &str,
        config: &ServiceConfig,
        marshaler: Arc<dyn Marshaler>,
        on_reply: ReplyCallback,
    ) -> Result<Self, EndpointError> {
        let core = EndpointCore::new(EndpointRole::Client, transport, service, config, marshaler)?;
        let inner = Arc::new(ClientInner {
            core,
            pending: CorrelationTable::new(),
            on_reply,
        });
        inner.core.attach(EndpointListener::new(&inner))?;
        info!(service, topics = %inner.core.topics, "Client endpoint ready");
        Ok(Self { inner })
    }

    /// Sends `request` on behalf of `caller`.
    ///
    /// The reply, if one ever arrives, is passed to the reply callback
    /// together with `caller`. The returned identity is the correlation key
    /// of this call.
    ///
    /// # Errors
    ///
    /// Fails if the endpoint is shut down, the request cannot be marshaled,
    /// or the transport rejects the publication. Nothing is registered in
    /// any of these cases.
    #[instrument(skip(self, request), fields(service = %self.inner.core.service))]
    pub fn call(&self, caller: CallerId, request: Message) -> Result<CallIdentity, EndpointError> {
        let core = &self.inner.core;
        core.ensure_open()?;

        let payload = core.encode(&core.request_type, request).map_err(|e| {
            core.record_marshal_failure();
            warn!(service = %core.service, %caller, reason = %e, "Dropping request");
            e
        })?;

        let result = self
            .inner
            .pending
            .register_with(caller, || core.publish(payload, None));
        debug_assert!(
            !matches!(result, Err(EndpointError::Correlation(_))),
            "transport assigned an identity that is already pending"
        );
        let identity = result?;

        core.stats.requests.fetch_add(1, Ordering::Relaxed);
        trace!(service = %core.service, %caller, %identity, "Request published");
        Ok(identity)
    }

    /// Forgets every pending call issued by `caller`.
    ///
    /// Replies to those calls arriving later are dropped. Returns the
    /// number of calls forgotten.
    pub fn cancel_caller(&self, caller: CallerId) -> usize {
        let removed = self.inner.pending.remove_all_for(&caller);
        debug!(service = %self.inner.core.service, %caller, removed, "Cancelled caller");
        removed
    }

    /// Number of calls still waiting for a reply.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Whether a reply is still outstanding for `identity`.
    #[must_use]
    pub fn is_pending(&self, identity: &CallIdentity) -> bool {
        self.inner.pending.contains(identity)
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

    /// Stops reply delivery, discards pending calls, then releases the
    /// request publication. Idempotent.
    pub fn shutdown(&self) {
        let pending = &self.inner.pending;
        self.inner.core.shutdown(|| pending.drain().len());
    }
}

impl Drop for ClientEndpoint {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl DeliveryHandler for ClientInner {
    fn core(&self) -> &EndpointCore {
        &self.core
    }

    fn on_sample(self: Arc<Self>, sample: Sample) {
        let core = &self.core;
        let Some(related) = sample.related else {
            core.record_miss();
            warn!(
                service = %core.service,
                identity = %sample.identity,
                reason = "no related request identity",
                "Dropping reply"
            );
            return;
        };

        // Decode before resolving so a malformed reply leaves the call pending.
        let reply = match core.decode(&core.reply_type, &sample.payload) {
            Ok(reply) => reply,
            Err(e) => {
                core.record_marshal_failure();
                warn!(service = %core.service, %related, reason = %e, "Dropping reply");
                return;
            }
        };

        let Some(caller) = self.pending.resolve_and_remove(&related) else {
            core.record_miss();
            debug!(
                service = %core.service,
                %related,
                reason = "no pending call",
                "Dropping reply"
            );
            return;
        };

        core.stats.replies.fetch_add(1, Ordering::Relaxed);
        trace!(service = %core.service, %caller, %related, "Delivering reply");
        (self.on_reply)(caller, reply);
    }
}
