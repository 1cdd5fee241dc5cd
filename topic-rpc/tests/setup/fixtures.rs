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
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;
use tracing::{error, trace};

use topic_rpc::prelude::*;

pub const ADD: &str = "Add";
pub const CALCULATOR: &str = "Calculator";

/// Plain-typed addition service: `Add_Request` / `Add_Reply`.
pub fn add_config() -> ServiceConfig {
    ServiceConfig::plain("AddRequest", "AddReply")
}

/// Union-typed calculator service where only `addition` is bridged.
pub fn calculator_config() -> ServiceConfig {
    ServiceConfig {
        request: MessageType::union(
            "Calculator_Request",
            [("addition", "AddRequest"), ("subtraction", "SubRequest")],
        ),
        reply: MessageType::union(
            "Calculator_Reply",
            [("addition", "AddReply"), ("subtraction", "SubReply")],
        ),
        remap: RemapConfig::both("addition"),
        service_instance_name: Some("calculator-1".to_string()),
    }
}

pub fn add_request(a: i64, b: i64) -> Message {
    Message::new("AddRequest", json!({ "a": a, "b": b }))
}

pub fn add_reply(sum: i64) -> Message {
    Message::new("AddReply", json!({ "sum": sum }))
}

pub fn sum_of(message: &Message) -> Option<i64> {
    message.body().get("sum").and_then(serde_json::Value::as_i64)
}

/// Request handler that answers every `AddRequest` immediately.
pub fn adding_handler() -> RequestCallback {
    Arc::new(|request: Message, responder: Responder| {
        let body = request.body();
        let (Some(a), Some(b)) = (
            body.get("a").and_then(serde_json::Value::as_i64),
            body.get("b").and_then(serde_json::Value::as_i64),
        ) else {
            error!(?request, "Unexpected request shape");
            return;
        };
        if let Err(e) = responder.respond(add_reply(a + b)) {
            error!(error = %e, "Failed to respond");
        }
    })
}

/// Request handler that parks every responder for the test to answer.
#[derive(Default)]
pub struct ParkedRequests {
    parked: Mutex<Vec<(Message, Responder)>>,
    notify: Notify,
}

impl ParkedRequests {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn callback(self: &Arc<Self>) -> RequestCallback {
        let parked = Arc::clone(self);
        Arc::new(move |request: Message, responder: Responder| {
            parked.parked.lock().push((request, responder));
            parked.notify.notify_waiters();
        })
    }

    pub fn len(&self) -> usize {
        self.parked.lock().len()
    }

    /// Removes and returns the parked request at `index`.
    pub fn take(&self, index: usize) -> (Message, Responder) {
        self.parked.lock().remove(index)
    }

    /// Removes the parked request whose `a` operand equals `a`.
    pub fn take_by_operand(&self, a: i64) -> Option<(Message, Responder)> {
        let mut parked = self.parked.lock();
        let index = parked
            .iter()
            .position(|(request, _)| request.body().get("a").and_then(serde_json::Value::as_i64) == Some(a))?;
        Some(parked.remove(index))
    }

    pub async fn wait_for(&self, count: usize) {
        wait_until(|| self.len() >= count, &self.notify).await;
    }
}

/// Collects replies handed to a client's reply callback.
#[derive(Default)]
pub struct ReplyLog {
    entries: Mutex<Vec<(CallerId, Message)>>,
    notify: Notify,
}

impl ReplyLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn callback(self: &Arc<Self>) -> ReplyCallback {
        let log = Arc::clone(self);
        Arc::new(move |caller: CallerId, reply: Message| {
            trace!(%caller, ?reply, "Reply received");
            log.entries.lock().push((caller, reply));
            log.notify.notify_waiters();
        })
    }

    pub fn entries(&self) -> Vec<(CallerId, Message)> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn for_caller(&self, caller: CallerId) -> Vec<Message> {
        self.entries
            .lock()
            .iter()
            .filter(|(c, _)| *c == caller)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub async fn wait_for(&self, count: usize) {
        wait_until(|| self.len() >= count, &self.notify).await;
    }
}

/// Polls `ready` until it holds, waking early on `notify`. Panics after
/// five seconds.
pub async fn wait_until(ready: impl Fn() -> bool, notify: &Notify) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !ready() {
            tokio::select! {
                () = notify.notified() => {}
                () = tokio::time::sleep(Duration::from_millis(10)) => {}
            }
        }
    })
    .await
    .expect("timed out waiting for condition");
}

/// Lets in-flight deliveries settle when nothing observable is expected.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
