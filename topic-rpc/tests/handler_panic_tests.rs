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

//! Delivery over the in-memory bus survives panicking handlers.
//!
//! Kept in its own test binary: the `#[rpc_test]` panic hook is process-wide
//! and would report these deliberate panics against unrelated tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use topic_rpc::prelude::*;

use crate::setup::*;

mod setup;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bus_keeps_delivering_after_handler_panic() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = MemoryBus::new()?;

    let invocations = Arc::new(AtomicUsize::new(0));
    let seen = invocations.clone();
    let answer = adding_handler();
    let server = ServerEndpoint::new(
        bus.participant("server"),
        ADD,
        &add_config(),
        Arc::new(JsonMarshaler),
        Arc::new(move |request: Message, responder: Responder| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("handler failed on its first request");
            }
            answer(request, responder);
        }),
    )?;
    let replies = ReplyLog::new();
    let client = ClientEndpoint::new(
        bus.participant("client"),
        ADD,
        &add_config(),
        Arc::new(JsonMarshaler),
        replies.callback(),
    )?;

    client.call(CallerId(1), add_request(1, 1))?;
    client.call(CallerId(2), add_request(2, 2))?;
    replies.wait_for(1).await;
    assert_eq!(sum_of(&replies.for_caller(CallerId(2))[0]), Some(4));
    assert!(replies.for_caller(CallerId(1)).is_empty());

    client.call(CallerId(3), add_request(3, 3))?;
    replies.wait_for(2).await;
    assert_eq!(sum_of(&replies.for_caller(CallerId(3))[0]), Some(6));

    assert_eq!(invocations.load(Ordering::SeqCst), 3);
    assert_eq!(server.stats().abandoned(), 1);
    assert_eq!(client.pending_calls(), 1);
    Ok(())
}
