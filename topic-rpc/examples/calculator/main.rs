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

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use topic_rpc::prelude::*;

// Uses `$XDG_CONFIG_HOME/topic-rpc/config.toml` when it defines the
// service, otherwise this built-in definition.
fn calculator_service(config: &BridgeConfig) -> ServiceConfig {
    config.service("Calculator").cloned().unwrap_or_else(|_| ServiceConfig {
        request: MessageType::union(
            "Calculator_Request",
            [("addition", "AddRequest"), ("subtraction", "SubRequest")],
        ),
        reply: MessageType::union(
            "Calculator_Reply",
            [("addition", "AddReply"), ("subtraction", "SubReply")],
        ),
        remap: RemapConfig::both("addition"),
        service_instance_name: Some("calculator-demo".to_string()),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .compact()
        .init();

    let config = BridgeConfig::load();
    let service = calculator_service(&config);
    let bus = MemoryBus::new()?;

    let _server = ServerEndpoint::new(
        bus.participant("calculator-server"),
        "Calculator",
        &service,
        Arc::new(JsonMarshaler),
        Arc::new(|request: Message, responder: Responder| {
            let body = request.body();
            let a = body["a"].as_i64().unwrap_or_default();
            let b = body["b"].as_i64().unwrap_or_default();
            info!(peer = %responder.peer(), a, b, "Adding");
            if let Err(e) = responder.respond(Message::new("AddReply", json!({ "sum": a + b }))) {
                warn!(error = %e, "Could not answer request");
            }
        }),
    )?;

    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
    let client = ClientEndpoint::new(
        bus.participant("calculator-client"),
        "Calculator",
        &service,
        Arc::new(JsonMarshaler),
        Arc::new(move |caller: CallerId, reply: Message| {
            let _ = reply_tx.send((caller, reply));
        }),
    )?;

    let operands = [(2, 3), (40, 2), (-7, 7)];
    for (caller, (a, b)) in operands.iter().enumerate() {
        let identity = client.call(
            CallerId(caller as u64),
            Message::new("AddRequest", json!({ "a": a, "b": b })),
        )?;
        info!(caller, %identity, "Request sent");
    }

    for _ in 0..operands.len() {
        match tokio::time::timeout(Duration::from_secs(2), reply_rx.recv()).await {
            Ok(Some((caller, reply))) => {
                let (a, b) = operands[caller.0 as usize];
                println!("{a} + {b} = {}", reply.body()["sum"]);
            }
            Ok(None) => break,
            Err(_) => {
                warn!(pending = client.pending_calls(), "Timed out waiting for replies");
                break;
            }
        }
    }

    client.shutdown();
    bus.shutdown();
    Ok(())
}
