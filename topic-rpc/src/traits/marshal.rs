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

use crate::message::{MarshalError, Message, MessageType};

/// Converts between [`Message`] and the transport's payload bytes.
///
/// Both directions are fallible; endpoints log and drop on failure.
pub trait Marshaler: Send + Sync + Debug {
    /// Encodes a message (already shaped for its topic type) into bytes.
    fn marshal_out(&self, message: &Message) -> Result<Vec<u8>, MarshalError>;

    /// Decodes bytes received on a topic of type `message_type`.
    fn marshal_in(&self, message_type: &MessageType, payload: &[u8])
        -> Result<Message, MarshalError>;
}

/// JSON marshaling via `serde_json`.
///
/// The body is written as-is; union samples therefore travel as
/// `{"<member>": <value>}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMarshaler;

impl Marshaler for JsonMarshaler {
    fn marshal_out(&self, message: &Message) -> Result<Vec<u8>, MarshalError> {
        serde_json::to_vec(message.body()).map_err(|e| MarshalError::Encode {
            type_name: message.type_name().to_string(),
            reason: e.to_string(),
        })
    }

    fn marshal_in(
        &self,
        message_type: &MessageType,
        payload: &[u8],
    ) -> Result<Message, MarshalError> {
        let body: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| MarshalError::Decode {
                type_name: message_type.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Message::new(message_type.name.clone(), body))
    }
}
