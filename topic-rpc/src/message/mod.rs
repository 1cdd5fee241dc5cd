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

pub use error::{ConfigError, CorrelationError, EndpointError, MarshalError, TransportError};
pub use generic_message::{Message, MessageType};
pub use identity::{CallHandle, CallIdentity, CallerId, PeerId, WriterGuid};
pub use sample::{MatchEvent, MatchStatus, Sample};

/// Error taxonomy for construction and per-message failures.
mod error;

/// Defines [`Message`] and [`MessageType`].
mod generic_message;

/// Correlation and peer identity value types.
mod identity;

/// Delivered samples and peer matching notifications.
mod sample;
