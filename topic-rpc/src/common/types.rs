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

use crate::common::Responder;
use crate::message::{CallerId, Message};

/// Invoked once per reply with the caller that issued the matching request.
pub type ReplyCallback = Arc<dyn Fn(CallerId, Message) + Send + Sync>;

/// Invoked once per accepted request. The [`Responder`] is the only way to
/// answer it.
pub type RequestCallback = Arc<dyn Fn(Message, Responder) + Send + Sync>;
