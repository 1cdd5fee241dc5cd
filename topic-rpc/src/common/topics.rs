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

use std::fmt;

/// Request and reply topic names for one logical service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceTopicPair {
    /// Topic carrying requests from clients to servers.
    pub request: String,
    /// Topic carrying replies from servers to clients.
    pub reply: String,
}

impl ServiceTopicPair {
    /// Derives the topic pair for `service`: `<service>_Request` and
    /// `<service>_Reply`.
    #[must_use]
    pub fn for_service(service: &str) -> Self {
        Self {
            request: format!("{service}_Request"),
            reply: format!("{service}_Reply"),
        }
    }
}

impl fmt::Display for ServiceTopicPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.request, self.reply)
    }
}
