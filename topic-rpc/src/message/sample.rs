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

use super::identity::{CallIdentity, PeerId};

/// A sample delivered by the transport on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Marshaled payload bytes.
    pub payload: Vec<u8>,
    /// Identity the transport assigned to this sample when it was published.
    pub identity: CallIdentity,
    /// Identity of the sample this one answers, when the publisher linked it.
    pub related: Option<CallIdentity>,
    /// Participant that published the sample.
    pub peer: PeerId,
}

/// Whether a remote reader or writer was just matched or lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    /// A compatible remote endpoint appeared on the topic.
    Matched,
    /// A previously matched remote endpoint went away.
    Unmatched,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Matched => f.write_str("matched"),
            Self::Unmatched => f.write_str("unmatched"),
        }
    }
}

/// Peer matching notification for a publication or subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchEvent {
    /// Topic the notification concerns.
    pub topic: String,
    /// Matched or unmatched.
    pub status: MatchStatus,
    /// The remote participant.
    pub peer: PeerId,
    /// Number of remote endpoints matched on this topic after the change.
    pub current_count: usize,
}
