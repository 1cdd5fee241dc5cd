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

//! Identity value types used as correlation keys and peer references.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Globally unique identifier of one transport publication (a data writer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WriterGuid(pub u64);

impl fmt::Display for WriterGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Identifies a transport participant that published or received a sample.
///
/// Server endpoints hold a `PeerId` as the non-owning back-reference to the
/// remote caller a pending reply belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

/// Opaque handle naming the local invocation waiting on a client call.
///
/// Chosen by the host; the client endpoint hands it back, unchanged, with
/// the reply that completes the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallerId(pub u64);

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "caller-{}", self.0)
    }
}

/// Transport-assigned identity of a single published sample.
///
/// Assigned once at publication time and never interpreted beyond equality
/// and hashing. A reply links back to its request by carrying the request's
/// `CallIdentity` as its related identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallIdentity {
    writer: WriterGuid,
    sequence: u64,
}

impl CallIdentity {
    /// Creates an identity from the publishing writer and its sequence number.
    #[must_use]
    pub const fn new(writer: WriterGuid, sequence: u64) -> Self {
        Self { writer, sequence }
    }

    /// The writer that published the sample.
    #[must_use]
    pub const fn writer(&self) -> WriterGuid {
        self.writer
    }

    /// The writer-local sequence number of the sample.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for CallIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.writer, self.sequence)
    }
}

/// Handle a server-side handler answers a request through.
pub type CallHandle = CallIdentity;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identity_display() {
        let id = CallIdentity::new(WriterGuid(0x2a), 7);
        assert_eq!(id.to_string(), "000000000000002a:7");
    }

    #[test]
    fn test_identity_equality_uses_writer_and_sequence() {
        let a = CallIdentity::new(WriterGuid(1), 1);
        let b = CallIdentity::new(WriterGuid(1), 2);
        let c = CallIdentity::new(WriterGuid(2), 1);

        let set: HashSet<_> = [a, b, c, a].into_iter().collect();
        assert_eq!(set.len(), 3);
        assert_eq!(a, CallIdentity::new(WriterGuid(1), 1));
    }
}
