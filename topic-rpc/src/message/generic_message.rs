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

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Generic host-side message: a named type plus its structured body.
///
/// Endpoints never look inside `body` beyond locating the active branch of
/// a tagged union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    type_name: String,
    body: serde_json::Value,
}

impl Message {
    /// Creates a message of the given type.
    #[must_use]
    pub fn new(type_name: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            type_name: type_name.into(),
            body,
        }
    }

    /// The message's declared type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The message body.
    #[must_use]
    pub const fn body(&self) -> &serde_json::Value {
        &self.body
    }

    /// Consumes the message, returning its body.
    #[must_use]
    pub fn into_body(self) -> serde_json::Value {
        self.body
    }

    /// Consumes the message, returning its type name and body.
    #[must_use]
    pub fn into_parts(self) -> (String, serde_json::Value) {
        (self.type_name, self.body)
    }
}

/// Data type carried on a topic.
///
/// An empty `members` table describes a plain structure. A non-empty table
/// describes a tagged union: each entry maps a member (discriminator) name
/// to the type name of the payload that member carries. A union sample is
/// encoded as a JSON object with exactly one key, the active member.
///
/// ```toml
/// name = "Calculator_Request"
/// members = { addition = "AddRequest", subtraction = "SubRequest" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageType {
    /// Type name registered with the transport for the topic.
    pub name: String,
    /// Union members, keyed by member name.
    pub members: BTreeMap<String, String>,
}

impl MessageType {
    /// A plain (non-union) structure type.
    #[must_use]
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: BTreeMap::new(),
        }
    }

    /// A tagged-union type built from `(member, member_type)` pairs.
    #[must_use]
    pub fn union<I, M, T>(name: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = (M, T)>,
        M: Into<String>,
        T: Into<String>,
    {
        Self {
            name: name.into(),
            members: members
                .into_iter()
                .map(|(m, t)| (m.into(), t.into()))
                .collect(),
        }
    }

    /// Whether this type is union-shaped.
    #[must_use]
    pub fn is_union(&self) -> bool {
        !self.members.is_empty()
    }

    /// Type name of the payload carried by `member`, if it is a member.
    #[must_use]
    pub fn member_type(&self, member: &str) -> Option<&str> {
        self.members.get(member).map(String::as_str)
    }
}
