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

//! Resolution of configured union members for a service's topic types.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{trace, warn};

use super::config::RemapConfig;
use crate::message::{ConfigError, MarshalError, Message, MessageType};

/// Read-only mapping between payload type names and union members.
///
/// Built once per endpoint by [`DiscriminatorMap::build`]. Plain topic types
/// contribute nothing and pass through [`wrap`](Self::wrap) and
/// [`unwrap`](Self::unwrap) untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscriminatorMap {
    /// `(union name, payload type)` to the member that carries it.
    by_type: HashMap<(String, String), String>,
    /// `(union name, member)` to the payload type that member carries.
    by_discriminator: HashMap<(String, String), String>,
}

impl DiscriminatorMap {
    /// Resolves `remap` against the service's request and reply types.
    ///
    /// When `type` is configured it is resolved in every union-shaped type
    /// and the direction-specific aliases are ignored.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnresolvedDiscriminator`] if a configured name is not
    /// a member of the type it must resolve against, or that type is not a
    /// union.
    pub fn build(
        service: &str,
        remap: &RemapConfig,
        request: &MessageType,
        reply: &MessageType,
    ) -> Result<Self, ConfigError> {
        let mut map = Self::default();

        if let Some(member) = &remap.type_member {
            if remap.request_type.is_some() || remap.reply_type.is_some() {
                warn!(
                    service,
                    "remap 'type' is set; 'request_type' and 'reply_type' are ignored"
                );
            }
            let unions: Vec<&MessageType> =
                [request, reply].into_iter().filter(|ty| ty.is_union()).collect();
            if unions.is_empty() {
                return Err(unresolved(service, member, request));
            }
            for ty in unions {
                map.insert(service, ty, member)?;
            }
        } else {
            if let Some(member) = &remap.request_type {
                map.insert(service, request, member)?;
            }
            if let Some(member) = &remap.reply_type {
                map.insert(service, reply, member)?;
            }
        }

        trace!(service, branches = map.by_type.len(), "Built discriminator map");
        Ok(map)
    }

    fn insert(
        &mut self,
        service: &str,
        ty: &MessageType,
        member: &str,
    ) -> Result<(), ConfigError> {
        let member_type = ty
            .member_type(member)
            .ok_or_else(|| unresolved(service, member, ty))?;
        self.by_type.insert(
            (ty.name.clone(), member_type.to_string()),
            member.to_string(),
        );
        self.by_discriminator.insert(
            (ty.name.clone(), member.to_string()),
            member_type.to_string(),
        );
        Ok(())
    }

    /// The member of `union` configured to carry payloads of `type_name`.
    #[must_use]
    pub fn discriminator_for(&self, union: &str, type_name: &str) -> Option<&str> {
        self.by_type
            .get(&(union.to_string(), type_name.to_string()))
            .map(String::as_str)
    }

    /// The payload type carried by `discriminator` in the union `union`.
    #[must_use]
    pub fn type_for(&self, union: &str, discriminator: &str) -> Option<&str> {
        self.by_discriminator
            .get(&(union.to_string(), discriminator.to_string()))
            .map(String::as_str)
    }

    /// Whether no branch was configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// Shapes an outgoing message for a topic of type `ty`.
    ///
    /// # Errors
    ///
    /// [`MarshalError::NoBranchForType`] if `ty` is a union and no member is
    /// configured for the message's type.
    pub fn wrap(&self, ty: &MessageType, message: Message) -> Result<Message, MarshalError> {
        if !ty.is_union() {
            return Ok(message);
        }

        let (type_name, body) = message.into_parts();
        let member = self
            .discriminator_for(&ty.name, &type_name)
            .filter(|member| ty.member_type(member) == Some(type_name.as_str()))
            .ok_or_else(|| MarshalError::NoBranchForType {
                union: ty.name.clone(),
                type_name: type_name.clone(),
            })?;

        let mut wrapped = serde_json::Map::with_capacity(1);
        wrapped.insert(member.to_string(), body);
        Ok(Message::new(ty.name.clone(), Value::Object(wrapped)))
    }

    /// Extracts the active branch of an incoming message of type `ty`.
    ///
    /// # Errors
    ///
    /// [`MarshalError::MalformedUnion`] if the sample does not have exactly
    /// one active member, [`MarshalError::UnconfiguredBranch`] if that
    /// member is not configured for this service.
    pub fn unwrap(&self, ty: &MessageType, message: Message) -> Result<Message, MarshalError> {
        if !ty.is_union() {
            return Ok(message);
        }

        let Value::Object(fields) = message.into_body() else {
            return Err(MarshalError::MalformedUnion {
                union: ty.name.clone(),
                reason: "expected an object".to_string(),
            });
        };
        if fields.len() != 1 {
            return Err(MarshalError::MalformedUnion {
                union: ty.name.clone(),
                reason: format!("expected one active member, found {}", fields.len()),
            });
        }

        let Some((member, body)) = fields.into_iter().next() else {
            return Err(MarshalError::MalformedUnion {
                union: ty.name.clone(),
                reason: "no active member".to_string(),
            });
        };
        let member_type = self
            .type_for(&ty.name, &member)
            .ok_or_else(|| MarshalError::UnconfiguredBranch {
                union: ty.name.clone(),
                member: member.clone(),
            })?;
        Ok(Message::new(member_type, body))
    }
}

fn unresolved(service: &str, member: &str, ty: &MessageType) -> ConfigError {
    ConfigError::UnresolvedDiscriminator {
        service: service.to_string(),
        discriminator: member.to_string(),
        type_name: ty.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_union() -> MessageType {
        MessageType::union(
            "Calculator_Request",
            [("addition", "AddRequest"), ("subtraction", "SubRequest")],
        )
    }

    fn reply_union() -> MessageType {
        MessageType::union(
            "Calculator_Reply",
            [("addition", "AddReply"), ("subtraction", "SubReply")],
        )
    }

    #[test]
    fn test_type_alias_resolves_in_both_unions() {
        let map = DiscriminatorMap::build(
            "calculator",
            &RemapConfig::both("addition"),
            &request_union(),
            &reply_union(),
        )
        .unwrap();

        assert_eq!(
            map.discriminator_for("Calculator_Request", "AddRequest"),
            Some("addition")
        );
        assert_eq!(
            map.discriminator_for("Calculator_Reply", "AddReply"),
            Some("addition")
        );
        assert_eq!(map.type_for("Calculator_Reply", "addition"), Some("AddReply"));
        assert_eq!(map.discriminator_for("Calculator_Request", "SubRequest"), None);
    }

    #[test]
    fn test_type_alias_takes_precedence_over_split_aliases() {
        let remap = RemapConfig {
            type_member: Some("subtraction".into()),
            request_type: Some("addition".into()),
            reply_type: Some("addition".into()),
        };
        let map =
            DiscriminatorMap::build("calculator", &remap, &request_union(), &reply_union())
                .unwrap();

        assert_eq!(
            map.discriminator_for("Calculator_Request", "SubRequest"),
            Some("subtraction")
        );
        assert_eq!(map.discriminator_for("Calculator_Request", "AddRequest"), None);
    }

    #[test]
    fn test_unknown_member_fails_construction() {
        let err = DiscriminatorMap::build(
            "calculator",
            &RemapConfig::split("addition", "division"),
            &request_union(),
            &reply_union(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ConfigError::UnresolvedDiscriminator { ref discriminator, ref type_name, .. }
                if discriminator == "division" && type_name == "Calculator_Reply"
        ));
    }

    #[test]
    fn test_alias_against_plain_type_fails() {
        let err = DiscriminatorMap::build(
            "echo",
            &RemapConfig::both("payload"),
            &MessageType::plain("EchoRequest"),
            &MessageType::plain("EchoReply"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedDiscriminator { .. }));
    }

    #[test]
    fn test_wrap_and_unwrap_union_branch() {
        let map = DiscriminatorMap::build(
            "calculator",
            &RemapConfig::both("addition"),
            &request_union(),
            &reply_union(),
        )
        .unwrap();

        let wrapped = map
            .wrap(&request_union(), Message::new("AddRequest", json!({ "a": 1, "b": 2 })))
            .unwrap();
        assert_eq!(wrapped.type_name(), "Calculator_Request");
        assert_eq!(wrapped.body(), &json!({ "addition": { "a": 1, "b": 2 } }));

        let unwrapped = map.unwrap(&request_union(), wrapped).unwrap();
        assert_eq!(unwrapped.type_name(), "AddRequest");
        assert_eq!(unwrapped.body(), &json!({ "a": 1, "b": 2 }));
    }

    #[test]
    fn test_wrap_rejects_unconfigured_type() {
        let map = DiscriminatorMap::build(
            "calculator",
            &RemapConfig::both("addition"),
            &request_union(),
            &reply_union(),
        )
        .unwrap();

        let err = map
            .wrap(&request_union(), Message::new("SubRequest", json!({})))
            .unwrap_err();
        assert!(matches!(err, MarshalError::NoBranchForType { .. }));

        // A reply payload cannot be wrapped into the request union.
        let err = map
            .wrap(&request_union(), Message::new("AddReply", json!({})))
            .unwrap_err();
        assert!(matches!(err, MarshalError::NoBranchForType { .. }));
    }

    #[test]
    fn test_unwrap_rejects_malformed_and_foreign_branches() {
        let map = DiscriminatorMap::build(
            "calculator",
            &RemapConfig::both("addition"),
            &request_union(),
            &reply_union(),
        )
        .unwrap();
        let ty = request_union();

        let two = Message::new(ty.name.clone(), json!({ "addition": {}, "subtraction": {} }));
        assert!(matches!(
            map.unwrap(&ty, two),
            Err(MarshalError::MalformedUnion { .. })
        ));

        let scalar = Message::new(ty.name.clone(), json!(7));
        assert!(matches!(
            map.unwrap(&ty, scalar),
            Err(MarshalError::MalformedUnion { .. })
        ));

        let foreign = Message::new(ty.name.clone(), json!({ "subtraction": {} }));
        assert!(matches!(
            map.unwrap(&ty, foreign),
            Err(MarshalError::UnconfiguredBranch { ref member, .. }) if member == "subtraction"
        ));
    }

    #[test]
    fn test_shared_payload_type_resolves_per_union() {
        let request = MessageType::union("Svc_Request", [("add", "Int")]);
        let reply = MessageType::union("Svc_Reply", [("result", "Int")]);
        let map =
            DiscriminatorMap::build("svc", &RemapConfig::split("add", "result"), &request, &reply)
                .unwrap();

        assert_eq!(map.discriminator_for("Svc_Request", "Int"), Some("add"));
        assert_eq!(map.discriminator_for("Svc_Reply", "Int"), Some("result"));

        let wrapped = map.wrap(&request, Message::new("Int", json!(3))).unwrap();
        assert_eq!(wrapped.body(), &json!({ "add": 3 }));
        let wrapped = map.wrap(&reply, Message::new("Int", json!(5))).unwrap();
        assert_eq!(wrapped.body(), &json!({ "result": 5 }));

        let unwrapped = map.unwrap(&reply, wrapped).unwrap();
        assert_eq!(unwrapped.type_name(), "Int");
        assert_eq!(unwrapped.body(), &json!(5));
    }

    #[test]
    fn test_plain_types_pass_through() {
        let map = DiscriminatorMap::build(
            "echo",
            &RemapConfig::default(),
            &MessageType::plain("EchoRequest"),
            &MessageType::plain("EchoReply"),
        )
        .unwrap();
        assert!(map.is_empty());

        let msg = Message::new("EchoRequest", json!("hi"));
        let out = map
            .wrap(&MessageType::plain("EchoRequest"), msg.clone())
            .unwrap();
        assert_eq!(out, msg);
    }
}
