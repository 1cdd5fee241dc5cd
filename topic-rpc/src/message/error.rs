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

//! Error types for endpoint construction and message handling.
//!
//! Construction-time failures ([`ConfigError`], [`TransportError`]) are fatal
//! and surface through [`EndpointError`]. Per-message failures
//! ([`MarshalError`], correlation misses) are logged and the message is
//! dropped; they never escape a delivery callback.

use std::path::PathBuf;

use thiserror::Error;

use super::identity::CallIdentity;

/// Misconfiguration detected while building an endpoint or loading config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configured discriminator alias names no member of the service type.
    #[error("service '{service}': discriminator '{discriminator}' is not a member of type '{type_name}'")]
    UnresolvedDiscriminator {
        /// Service being configured.
        service: String,
        /// The configured member name.
        discriminator: String,
        /// The type it was resolved against.
        type_name: String,
    },

    /// No configuration entry exists for a requested service.
    #[error("no configuration for service '{0}'")]
    UnknownService(String),

    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration text is not valid TOML for the expected schema.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Failure reported by a transport implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport needs a Tokio runtime and none is running.
    #[error("no Tokio runtime available for transport delivery tasks")]
    NoRuntime,

    /// A topic already exists with a different data type.
    #[error("topic '{topic}' is registered with type '{existing}', not '{requested}'")]
    TypeMismatch {
        /// Topic name.
        topic: String,
        /// Type the topic was created with.
        existing: String,
        /// Type requested by the new publication or subscription.
        requested: String,
    },

    /// A publication handle does not name a live publication.
    #[error("unknown publication {0}")]
    UnknownPublication(u64),

    /// The transport or participant has been shut down.
    #[error("transport closed")]
    Closed,

    /// Any other transport-specific failure.
    #[error("transport error: {0}")]
    Other(String),
}

/// Conversion failure between a [`Message`](super::Message) and its wire form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalError {
    /// The message could not be encoded.
    #[error("failed to encode '{type_name}': {reason}")]
    Encode {
        /// Type being encoded.
        type_name: String,
        /// Encoder message.
        reason: String,
    },

    /// The payload could not be decoded.
    #[error("failed to decode '{type_name}': {reason}")]
    Decode {
        /// Type being decoded.
        type_name: String,
        /// Decoder message.
        reason: String,
    },

    /// No union member is configured for the message's type.
    #[error("union '{union}' has no configured member for type '{type_name}'")]
    NoBranchForType {
        /// Union type name.
        union: String,
        /// Type of the message that had to be wrapped.
        type_name: String,
    },

    /// A union sample does not have exactly one active member.
    #[error("union '{union}' sample is malformed: {reason}")]
    MalformedUnion {
        /// Union type name.
        union: String,
        /// What was wrong with the sample.
        reason: String,
    },

    /// The active union member is not one this endpoint was configured for.
    #[error("union '{union}' member '{member}' is not configured")]
    UnconfiguredBranch {
        /// Union type name.
        union: String,
        /// Active member found in the sample.
        member: String,
    },
}

/// Invariant violations on the correlation table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrelationError {
    /// A pending call already exists for this identity.
    #[error("a pending call is already registered for {0}")]
    DuplicateIdentity(CallIdentity),
}

/// Umbrella error for endpoint operations.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// Configuration problem (fatal at construction).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transport problem (fatal at construction, per-call afterwards).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Message could not be marshaled.
    #[error(transparent)]
    Marshal(#[from] MarshalError),

    /// Correlation invariant violated.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    /// The endpoint has been shut down.
    #[error("endpoint for service '{0}' is shut down")]
    Closed(String),
}
