//! The closed set of Marathon event kinds
//!
//! Each kind owns one bit of an [`EventFilter`], a wire name (the `eventType`
//! discriminant) and a payload type. All three come from the single
//! `event_kinds!` table below; the decode table is built from it once, on
//! first use.

use std::collections::HashMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::LazyLock;

use serde::Deserialize;
use thiserror::Error;

use super::payloads::*;

/// Errors raised while decoding an event body
#[derive(Error, Debug)]
pub enum EventError {
    #[error("failed to decode the event type: {0}")]
    Discriminant(#[source] serde_json::Error),

    #[error("the event type: {0} was not found or supported")]
    UnknownKind(String),

    #[error("failed to decode the {kind} event: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

type Decoder = fn(&[u8]) -> Result<EventPayload, serde_json::Error>;

macro_rules! event_kinds {
    ($( $(#[$meta:meta])* $kind:ident => $name:literal, $payload:ty; )+) => {
        /// A Marathon event kind; the declaration order fixes the filter bit
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventKind {
            $( $(#[$meta])* $kind, )+
        }

        impl EventKind {
            /// Every known kind, in bit order
            pub const ALL: &'static [EventKind] = &[ $( EventKind::$kind, )+ ];

            /// Wire name used in the `eventType` field
            pub const fn name(self) -> &'static str {
                match self {
                    $( EventKind::$kind => $name, )+
                }
            }
        }

        /// Decoded payload, one variant per [`EventKind`]
        #[derive(Debug, Clone, PartialEq)]
        pub enum EventPayload {
            $( $kind($payload), )+
        }

        impl EventPayload {
            pub fn kind(&self) -> EventKind {
                match self {
                    $( EventPayload::$kind(_) => EventKind::$kind, )+
                }
            }
        }

        static DECODERS: LazyLock<HashMap<&'static str, (EventKind, Decoder)>> =
            LazyLock::new(|| {
                let mut table: HashMap<&'static str, (EventKind, Decoder)> = HashMap::new();
                $(
                    table.insert(
                        $name,
                        (
                            EventKind::$kind,
                            (|raw: &[u8]| {
                                serde_json::from_slice::<$payload>(raw).map(EventPayload::$kind)
                            }) as Decoder,
                        ),
                    );
                )+
                table
            });
    };
}

event_kinds! {
    ApiRequest => "api_post_event", EventApiRequest;
    StatusUpdate => "status_update_event", EventStatusUpdate;
    FrameworkMessage => "framework_message_event", EventFrameworkMessage;
    Subscription => "subscribe_event", EventSubscription;
    Unsubscription => "unsubscribe_event", EventSubscription;
    StreamAttached => "event_stream_attached", EventStreamAttachment;
    StreamDetached => "event_stream_detached", EventStreamAttachment;
    AddHealthCheck => "add_health_check_event", EventHealthCheck;
    RemoveHealthCheck => "remove_health_check_event", EventHealthCheck;
    FailedHealthCheck => "failed_health_check_event", EventHealthCheck;
    HealthStatusChanged => "health_status_changed_event", EventHealthCheckChanged;
    GroupChangeSuccess => "group_change_success", EventGroupChange;
    GroupChangeFailed => "group_change_failed", EventGroupChange;
    DeploymentSuccess => "deployment_success", EventDeploymentResult;
    DeploymentFailed => "deployment_failed", EventDeploymentResult;
    DeploymentInfo => "deployment_info", EventDeploymentStep;
    DeploymentStepSuccess => "deployment_step_success", EventDeploymentStep;
    DeploymentStepFailure => "deployment_step_failure", EventDeploymentStep;
    AppTerminated => "app_terminated_event", EventAppTerminated;
}

impl EventKind {
    /// The filter bit of this kind
    pub const fn bit(self) -> u32 {
        1 << (self as u32)
    }

    /// Look a kind up by its wire name
    pub fn from_name(name: &str) -> Option<EventKind> {
        DECODERS.get(name).map(|(kind, _)| *kind)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded event envelope
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub payload: EventPayload,
}

impl Event {
    /// Numeric identity tag (the kind's filter bit)
    pub fn id(&self) -> u32 {
        self.kind.bit()
    }

    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type: {}, event: {:?}", self.name(), self.payload)
    }
}

#[derive(Deserialize)]
struct Discriminant {
    #[serde(rename = "eventType")]
    event_type: String,
}

/// Decode an event body: the `eventType` discriminant first, then the
/// kind-specific payload.
pub fn decode_event(raw: &[u8]) -> Result<Event, EventError> {
    let discriminant: Discriminant =
        serde_json::from_slice(raw).map_err(EventError::Discriminant)?;

    let (kind, decoder) = DECODERS
        .get(discriminant.event_type.as_str())
        .ok_or_else(|| EventError::UnknownKind(discriminant.event_type.clone()))?;

    let payload = decoder(raw).map_err(|source| EventError::Decode {
        kind: kind.name(),
        source,
    })?;

    Ok(Event {
        kind: *kind,
        payload,
    })
}

/// A set of event kinds a subscriber is interested in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EventFilter(u32);

impl EventFilter {
    pub const NONE: EventFilter = EventFilter(0);

    pub const ALL: EventFilter = EventFilter((1 << EventKind::ALL.len() as u32) - 1);

    /// Task and health changes of applications
    pub const APPLICATIONS: EventFilter = EventFilter(
        EventKind::StatusUpdate.bit()
            | EventKind::HealthStatusChanged.bit()
            | EventKind::FailedHealthCheck.bit()
            | EventKind::AppTerminated.bit(),
    );

    /// Event bus subscription changes
    pub const SUBSCRIPTIONS: EventFilter = EventFilter(
        EventKind::Subscription.bit()
            | EventKind::Unsubscription.bit()
            | EventKind::StreamAttached.bit()
            | EventKind::StreamDetached.bit(),
    );

    /// Deployment and group change progress
    pub const DEPLOYMENTS: EventFilter = EventFilter(
        EventKind::GroupChangeSuccess.bit()
            | EventKind::GroupChangeFailed.bit()
            | EventKind::DeploymentSuccess.bit()
            | EventKind::DeploymentFailed.bit()
            | EventKind::DeploymentInfo.bit()
            | EventKind::DeploymentStepSuccess.bit()
            | EventKind::DeploymentStepFailure.bit(),
    );

    pub const fn from_bits(bits: u32) -> Self {
        EventFilter(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether events of `kind` pass this filter
    pub const fn matches(self, kind: EventKind) -> bool {
        self.0 & kind.bit() != 0
    }
}

impl From<EventKind> for EventFilter {
    fn from(kind: EventKind) -> Self {
        EventFilter(kind.bit())
    }
}

impl<T: Into<EventFilter>> BitOr<T> for EventFilter {
    type Output = EventFilter;

    fn bitor(self, rhs: T) -> EventFilter {
        EventFilter(self.0 | rhs.into().0)
    }
}

impl<T: Into<EventFilter>> BitOr<T> for EventKind {
    type Output = EventFilter;

    fn bitor(self, rhs: T) -> EventFilter {
        EventFilter::from(self) | rhs
    }
}

impl<T: Into<EventFilter>> BitOrAssign<T> for EventFilter {
    fn bitor_assign(&mut self, rhs: T) {
        self.0 |= rhs.into().0;
    }
}
