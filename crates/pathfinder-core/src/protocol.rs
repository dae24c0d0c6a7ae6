//! Wire message types: newline-delimited JSON requests/responses exchanged
//! between a session and its client, per spec.md §6.
//!
//! Every request carries `ta_id` (client-chosen transaction id) and `cmd`.
//! Every response carries `ta_id` and `msg_type` of `accept | notify |
//! complete | fail`. These types round-trip through `serde_json` without a
//! framing layer of their own — `pathfinder-daemon` adds the
//! newline-delimited framing.

use crate::props::Props;
use crate::subscription::MatchType;
use serde::{Deserialize, Serialize};

/// The lowest and highest protocol versions this server negotiates.
pub const SUPPORTED_MIN_VERSION: u32 = 1;
pub const SUPPORTED_MAX_VERSION: u32 = 1;

/// A client-initiated request. `ta_id` is chosen by the client and echoed on
/// every response belonging to this transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub ta_id: u64,
    #[serde(flatten)]
    pub command: Command,
}

/// The request body, tagged by `cmd`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Hello {
        min_version: u32,
        max_version: u32,
    },
    Publish {
        service_id: u64,
        generation: u32,
        props: Props,
        ttl: u64,
    },
    Unpublish {
        service_id: u64,
    },
    Subscribe {
        subscription_id: u64,
        filter: String,
    },
    Unsubscribe {
        subscription_id: u64,
    },
    Services {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<String>,
    },
    Subscriptions,
    Clients,
    Ping,
}

/// A server-to-client response, tagged by `msg_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub ta_id: u64,
    #[serde(flatten)]
    pub body: ResponseBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "msg_type", rename_all = "snake_case")]
pub enum ResponseBody {
    Accept {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        protocol_version: Option<u32>,
    },
    Notify(NotifyPayload),
    Complete,
    Fail {
        fail_reason: FailReason,
    },
}

/// One item of a multi-response stream: either a service-change delta for a
/// live subscription, or one row of a `services`/`subscriptions`/`clients`
/// snapshot listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifyPayload {
    /// appeared/modified/disappeared delta delivered to a live subscription.
    ServiceChange {
        match_type: MatchType,
        service_id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        generation: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        service_props: Option<Props>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ttl: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        orphan_since_unix: Option<u64>,
    },
    /// One row of a `services` snapshot.
    Service {
        service_id: u64,
        generation: u32,
        service_props: Props,
        ttl: u64,
        client_id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        orphan_since_unix: Option<u64>,
    },
    /// One row of a `subscriptions` snapshot.
    Subscription {
        subscription_id: u64,
        client_id: u64,
        filter: String,
    },
    /// One row of a `clients` snapshot.
    Client {
        client_id: u64,
        remote_addr: String,
        connect_time_unix: u64,
    },
}

/// The closed set of machine-readable failure reasons, spelled exactly as
/// spec.md §6 names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailReason {
    NoHello,
    ClientIdExists,
    InvalidFilterSyntax,
    SubscriptionIdExists,
    NonExistentSubscription,
    NonExistentService,
    UnsupportedProtocolVersion,
    PermissionDenied,
    OldGeneration,
    SameGenerationButDifferent,
    InsufficientResources,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_reason_wire_spelling() {
        assert_eq!(
            serde_json::to_string(&FailReason::OldGeneration).unwrap(),
            "\"old-generation\""
        );
        assert_eq!(
            serde_json::to_string(&FailReason::SameGenerationButDifferent).unwrap(),
            "\"same-generation-but-different\""
        );
        assert_eq!(
            serde_json::to_string(&FailReason::InsufficientResources).unwrap(),
            "\"insufficient-resources\""
        );
    }

    #[test]
    fn request_round_trip() {
        let req = Request {
            ta_id: 7,
            command: Command::Publish {
                service_id: 0x4711,
                generation: 0,
                props: Props::new(),
                ttl: 60,
            },
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"cmd\":\"publish\""));
        let back: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(back.ta_id, 7);
    }

    #[test]
    fn fail_response_round_trip() {
        let resp = Response {
            ta_id: 3,
            body: ResponseBody::Fail {
                fail_reason: FailReason::NonExistentService,
            },
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"msg_type\":\"fail\""));
        assert!(json.contains("\"fail_reason\":\"non-existent-service\""));
        let back: Response = serde_json::from_str(&json).unwrap();
        match back.body {
            ResponseBody::Fail { fail_reason } => assert_eq!(fail_reason, FailReason::NonExistentService),
            _ => panic!("expected fail"),
        }
    }
}
