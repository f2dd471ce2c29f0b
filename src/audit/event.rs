//! Audit Events
//! Mission: Describe every completed protected query as one immutable record

use crate::auth::middleware::RequestContext;
use axum::http::HeaderMap;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Which lookup produced the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    /// Credits by service invoice (NFS-e) number
    #[serde(rename = "BY_KEY_A")]
    ByKeyA,
    /// Single credit by credit number
    #[serde(rename = "BY_KEY_B")]
    ByKeyB,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryStatus {
    Success,
    NotFound,
    Error,
}

/// Result of a lookup as seen by the audit trail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Success { count: usize },
    NotFound,
    Error { message: String },
}

/// The key a query was made with. Exactly one key per query, by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKey {
    Invoice(String),
    CreditNumber(String),
}

impl QueryKey {
    pub fn query_type(&self) -> QueryType {
        match self {
            QueryKey::Invoice(_) => QueryType::ByKeyA,
            QueryKey::CreditNumber(_) => QueryType::ByKeyB,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            QueryKey::Invoice(v) | QueryKey::CreditNumber(v) => v,
        }
    }
}

/// Audit record emitted to the message bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub query_type: QueryType,
    pub key_a: Option<String>,
    pub key_b: Option<String>,
    pub principal: Option<String>,
    pub source_ip: String,
    #[serde(with = "audit_timestamp")]
    pub timestamp: NaiveDateTime,
    pub result_count: usize,
    pub status: QueryStatus,
    pub error_message: Option<String>,
}

impl AuditEvent {
    /// Bus partition key: the field the query was keyed by
    pub fn partition_key(&self) -> &str {
        match self.query_type {
            QueryType::ByKeyA => self.key_a.as_deref().unwrap_or_default(),
            QueryType::ByKeyB => self.key_b.as_deref().unwrap_or_default(),
        }
    }
}

/// Build the audit record for a completed query. Never fails.
pub fn compose(context: &RequestContext, key: &QueryKey, outcome: &QueryOutcome) -> AuditEvent {
    compose_at(context, key, outcome, Utc::now().naive_utc())
}

pub fn compose_at(
    context: &RequestContext,
    key: &QueryKey,
    outcome: &QueryOutcome,
    timestamp: NaiveDateTime,
) -> AuditEvent {
    let (key_a, key_b) = match key {
        QueryKey::Invoice(v) => (Some(v.clone()), None),
        QueryKey::CreditNumber(v) => (None, Some(v.clone())),
    };

    let (status, result_count, error_message) = match outcome {
        QueryOutcome::Success { count } if *count > 0 => (QueryStatus::Success, *count, None),
        QueryOutcome::Success { .. } | QueryOutcome::NotFound => (QueryStatus::NotFound, 0, None),
        QueryOutcome::Error { message } => (QueryStatus::Error, 0, Some(message.clone())),
    };

    AuditEvent {
        query_type: key.query_type(),
        key_a,
        key_b,
        principal: context.principal.as_ref().map(|p| p.login.clone()),
        source_ip: context.source_ip.clone(),
        timestamp,
        result_count,
        status,
        error_message,
    }
}

/// First `X-Forwarded-For` entry if present, else the transport peer address.
pub fn resolve_source_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

mod audit_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{middleware::Resolution, models::Principal};
    use chrono::NaiveDate;

    fn context(principal: Option<&str>) -> RequestContext {
        RequestContext {
            principal: principal.map(Principal::new),
            resolution: if principal.is_some() {
                Resolution::PrincipalResolved
            } else {
                Resolution::Anonymous
            },
            source_ip: "10.0.0.7".to_string(),
            path: "/credits/credit/CRED123".to_string(),
        }
    }

    fn fixed_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(9, 26, 53)
            .unwrap()
    }

    #[test]
    fn test_compose_success_by_credit_number() {
        let event = compose_at(
            &context(Some("alice")),
            &QueryKey::CreditNumber("CRED123".to_string()),
            &QueryOutcome::Success { count: 1 },
            fixed_time(),
        );

        assert_eq!(event.query_type, QueryType::ByKeyB);
        assert_eq!(event.key_a, None);
        assert_eq!(event.key_b.as_deref(), Some("CRED123"));
        assert_eq!(event.principal.as_deref(), Some("alice"));
        assert_eq!(event.status, QueryStatus::Success);
        assert_eq!(event.result_count, 1);
        assert_eq!(event.error_message, None);
        assert_eq!(event.partition_key(), "CRED123");
    }

    #[test]
    fn test_compose_not_found_and_error() {
        let key = QueryKey::Invoice("NOPE".to_string());

        let not_found = compose(&context(None), &key, &QueryOutcome::NotFound);
        assert_eq!(not_found.status, QueryStatus::NotFound);
        assert_eq!(not_found.result_count, 0);
        assert_eq!(not_found.principal, None);
        assert_eq!(not_found.key_a.as_deref(), Some("NOPE"));
        assert_eq!(not_found.key_b, None);

        let error = compose(
            &context(Some("bob")),
            &key,
            &QueryOutcome::Error {
                message: "internal error".to_string(),
            },
        );
        assert_eq!(error.status, QueryStatus::Error);
        assert_eq!(error.result_count, 0);
        assert_eq!(error.error_message.as_deref(), Some("internal error"));
    }

    #[test]
    fn test_compose_empty_success_is_not_found() {
        let event = compose(
            &context(Some("alice")),
            &QueryKey::Invoice("123".to_string()),
            &QueryOutcome::Success { count: 0 },
        );
        assert_eq!(event.status, QueryStatus::NotFound);
        assert_eq!(event.result_count, 0);
    }

    #[test]
    fn test_audit_event_wire_schema() {
        let event = compose_at(
            &context(Some("alice")),
            &QueryKey::Invoice("123456789".to_string()),
            &QueryOutcome::Success { count: 2 },
            fixed_time(),
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["queryType"], "BY_KEY_A");
        assert_eq!(json["keyA"], "123456789");
        assert!(json["keyB"].is_null());
        assert_eq!(json["principal"], "alice");
        assert_eq!(json["sourceIp"], "10.0.0.7");
        assert_eq!(json["timestamp"], "2025-03-14 09:26:53");
        assert_eq!(json["resultCount"], 2);
        assert_eq!(json["status"], "SUCCESS");
        assert!(json["errorMessage"].is_null());

        let back: AuditEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_resolve_source_ip() {
        let peer: SocketAddr = "192.168.1.20:51234".parse().unwrap();
        let mut headers = HeaderMap::new();

        assert_eq!(resolve_source_ip(&headers, Some(peer)), "192.168.1.20");
        assert_eq!(resolve_source_ip(&headers, None), "unknown");

        headers.insert("x-forwarded-for", "203.0.113.5, 10.0.0.1".parse().unwrap());
        assert_eq!(resolve_source_ip(&headers, Some(peer)), "203.0.113.5");

        headers.insert("x-forwarded-for", "".parse().unwrap());
        assert_eq!(resolve_source_ip(&headers, Some(peer)), "192.168.1.20");
    }
}
