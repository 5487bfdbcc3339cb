use std::collections::HashMap;

use super::*;
use crate::Action;
use crate::ChangeEvent;

fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn event(key: &str, l: &[(&str, &str)]) -> ChangeEvent {
    ChangeEvent {
        key: key.to_string(),
        action: Action::Put,
        labels: labels(l),
        domain_id: "2".to_string(),
        project: "1".to_string(),
    }
}

#[test]
fn encode_should_canonicalize_labels() {
    let topic = Topic {
        labels: labels(&[("c", "d"), ("a", "b")]),
        ..Default::default()
    };
    assert_eq!(topic.encode().unwrap(), r#"{"labels":"a=b::c=d"}"#);
}

#[test]
fn encode_should_emit_none_for_empty_labels() {
    let topic = Topic::default();
    assert_eq!(topic.encode().unwrap(), r#"{"labels":"none"}"#);
}

#[test]
fn identical_topics_should_share_one_wire_string() {
    let a = Topic {
        labels: labels(&[("a", "b"), ("c", "d")]),
        domain_id: "2".to_string(),
        project: "1".to_string(),
        ..Default::default()
    };
    let b = Topic {
        labels: labels(&[("c", "d"), ("a", "b")]),
        domain_id: "2".to_string(),
        project: "1".to_string(),
        ..Default::default()
    };
    assert_eq!(a.encode().unwrap(), b.encode().unwrap());
}

#[test]
fn parse_should_explode_label_format() {
    let topic = Topic::parse(r#"{"labels":"a=b::c=d","domainID":"2","project":"1"}"#).unwrap();

    assert_eq!(topic.labels, labels(&[("a", "b"), ("c", "d")]));
    assert_eq!(topic.domain_id, "2");
    assert_eq!(topic.project, "1");
}

#[test]
fn parse_should_reject_invalid_label_pair() {
    assert!(Topic::parse(r#"{"labels":"broken"}"#).is_err());
}

#[test]
fn parse_should_reject_malformed_json() {
    assert!(Topic::parse("not json at all").is_err());
}

#[test]
fn encode_parse_should_round_trip() {
    let topic = Topic {
        key: "some_key".to_string(),
        labels: labels(&[("a", "b")]),
        domain_id: "2".to_string(),
        project: "1".to_string(),
        ..Default::default()
    };
    let parsed = Topic::parse(&topic.encode().unwrap()).unwrap();
    assert_eq!(parsed.key, "some_key");
    assert_eq!(parsed.labels, topic.labels);
}

// Matching semantics. The key constraint can only ever vote "yes": a topic
// carrying both a key and labels still matches an event with a different
// key as long as every label constraint holds.

#[test]
fn label_match_should_override_key_mismatch() {
    let topic = Topic {
        key: "k1".to_string(),
        labels: labels(&[("a", "b")]),
        ..Default::default()
    };
    assert!(topic.matches(&event("other_key", &[("a", "b")])));
}

#[test]
fn label_mismatch_should_veto_even_with_equal_key() {
    let topic = Topic {
        key: "k1".to_string(),
        labels: labels(&[("a", "b")]),
        ..Default::default()
    };
    assert!(!topic.matches(&event("k1", &[("a", "x")])));
    assert!(!topic.matches(&event("k1", &[])));
}

#[test]
fn key_only_topic_should_match_on_key_equality() {
    let topic = Topic {
        key: "k1".to_string(),
        ..Default::default()
    };
    assert!(topic.matches(&event("k1", &[("whatever", "v")])));
    assert!(!topic.matches(&event("k2", &[])));
}

#[test]
fn empty_topic_should_match_everything() {
    let topic = Topic::default();
    assert!(topic.matches(&event("any", &[("a", "b")])));
    assert!(topic.matches(&event("any", &[])));
}

#[test]
fn default_match_should_accept_label_supersets() {
    let topic = Topic {
        labels: labels(&[("a", "1")]),
        ..Default::default()
    };
    assert!(topic.matches(&event("k", &[("a", "1"), ("b", "2")])));
}

#[test]
fn exact_match_should_require_label_set_equality() {
    let topic = Topic {
        labels: labels(&[("a", "1")]),
        match_type: "exact".to_string(),
        ..Default::default()
    };
    assert!(topic.matches(&event("k", &[("a", "1")])));
    assert!(!topic.matches(&event("k", &[("a", "1"), ("b", "2")])));
    assert!(!topic.matches(&event("k", &[])));
}

#[test]
fn event_canonical_string_should_dedup_identical_events() {
    let a = event("k", &[("b", "2"), ("a", "1")]);
    let b = event("k", &[("a", "1"), ("b", "2")]);
    assert_eq!(a.to_string(), b.to_string());
    assert_eq!(a.to_string(), "k;;put;;a=1::b=2;;2;;1");
}

#[test]
fn event_should_decode_wire_json() {
    let payload = br#"{"Key":"some_key","Action":"put","Labels":{"app":"mall"},"DomainID":"default","Project":"p1"}"#;
    let event = ChangeEvent::decode(payload).unwrap();

    assert_eq!(event.key, "some_key");
    assert_eq!(event.action, Action::Put);
    assert_eq!(event.labels.get("app").unwrap(), "mall");

    let del = ChangeEvent::decode(br#"{"Key":"k","Action":"del"}"#).unwrap();
    assert_eq!(del.action, Action::Delete);
    // long-form spelling is tolerated
    let del2 = ChangeEvent::decode(br#"{"Key":"k","Action":"delete"}"#).unwrap();
    assert_eq!(del2.action, Action::Delete);
}

#[test]
fn event_decode_should_fail_on_malformed_payload() {
    assert!(ChangeEvent::decode(b"{oops").is_err());
}
