use std::sync::Arc;

use frames::Opcode;

use super::*;
use crate::subprotocol::{Subprotocol, SubprotocolError};

#[derive(Debug)]
struct Named(&'static str);

impl Subprotocol for Named {
    fn name(&self) -> &str {
        self.0
    }

    fn opcode(&self) -> Opcode {
        Opcode::Text
    }

    fn decode(&self, payload: &[u8]) -> Result<Vec<u8>, SubprotocolError> {
        Ok(payload.to_vec())
    }

    fn encode(&self, payload: &[u8]) -> Result<Vec<u8>, SubprotocolError> {
        Ok(payload.to_vec())
    }
}

fn supported(names: &[&'static str]) -> Vec<SubprotocolRef> {
    names
        .iter()
        .map(|n| Arc::new(Named(n)) as SubprotocolRef)
        .collect()
}

fn picked(offered: &[&str], supported: &[SubprotocolRef]) -> Option<String> {
    negotiate(offered, supported).map(|d| d.name().to_owned())
}

#[test]
fn server_priority_beats_offer_order() {
    let supported = supported(&["chat.v2", "chat.v1"]);
    assert_eq!(picked(&["chat.v1", "chat.v3"], &supported).as_deref(), Some("chat.v1"));
    assert_eq!(picked(&["chat.v1", "chat.v2"], &supported).as_deref(), Some("chat.v2"));
}

#[test]
fn empty_offer_negotiates_nothing() {
    let supported = supported(&["chat.v2", "chat.v1"]);
    assert_eq!(picked(&[], &supported), None);
}

#[test]
fn no_overlap_negotiates_nothing() {
    let supported = supported(&["chat.v2"]);
    assert_eq!(picked(&["mqtt", "stomp"], &supported), None);
}

#[test]
fn empty_supported_list_negotiates_nothing() {
    assert_eq!(picked(&["chat.v1"], &[]), None);
}

#[test]
fn offer_permutations_agree() {
    let supported = supported(&["c", "b", "a"]);
    let offers: [&[&str]; 6] = [
        &["a", "b", "x"],
        &["a", "x", "b"],
        &["b", "a", "x"],
        &["b", "x", "a"],
        &["x", "a", "b"],
        &["x", "b", "a"],
    ];
    for offer in offers {
        assert_eq!(picked(offer, &supported).as_deref(), Some("b"), "offer {offer:?}");
    }
}

#[test]
fn names_match_exactly() {
    let supported = supported(&["chat.v1"]);
    assert_eq!(picked(&["CHAT.V1", "chat.v1 "], &supported), None);
}

#[test]
fn parse_offered_splits_and_trims() {
    let offered = parse_offered(["chat.v1, chat.v2", " ", "chat.v3,,"]);
    assert_eq!(offered, vec!["chat.v1", "chat.v2", "chat.v3"]);
}

#[test]
fn parse_offered_handles_no_header() {
    assert!(parse_offered(std::iter::empty::<&str>()).is_empty());
}

#[test]
fn resolve_uses_negotiated_descriptor_and_advertises_it() {
    let supported = supported(&["chat.v2", "chat.v1"]);
    let default: SubprotocolRef = Arc::new(Named("plain"));
    let selection = resolve(&["chat.v1", "chat.v3"], &supported, &default);
    assert!(selection.negotiated);
    assert_eq!(selection.descriptor.name(), "chat.v1");
    assert_eq!(selection.header_value(), Some("chat.v1"));
}

#[test]
fn resolve_falls_back_to_default_without_advertising() {
    let supported = supported(&["chat.v2", "chat.v1"]);
    let default: SubprotocolRef = Arc::new(Named("plain"));
    let selection = resolve::<&str>(&[], &supported, &default);
    assert!(!selection.negotiated);
    assert_eq!(selection.descriptor.name(), "plain");
    assert_eq!(selection.header_value(), None);
}
