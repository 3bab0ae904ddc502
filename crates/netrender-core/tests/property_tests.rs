//! # Property-Based Tests
//!
//! Overlay laws and ordering determinism, checked with proptest.

use netrender_core::{
    DefType, Fields, Nameservers, Overlay, Parser, State, definition_to_yaml, state_to_yaml,
};
use proptest::collection::vec;
use proptest::option;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::path::Path;

// =============================================================================
// STRATEGIES
// =============================================================================

fn address() -> impl Strategy<Value = String> {
    (1u8..=254, 1u8..=254, 8u8..=30)
        .prop_map(|(a, b, prefix)| format!("10.{}.{}.1/{}", a, b, prefix))
}

fn fields() -> impl Strategy<Value = Fields> {
    (
        option::of(any::<bool>()),
        option::of(any::<bool>()),
        option::of(576u32..9000),
        option::of(vec(address(), 0..4)),
        option::of("10\\.0\\.[0-9]{1,2}\\.1"),
        option::of(vec("[a-z]{1,8}", 0..3)),
    )
        .prop_map(|(dhcp4, dhcp6, mtu, addresses, gateway4, search)| Fields {
            dhcp4,
            dhcp6,
            mtu,
            addresses,
            gateway4,
            nameservers: search.map(|search| Nameservers {
                addresses: None,
                search: Some(search),
            }),
            ..Fields::default()
        })
}

fn ids() -> impl Strategy<Value = Vec<String>> {
    vec("[a-z]{1,5}[0-9]{1,2}", 1..12)
}

/// Build a document declaring every ID in `ids` as an ethernet.
fn document(ids: &[String]) -> String {
    let mut text = String::from("network:\n  ethernets:\n");
    let mut seen = BTreeSet::new();
    for id in ids {
        if seen.insert(id) {
            text.push_str(&format!("    {}:\n      dhcp4: true\n", id));
        }
    }
    text
}

fn import(text: &str) -> State {
    let mut parser = Parser::new();
    parser
        .load_yaml_str(text, Path::new("/etc/netplan/prop.yaml"))
        .expect("load");
    let mut state = State::new();
    state.import_from(&mut parser).expect("import");
    state
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Overlaying nothing changes nothing.
    #[test]
    fn overlay_with_empty_is_identity(base in fields()) {
        let mut merged = base.clone();
        merged.overlay(Fields::default());
        prop_assert_eq!(merged, base);
    }

    /// Overlaying a value onto itself changes nothing.
    #[test]
    fn overlay_is_idempotent(base in fields()) {
        let mut merged = base.clone();
        merged.overlay(base.clone());
        prop_assert_eq!(merged, base);
    }

    /// Every field the later value sets wins; every other field survives.
    #[test]
    fn later_set_fields_win(base in fields(), later in fields()) {
        let mut merged = base.clone();
        merged.overlay(later.clone());

        prop_assert_eq!(merged.mtu, later.mtu.or(base.mtu));
        prop_assert_eq!(merged.dhcp4, later.dhcp4.or(base.dhcp4));
        prop_assert_eq!(merged.dhcp6, later.dhcp6.or(base.dhcp6));
        prop_assert_eq!(merged.addresses, later.addresses.or(base.addresses));
        prop_assert_eq!(merged.gateway4, later.gateway4.or(base.gateway4));
    }

    /// Overlay is associative for scalar and list fields.
    #[test]
    fn overlay_is_associative(a in fields(), b in fields(), c in fields()) {
        let mut left = a.clone();
        left.overlay(b.clone());
        left.overlay(c.clone());

        let mut bc = b;
        bc.overlay(c);
        let mut right = a;
        right.overlay(bc);

        prop_assert_eq!(left, right);
    }

    /// Definitions keep first-seen order, and output is identical run to run.
    #[test]
    fn ordering_is_deterministic(ids in ids()) {
        let text = document(&ids);
        let first = import(&text);
        let second = import(&text);

        let mut expected: Vec<&str> = Vec::new();
        for id in &ids {
            if !expected.contains(&id.as_str()) {
                expected.push(id);
            }
        }
        prop_assert_eq!(first.ids_for_type(DefType::Ethernet), expected);
        prop_assert_eq!(
            state_to_yaml(&first).expect("yaml"),
            state_to_yaml(&second).expect("yaml")
        );
    }

    /// A single definition survives export and re-import unchanged.
    #[test]
    fn definition_round_trip(generated in fields()) {
        let mut text = String::from("network:\n  ethernets:\n    eth0: {}\n");
        let state = import(&text);
        let mut def = state.get_definition("eth0").expect("eth0").clone();
        def.fields = generated;

        text = definition_to_yaml(&def).expect("yaml");
        let reparsed = import(&text);
        prop_assert_eq!(&reparsed.get_definition("eth0").expect("eth0").fields, &def.fields);
    }
}
