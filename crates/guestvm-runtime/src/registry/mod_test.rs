// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 The guestvm Authors

use guestvm_abi::types::{ParameterType, ReturnType};

use super::{FunctionDefinition, FunctionRegistry};

fn def(name: &str) -> FunctionDefinition {
    FunctionDefinition::new(name.into(), vec![ParameterType::Int32], ReturnType::Int32, 0)
}

#[test]
fn registered_functions_are_found_after_finalize() {
    let mut registry: FunctionRegistry<()> = FunctionRegistry::new();
    registry.register(def("Zeta"), ()).unwrap();
    registry.register(def("Alpha"), ()).unwrap();
    registry.register(def("Mu"), ()).unwrap();
    registry.finalize().unwrap();

    assert!(registry.lookup("Alpha").is_some());
    assert!(registry.lookup("Mu").is_some());
    assert!(registry.lookup("Zeta").is_some());
    assert!(registry.lookup("Missing").is_none());
}

#[test]
fn lookup_is_case_sensitive() {
    let mut registry: FunctionRegistry<()> = FunctionRegistry::new();
    registry.register(def("Echo"), ()).unwrap();
    registry.finalize().unwrap();

    assert!(registry.lookup("Echo").is_some());
    assert!(registry.lookup("echo").is_none());
}

#[test]
fn duplicate_registration_fails_at_finalize() {
    let mut registry: FunctionRegistry<()> = FunctionRegistry::new();
    registry.register(def("Dup"), ()).unwrap();
    registry.register(def("Dup"), ()).unwrap();
    assert!(registry.finalize().is_err());
}

#[test]
fn register_after_finalize_fails() {
    let mut registry: FunctionRegistry<()> = FunctionRegistry::new();
    registry.finalize().unwrap();
    assert!(registry.register(def("TooLate"), ()).is_err());
}

#[test]
fn registration_order_is_arbitrary() {
    let mut registry: FunctionRegistry<()> = FunctionRegistry::new();
    for name in ["C", "A", "B"] {
        registry.register(def(name), ()).unwrap();
    }
    registry.finalize().unwrap();
    assert_eq!(registry.len(), 3);
}

#[test]
fn handler_travels_with_its_definition() {
    let mut registry: FunctionRegistry<i32> = FunctionRegistry::new();
    registry.register(def("A"), 1).unwrap();
    registry.register(def("B"), 2).unwrap();
    registry.finalize().unwrap();

    let (_, handler) = registry.lookup("B").unwrap();
    assert_eq!(*handler, 2);
}
