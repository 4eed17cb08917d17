use std::sync::Arc;
use std::thread;

use rivet_core::{Container, DiError, Dependency, Injectable, Lifetime, Resolved};

struct A;
struct B;

impl Injectable for A {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::of::<B>()]
    }

    fn construct(_: &Resolved) -> Result<Self, DiError> {
        Ok(A)
    }
}

impl Injectable for B {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::of::<A>()]
    }

    fn construct(_: &Resolved) -> Result<Self, DiError> {
        Ok(B)
    }
}

#[test]
fn cycle_reports_the_full_chain() {
    let mut c = Container::new();
    c.register::<A>().register::<B>();

    match c.resolve::<A>() {
        Err(DiError::CircularDependency { chain }) => assert_eq!(chain, vec!["A", "B", "A"]),
        Err(other) => panic!("expected a cycle, got {other}"),
        Ok(_) => panic!("expected a cycle"),
    }
}

struct SelfRef;

impl Injectable for SelfRef {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::of::<SelfRef>()]
    }

    fn construct(_: &Resolved) -> Result<Self, DiError> {
        Ok(SelfRef)
    }
}

#[test]
fn direct_self_dependency_is_a_cycle() {
    let mut c = Container::new();
    c.register::<SelfRef>();
    let err = c.resolve::<SelfRef>().err().unwrap();
    assert_eq!(err.to_string(), "Circular dependency detected: SelfRef -> SelfRef");
}

#[test]
fn failed_resolution_leaves_no_stack_behind() {
    let mut c = Container::new();
    c.register::<A>().register::<B>();
    // Each call starts from an empty stack, so the second error is identical.
    let first = c.resolve::<B>().err().unwrap().to_string();
    let second = c.resolve::<B>().err().unwrap().to_string();
    assert_eq!(first, second);
    assert_eq!(first, "Circular dependency detected: B -> A -> B");
}

struct Clock {
    started: u64,
}

struct Ledger {
    clock: Arc<Clock>,
}

impl Injectable for Ledger {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::of::<Clock>()]
    }

    fn lifetime() -> Lifetime {
        Lifetime::Singleton
    }

    fn construct(deps: &Resolved) -> Result<Self, DiError> {
        Ok(Ledger { clock: deps.get()? })
    }
}

#[test]
fn concurrent_resolutions_share_one_singleton() {
    let mut c = Container::new();
    c.register_singleton(Clock { started: 7 }).register::<Ledger>();
    let c = Arc::new(c);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let c = c.clone();
            thread::spawn(move || c.resolve::<Ledger>().unwrap())
        })
        .collect();
    let ledgers: Vec<Arc<Ledger>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let cached = c.resolve::<Ledger>().unwrap();
    assert_eq!(cached.clock.started, 7);
    // Every resolution after the first insert returns the cached instance.
    assert!(ledgers.iter().any(|l| Arc::ptr_eq(l, &cached)));
}

#[test]
fn factories_can_resolve_their_own_dependencies() {
    let mut c = Container::new();
    c.register_singleton(Clock { started: 1 })
        .register_factory(|r| {
            let clock = r.resolve::<Clock>()?;
            Ok(format!("ledger@{}", clock.started))
        });
    assert_eq!(*c.resolve::<String>().unwrap(), "ledger@1");
}

#[test]
fn unregistered_types_are_reported_by_name() {
    let c = Container::new();
    assert!(matches!(
        c.resolve::<Clock>().err().unwrap(),
        DiError::NotRegistered { name: "Clock" }
    ));
}
