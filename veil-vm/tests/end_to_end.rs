//! End-to-end object lifecycles against the local proofless backend.

mod common;

use veil_types::Scalar;
use veil_vm::prelude::*;

struct Env {
    ledger: Ledger,
    runtime: Runtime<LocalBackend>,
}

fn env(seed: u64) -> Env {
    let registry = common::example_registry();
    let mut ledger = Ledger::new(LedgerParameters {
        register_limit: 16,
        ..LedgerParameters::default()
    });
    ledger.register_classes(registry.compile_all().unwrap()).unwrap();
    let runtime = Runtime::new(LocalBackend::seeded(seed), &ledger).unwrap();
    Env { ledger, runtime }
}

fn scalar_field(env: &Env, object: &ObjectHandle, name: &str) -> Scalar {
    object
        .field(&env.runtime, &env.ledger, name)
        .unwrap()
        .as_scalar()
        .unwrap()
}

#[test]
fn example_1_lifecycle() {
    let mut env = env(1);
    let user = env.runtime.new_user_account().unwrap();
    let user_address = Scalar::from(user.address);

    let ex1 = ClassHandle::new(common::EXAMPLE_1)
        .construct(&mut env.runtime, &mut env.ledger, "create", &user, &[])
        .unwrap();
    assert_eq!(scalar_field(&env, &ex1, "uint"), Scalar::from(1u64));
    assert_eq!(scalar_field(&env, &ex1, "addr"), user_address);
    assert_eq!(scalar_field(&env, &ex1, "owner"), user_address);

    ex1.call(&mut env.runtime, &mut env.ledger, "equality", &user, &[])
        .unwrap();
    ex1.call(
        &mut env.runtime,
        &mut env.ledger,
        "inequality",
        &user,
        &[CallArg::Uint(0)],
    )
    .unwrap();

    let returned = ex1
        .call(&mut env.runtime, &mut env.ledger, "expression", &user, &[])
        .unwrap()
        .as_scalar()
        .unwrap();
    assert_eq!(returned, Scalar::from(3u64));
    assert_eq!(scalar_field(&env, &ex1, "uint"), Scalar::from(2u64));
}

#[test]
fn failed_requirements_reach_the_caller_and_leave_the_ledger_unchanged() {
    let mut env = env(2);
    let user = env.runtime.new_user_account().unwrap();

    let ex1 = ClassHandle::new(common::EXAMPLE_1)
        .construct(&mut env.runtime, &mut env.ledger, "create", &user, &[])
        .unwrap();

    let accepted = env.ledger.accepted_transactions().len();
    let root = env.ledger.current_root();

    // uint is 1, so `uint > 5` fails inside the processor
    let err = ex1
        .call(
            &mut env.runtime,
            &mut env.ledger,
            "inequality",
            &user,
            &[CallArg::Uint(5)],
        )
        .unwrap_err();
    assert!(matches!(err, VmError::BackendExecute(_)));
    assert_eq!(env.ledger.accepted_transactions().len(), accepted);
    assert_eq!(env.ledger.current_root(), root);
    assert_eq!(scalar_field(&env, &ex1, "uint"), Scalar::from(1u64));
}

#[test]
fn example_2_counts_through_an_internal_call() {
    let mut env = env(3);
    let user = env.runtime.new_user_account().unwrap();
    let user_address = Scalar::from(user.address);

    let ex2 = ClassHandle::new(common::EXAMPLE_2)
        .construct(
            &mut env.runtime,
            &mut env.ledger,
            "create",
            &user,
            &[CallArg::Uint(300)],
        )
        .unwrap();
    assert_eq!(scalar_field(&env, &ex2, "count"), Scalar::from(300u64));
    assert_eq!(scalar_field(&env, &ex2, "addr"), user_address);

    ex2.call(&mut env.runtime, &mut env.ledger, "increment", &user, &[])
        .unwrap();
    assert_eq!(scalar_field(&env, &ex2, "count"), Scalar::from(303u64));
    assert_eq!(scalar_field(&env, &ex2, "owner"), user_address);
}

#[test]
fn example_3_swaps_object_references() {
    let mut env = env(4);
    let user = env.runtime.new_user_account().unwrap();

    let ex3 = ClassHandle::new(common::EXAMPLE_3)
        .construct(&mut env.runtime, &mut env.ledger, "create", &user, &[])
        .unwrap();
    assert_eq!(scalar_field(&env, &ex3, "x"), Scalar::from(1u64));

    let old = ex3
        .field(&env.runtime, &env.ledger, "other")
        .unwrap()
        .into_object()
        .unwrap();
    assert_eq!(scalar_field(&env, &old, "count"), Scalar::from(5u64));

    let new = ClassHandle::new(common::EXAMPLE_2)
        .construct(
            &mut env.runtime,
            &mut env.ledger,
            "create",
            &user,
            &[CallArg::Uint(300)],
        )
        .unwrap();

    ex3.call(
        &mut env.runtime,
        &mut env.ledger,
        "swap",
        &user,
        &[CallArg::Object(new.clone())],
    )
    .unwrap();

    assert_eq!(scalar_field(&env, &old, "count"), Scalar::from(8u64));
    assert_eq!(scalar_field(&env, &ex3, "x"), Scalar::from(3u64));
    let other = ex3
        .field(&env.runtime, &env.ledger, "other")
        .unwrap()
        .into_object()
        .unwrap();
    assert_eq!(other.object_id(), new.object_id());
}

#[test]
fn example_3_returns_objects_from_calls() {
    let mut env = env(5);
    let user = env.runtime.new_user_account().unwrap();

    let ex3 = ClassHandle::new(common::EXAMPLE_3)
        .construct(&mut env.runtime, &mut env.ledger, "create", &user, &[])
        .unwrap();

    let other = ex3
        .call(
            &mut env.runtime,
            &mut env.ledger,
            "foo",
            &user,
            &[CallArg::Uint(3)],
        )
        .unwrap()
        .into_object()
        .unwrap();
    assert_eq!(scalar_field(&env, &ex3, "x"), Scalar::from(3u64));
    assert_eq!(scalar_field(&env, &other, "count"), Scalar::from(5u64));

    ex3.call(&mut env.runtime, &mut env.ledger, "bar", &user, &[])
        .unwrap();
    assert_eq!(scalar_field(&env, &ex3, "x"), Scalar::from(6u64));
    assert_eq!(scalar_field(&env, &other, "count"), Scalar::from(8u64));
}

#[test]
fn example_4_reads_the_clock_and_draws_fresh_values() {
    let mut env = env(6);
    let user = env.runtime.new_user_account().unwrap();

    let ex4 = ClassHandle::new(common::EXAMPLE_4)
        .construct(&mut env.runtime, &mut env.ledger, "create", &user, &[])
        .unwrap();
    assert_eq!(
        scalar_field(&env, &ex4, "t"),
        Scalar::from(env.ledger.current_time())
    );
    assert_eq!(scalar_field(&env, &ex4, "a"), common::example_address());
    let old_w = scalar_field(&env, &ex4, "w");

    ex4.call(
        &mut env.runtime,
        &mut env.ledger,
        "work",
        &user,
        &[CallArg::Uint(3)],
    )
    .unwrap();
    assert_eq!(scalar_field(&env, &ex4, "x"), Scalar::from(5u64));
    assert_ne!(scalar_field(&env, &ex4, "w"), old_w);

    ex4.call(
        &mut env.runtime,
        &mut env.ledger,
        "work",
        &user,
        &[CallArg::Uint(4)],
    )
    .unwrap();
    assert_eq!(scalar_field(&env, &ex4, "x"), Scalar::from(20u64));
}

#[test]
fn coin_lifecycle_mint_split_merge_transfer() {
    let mut env = env(7);
    let user = env.runtime.new_user_account().unwrap();
    let user_address = Scalar::from(user.address);

    let coin = ClassHandle::new(common::COIN)
        .construct(
            &mut env.runtime,
            &mut env.ledger,
            "mint",
            &user,
            &[CallArg::Uint(1000)],
        )
        .unwrap();
    assert_eq!(scalar_field(&env, &coin, "val"), Scalar::from(1000u64));
    assert_eq!(scalar_field(&env, &coin, "owner"), user_address);
    let asset = scalar_field(&env, &coin, "asset_id");

    let coin_2 = coin
        .call(
            &mut env.runtime,
            &mut env.ledger,
            "split",
            &user,
            &[CallArg::Uint(400)],
        )
        .unwrap()
        .into_object()
        .unwrap();
    assert_eq!(scalar_field(&env, &coin, "val"), Scalar::from(600u64));
    assert_eq!(scalar_field(&env, &coin_2, "val"), Scalar::from(400u64));
    assert_eq!(scalar_field(&env, &coin_2, "owner"), user_address);
    assert_eq!(scalar_field(&env, &coin_2, "asset_id"), asset);

    coin.call(
        &mut env.runtime,
        &mut env.ledger,
        "merge",
        &user,
        &[CallArg::Object(coin_2.clone())],
    )
    .unwrap();
    assert_eq!(scalar_field(&env, &coin_2, "val"), Scalar::from(1000u64));
    // the merged-away coin is spent
    assert!(coin.field(&env.runtime, &env.ledger, "val").is_err());

    let user_2 = env.runtime.new_user_account().unwrap();
    coin_2
        .call(
            &mut env.runtime,
            &mut env.ledger,
            "transfer",
            &user,
            &[CallArg::Address(user_2.address)],
        )
        .unwrap();
    assert_eq!(
        scalar_field(&env, &coin_2, "owner"),
        Scalar::from(user_2.address)
    );
}

#[test]
fn fresh_asset_ids_differ_across_transactions() {
    let mut env = env(8);
    let user = env.runtime.new_user_account().unwrap();
    let handle = ClassHandle::new(common::COIN);

    let first = handle
        .construct(
            &mut env.runtime,
            &mut env.ledger,
            "mint",
            &user,
            &[CallArg::Uint(5)],
        )
        .unwrap();
    let second = handle
        .construct(
            &mut env.runtime,
            &mut env.ledger,
            "mint",
            &user,
            &[CallArg::Uint(5)],
        )
        .unwrap();
    assert_ne!(
        scalar_field(&env, &first, "asset_id"),
        scalar_field(&env, &second, "asset_id")
    );
}

#[test]
fn a_second_runtime_catches_up_by_replaying_the_ledger() {
    let mut env = env(9);
    let user = env.runtime.new_user_account().unwrap();

    let coin = ClassHandle::new(common::COIN)
        .construct(
            &mut env.runtime,
            &mut env.ledger,
            "mint",
            &user,
            &[CallArg::Uint(1000)],
        )
        .unwrap();
    coin.call(
        &mut env.runtime,
        &mut env.ledger,
        "split",
        &user,
        &[CallArg::Uint(400)],
    )
    .unwrap();

    // a fresh backend replays the accepted history on construction
    let late_runtime = Runtime::new(LocalBackend::seeded(10), &env.ledger).unwrap();
    let late_env = Env {
        ledger: env.ledger,
        runtime: late_runtime,
    };
    assert_eq!(scalar_field(&late_env, &coin, "val"), Scalar::from(600u64));

    // replaying the same history again is a no-op
    let mut caught_up = late_env.runtime;
    caught_up.sync(&late_env.ledger).unwrap();
    assert_eq!(
        caught_up
            .field_values(&late_env.ledger, &coin.object_id())
            .unwrap()["val"],
        Scalar::from(600u64)
    );
}
