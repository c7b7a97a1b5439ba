//! Example contracts shared by the integration tests.

#![allow(dead_code)]

use veil_types::Scalar;
use veil_vm::prelude::*;
use veil_vm::veil_asm::AsmType;

pub const COIN: &str = "examples.Coin";
pub const DEX_OFFER: &str = "examples.DexOffer";
pub const EXAMPLE_1: &str = "examples.ContractExample1";
pub const EXAMPLE_2: &str = "examples.ContractExample2";
pub const EXAMPLE_3: &str = "examples.ContractExample3";
pub const EXAMPLE_4: &str = "examples.ContractExample4";
pub const INNER: &str = "examples.InnerExample";

/// Address literal used by `ContractExample4`.
pub fn example_address() -> Scalar {
    Scalar::new([0x2d; 32])
}

pub fn coin() -> ContractDecl {
    ContractDecl::new(COIN)
        .field("val", AsmType::Uint)
        .field("asset_id", AsmType::Long)
        .function(
            FunctionDecl::new("create", |em, args| {
                let (this, val, owner, asset_id) = (&args[0], &args[1], &args[2], &args[3]);
                em.write_field(this, "val", val)?;
                em.write_field(this, "owner", owner)?;
                em.write_field(this, "asset_id", asset_id)?;
                Ok(None)
            })
            .param("val", AsmType::Uint)
            .param("owner", AsmType::Address)
            .param("asset_id", AsmType::Long)
            .constructor()
            .private(),
        )
        .function(
            FunctionDecl::new("mint", |em, args| {
                let (this, v) = (&args[0], &args[1]);
                em.write_field(this, "val", v)?;
                let me = em.me();
                em.write_field(this, "owner", &me)?;
                let asset = em.fresh();
                em.write_field(this, "asset_id", &asset)?;
                Ok(None)
            })
            .param("v", AsmType::Uint)
            .constructor(),
        )
        .function(
            FunctionDecl::new("split", |em, args| {
                let (this, v) = (&args[0], &args[1]);
                let owner = em.read_field(this, "owner")?;
                let me = em.me();
                let owned = em.eq(&owner, &me);
                em.require(&owned);
                let val = em.read_field(this, "val")?;
                let enough = em.ge(&val, v);
                em.require(&enough);
                let val = em.read_field(this, "val")?;
                let rest = em.sub(&val, v);
                em.write_field(this, "val", &rest)?;
                let asset = em.read_field(this, "asset_id")?;
                let split = em.new_object(COIN, "create", &[v.clone(), me, asset])?;
                Ok(Some(split))
            })
            .param("v", AsmType::Uint)
            .returns(AsmType::contract(COIN)),
        )
        .function(
            FunctionDecl::new("merge", |em, args| {
                let (this, other) = (&args[0], &args[1]);
                let owner = em.read_field(this, "owner")?;
                let me = em.me();
                let owned = em.eq(&owner, &me);
                em.require(&owned);
                let other_owner = em.read_field(other, "owner")?;
                let other_owned = em.eq(&other_owner, &me);
                em.require(&other_owned);
                let distinct = em.ne(this, other);
                em.require(&distinct);
                let other_val = em.read_field(other, "val")?;
                let val = em.read_field(this, "val")?;
                let sum = em.add(&other_val, &val);
                em.write_field(other, "val", &sum)?;
                em.kill(this);
                Ok(None)
            })
            .param("other", AsmType::contract(COIN)),
        )
        .function(
            FunctionDecl::new("transfer", |em, args| {
                let (this, recipient) = (&args[0], &args[1]);
                let owner = em.read_field(this, "owner")?;
                let me = em.me();
                let owned = em.eq(&owner, &me);
                em.require(&owned);
                em.write_field(this, "owner", recipient)?;
                Ok(None)
            })
            .param("recipient", AsmType::Address),
        )
}

pub fn dex_offer() -> ContractDecl {
    ContractDecl::new(DEX_OFFER)
        .with_address()
        .field("creator", AsmType::Address)
        .field("for_amount", AsmType::Uint)
        .field("for_asset", AsmType::Long)
        .field("coin", AsmType::contract(COIN))
        .function(
            FunctionDecl::new("create", |em, args| {
                let (this, shared, coin, for_amount, for_asset) =
                    (&args[0], &args[1], &args[2], &args[3], &args[4]);
                em.write_field(this, "owner", shared)?;
                let me = em.me();
                em.write_field(this, "creator", &me)?;
                em.write_field(this, "for_amount", for_amount)?;
                em.write_field(this, "for_asset", for_asset)?;
                em.write_field(this, "coin", coin)?;
                let address = em.address_of(this);
                em.call(coin, "transfer", &[address], false)?;
                Ok(None)
            })
            .param("shared", AsmType::Address)
            .param("coin", AsmType::contract(COIN))
            .param("for_amount", AsmType::Uint)
            .param("for_asset", AsmType::Long)
            .constructor(),
        )
        .function(FunctionDecl::new("abort", |em, args| {
            let this = &args[0];
            let creator = em.read_field(this, "creator")?;
            let me = em.me();
            let ours = em.eq(&creator, &me);
            em.require(&ours);
            let coin = em.read_field(this, "coin")?;
            em.call(&coin, "transfer", &[me], true)?;
            em.kill(this);
            Ok(None)
        }))
        .function(
            FunctionDecl::new("accept", |em, args| {
                let (this, other) = (&args[0], &args[1]);
                let other_val = em.read_field(other, "val")?;
                let for_amount = em.read_field(this, "for_amount")?;
                let amount_ok = em.eq(&other_val, &for_amount);
                em.require(&amount_ok);
                let other_asset = em.read_field(other, "asset_id")?;
                let for_asset = em.read_field(this, "for_asset")?;
                let asset_ok = em.eq(&other_asset, &for_asset);
                em.require(&asset_ok);
                let coin = em.read_field(this, "coin")?;
                let me = em.me();
                em.call(&coin, "transfer", &[me], true)?;
                let creator = em.read_field(this, "creator")?;
                em.call(other, "transfer", &[creator], false)?;
                em.kill(this);
                Ok(None)
            })
            .param("other", AsmType::contract(COIN)),
        )
}

pub fn contract_example_1() -> ContractDecl {
    ContractDecl::new(EXAMPLE_1)
        .field("uint", AsmType::Uint)
        .field("addr", AsmType::Address)
        .function(
            FunctionDecl::new("create", |em, args| {
                let this = &args[0];
                let one = em.uint(1)?;
                em.write_field(this, "uint", &one)?;
                let me = em.me();
                em.write_field(this, "addr", &me)?;
                em.write_field(this, "owner", &me)?;
                Ok(None)
            })
            .constructor(),
        )
        .function(FunctionDecl::new("equality", |em, args| {
            let this = &args[0];
            let owner = em.read_field(this, "owner")?;
            let me = em.me();
            em.require_equals(&owner, &me);
            Ok(None)
        }))
        .function(
            FunctionDecl::new("inequality", |em, args| {
                let (this, z) = (&args[0], &args[1]);
                let uint = em.read_field(this, "uint")?;
                let greater = em.gt(&uint, z);
                em.require(&greater);
                Ok(None)
            })
            .param("z", AsmType::Uint),
        )
        .function(
            FunctionDecl::new("expression", |em, args| {
                let this = &args[0];
                let lhs = em.read_field(this, "uint")?;
                let rhs = em.read_field(this, "uint")?;
                let diff = em.sub(&lhs, &rhs);
                let one = em.uint(1)?;
                let sum = em.add(&diff, &one);
                let two = em.uint(2)?;
                let product = em.mul(&sum, &two);
                em.write_field(this, "uint", &product)?;
                Ok(Some(em.uint(3)?))
            })
            .returns(AsmType::Uint),
        )
}

pub fn contract_example_2() -> ContractDecl {
    ContractDecl::new(EXAMPLE_2)
        .field("addr", AsmType::Address)
        .field("count", AsmType::Uint)
        .function(
            FunctionDecl::new("create", |em, args| {
                let (this, initial_count) = (&args[0], &args[1]);
                let me = em.me();
                em.write_field(this, "addr", &me)?;
                em.write_field(this, "count", initial_count)?;
                em.write_field(this, "owner", &me)?;
                Ok(None)
            })
            .param("initial_count", AsmType::Uint)
            .constructor(),
        )
        .function(FunctionDecl::new("increment", |em, args| {
            let this = &args[0];
            let owner = em.read_field(this, "owner")?;
            let me = em.me();
            em.require_equals(&owner, &me);
            let count = em.read_field(this, "count")?;
            let bump = em.call(this, "helper", &[], false)?;
            let sum = em.add(&count, &bump);
            em.write_field(this, "count", &sum)?;
            Ok(None)
        }))
        .function(
            FunctionDecl::new("helper", |em, _args| Ok(Some(em.uint(3)?)))
                .returns(AsmType::Uint),
        )
}

pub fn contract_example_3() -> ContractDecl {
    ContractDecl::new(EXAMPLE_3)
        .field("other", AsmType::contract(EXAMPLE_2))
        .field("x", AsmType::Uint)
        .function(
            FunctionDecl::new("create", |em, args| {
                let this = &args[0];
                let five = em.uint(5)?;
                let other = em.new_object(EXAMPLE_2, "create", &[five])?;
                em.write_field(this, "other", &other)?;
                let one = em.uint(1)?;
                em.write_field(this, "x", &one)?;
                let me = em.me();
                em.write_field(this, "owner", &me)?;
                Ok(None)
            })
            .constructor(),
        )
        .function(
            FunctionDecl::new("swap", |em, args| {
                let (this, new_other) = (&args[0], &args[1]);
                let other = em.read_field(this, "other")?;
                em.call(&other, "increment", &[], false)?;
                em.write_field(this, "other", new_other)?;
                let x = em.call(new_other, "helper", &[], false)?;
                em.write_field(this, "x", &x)?;
                Ok(None)
            })
            .param("new_other", AsmType::contract(EXAMPLE_2)),
        )
        .function(FunctionDecl::new("bar", |em, args| {
            let this = &args[0];
            let two = em.uint(2)?;
            let other = em.call(this, "foo", &[two], false)?;
            em.call(&other, "increment", &[], false)?;
            Ok(None)
        }))
        .function(
            FunctionDecl::new("foo", |em, args| {
                let (this, factor) = (&args[0], &args[1]);
                let x = em.read_field(this, "x")?;
                let product = em.mul(&x, factor);
                em.write_field(this, "x", &product)?;
                let other = em.read_field(this, "other")?;
                Ok(Some(other))
            })
            .param("factor", AsmType::Uint)
            .returns(AsmType::contract(EXAMPLE_2)),
        )
}

pub fn contract_example_4() -> ContractDecl {
    ContractDecl::new(EXAMPLE_4)
        .field("x", AsmType::Uint)
        .field("w", AsmType::Long)
        .field("t", AsmType::Uint)
        .field("a", AsmType::Address)
        .function(
            FunctionDecl::new("create", |em, args| {
                let this = &args[0];
                let hundred = em.uint(100)?;
                em.write_field(this, "x", &hundred)?;
                let address = em.address(example_address());
                em.write_field(this, "a", &address)?;
                let w = em.fresh();
                em.write_field(this, "w", &w)?;
                let me = em.me();
                em.write_field(this, "owner", &me)?;
                let t = em.now();
                em.write_field(this, "t", &t)?;
                Ok(None)
            })
            .constructor(),
        )
        .function(
            FunctionDecl::new("work", |em, args| {
                let (this, z) = (&args[0], &args[1]);
                let w = em.fresh();
                em.write_field(this, "w", &w)?;
                let three = em.uint(3)?;
                let cond = em.gt(z, &three);
                let x = em.read_field(this, "x")?;
                let scaled = em.mul(&x, z);
                let five = em.uint(5)?;
                let choice = em.if_then_else(&cond, &scaled, &five);
                em.write_field(this, "x", &choice)?;
                let inner = em.new_object(INNER, "create", &[])?;
                Ok(Some(inner))
            })
            .param("z", AsmType::Uint)
            .returns(AsmType::contract(INNER)),
        )
}

pub fn inner_example() -> ContractDecl {
    ContractDecl::new(INNER)
        .field("x", AsmType::Uint)
        .function(
            FunctionDecl::new("create", |em, args| {
                let this = &args[0];
                let zero = em.uint(0)?;
                em.write_field(this, "x", &zero)?;
                let me = em.me();
                em.write_field(this, "owner", &me)?;
                Ok(None)
            })
            .constructor()
            .private_for(EXAMPLE_4),
        )
}

/// Registry holding every example contract.
pub fn example_registry() -> ContractRegistry {
    let mut registry = ContractRegistry::new();
    registry.register(coin());
    registry.register(dex_offer());
    registry.register(contract_example_1());
    registry.register(contract_example_2());
    registry.register(contract_example_3());
    registry.register(contract_example_4());
    registry.register(inner_example());
    registry
}
