//! Tests for content-addressed staging and deterministic deployment.

use switchyard_core::access::CallContext;
use switchyard_core::crypto::{code_hash, hash_content};
use switchyard_core::handler::CodeSource;
use switchyard_core::registry::{
    DeployRequest, DeploymentRegistry, MAX_CODE_SIZE, MAX_STAGE_BATCH, RegistryError,
};
use switchyard_core::types::Address;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn addr(byte: u8) -> Address {
    Address::from_bytes([byte; 32])
}

fn registry() -> DeploymentRegistry {
    DeploymentRegistry::new(addr(1), addr(2))
}

fn funded(caller: u8, now_ns: u64) -> CallContext {
    CallContext::new(addr(caller), now_ns).with_fee(1_000)
}

// ---------------------------------------------------------------------------
// staging idempotence
// ---------------------------------------------------------------------------

#[test]
fn identical_content_stages_to_the_same_address_once() {
    let mut registry = registry();
    let first = registry.stage(&funded(5, 10), b"shared chunk").unwrap();
    assert!(first.created);
    assert!(first.fee_charged > 0);

    let second = registry.stage(&funded(6, 20), b"shared chunk").unwrap();
    assert!(!second.created);
    assert_eq!(second.address, first.address);
    assert_eq!(second.content_hash, first.content_hash);
    assert_eq!(second.fee_charged, 0);
    assert_eq!(second.refund, 1_000);

    // Only one staging event exists.
    let staged_events = registry
        .events()
        .iter()
        .filter(|record| record.event.kind() == "registry.chunk_staged")
        .count();
    assert_eq!(staged_events, 1);
}

#[test]
fn staged_chunks_are_recorded_and_queryable() {
    let mut registry = registry();
    let outcome = registry.stage(&funded(5, 42), b"chunk").unwrap();

    assert!(registry.exists(&outcome.content_hash));
    assert!(registry.is_deployed(&outcome.address));
    let record = registry.chunk(&outcome.content_hash).unwrap();
    assert_eq!(record.size, 5);
    assert_eq!(record.created_at_ns, 42);
    assert_eq!(registry.code_at(&outcome.address), Some(&b"chunk"[..]));
}

#[test]
fn stage_rejects_oversized_content() {
    let mut registry = registry();
    let oversized = vec![0u8; MAX_CODE_SIZE + 1];
    let err = registry.stage(&funded(5, 10), &oversized).unwrap_err();
    assert!(matches!(err, RegistryError::ContentTooLarge { .. }));
}

// ---------------------------------------------------------------------------
// deterministic deployment
// ---------------------------------------------------------------------------

#[test]
fn deploy_deterministic_is_idempotent() {
    let mut registry = registry();
    let salt = hash_content(b"salt");

    let first = registry
        .deploy_deterministic(&funded(5, 10), salt, b"code", b"args")
        .unwrap();
    assert!(first.created);

    let second = registry
        .deploy_deterministic(&funded(5, 20), salt, b"code", b"args")
        .unwrap();
    assert!(!second.created);
    assert_eq!(second.address, first.address);
    assert_eq!(second.fee_charged, 0);
    assert_eq!(second.refund, 1_000);

    let deploy_events = registry
        .events()
        .iter()
        .filter(|record| record.event.kind() == "registry.contract_deployed")
        .count();
    assert_eq!(deploy_events, 1);
}

#[test]
fn predicted_addresses_match_deployed_addresses() {
    let mut registry = registry();
    let salt = hash_content(b"salt");
    let unit_hash = code_hash(b"code", b"args");

    let predicted = registry.predict_address(&salt, &unit_hash);
    let outcome = registry
        .deploy_deterministic(&funded(5, 10), salt, b"code", b"args")
        .unwrap();
    assert_eq!(outcome.address, predicted);

    let (chunk_addr, _) = registry.predict(b"chunk");
    let staged = registry.stage(&funded(5, 11), b"chunk").unwrap();
    assert_eq!(staged.address, chunk_addr);
}

#[test]
fn independent_instances_agree_on_addresses_without_deploying() {
    // Same registry identity, different operators and histories.
    let mut left = DeploymentRegistry::new(addr(1), addr(2));
    let right = DeploymentRegistry::new(addr(1), addr(3));

    let salt = hash_content(b"rollout salt");
    let unit_hash = code_hash(b"handler code", b"");
    assert_eq!(
        left.predict_address(&salt, &unit_hash),
        right.predict_address(&salt, &unit_hash)
    );

    // Deploying on one instance lands exactly where the other predicted.
    let outcome = left
        .deploy_deterministic(&funded(5, 10), salt, b"handler code", b"")
        .unwrap();
    assert_eq!(outcome.address, right.predict_address(&salt, &unit_hash));

    // A different identity diverges.
    let other = DeploymentRegistry::new(addr(9), addr(2));
    assert_ne!(
        other.predict_address(&salt, &unit_hash),
        right.predict_address(&salt, &unit_hash)
    );
}

#[test]
fn oversized_code_is_rejected_before_deployment() {
    let mut registry = registry();
    let bomb = vec![0u8; MAX_CODE_SIZE + 1];
    let err = registry
        .deploy_deterministic(&funded(5, 10), hash_content(b"salt"), &bomb, b"")
        .unwrap_err();
    assert_eq!(
        err,
        RegistryError::CodeTooLarge {
            size: MAX_CODE_SIZE + 1,
            limit: MAX_CODE_SIZE,
        }
    );
    assert_eq!(registry.collected_fees(), 0);
}

// ---------------------------------------------------------------------------
// fees
// ---------------------------------------------------------------------------

#[test]
fn fees_follow_the_size_tiers_and_refund_the_surplus() {
    let mut registry = registry();
    let small = registry
        .deploy_deterministic(
            &funded(5, 10),
            hash_content(b"salt-a"),
            &vec![0u8; 100],
            b"",
        )
        .unwrap();
    assert_eq!(small.fee_charged, 10);
    assert_eq!(small.refund, 990);

    let large = registry
        .deploy_deterministic(
            &funded(5, 11),
            hash_content(b"salt-b"),
            &vec![0u8; 20_000],
            b"",
        )
        .unwrap();
    assert_eq!(large.fee_charged, 60);
    assert_eq!(registry.collected_fees(), 70);
}

#[test]
fn insufficient_fee_is_rejected_with_both_amounts() {
    let mut registry = registry();
    let ctx = CallContext::new(addr(5), 10).with_fee(3);
    let err = registry
        .deploy_deterministic(&ctx, hash_content(b"salt"), b"code", b"")
        .unwrap_err();
    assert_eq!(
        err,
        RegistryError::FeeInsufficient {
            required: 10,
            provided: 3,
        }
    );
    assert!(!registry.is_deployed(&registry.predict_address(
        &hash_content(b"salt"),
        &code_hash(b"code", b"")
    )));
}

#[test]
fn withdraw_is_admin_gated_and_zeroes_the_balance() {
    let mut registry = registry();
    registry.stage(&funded(5, 10), b"chunk").unwrap();
    assert!(registry.collected_fees() > 0);

    let outsider = CallContext::new(addr(5), 20);
    assert!(matches!(
        registry.withdraw_fees(&outsider),
        Err(RegistryError::Unauthorized(_))
    ));

    let admin = CallContext::new(addr(2), 20);
    let amount = registry.withdraw_fees(&admin).unwrap();
    assert_eq!(amount, 10);
    assert_eq!(registry.collected_fees(), 0);
    assert!(matches!(
        registry.withdraw_fees(&admin),
        Err(RegistryError::NothingToWithdraw)
    ));
}

// ---------------------------------------------------------------------------
// batches
// ---------------------------------------------------------------------------

#[test]
fn stage_batch_is_all_or_nothing() {
    let mut registry = registry();
    let contents = vec![
        b"chunk one".to_vec(),
        vec![0u8; MAX_CODE_SIZE + 1],
        b"chunk three".to_vec(),
    ];
    let err = registry.stage_batch(&funded(5, 10), &contents).unwrap_err();
    assert!(matches!(err, RegistryError::ContentTooLarge { .. }));

    // Nothing from the failed batch landed.
    let (_, hash_one) = registry.predict(b"chunk one");
    assert!(!registry.exists(&hash_one));
    assert_eq!(registry.collected_fees(), 0);
    assert!(registry.events().is_empty());
}

#[test]
fn stage_batch_charges_duplicates_once_and_refunds_the_rest() {
    let mut registry = registry();
    let contents = vec![
        b"alpha".to_vec(),
        b"beta".to_vec(),
        b"alpha".to_vec(),
    ];
    let outcome = registry.stage_batch(&funded(5, 10), &contents).unwrap();

    assert_eq!(outcome.staged.len(), 3);
    assert!(outcome.staged[0].created);
    assert!(outcome.staged[1].created);
    assert!(!outcome.staged[2].created);
    assert_eq!(outcome.staged[2].address, outcome.staged[0].address);
    assert_eq!(outcome.fee_charged, 20);
    assert_eq!(outcome.refund, 980);
}

#[test]
fn stage_batch_enforces_the_cap() {
    let mut registry = registry();
    let contents: Vec<Vec<u8>> = (0..=MAX_STAGE_BATCH)
        .map(|i| format!("chunk {i}").into_bytes())
        .collect();
    let err = registry.stage_batch(&funded(5, 10), &contents).unwrap_err();
    assert_eq!(
        err,
        RegistryError::BatchTooLarge {
            submitted: MAX_STAGE_BATCH + 1,
            limit: MAX_STAGE_BATCH,
        }
    );
}

#[test]
fn deploy_batch_mixes_fresh_and_existing_deployments() {
    let mut registry = registry();
    let salt = hash_content(b"salt");
    registry
        .deploy_deterministic(&funded(5, 10), salt, b"existing", b"")
        .unwrap();

    let requests = vec![
        DeployRequest {
            salt,
            code: b"existing".to_vec(),
            ctor_args: Vec::new(),
        },
        DeployRequest {
            salt,
            code: b"fresh".to_vec(),
            ctor_args: Vec::new(),
        },
    ];
    let outcome = registry
        .deploy_deterministic_batch(&funded(5, 20), &requests)
        .unwrap();

    assert!(!outcome.deployed[0].created);
    assert_eq!(outcome.deployed[0].fee_charged, 0);
    assert!(outcome.deployed[1].created);
    assert_eq!(outcome.fee_charged, outcome.deployed[1].fee_charged);
    assert_eq!(outcome.refund, 1_000 - outcome.fee_charged);
}

#[test]
fn deploy_batch_with_insufficient_fee_deploys_nothing() {
    let mut registry = registry();
    let requests = vec![
        DeployRequest {
            salt: hash_content(b"salt-a"),
            code: b"code a".to_vec(),
            ctor_args: Vec::new(),
        },
        DeployRequest {
            salt: hash_content(b"salt-b"),
            code: b"code b".to_vec(),
            ctor_args: Vec::new(),
        },
    ];
    let ctx = CallContext::new(addr(5), 10).with_fee(15);
    let err = registry
        .deploy_deterministic_batch(&ctx, &requests)
        .unwrap_err();
    assert_eq!(
        err,
        RegistryError::FeeInsufficient {
            required: 20,
            provided: 15,
        }
    );
    assert!(registry.events().is_empty());
    assert_eq!(registry.collected_fees(), 0);
}

#[test]
fn empty_batches_are_rejected() {
    let mut registry = registry();
    assert_eq!(
        registry.stage_batch(&funded(5, 10), &[]).unwrap_err(),
        RegistryError::EmptyBatch
    );
    assert_eq!(
        registry
            .deploy_deterministic_batch(&funded(5, 10), &[])
            .unwrap_err(),
        RegistryError::EmptyBatch
    );
}
