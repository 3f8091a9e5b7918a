//! End-to-end processing scenarios over the in-memory providers.

use alloy_primitives::{Address, Bytes, B256, U256};
use std::sync::Arc;
use thor_chainspec::{
    min_validator_stake, ChainSpec, ForkConfig, BLOCK_INTERVAL, INITIAL_BASE_FEE,
};
use thor_consensus::{
    builtin::{authority, params},
    test_utils::{NativeExecutor, TestChain, TestKey},
    Consensus, ConsensusError, ProcessError,
};
use thor_primitives::{Block, Header, SIGNATURE_SIZE};
use thor_provider::{Stage, State, Stater};

/// A pre-randomness, pre-fee-market PoA network with `proposer_keys`
/// authorities.
fn poa_chain(proposer_keys: &[TestKey], user: &TestKey) -> TestChain {
    let spec = ChainSpec {
        forks: ForkConfig { blocklist: 0, vip191: 0, ..Default::default() },
        ..ChainSpec::dev()
    };
    let keys = proposer_keys.to_vec();
    let user = user.clone();
    TestChain::new(spec, move |state| {
        params::set(state, *params::KEY_PROPOSER_ENDORSEMENT, min_validator_stake()).unwrap();
        for (i, key) in keys.iter().enumerate() {
            let endorsor = Address::with_last_byte(0xa0 + i as u8);
            TestChain::fund(state, &ChainSpec::dev(), endorsor, 25_000_000);
            authority::add(state, key.address, endorsor, B256::with_last_byte(i as u8 + 1))
                .unwrap();
        }
        TestChain::fund(state, &ChainSpec::dev(), user.address, 1_000);
    })
}

#[test]
fn mints_a_chain_of_transfer_blocks() {
    let proposers: Vec<TestKey> = (0..3).map(|_| TestKey::random()).collect();
    let user = TestKey::random();
    let mut chain = poa_chain(&proposers, &user);

    let recipient = Address::with_last_byte(0x77);
    for round in 1..=3u64 {
        let tx = chain.transfer_tx(&user, recipient, 10);
        let (block, receipts) = chain.mint_block(&proposers, vec![tx]).unwrap();

        assert_eq!(block.header.number, round as u32);
        assert_eq!(receipts.len(), 1);
        assert!(!receipts[0].reverted);
        assert_eq!(receipts[0].outputs[0].transfers[0].amount, U256::from(10) * U256::from(thor_chainspec::VET));
    }

    let state = chain.stater.new_state(chain.best.header.state_root).unwrap();
    assert_eq!(
        state.balance(&recipient).unwrap(),
        U256::from(30) * U256::from(thor_chainspec::VET)
    );
}

#[test]
fn rejects_duplicate_transaction_in_one_block() {
    let proposers: Vec<TestKey> = (0..2).map(|_| TestKey::random()).collect();
    let user = TestKey::random();
    let mut chain = poa_chain(&proposers, &user);

    let tx = chain.transfer_tx(&user, Address::with_last_byte(0x77), 1);
    let err = chain.mint_block(&proposers, vec![tx.clone(), tx]).unwrap_err();
    assert!(matches!(
        err,
        ProcessError::Consensus(ConsensusError::TxAlreadyExists { .. })
    ));
}

#[test]
fn rejects_transaction_replayed_across_blocks() {
    let proposers: Vec<TestKey> = (0..2).map(|_| TestKey::random()).collect();
    let user = TestKey::random();
    let mut chain = poa_chain(&proposers, &user);

    let tx = chain.transfer_tx(&user, Address::with_last_byte(0x77), 1);
    chain.mint_block(&proposers, vec![tx.clone()]).unwrap();

    let err = chain.mint_block(&proposers, vec![tx]).unwrap_err();
    assert!(matches!(
        err,
        ProcessError::Consensus(ConsensusError::TxAlreadyExists { .. })
    ));
}

#[test]
fn dependency_rules() {
    let proposers: Vec<TestKey> = (0..2).map(|_| TestKey::random()).collect();
    let user = TestKey::random();
    let broke = TestKey::random();
    let mut chain = poa_chain(&proposers, &user);

    // unknown dependency
    let missing_dep = B256::with_last_byte(0xee);
    let tx = chain.legacy_tx_with(&user, vec![], |body| body.depends_on = Some(missing_dep));
    let err = chain.mint_block(&proposers, vec![tx]).unwrap_err();
    assert!(matches!(
        err,
        ProcessError::Consensus(ConsensusError::TxDepBroken { dep, .. }) if dep == missing_dep
    ));

    // in-block dependency on a successful transaction
    let first = chain.transfer_tx(&user, Address::with_last_byte(0x77), 1);
    let first_id = first.id().unwrap();
    let second = chain.legacy_tx_with(&user, vec![], |body| body.depends_on = Some(first_id));
    chain.mint_block(&proposers, vec![first, second]).unwrap();

    // dependency on a reverted transaction: `broke` holds energy but no VET
    let keys = proposers.clone();
    let user_setup = user.clone();
    let broke_setup = broke.clone();
    let spec = ChainSpec {
        forks: ForkConfig { blocklist: 0, vip191: 0, ..Default::default() },
        ..ChainSpec::dev()
    };
    let mut chain = TestChain::new(spec, move |state| {
        params::set(state, *params::KEY_PROPOSER_ENDORSEMENT, min_validator_stake()).unwrap();
        for (i, key) in keys.iter().enumerate() {
            let endorsor = Address::with_last_byte(0xa0 + i as u8);
            TestChain::fund(state, &ChainSpec::dev(), endorsor, 25_000_000);
            authority::add(state, key.address, endorsor, B256::ZERO).unwrap();
        }
        TestChain::fund(state, &ChainSpec::dev(), user_setup.address, 1_000);
        thor_consensus::builtin::energy::add(
            state,
            &broke_setup.address,
            ChainSpec::dev().genesis_timestamp,
            U256::from(thor_chainspec::VET) * U256::from(1_000u64),
        )
        .unwrap();
    });
    let reverting = chain.legacy_tx_with(&broke, vec![thor_primitives::Clause {
        to: Some(Address::with_last_byte(0x78)),
        value: U256::from(1),
        data: Bytes::new(),
    }], |_| {});
    let reverting_id = reverting.id().unwrap();
    let dependent =
        chain.legacy_tx_with(&user, vec![], |body| body.depends_on = Some(reverting_id));
    let err = chain.mint_block(&proposers, vec![reverting, dependent]).unwrap_err();
    assert!(matches!(
        err,
        ProcessError::Consensus(ConsensusError::TxDepReverted { .. })
    ));
}

#[test]
fn future_block_is_requeued_not_rejected() {
    let proposers: Vec<TestKey> = (0..2).map(|_| TestKey::random()).collect();
    let user = TestKey::random();
    let chain = poa_chain(&proposers, &user);

    let parent = chain.best.clone();
    let header = Header {
        parent_id: parent.id,
        number: 1,
        timestamp: parent.header.timestamp + 2 * BLOCK_INTERVAL,
        gas_limit: parent.header.gas_limit,
        total_score: 1,
        signature: Bytes::from(vec![0u8; SIGNATURE_SIZE]),
        ..Default::default()
    };
    let block = Block::new(header, vec![]);

    let err = chain
        .consensus
        .process(&parent, &block, parent.header.timestamp, 0)
        .unwrap_err();
    assert_eq!(err, ProcessError::FutureBlock);
    assert!(!err.is_consensus_failure());
}

#[test]
fn timestamp_behind_parent_reports_both_values() {
    let proposers: Vec<TestKey> = (0..2).map(|_| TestKey::random()).collect();
    let user = TestKey::random();
    let chain = poa_chain(&proposers, &user);

    let parent = chain.best.clone();
    let header = Header {
        parent_id: parent.id,
        number: 1,
        timestamp: parent.header.timestamp,
        gas_limit: parent.header.gas_limit,
        total_score: 1,
        signature: Bytes::from(vec![0u8; SIGNATURE_SIZE]),
        ..Default::default()
    };
    let block = Block::new(header, vec![]);

    let err = chain
        .consensus
        .process(&parent, &block, parent.header.timestamp, 0)
        .unwrap_err();
    assert_eq!(
        err,
        ConsensusError::TimestampBehindParent {
            parent: parent.header.timestamp,
            current: parent.header.timestamp,
        }
        .into()
    );
}

#[test]
fn wrong_base_fee_is_rejected_with_exact_message() {
    let proposers: Vec<TestKey> = (0..2).map(|_| TestKey::random()).collect();
    let user = TestKey::random();
    let spec = ChainSpec {
        forks: ForkConfig { galactica: 1, ..Default::default() },
        ..ChainSpec::dev()
    };
    let keys = proposers.clone();
    let mut chain = TestChain::new(spec, move |state| {
        params::set(state, *params::KEY_PROPOSER_ENDORSEMENT, min_validator_stake()).unwrap();
        for (i, key) in keys.iter().enumerate() {
            let endorsor = Address::with_last_byte(0xa0 + i as u8);
            TestChain::fund(state, &ChainSpec::dev(), endorsor, 25_000_000);
            authority::add(state, key.address, endorsor, B256::ZERO).unwrap();
        }
    });

    // grow the chain a bit under the fee market first
    for _ in 0..3 {
        chain.mint_block(&proposers, vec![]).unwrap();
    }

    let parent = chain.best.clone();
    let header = Header {
        parent_id: parent.id,
        number: parent.header.number + 1,
        timestamp: parent.header.timestamp + BLOCK_INTERVAL,
        gas_limit: parent.header.gas_limit,
        total_score: parent.header.total_score + 1,
        base_fee_per_gas: Some(INITIAL_BASE_FEE * 123),
        signature: Bytes::from(vec![0u8; SIGNATURE_SIZE]),
        ..Default::default()
    };
    let block = Block::new(header.clone(), vec![]);

    let err = chain.consensus.process(&parent, &block, header.timestamp, 0).unwrap_err();
    assert_eq!(
        err.to_string(),
        "block baseFee invalid: have 1230000000000000, want 10000000000000"
    );
}

#[test]
fn unauthorized_signer_is_rejected() {
    let proposers: Vec<TestKey> = (0..2).map(|_| TestKey::random()).collect();
    let user = TestKey::random();
    let mut chain = poa_chain(&proposers, &user);
    chain.mint_block(&proposers, vec![]).unwrap();

    // a structurally fine block sealed by a key outside the authority list
    let outsider = TestKey::random();
    let parent = chain.best.clone();
    let mut header = Header {
        parent_id: parent.id,
        number: parent.header.number + 1,
        timestamp: parent.header.timestamp + BLOCK_INTERVAL,
        gas_limit: parent.header.gas_limit,
        total_score: parent.header.total_score + 1,
        ..Default::default()
    };
    header.signature =
        Bytes::from(thor_primitives::sign_hash(&header.signing_hash(), &outsider.secret).to_vec());
    let block = Block::new(header.clone(), vec![]);

    let err = chain.consensus.process(&parent, &block, header.timestamp, 0).unwrap_err();
    assert_eq!(err, ConsensusError::SignerInvalid { signer: outsider.address }.into());
}

#[test]
fn processing_is_idempotent_across_fresh_caches() {
    let proposers: Vec<TestKey> = (0..3).map(|_| TestKey::random()).collect();
    let user = TestKey::random();
    let mut chain = poa_chain(&proposers, &user);

    chain.mint_block(&proposers, vec![]).unwrap();
    let tx = chain.transfer_tx(&user, Address::with_last_byte(0x55), 2);
    let (block, receipts) = chain.mint_block(&proposers, vec![tx]).unwrap();

    // a second engine with cold caches must agree bit for bit
    let fresh = Consensus::new(
        Arc::clone(&chain.spec),
        Arc::clone(&chain.store),
        Arc::clone(&chain.stater),
        NativeExecutor,
    );
    let (stage, replay_receipts) =
        fresh.process_block(&block, block.header.timestamp, 0).unwrap();

    assert_eq!(replay_receipts, receipts);
    assert_eq!(stage.hash(), block.header.state_root);
}

#[test]
fn blocked_origin_is_rejected() {
    let proposers: Vec<TestKey> = (0..2).map(|_| TestKey::random()).collect();
    let banned = TestKey::random();

    let mut spec = ChainSpec {
        forks: ForkConfig { blocklist: 0, ..Default::default() },
        ..ChainSpec::dev()
    };
    spec.blocked.insert(banned.address);

    let keys = proposers.clone();
    let banned_setup = banned.clone();
    let mut chain = TestChain::new(spec, move |state| {
        params::set(state, *params::KEY_PROPOSER_ENDORSEMENT, min_validator_stake()).unwrap();
        for (i, key) in keys.iter().enumerate() {
            let endorsor = Address::with_last_byte(0xa0 + i as u8);
            TestChain::fund(state, &ChainSpec::dev(), endorsor, 25_000_000);
            authority::add(state, key.address, endorsor, B256::ZERO).unwrap();
        }
        TestChain::fund(state, &ChainSpec::dev(), banned_setup.address, 100);
    });

    let tx = chain.transfer_tx(&banned, Address::with_last_byte(0x77), 1);
    let err = chain.mint_block(&proposers, vec![tx]).unwrap_err();
    assert!(matches!(
        err,
        ProcessError::Consensus(ConsensusError::OriginBlocked { address }) if address == banned.address
    ));
}

#[test]
fn chain_tag_mismatch_is_rejected() {
    let proposers: Vec<TestKey> = (0..2).map(|_| TestKey::random()).collect();
    let user = TestKey::random();
    let mut chain = poa_chain(&proposers, &user);

    let tx = chain.legacy_tx_with(&user, vec![], |body| body.chain_tag = 0x99);
    let err = chain.mint_block(&proposers, vec![tx]).unwrap_err();
    assert!(matches!(
        err,
        ProcessError::Consensus(ConsensusError::TxChainTagMismatch { have: 0x99, .. })
    ));
}

#[test]
fn expired_transaction_is_rejected() {
    let proposers: Vec<TestKey> = (0..2).map(|_| TestKey::random()).collect();
    let user = TestKey::random();
    let mut chain = poa_chain(&proposers, &user);

    // expires one block after its ref
    let tx = chain.legacy_tx_with(&user, vec![], |body| body.expiration = 1);
    chain.mint_block(&proposers, vec![]).unwrap();
    chain.mint_block(&proposers, vec![]).unwrap();

    let err = chain.mint_block(&proposers, vec![tx]).unwrap_err();
    assert!(matches!(
        err,
        ProcessError::Consensus(ConsensusError::TxExpired { .. })
    ));
}

#[test]
fn dynamic_fee_transactions_need_the_fee_market() {
    let proposers: Vec<TestKey> = (0..2).map(|_| TestKey::random()).collect();
    let user = TestKey::random();
    let mut chain = poa_chain(&proposers, &user);

    let tx = thor_primitives::sign_transaction(
        thor_primitives::Transaction::DynamicFee(thor_primitives::DynamicFeeTransaction {
            chain_tag: chain.spec.chain_tag,
            block_ref: thor_primitives::block_ref_of(&chain.best.id),
            expiration: 100,
            max_fee_per_gas: INITIAL_BASE_FEE as u128 * 2,
            gas: 100_000,
            ..Default::default()
        }),
        &user.secret,
        None,
    )
    .unwrap();

    let err = chain.mint_block(&proposers, vec![tx]).unwrap_err();
    assert!(matches!(
        err,
        ProcessError::Consensus(ConsensusError::TxTypeUnsupported { .. })
    ));
}

#[test]
fn authority_events_force_a_snapshot_rebuild() {
    let proposers: Vec<TestKey> = (0..3).map(|_| TestKey::random()).collect();
    let user = TestKey::random();
    let mut chain = poa_chain(&proposers, &user);
    chain.mint_block(&proposers, vec![]).unwrap();

    // an event on the authority contract drops the cached snapshot; the next
    // block must rebuild the candidate list from state and still validate
    let tx = chain.legacy_tx(
        &user,
        vec![thor_primitives::Clause {
            to: Some(*thor_consensus::builtin::AUTHORITY_CONTRACT),
            value: U256::ZERO,
            data: thor_consensus::test_utils::emit_event_data("CandidateUpdated"),
        }],
    );
    let (block, receipts) = chain.mint_block(&proposers, vec![tx]).unwrap();
    assert!(receipts[0]
        .events()
        .any(|event| event.address == *thor_consensus::builtin::AUTHORITY_CONTRACT));
    assert_eq!(block.header.number, 2);

    chain.mint_block(&proposers, vec![]).unwrap();
    assert_eq!(chain.best.header.number, 3);
}

#[test]
fn delegated_fees_charge_the_sponsor() {
    let proposers: Vec<TestKey> = (0..2).map(|_| TestKey::random()).collect();
    let user = TestKey::random();
    let sponsor = TestKey::random();

    let keys = proposers.clone();
    let user_setup = user.clone();
    let sponsor_setup = sponsor.clone();
    let spec = ChainSpec {
        forks: ForkConfig { blocklist: 0, vip191: 0, ..Default::default() },
        ..ChainSpec::dev()
    };
    let mut chain = TestChain::new(spec, move |state| {
        params::set(state, *params::KEY_PROPOSER_ENDORSEMENT, min_validator_stake()).unwrap();
        for (i, key) in keys.iter().enumerate() {
            let endorsor = Address::with_last_byte(0xa0 + i as u8);
            TestChain::fund(state, &ChainSpec::dev(), endorsor, 25_000_000);
            authority::add(state, key.address, endorsor, B256::ZERO).unwrap();
        }
        // the user owns VET but no energy; the sponsor carries the gas
        state
            .set_balance(user_setup.address, U256::from(100) * U256::from(thor_chainspec::VET))
            .unwrap();
        thor_consensus::builtin::energy::add(
            state,
            &sponsor_setup.address,
            ChainSpec::dev().genesis_timestamp,
            U256::from(thor_chainspec::VET) * U256::from(1_000u64),
        )
        .unwrap();
    });

    let tx = thor_primitives::sign_transaction(
        thor_primitives::Transaction::Legacy(thor_primitives::LegacyTransaction {
            chain_tag: chain.spec.chain_tag,
            block_ref: thor_primitives::block_ref_of(&chain.best.id),
            expiration: 100,
            clauses: vec![thor_primitives::Clause {
                to: Some(Address::with_last_byte(0x70)),
                value: U256::from(thor_chainspec::VET),
                data: Bytes::new(),
            }],
            gas: 100_000,
            features: thor_primitives::Features::DELEGATED,
            ..Default::default()
        }),
        &user.secret,
        Some(&sponsor.secret),
    )
    .unwrap();

    let (_, receipts) = chain.mint_block(&proposers, vec![tx]).unwrap();
    assert!(!receipts[0].reverted);
    assert_eq!(receipts[0].gas_payer, sponsor.address);
}

#[test]
fn unknown_feature_bits_are_rejected() {
    let proposers: Vec<TestKey> = (0..2).map(|_| TestKey::random()).collect();
    let user = TestKey::random();
    let mut chain = poa_chain(&proposers, &user);

    let tx = chain.legacy_tx_with(&user, vec![], |body| {
        body.features = thor_primitives::Features(0b100);
    });
    let err = chain.mint_block(&proposers, vec![tx]).unwrap_err();
    assert!(matches!(
        err,
        ProcessError::Consensus(ConsensusError::TxFeaturesInvalid { .. })
    ));
}

#[test]
fn v1_and_v2_schedules_are_used_across_the_fork() {
    let proposers: Vec<TestKey> = (0..3).map(|_| TestKey::random()).collect();
    let user = TestKey::random();

    // randomness fork at block 3
    let spec = ChainSpec {
        forks: ForkConfig { vip214: 3, ..Default::default() },
        ..ChainSpec::dev()
    };
    let keys = proposers.clone();
    let mut chain = TestChain::new(spec, move |state| {
        params::set(state, *params::KEY_PROPOSER_ENDORSEMENT, min_validator_stake()).unwrap();
        for (i, key) in keys.iter().enumerate() {
            let endorsor = Address::with_last_byte(0xa0 + i as u8);
            TestChain::fund(state, &ChainSpec::dev(), endorsor, 25_000_000);
            authority::add(state, key.address, endorsor, B256::ZERO).unwrap();
        }
        TestChain::fund(state, &ChainSpec::dev(), user.address, 100);
    });

    for expected_number in 1..=5u32 {
        let (block, _) = chain.mint_block(&proposers, vec![]).unwrap();
        assert_eq!(block.header.number, expected_number);

        if expected_number < 3 {
            assert_eq!(block.header.signature.len(), SIGNATURE_SIZE);
            assert!(block.header.alpha.is_empty());
        } else {
            assert_eq!(block.header.signature.len(), thor_primitives::COMPLEX_SIGNATURE_SIZE);
            assert!(!block.header.alpha.is_empty());
            assert!(block.header.beta().unwrap().is_some());
        }
    }
}
