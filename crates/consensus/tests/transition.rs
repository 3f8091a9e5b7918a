//! The PoA→dPoS switch, end to end: authority blocks up to the transition
//! checkpoint, stake queuing through a native call, activation, and staking
//! blocks afterwards.

use alloy_primitives::{Address, Bytes, B256, U256};
use thor_chainspec::{min_validator_stake, ChainSpec, ForkConfig, BLOCK_INTERVAL, VET};
use thor_consensus::{
    builtin::{authority, energy, params, staker},
    test_utils::{add_validation_data, TestChain, TestKey},
    ConsensusError,
};
use thor_primitives::{Clause, Header, ValidationStatus};
use thor_provider::{State, Stater};

struct Fixture {
    chain: TestChain,
    authority_key: TestKey,
    validator_key: TestKey,
    validator_endorsor: TestKey,
}

/// Staking forks at block 2 with a one-block transition period, one authority
/// proposer, proposer cap 1.
fn transition_fixture() -> Fixture {
    let authority_key = TestKey::random();
    let validator_key = TestKey::random();
    let validator_endorsor = TestKey::random();

    let spec = ChainSpec {
        forks: ForkConfig {
            blocklist: 0,
            vip191: 0,
            vip214: 0,
            finality: 0,
            galactica: 0,
            hayabusa: 2,
            hayabusa_tp: 1,
        },
        ..ChainSpec::dev()
    };

    let authority_setup = authority_key.clone();
    let endorsor_setup = validator_endorsor.clone();
    let chain = TestChain::new(spec, move |state| {
        params::set(state, *params::KEY_PROPOSER_ENDORSEMENT, min_validator_stake()).unwrap();
        params::set(state, *params::KEY_MAX_BLOCK_PROPOSERS, U256::from(1)).unwrap();

        let authority_endorsor = Address::with_last_byte(0xaa);
        TestChain::fund(state, &ChainSpec::dev(), authority_endorsor, 25_000_000);
        authority::add(state, authority_setup.address, authority_endorsor, B256::ZERO).unwrap();

        TestChain::fund(state, &ChainSpec::dev(), endorsor_setup.address, 30_000_000);
    });

    Fixture { chain, authority_key, validator_key, validator_endorsor }
}

#[test]
fn poa_to_dpos_switch() {
    let Fixture { mut chain, authority_key, validator_key, validator_endorsor } =
        transition_fixture();
    let poa_keys = vec![authority_key.clone()];
    let stake = min_validator_stake();

    // blocks 1 and 2: authority keeps proposing; the transition checkpoint at
    // block 2 has nobody queued yet
    for number in 1..=2u32 {
        let (block, _) = chain.mint_block(&poa_keys, vec![]).unwrap();
        assert_eq!(block.header.number, number);
    }
    {
        let state = chain.stater.new_state(chain.best.header.state_root).unwrap();
        assert!(!staker::is_active(&state).unwrap());
    }

    // block 3: a validator queues through the staker native call
    let endorsor_before = {
        let state = chain.stater.new_state(chain.best.header.state_root).unwrap();
        state.balance(&validator_endorsor.address).unwrap()
    };
    let queue_tx = chain.legacy_tx(
        &validator_endorsor,
        vec![Clause {
            to: Some(*thor_consensus::builtin::STAKER_CONTRACT),
            value: U256::ZERO,
            data: add_validation_data(validator_key.address, 30, stake),
        }],
    );
    let (block3, receipts3) = chain.mint_block(&poa_keys, vec![queue_tx]).unwrap();
    assert_eq!(block3.header.number, 3);
    assert!(!receipts3[0].reverted);

    {
        let state = chain.stater.new_state(chain.best.header.state_root).unwrap();
        assert!(!staker::is_active(&state).unwrap());

        // the endorsor's VET decreased by exactly the stake moved
        assert_eq!(
            state.balance(&validator_endorsor.address).unwrap(),
            endorsor_before - stake
        );
        let validation = staker::get(&state, &validator_key.address).unwrap().unwrap();
        assert_eq!(validation.status, ValidationStatus::Queued);
        assert_eq!(validation.queued_vet, stake);
        assert_eq!(validation.endorsor, validator_endorsor.address);
    }

    // block 4: the checkpoint finds a queued validator and flips to staking
    let all_keys = vec![authority_key.clone(), validator_key.clone()];
    let (block4, _) = chain.mint_block(&all_keys, vec![]).unwrap();
    assert_eq!(block4.header.number, 4);
    assert_eq!(block4.header.signer().unwrap(), validator_key.address);

    let state = chain.stater.new_state(chain.best.header.state_root).unwrap();
    assert!(staker::is_active(&state).unwrap());

    let group = staker::leader_group(&state).unwrap();
    assert_eq!(group.len(), 1);
    assert_eq!(group[0].0, validator_key.address);
    assert_eq!(group[0].1.status, ValidationStatus::Active);
    assert_eq!(group[0].1.locked_vet, stake);
    assert_eq!(group[0].1.queued_vet, U256::ZERO);

    // the staking proposer check accepts block 4, the authority check rejects
    // its signer
    chain
        .consensus
        .validate_staking_proposer(
            validator_key.address,
            &block4.header,
            &block3.header,
            &group,
        )
        .unwrap();

    let mut poa_state = chain.stater.new_state(block3.header.state_root).unwrap();
    let parent_summary = block3.summarize().unwrap();
    let err = chain
        .consensus
        .validate_authority_proposer(
            &mut poa_state,
            validator_key.address,
            &block4.header,
            &parent_summary,
        )
        .unwrap_err();
    assert_eq!(
        err,
        ConsensusError::SignerInvalid { signer: validator_key.address }.into()
    );

    // energy growth halted at the activation timestamp
    assert_eq!(energy::growth_stop(&state).unwrap(), Some(block4.header.timestamp));
}

#[test]
fn energy_growth_stays_halted_after_activation() {
    let Fixture { mut chain, authority_key, validator_key, validator_endorsor } =
        transition_fixture();
    let poa_keys = vec![authority_key.clone()];

    for number in 1..=3u32 {
        let txs = if number == 3 {
            vec![chain.legacy_tx(
                &validator_endorsor,
                vec![Clause {
                    to: Some(*thor_consensus::builtin::STAKER_CONTRACT),
                    value: U256::ZERO,
                    data: add_validation_data(
                        validator_key.address,
                        30,
                        min_validator_stake(),
                    ),
                }],
            )]
        } else {
            vec![]
        };
        chain.mint_block(&poa_keys, txs).unwrap();
    }

    let all_keys = vec![authority_key.clone(), validator_key.clone()];
    let (block4, _) = chain.mint_block(&all_keys, vec![]).unwrap();
    let stop = block4.header.timestamp;

    // mint more staking blocks; the stop time never moves
    for _ in 0..3 {
        chain.mint_block(&all_keys, vec![]).unwrap();
    }
    let state = chain.stater.new_state(chain.best.header.state_root).unwrap();
    assert_eq!(energy::growth_stop(&state).unwrap(), Some(stop));
    assert!(chain.best.header.timestamp > stop);

    // the endorsor kept 5M VET; its accrual froze at the stop time
    let endorsor = validator_endorsor.address;
    let at_stop = energy::get(&state, &endorsor, stop).unwrap();
    let much_later = energy::get(&state, &endorsor, stop + 1_000_000).unwrap();
    assert!(at_stop > U256::ZERO);
    assert_eq!(at_stop, much_later);
}

#[test]
fn off_slot_staking_timestamp_is_unscheduled() {
    let Fixture { mut chain, authority_key, validator_key, validator_endorsor } =
        transition_fixture();
    let poa_keys = vec![authority_key.clone()];

    for number in 1..=3u32 {
        let txs = if number == 3 {
            vec![chain.legacy_tx(
                &validator_endorsor,
                vec![Clause {
                    to: Some(*thor_consensus::builtin::STAKER_CONTRACT),
                    value: U256::ZERO,
                    data: add_validation_data(
                        validator_key.address,
                        30,
                        min_validator_stake(),
                    ),
                }],
            )]
        } else {
            vec![]
        };
        chain.mint_block(&poa_keys, txs).unwrap();
    }
    let all_keys = vec![authority_key.clone(), validator_key.clone()];
    chain.mint_block(&all_keys, vec![]).unwrap();

    let parent = chain.best.clone();
    let state = chain.stater.new_state(parent.header.state_root).unwrap();
    let group = staker::leader_group(&state).unwrap();

    // one second past the parent is not a slot boundary
    let header = Header {
        parent_id: parent.id,
        number: parent.header.number + 1,
        timestamp: parent.header.timestamp + 1,
        ..Default::default()
    };
    let err = chain
        .consensus
        .validate_staking_proposer(validator_key.address, &header, &parent.header, &group)
        .unwrap_err();
    assert!(err.to_string().contains("block timestamp unscheduled"));

    // a whole interval later lands on the single leader's slot
    let ok_header = Header {
        parent_id: parent.id,
        number: parent.header.number + 1,
        timestamp: parent.header.timestamp + BLOCK_INTERVAL,
        total_score: parent.header.total_score + group.len() as u64,
        ..Default::default()
    };
    chain
        .consensus
        .validate_staking_proposer(
            validator_key.address,
            &ok_header,
            &parent.header,
            &group,
        )
        .unwrap();
}

#[test]
fn staking_rewards_flow_from_the_pool() {
    let Fixture { mut chain, authority_key, validator_key, validator_endorsor } =
        transition_fixture();
    let poa_keys = vec![authority_key.clone()];
    let user = validator_endorsor.clone();

    for number in 1..=3u32 {
        let txs = if number == 3 {
            vec![chain.legacy_tx(
                &user,
                vec![Clause {
                    to: Some(*thor_consensus::builtin::STAKER_CONTRACT),
                    value: U256::ZERO,
                    data: add_validation_data(
                        validator_key.address,
                        30,
                        min_validator_stake(),
                    ),
                }],
            )]
        } else {
            vec![]
        };
        chain.mint_block(&poa_keys, txs).unwrap();
    }
    let all_keys = vec![authority_key.clone(), validator_key.clone()];
    chain.mint_block(&all_keys, vec![]).unwrap();

    // a fee-paying transfer under staking feeds the pool, which the block
    // drains to beneficiary and validator
    let tx = chain.transfer_tx(&user, Address::with_last_byte(0x66), 1);
    let (block, receipts) = chain.mint_block(&all_keys, vec![tx]).unwrap();
    assert!(!receipts[0].reverted);
    assert!(receipts[0].paid > U256::ZERO);

    let state = chain.stater.new_state(chain.best.header.state_root).unwrap();
    let pool = energy::get(
        &state,
        &thor_consensus::builtin::STAKER_CONTRACT,
        block.header.timestamp,
    )
    .unwrap();
    assert_eq!(pool, U256::ZERO);

    // the signer doubles as beneficiary here, so the whole fee lands with it
    let validator_energy =
        energy::get(&state, &validator_key.address, block.header.timestamp).unwrap();
    assert_eq!(validator_energy, receipts[0].paid);
}

#[test]
fn queued_stake_backs_the_endorsement_during_the_window() {
    // an authority whose endorsor moves its whole balance into the staker
    // queue keeps proposing through the transition window
    let authority_key = TestKey::random();
    let spec = ChainSpec {
        forks: ForkConfig {
            hayabusa: 2,
            hayabusa_tp: 5,
            ..Default::default()
        },
        ..ChainSpec::dev()
    };

    let authority_setup = authority_key.clone();
    let endorsor = TestKey::random();
    let endorsor_setup = endorsor.clone();
    let mut chain = TestChain::new(spec, move |state| {
        params::set(state, *params::KEY_PROPOSER_ENDORSEMENT, min_validator_stake()).unwrap();
        TestChain::fund(state, &ChainSpec::dev(), endorsor_setup.address, 25_000_000);
        authority::add(state, authority_setup.address, endorsor_setup.address, B256::ZERO)
            .unwrap();
    });

    let keys = vec![authority_key.clone()];
    chain.mint_block(&keys, vec![]).unwrap();

    // the endorsor queues everything as stake at block 2, inside the window
    let queue_tx = chain.legacy_tx(
        &endorsor,
        vec![Clause {
            to: Some(*thor_consensus::builtin::STAKER_CONTRACT),
            value: U256::ZERO,
            data: add_validation_data(
                Address::with_last_byte(0x42),
                30,
                min_validator_stake(),
            ),
        }],
    );
    let (_, receipts) = chain.mint_block(&keys, vec![queue_tx]).unwrap();
    assert!(!receipts[0].reverted);

    {
        let state = chain.stater.new_state(chain.best.header.state_root).unwrap();
        assert_eq!(state.balance(&endorsor.address).unwrap(), U256::ZERO);
    }

    // blocks 3..6 sit inside the window (hayabusa 2 + tp 5 = end 7): the
    // queued stake keeps the endorsement alive
    for _ in 0..4 {
        chain.mint_block(&keys, vec![]).unwrap();
    }
    assert_eq!(chain.best.header.number, 6);
}

#[test]
fn rewards_pay_the_validation_beneficiary_when_set() {
    // direct unit-style check against builtin state, no chain needed
    let stater = thor_provider::MemoryStater::new();
    let mut state = stater.new_state(stater.empty_root()).unwrap();

    let master = Address::with_last_byte(1);
    let reward_to = Address::with_last_byte(2);
    let endorsor = Address::with_last_byte(3);
    state.set_balance(endorsor, min_validator_stake()).unwrap();
    staker::add_validation(
        &mut state,
        master,
        endorsor,
        Some(reward_to),
        30,
        min_validator_stake(),
    )
    .unwrap();
    staker::transition(&mut state, 0).unwrap();

    energy::add(
        &mut state,
        &thor_consensus::builtin::STAKER_CONTRACT,
        100,
        U256::from(VET),
    )
    .unwrap();
    energy::distribute_rewards(&mut state, Address::with_last_byte(9), master, 100).unwrap();

    // 30% to the block beneficiary, the rest to the validation's beneficiary
    let beneficiary_share = energy::get(&state, &Address::with_last_byte(9), 100).unwrap();
    let validator_share = energy::get(&state, &reward_to, 100).unwrap();
    assert_eq!(beneficiary_share, U256::from(VET) * U256::from(3u64) / U256::from(10u64));
    assert_eq!(beneficiary_share + validator_share, U256::from(VET));
}
