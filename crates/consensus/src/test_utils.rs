//! Fixtures for consensus tests: a deterministic clause-transfer executor and
//! a chain harness that mints valid blocks through the real processing flow.

use crate::{
    builtin::{authority, energy, params, staker, STAKER_CONTRACT},
    leader_masters, sync_pos, CandidateSet, ConsensusError, Consensus, ProcessError, Scheduler,
    Seeder,
};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{Decodable, Encodable, RlpDecodable, RlpEncodable};
use secp256k1::{rand, SecretKey, SECP256K1};
use std::sync::Arc;
use thor_chainspec::{ChainSpec, MIN_GAS_LIMIT, VET};
use thor_primitives::{
    proofs, public_key_to_address, sign_hash, vrf, Block, BlockSummary, Clause, Header,
    LegacyTransaction, Output, Receipt, Transaction, TransactionSigned, Transfer,
};
use thor_provider::{
    BlockContext, ExecutorError, MemoryBlockStore, MemoryState, MemoryStater, Stage, StageVersion,
    State, Stater, TransactionExecutor,
};

/// Default energy price per unit of gas when the parameter is unset.
const DEFAULT_BASE_GAS_PRICE: u64 = 1_000_000_000_000_000;
/// Default reward ratio: 30%, 1e18-scaled.
const DEFAULT_REWARD_RATIO: u64 = 300_000_000_000_000_000;

/// A test identity.
#[derive(Debug, Clone)]
pub struct TestKey {
    pub secret: SecretKey,
    pub address: Address,
}

impl TestKey {
    pub fn random() -> Self {
        let (secret, public) = SECP256K1.generate_keypair(&mut rand::thread_rng());
        Self { secret, address: public_key_to_address(&public) }
    }
}

/// Payload of a staker `addValidation` native call.
#[derive(Debug, RlpEncodable, RlpDecodable)]
struct AddValidationCall {
    master: Address,
    period: u32,
    stake: U256,
}

const ADD_VALIDATION_PREFIX: &[u8] = b"addValidation:";
const EMIT_PREFIX: &[u8] = b"emit:";

/// Clause data invoking the staker contract's `addValidation` with the
/// clause origin as endorsor.
pub fn add_validation_data(master: Address, period: u32, stake: U256) -> Bytes {
    let mut out = ADD_VALIDATION_PREFIX.to_vec();
    AddValidationCall { master, period, stake }.encode(&mut out);
    Bytes::from(out)
}

/// Clause data making the executor emit an event from the clause target with
/// the given topic name. Used to drive cache-invalidation paths.
pub fn emit_event_data(topic: &str) -> Bytes {
    let mut out = EMIT_PREFIX.to_vec();
    out.extend_from_slice(topic.as_bytes());
    Bytes::from(out)
}

/// A deterministic stand-in for the EVM runtime.
///
/// Charges intrinsic gas, moves clause VET values, interprets two native
/// conventions (`addValidation:` on the staker contract and `emit:` on any
/// target) and routes fees: to the staker pool while staking is active, as a
/// beneficiary reward before.
#[derive(Debug, Default, Clone)]
pub struct NativeExecutor;

impl NativeExecutor {
    fn gas_price<S: State>(
        &self,
        state: &S,
        ctx: &BlockContext,
        tx: &Transaction,
    ) -> Result<U256, ExecutorError> {
        match ctx.base_fee {
            Some(base_fee) => {
                let priority = tx.effective_priority_fee(base_fee as u128).unwrap_or(0);
                Ok(U256::from(base_fee) + U256::from(priority))
            }
            None => {
                let base = params::get(state, &params::KEY_BASE_GAS_PRICE)?
                    .unwrap_or_else(|| U256::from(DEFAULT_BASE_GAS_PRICE));
                Ok(tx.gas_price(base))
            }
        }
    }
}

impl TransactionExecutor<MemoryState> for NativeExecutor {
    fn execute_transaction(
        &self,
        state: &mut MemoryState,
        ctx: &BlockContext,
        tx: &TransactionSigned,
    ) -> Result<Receipt, ExecutorError> {
        let origin = tx
            .origin()
            .map_err(|err| ExecutorError::BadSignature(err.to_string()))?;
        let gas_payer = tx
            .gas_payer()
            .map_err(|err| ExecutorError::BadSignature(err.to_string()))?;

        let gas_used = tx.transaction.intrinsic_gas();
        if gas_used > tx.transaction.gas() {
            return Err(ExecutorError::IntrinsicGasExceeded {
                intrinsic: gas_used,
                provided: tx.transaction.gas(),
            });
        }

        let price = self.gas_price(state, ctx, &tx.transaction)?;
        let paid = price * U256::from(gas_used);
        if !energy::sub(state, &gas_payer, ctx.timestamp, paid)? {
            return Err(ExecutorError::InsufficientEnergy { payer: gas_payer });
        }

        let ratio = params::get(state, &params::KEY_REWARD_RATIO)?
            .unwrap_or_else(|| U256::from(DEFAULT_REWARD_RATIO));
        let reward = paid * ratio / U256::from(VET);
        if staker::is_active(state)? {
            // fees feed the staker reward pool, paid out after each block
            energy::add(state, &STAKER_CONTRACT, ctx.timestamp, paid)?;
        } else {
            energy::add(state, &ctx.beneficiary, ctx.timestamp, reward)?;
        }

        let mut outputs = Vec::with_capacity(tx.transaction.clauses().len());
        let mut reverted = false;

        for clause in tx.transaction.clauses() {
            let mut output = Output::default();

            if !clause.value.is_zero() {
                let Some(to) = clause.to else { continue };
                let from_balance = state.balance(&origin)?;
                if from_balance < clause.value {
                    reverted = true;
                    break;
                }
                state.set_balance(origin, from_balance - clause.value)?;
                let to_balance = state.balance(&to)?;
                state.set_balance(to, to_balance + clause.value)?;
                output.transfers.push(Transfer {
                    sender: origin,
                    recipient: to,
                    amount: clause.value,
                });
            }

            if let Some(to) = clause.to {
                if to == *STAKER_CONTRACT && clause.data.starts_with(ADD_VALIDATION_PREFIX) {
                    let mut raw = &clause.data[ADD_VALIDATION_PREFIX.len()..];
                    let call = AddValidationCall::decode(&mut raw).map_err(|err| {
                        ExecutorError::BadSignature(format!("bad native call: {err}"))
                    })?;
                    if staker::add_validation(
                        state,
                        call.master,
                        origin,
                        None,
                        call.period,
                        call.stake,
                    )? {
                        output.events.push(thor_primitives::Event {
                            address: *STAKER_CONTRACT,
                            topics: vec![keccak256(b"ValidationQueued"), call.master.into_word()],
                            data: Bytes::new(),
                        });
                    } else {
                        reverted = true;
                        break;
                    }
                } else if clause.data.starts_with(EMIT_PREFIX) {
                    output.events.push(thor_primitives::Event {
                        address: to,
                        topics: vec![keccak256(&clause.data[EMIT_PREFIX.len()..])],
                        data: Bytes::new(),
                    });
                }
            }

            outputs.push(output);
        }

        if reverted {
            outputs.clear();
        }

        Ok(Receipt { gas_used, gas_payer, paid, reward, reverted, outputs })
    }
}

/// A self-contained chain: spec, stores, consensus engine and minting.
pub struct TestChain {
    pub spec: Arc<ChainSpec>,
    pub store: Arc<MemoryBlockStore>,
    pub stater: Arc<MemoryStater>,
    pub consensus: Consensus<MemoryBlockStore, MemoryStater, NativeExecutor>,
    seeder: Seeder,
    pub best: BlockSummary,
}

impl TestChain {
    /// Builds a chain with a genesis whose state is seeded by `setup`.
    pub fn new(mut spec: ChainSpec, setup: impl FnOnce(&mut MemoryState)) -> Self {
        let stater = Arc::new(MemoryStater::new());
        let store = Arc::new(MemoryBlockStore::new());

        let mut genesis_state = stater.new_state(stater.empty_root()).unwrap();
        setup(&mut genesis_state);
        let stage = genesis_state.stage(StageVersion::default()).unwrap();
        let state_root = stage.commit().unwrap();

        let genesis_key = TestKey::random();
        let mut genesis_header = Header {
            number: 0,
            timestamp: spec.genesis_timestamp,
            gas_limit: MIN_GAS_LIMIT,
            beneficiary: genesis_key.address,
            txs_root: proofs::calculate_txs_root(&[]),
            receipts_root: proofs::calculate_receipts_root(&[]),
            state_root,
            total_score: 0,
            ..Default::default()
        };
        genesis_header.signature =
            Bytes::from(sign_hash(&genesis_header.signing_hash(), &genesis_key.secret).to_vec());

        let genesis = Block::new(genesis_header, Vec::new());
        store.insert_block(&genesis, &[]).unwrap();
        let best = genesis.summarize().unwrap();
        spec.genesis_id = best.id;

        let spec = Arc::new(spec);
        let consensus =
            Consensus::new(spec.clone(), store.clone(), stater.clone(), NativeExecutor);

        Self { spec, store, stater, consensus, seeder: Seeder::new(), best }
    }

    /// Funds an account with VET and pins its energy accrual clock.
    pub fn fund(state: &mut MemoryState, spec: &ChainSpec, address: Address, vet: u64) {
        state.set_balance(address, U256::from(vet) * U256::from(VET)).unwrap();
        energy::add(
            state,
            &address,
            spec.genesis_timestamp,
            U256::from(vet) * U256::from(VET),
        )
        .unwrap();
    }

    /// A signed legacy transfer referencing the current best block.
    pub fn transfer_tx(&self, key: &TestKey, to: Address, vet: u64) -> TransactionSigned {
        self.legacy_tx(key, vec![Clause {
            to: Some(to),
            value: U256::from(vet) * U256::from(VET),
            data: Bytes::new(),
        }])
    }

    /// A signed legacy transaction carrying the given clauses.
    pub fn legacy_tx(&self, key: &TestKey, clauses: Vec<Clause>) -> TransactionSigned {
        self.legacy_tx_with(key, clauses, |_| {})
    }

    /// A signed legacy transaction with body tweaks applied before signing.
    pub fn legacy_tx_with(
        &self,
        key: &TestKey,
        clauses: Vec<Clause>,
        tweak: impl FnOnce(&mut LegacyTransaction),
    ) -> TransactionSigned {
        let mut body = LegacyTransaction {
            chain_tag: self.spec.chain_tag,
            block_ref: thor_primitives::block_ref_of(&self.best.id),
            expiration: 720,
            clauses,
            gas: 1_000_000,
            nonce: rand::random(),
            ..Default::default()
        };
        tweak(&mut body);
        thor_primitives::sign_transaction(Transaction::Legacy(body), &key.secret, None).unwrap()
    }

    /// Finds the key scheduled next among `keys` and mints a block carrying
    /// `txs` through the full processing flow. Returns the sealed block and
    /// its receipts.
    pub fn mint_block(
        &mut self,
        keys: &[TestKey],
        txs: Vec<TransactionSigned>,
    ) -> Result<(Block, Vec<Receipt>), ProcessError> {
        let parent = self.best.clone();
        let parent_header = &parent.header;

        // replicate the processing flow on a scratch state to derive the
        // schedule and the roots
        let mut state = self.stater.new_state(parent_header.state_root)?;
        let number = parent_header.number + 1;
        let pos = sync_pos(&mut state, number, &self.spec)?;

        let (signer, timestamp, score, updates) = if pos.active {
            let group = match &pos.leader_group {
                Some(group) => group.clone(),
                None => staker::leader_group(&state)?,
            };
            let masters = leader_masters(&group);
            let mut picked = None;
            for key in keys {
                if let Some(sched) = Scheduler::new_staking(
                    key.address,
                    &masters,
                    self.spec.genesis_timestamp,
                    parent_header.timestamp,
                ) {
                    let slot = sched.schedule(parent_header.timestamp).unwrap();
                    let (_, score) = sched.updates(slot);
                    match picked {
                        Some((_, best_slot, _, _)) if best_slot <= slot => {}
                        _ => picked = Some((key, slot, score, Vec::new())),
                    }
                }
            }
            picked.ok_or(ConsensusError::SignerInvalid { signer: Address::ZERO })?
        } else {
            let mut set = CandidateSet::new(authority::all_candidates(&state)?);
            let proposers = set.pick_proposers(&state, &self.spec, number)?.to_vec();
            let mut picked = None;
            for key in keys {
                let sched = if self.spec.forks.is_vip214_active_at_block(number) {
                    let seed = self.seeder.generate(self.store.as_ref(), &parent.id)?;
                    Scheduler::new_v2(key.address, &proposers, seed, parent_header.timestamp)
                } else {
                    Scheduler::new_v1(
                        key.address,
                        &proposers,
                        parent_header.number,
                        parent_header.timestamp,
                    )
                };
                let Some(sched) = sched else { continue };
                let Some(slot) = sched.schedule(parent_header.timestamp) else { continue };
                let (updates, score) = sched.updates(slot);
                match picked {
                    Some((_, best_slot, _, _)) if best_slot <= slot => {}
                    _ => picked = Some((key, slot, score, updates)),
                }
            }
            picked.ok_or(ConsensusError::SignerInvalid { signer: Address::ZERO })?
        };

        for (address, active) in &updates {
            authority::update(&mut state, address, *active)?;
        }
        if pos.just_activated {
            energy::stop_growth(&mut state, timestamp)?;
        }

        let ctx = BlockContext {
            beneficiary: signer.address,
            signer: signer.address,
            number,
            timestamp,
            gas_limit: parent_header.gas_limit,
            total_score: parent_header.total_score + score,
            base_fee: self
                .spec
                .forks
                .is_galactica_active_at_block(number)
                .then(|| crate::calc_base_fee(parent_header, &self.spec)),
        };

        let mut receipts = Vec::with_capacity(txs.len());
        let mut gas_used = 0;
        for tx in &txs {
            let receipt = NativeExecutor.execute_transaction(&mut state, &ctx, tx)?;
            gas_used += receipt.gas_used;
            receipts.push(receipt);
        }
        if pos.active {
            energy::distribute_rewards(&mut state, ctx.beneficiary, ctx.signer, timestamp)?;
        }
        let state_root =
            state.stage(StageVersion { major: number, minor: 0 })?.hash();

        let mut header = Header {
            parent_id: parent.id,
            number,
            timestamp,
            gas_limit: ctx.gas_limit,
            beneficiary: ctx.beneficiary,
            gas_used,
            total_score: ctx.total_score,
            txs_root: proofs::calculate_txs_root(&txs),
            txs_features: self.spec.txs_features,
            state_root,
            receipts_root: proofs::calculate_receipts_root(&receipts),
            base_fee_per_gas: ctx.base_fee,
            ..Default::default()
        };

        if self.spec.forks.is_vip214_active_at_block(number) {
            header.alpha = match parent_header.beta().map_err(|err| {
                ProcessError::Consensus(ConsensusError::VrfInvalid(err.to_string()))
            })? {
                Some(beta) => Bytes::copy_from_slice(beta.as_slice()),
                None => Bytes::copy_from_slice(parent_header.state_root.as_slice()),
            };
            let mut sig = sign_hash(&header.signing_hash(), &signer.secret).to_vec();
            sig.extend_from_slice(&vrf::prove(&header.alpha, &signer.secret));
            header.signature = Bytes::from(sig);
        } else {
            header.signature =
                Bytes::from(sign_hash(&header.signing_hash(), &signer.secret).to_vec());
        }

        let block = Block::new(header, txs);

        // run the real thing and adopt the block
        let (stage, receipts) = self.consensus.process(&parent, &block, timestamp, 0)?;
        stage.commit()?;
        self.store.insert_block(&block, &receipts)?;
        self.best = block.summarize().unwrap();
        Ok((block, receipts))
    }
}

impl std::fmt::Debug for TestChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestChain").field("best", &self.best.id).finish_non_exhaustive()
    }
}
