//! Test utilities: an in-memory utility layer and cluster builders.
//!
//! Used by this crate's unit tests and by the simulation crate's
//! protocol tests. Nothing here is wired into production paths.

use crate::{
    ConsensusConfig, ConsensusState, RoundRobinElection, UtilityError, UtilityProvider,
};
use meridian_types::{
    Address, Block, BlockHeight, Hash, KeyPair, Validator, ValidatorId, ValidatorSet,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A shared view of a node's committed chain, observable from tests
/// while the engine owns the utility box.
#[derive(Debug, Clone, Default)]
pub struct SharedLedger {
    inner: Arc<Mutex<Vec<Block>>>,
}

impl SharedLedger {
    pub fn committed(&self) -> Vec<Block> {
        self.inner.lock().expect("ledger lock").clone()
    }

    pub fn height(&self) -> u64 {
        self.committed().last().map(|b| b.header.height.0).unwrap_or(0)
    }

    fn push(&self, block: Block) {
        self.inner.lock().expect("ledger lock").push(block);
    }
}

/// Failure injection switches, shared so tests keep a handle after the
/// utility is boxed into the engine.
#[derive(Debug, Default)]
pub struct FailureKnobs {
    /// Fail the next `apply_block` call (then reset).
    pub fail_next_apply: AtomicBool,
    /// Fail the next `commit_block` call (then reset).
    pub fail_next_commit: AtomicBool,
}

/// Deterministic in-memory utility layer.
///
/// All nodes derive the same application hash for the same inputs, so
/// a cluster of `MockUtility`s agrees the way real replicated state
/// machines do.
#[derive(Debug, Default)]
pub struct MockUtility {
    ledger: SharedLedger,
    context_height: Option<BlockHeight>,
    knobs: Arc<FailureKnobs>,
}

impl MockUtility {
    pub fn new(ledger: SharedLedger) -> Self {
        Self {
            ledger,
            ..Default::default()
        }
    }

    pub fn with_knobs(mut self, knobs: Arc<FailureKnobs>) -> Self {
        self.knobs = knobs;
        self
    }

    /// Compute the application hash this utility derives for a block's
    /// inputs, for building expected blocks in tests.
    pub fn expected_app_hash(
        height: BlockHeight,
        proposer: Address,
        transactions: &[Vec<u8>],
    ) -> Hash {
        let mut preimage = Vec::new();
        preimage.extend_from_slice(&height.0.to_le_bytes());
        preimage.extend_from_slice(proposer.as_bytes());
        for tx in transactions {
            preimage.extend_from_slice(tx);
        }
        Hash::from_bytes(&preimage)
    }
}

impl UtilityProvider for MockUtility {
    fn refresh_context(&mut self, height: BlockHeight) -> Result<(), UtilityError> {
        self.context_height = Some(height);
        Ok(())
    }

    fn get_proposal_transactions(
        &mut self,
        proposer: Address,
        _max_tx_bytes: u64,
        _byzantine: &[Address],
    ) -> Result<Vec<Vec<u8>>, UtilityError> {
        let height = self
            .context_height
            .ok_or_else(|| UtilityError("no block-building context".into()))?;
        Ok(vec![
            format!("tx/{height}/{proposer}/0").into_bytes(),
            format!("tx/{height}/{proposer}/1").into_bytes(),
        ])
    }

    fn apply_block(
        &mut self,
        height: BlockHeight,
        proposer: Address,
        transactions: &[Vec<u8>],
        _byzantine: &[Address],
    ) -> Result<Hash, UtilityError> {
        if self.knobs.fail_next_apply.swap(false, Ordering::SeqCst) {
            return Err(UtilityError("injected apply failure".into()));
        }
        Ok(Self::expected_app_hash(height, proposer, transactions))
    }

    fn commit_block(&mut self, block: &Block) -> Result<(), UtilityError> {
        if self.knobs.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(UtilityError("injected commit failure".into()));
        }
        self.ledger.push(block.clone());
        Ok(())
    }

    fn validate_block_basic(&self, block: &Block) -> Result<(), UtilityError> {
        block
            .validate_basic()
            .map_err(|e| UtilityError(e.to_string()))
    }
}

/// Deterministic keypairs and validator set for an `n`-node cluster.
/// Ids are 1-based; id 0 is the "no leader" sentinel.
pub fn cluster_keys(n: u8) -> (Vec<KeyPair>, Arc<ValidatorSet>) {
    let keys: Vec<KeyPair> = (0..n).map(|i| KeyPair::from_seed([i; 32])).collect();
    let validators = keys
        .iter()
        .enumerate()
        .map(|(i, k)| Validator {
            id: ValidatorId(i as u64 + 1),
            address: k.address(),
            public_key: k.public_key(),
        })
        .collect();
    (keys, Arc::new(ValidatorSet::new(validators)))
}

/// Build one node of a test cluster.
pub fn test_node(
    index: usize,
    keys: &[KeyPair],
    validators: &Arc<ValidatorSet>,
    config: ConsensusConfig,
) -> (ConsensusState, SharedLedger) {
    let ledger = SharedLedger::default();
    let state = ConsensusState::new(
        keys[index].clone(),
        validators.clone(),
        Box::new(MockUtility::new(ledger.clone())),
        Box::new(RoundRobinElection::new(validators)),
        config,
    )
    .expect("test key is in the validator set");
    (state, ledger)
}

/// Build one node with a handle to its failure-injection knobs.
pub fn test_node_with_knobs(
    index: usize,
    keys: &[KeyPair],
    validators: &Arc<ValidatorSet>,
    config: ConsensusConfig,
) -> (ConsensusState, SharedLedger, Arc<FailureKnobs>) {
    let ledger = SharedLedger::default();
    let knobs = Arc::new(FailureKnobs::default());
    let state = ConsensusState::new(
        keys[index].clone(),
        validators.clone(),
        Box::new(MockUtility::new(ledger.clone()).with_knobs(knobs.clone())),
        Box::new(RoundRobinElection::new(validators)),
        config,
    )
    .expect("test key is in the validator set");
    (state, ledger, knobs)
}

/// Build a full test cluster with default config.
pub fn test_cluster(n: u8) -> (Vec<ConsensusState>, Vec<SharedLedger>) {
    let (keys, validators) = cluster_keys(n);
    let mut states = Vec::new();
    let mut ledgers = Vec::new();
    for i in 0..n as usize {
        let (state, ledger) = test_node(i, &keys, &validators, ConsensusConfig::default());
        states.push(state);
        ledgers.push(ledger);
    }
    (states, ledgers)
}
