//! Protocol unit tests: the engine driven message by message.

use crate::testonly::{cluster_keys, test_cluster, test_node, test_node_with_knobs, MockUtility};
use crate::{ConsensusConfig, ConsensusState, Role};
use meridian_core::{Action, Event, StateMachine, TimerId};
use meridian_messages::HotstuffMessage;
use meridian_types::{
    signable_bytes, Address, Block, BlockHeader, BlockHeight, Hash, HotstuffStep, KeyPair,
    MessageType, PartialSignature, QuorumCertificate, Signature, ThresholdSignature,
};
use std::sync::atomic::Ordering;
use std::time::Duration;

const H1: BlockHeight = BlockHeight(1);

fn deliver(node: &mut ConsensusState, message: HotstuffMessage) -> Vec<Action> {
    node.handle(Event::MessageReceived {
        message: Box::new(message),
    })
}

fn broadcasts(actions: &[Action]) -> Vec<HotstuffMessage> {
    actions
        .iter()
        .filter_map(|a| match a {
            Action::Broadcast { message } => Some((**message).clone()),
            _ => None,
        })
        .collect()
}

fn sends(actions: &[Action]) -> Vec<(Address, HotstuffMessage)> {
    actions
        .iter()
        .filter_map(|a| match a {
            Action::Send { to, message } => Some((*to, (**message).clone())),
            _ => None,
        })
        .collect()
}

fn committed_heights(actions: &[Action]) -> Vec<BlockHeight> {
    actions
        .iter()
        .filter_map(|a| match a {
            Action::EmitCommitted { height, .. } => Some(*height),
            _ => None,
        })
        .collect()
}

/// Build a valid certificate signed by the first `signers` keys.
fn make_qc(
    keys: &[KeyPair],
    signers: usize,
    step: HotstuffStep,
    round: u64,
    block: &Block,
) -> QuorumCertificate {
    let payload = signable_bytes(
        MessageType::Vote,
        block.header.height,
        step,
        round,
        Some(block.hash()),
    );
    let partials = keys[..signers]
        .iter()
        .map(|k| PartialSignature {
            address: k.address(),
            signature: k.sign(&payload),
        })
        .collect();
    QuorumCertificate {
        height: block.header.height,
        step,
        round,
        block: block.clone(),
        threshold_signature: ThresholdSignature::aggregate(partials),
    }
}

/// A block as the utility layer would build it for `proposer`.
fn utility_block(proposer: &KeyPair, height: BlockHeight, transactions: Vec<Vec<u8>>) -> Block {
    Block::new(
        BlockHeader {
            height,
            app_hash: MockUtility::expected_app_hash(height, proposer.address(), &transactions),
            prev_block_hash: Hash::ZERO,
            proposer: proposer.address(),
            tx_count: transactions.len() as u32,
        },
        transactions,
    )
}

// With ids [1, 2, 3, 4], round-robin for (height 1, round 0) picks
// ids[(1 + 0) % 4] = id 2, which is node index 1.
const LEADER: usize = 1;

#[test]
fn round_robin_makes_node1_leader_at_height1() {
    let (mut nodes, _) = test_cluster(4);
    for node in &mut nodes {
        node.start();
    }
    assert_eq!(nodes[LEADER].role(), Role::Leader);
    for i in [0, 2, 3] {
        assert_eq!(nodes[i].role(), Role::Replica);
    }
}

#[test]
fn happy_path_commits_the_same_block_everywhere() {
    let (mut nodes, ledgers) = test_cluster(4);

    // Start everyone; replicas emit NewRound votes bound for the leader.
    let mut new_round_votes = Vec::new();
    for node in &mut nodes {
        for (_, message) in sends(&node.start()) {
            new_round_votes.push(message);
        }
    }
    assert_eq!(new_round_votes.len(), 3);

    // Two external votes plus the leader's own cross the threshold.
    let actions = deliver(&mut nodes[LEADER], new_round_votes[0].clone());
    assert!(broadcasts(&actions).is_empty());
    let actions = deliver(&mut nodes[LEADER], new_round_votes[1].clone());
    let proposal = broadcasts(&actions).pop().expect("Prepare proposal");
    assert_eq!(proposal.step, HotstuffStep::Prepare);
    assert_eq!(nodes[LEADER].step(), HotstuffStep::Prepare);
    // The consumed slot is cleared on the transition.
    assert_eq!(nodes[LEADER].pool().count(HotstuffStep::NewRound), 0);

    let mut proposal = proposal;
    while proposal.step != HotstuffStep::Decide {
        // Fan the proposal out to the replicas and gather their votes.
        let mut votes = Vec::new();
        for i in [0, 2, 3] {
            for (to, message) in sends(&deliver(&mut nodes[i], proposal.clone())) {
                if message.is_vote() && message.step == proposal.step {
                    assert_eq!(to, nodes[LEADER].address());
                    votes.push(message);
                }
            }
            assert_eq!(nodes[i].step(), proposal.step);
        }
        assert_eq!(votes.len(), 3);

        // Two of them reach quorum together with the leader's own vote.
        let consumed = proposal.step;
        deliver(&mut nodes[LEADER], votes[0].clone());
        let actions = deliver(&mut nodes[LEADER], votes[1].clone());
        proposal = broadcasts(&actions).pop().expect("next proposal");
        assert_eq!(nodes[LEADER].pool().count(consumed), 0);

        if proposal.step == HotstuffStep::Decide {
            // The leader commits immediately after broadcasting Decide.
            assert_eq!(committed_heights(&actions), vec![H1]);
            assert_eq!(nodes[LEADER].height(), BlockHeight(2));
        }
    }

    // The Decide proposal is terminal: replicas commit and advance, no
    // votes are cast.
    for i in [0, 2, 3] {
        let actions = deliver(&mut nodes[i], proposal.clone());
        assert_eq!(committed_heights(&actions), vec![H1]);
        assert_eq!(nodes[i].height(), BlockHeight(2));
    }

    // Safety: every node committed the same block at height 1.
    let reference = ledgers[LEADER].committed();
    assert_eq!(reference.len(), 1);
    for ledger in &ledgers {
        let committed = ledger.committed();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].hash(), reference[0].hash());
    }

    // Replicas have stepped to height 2 as well.
    for node in &nodes {
        assert_eq!(node.height(), BlockHeight(2));
        assert_eq!(node.step(), HotstuffStep::NewRound);
    }
}

#[test]
fn certificates_meet_the_threshold_and_validate() {
    let (keys, validators) = cluster_keys(4);
    let (mut leader, _) = test_node(LEADER, &keys, &validators, ConsensusConfig::default());
    leader.start();

    for i in [0, 2] {
        deliver(
            &mut leader,
            HotstuffMessage::vote(H1, 0, HotstuffStep::NewRound, None, &keys[i]),
        );
    }
    // The leader self-voted for its proposal; read the block back from
    // the pool.
    let block = leader
        .pool()
        .messages(HotstuffStep::Prepare)
        .first()
        .and_then(|m| m.block.clone())
        .expect("leader voted for its own proposal");

    // Drive Prepare votes from two replicas; with the leader's own that
    // builds the PrepareQC.
    for i in [0, 2] {
        deliver(
            &mut leader,
            HotstuffMessage::vote(H1, 0, HotstuffStep::Prepare, Some(block.clone()), &keys[i]),
        );
    }
    let qc = leader.high_prepare_qc().expect("PrepareQC formed").clone();
    assert_eq!(qc.step, HotstuffStep::Prepare);
    assert!(qc.threshold_signature.len() >= 3);
    assert_eq!(qc.validate(&validators), Ok(()));
}

#[test]
fn duplicate_votes_do_not_cross_the_threshold() {
    let (keys, validators) = cluster_keys(4);
    let (mut leader, _) = test_node(LEADER, &keys, &validators, ConsensusConfig::default());
    leader.start();
    assert_eq!(leader.pool().count(HotstuffStep::NewRound), 1);

    let vote = HotstuffMessage::vote(H1, 0, HotstuffStep::NewRound, None, &keys[0]);
    for _ in 0..1000 {
        deliver(&mut leader, vote.clone());
    }
    // Own vote plus one distinct external: still below quorum.
    assert_eq!(leader.pool().count(HotstuffStep::NewRound), 2);
    assert_eq!(leader.step(), HotstuffStep::NewRound);
}

#[test]
fn byzantine_signature_is_rejected_but_quorum_still_forms() {
    let (keys, validators) = cluster_keys(4);
    let (mut leader, _) = test_node(LEADER, &keys, &validators, ConsensusConfig::default());
    leader.start();

    // A vote whose content was tampered with after signing.
    let mut forged = HotstuffMessage::vote(H1, 0, HotstuffStep::NewRound, None, &keys[3]);
    if let Some(partial) = forged.partial_signature.as_mut() {
        partial.signature = Signature::zero();
    }
    deliver(&mut leader, forged);
    assert_eq!(leader.pool().count(HotstuffStep::NewRound), 1);

    // Three honest signers (the leader included) still reach quorum.
    deliver(
        &mut leader,
        HotstuffMessage::vote(H1, 0, HotstuffStep::NewRound, None, &keys[0]),
    );
    let actions = deliver(
        &mut leader,
        HotstuffMessage::vote(H1, 0, HotstuffStep::NewRound, None, &keys[2]),
    );
    assert!(!broadcasts(&actions).is_empty());
    assert_eq!(leader.step(), HotstuffStep::Prepare);
}

#[test]
fn outsider_vote_is_rejected() {
    let (keys, validators) = cluster_keys(4);
    let (mut leader, _) = test_node(LEADER, &keys, &validators, ConsensusConfig::default());
    leader.start();

    let outsider = KeyPair::from_seed([77; 32]);
    deliver(
        &mut leader,
        HotstuffMessage::vote(H1, 0, HotstuffStep::NewRound, None, &outsider),
    );
    assert_eq!(leader.pool().count(HotstuffStep::NewRound), 1);
}

#[test]
fn out_of_phase_votes_are_dropped_not_replayed() {
    let (keys, validators) = cluster_keys(4);
    let (mut leader, _) = test_node(LEADER, &keys, &validators, ConsensusConfig::default());
    leader.start();

    // Wrong round.
    deliver(
        &mut leader,
        HotstuffMessage::vote(H1, 3, HotstuffStep::NewRound, None, &keys[0]),
    );
    // Wrong height.
    deliver(
        &mut leader,
        HotstuffMessage::vote(BlockHeight(9), 0, HotstuffStep::NewRound, None, &keys[0]),
    );
    // Wrong (future) step.
    deliver(
        &mut leader,
        HotstuffMessage::vote(H1, 0, HotstuffStep::Prepare, None, &keys[0]),
    );
    assert_eq!(leader.pool().count(HotstuffStep::NewRound), 1);
    assert_eq!(leader.pool().count(HotstuffStep::Prepare), 0);
}

#[test]
fn timeout_interrupts_the_round_with_backoff() {
    let (keys, validators) = cluster_keys(4);
    let (mut node, _) = test_node(0, &keys, &validators, ConsensusConfig::default());
    node.start();
    assert_eq!(node.round(), 0);

    let actions = node.handle(Event::PacemakerTimeout);
    assert_eq!(node.round(), 1);
    assert_eq!(node.step(), HotstuffStep::NewRound);
    assert!(node.pool().is_empty());

    // The new leader for (1, 1) is id 3 = node index 2.
    let votes = sends(&actions);
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].0, keys[2].address());

    // Exponential back-off doubled the timeout.
    let base = ConsensusConfig::default().pacemaker_base_timeout;
    let timer = actions.iter().find_map(|a| match a {
        Action::SetTimer {
            id: TimerId::Pacemaker,
            duration,
        } => Some(*duration),
        _ => None,
    });
    assert_eq!(timer, Some(base * 2));
}

#[test]
fn replica_enforces_the_safe_extension_rule() {
    let (keys, validators) = cluster_keys(4);
    let (mut replica, _) = test_node(0, &keys, &validators, ConsensusConfig::default());
    replica.start();

    // Lock the replica on block X at this height.
    let x = utility_block(&keys[LEADER], H1, vec![b"payload-x".to_vec()]);
    replica.locked_qc = Some(make_qc(&keys, 3, HotstuffStep::PreCommit, 0, &x));

    // A different block Y with a nil justify must be rejected.
    let y = utility_block(&keys[LEADER], H1, vec![b"payload-y".to_vec()]);
    let proposal = HotstuffMessage::propose(H1, 0, HotstuffStep::Prepare, y, None).unwrap();
    let actions = deliver(&mut replica, proposal);
    assert!(sends(&actions).is_empty());
    assert_eq!(replica.step(), HotstuffStep::NewRound);

    // Re-proposing the locked block itself is accepted.
    let proposal = HotstuffMessage::propose(H1, 0, HotstuffStep::Prepare, x, None).unwrap();
    let actions = deliver(&mut replica, proposal);
    assert_eq!(sends(&actions).len(), 1);
    assert_eq!(replica.step(), HotstuffStep::Prepare);
}

#[test]
fn replica_rejects_proposals_from_non_leaders() {
    let (keys, validators) = cluster_keys(4);
    let (mut replica, _) = test_node(0, &keys, &validators, ConsensusConfig::default());
    replica.start();

    // keys[3] is not the leader for (height 1, round 0).
    let block = utility_block(&keys[3], H1, vec![b"tx".to_vec()]);
    let proposal = HotstuffMessage::propose(H1, 0, HotstuffStep::Prepare, block, None).unwrap();
    let actions = deliver(&mut replica, proposal);
    assert!(sends(&actions).is_empty());
    assert_eq!(replica.step(), HotstuffStep::NewRound);
}

#[test]
fn replica_requires_matching_justify_for_precommit() {
    let (keys, validators) = cluster_keys(4);
    let (mut replica, _) = test_node(0, &keys, &validators, ConsensusConfig::default());
    replica.start();

    let block = utility_block(&keys[LEADER], H1, vec![b"tx".to_vec()]);
    let other = utility_block(&keys[LEADER], H1, vec![b"other".to_vec()]);

    // Justify certifies a different block: dropped.
    let wrong_block_qc = make_qc(&keys, 3, HotstuffStep::Prepare, 0, &other);
    let proposal = HotstuffMessage::propose(
        H1,
        0,
        HotstuffStep::PreCommit,
        block.clone(),
        Some(wrong_block_qc),
    )
    .unwrap();
    assert!(sends(&deliver(&mut replica, proposal)).is_empty());

    // Justify at the wrong step: dropped.
    let wrong_step_qc = make_qc(&keys, 3, HotstuffStep::PreCommit, 0, &block);
    let proposal = HotstuffMessage::propose(
        H1,
        0,
        HotstuffStep::PreCommit,
        block.clone(),
        Some(wrong_step_qc),
    )
    .unwrap();
    assert!(sends(&deliver(&mut replica, proposal)).is_empty());

    // A proper PrepareQC over the proposed block: the replica votes and
    // records it as its high prepare certificate.
    let prepare_qc = make_qc(&keys, 3, HotstuffStep::Prepare, 0, &block);
    let proposal = HotstuffMessage::propose(
        H1,
        0,
        HotstuffStep::PreCommit,
        block,
        Some(prepare_qc.clone()),
    )
    .unwrap();
    let actions = deliver(&mut replica, proposal);
    assert_eq!(sends(&actions).len(), 1);
    assert_eq!(replica.step(), HotstuffStep::PreCommit);
    assert_eq!(replica.high_prepare_qc(), Some(&prepare_qc));
}

#[test]
fn replica_locks_on_commit_justify() {
    let (keys, validators) = cluster_keys(4);
    let (mut replica, _) = test_node(0, &keys, &validators, ConsensusConfig::default());
    replica.start();

    let block = utility_block(&keys[LEADER], H1, vec![b"tx".to_vec()]);
    let precommit_qc = make_qc(&keys, 3, HotstuffStep::PreCommit, 0, &block);
    let proposal = HotstuffMessage::propose(
        H1,
        0,
        HotstuffStep::Commit,
        block,
        Some(precommit_qc.clone()),
    )
    .unwrap();
    let actions = deliver(&mut replica, proposal);
    assert_eq!(sends(&actions).len(), 1);
    assert_eq!(replica.locked_qc(), Some(&precommit_qc));
    assert_eq!(replica.step(), HotstuffStep::Commit);
}

#[test]
fn replica_commits_on_decide_and_advances_height() {
    let (keys, validators) = cluster_keys(4);
    let (mut replica, ledger) = test_node(0, &keys, &validators, ConsensusConfig::default());
    replica.start();

    let block = utility_block(&keys[LEADER], H1, vec![b"tx".to_vec()]);
    let commit_qc = make_qc(&keys, 3, HotstuffStep::Commit, 0, &block);
    let proposal =
        HotstuffMessage::propose(H1, 0, HotstuffStep::Decide, block.clone(), Some(commit_qc))
            .unwrap();
    let actions = deliver(&mut replica, proposal);

    assert_eq!(committed_heights(&actions), vec![H1]);
    assert_eq!(ledger.height(), 1);
    assert_eq!(ledger.committed()[0].hash(), block.hash());
    assert_eq!(replica.height(), BlockHeight(2));
    assert_eq!(replica.round(), 0);
    assert_eq!(replica.step(), HotstuffStep::NewRound);
    // The committed block's certificates are superseded and cleared.
    assert!(replica.locked_qc().is_none());
    assert!(replica.high_prepare_qc().is_none());
}

#[test]
fn new_leader_adopts_the_high_prepare_certificate() {
    let (keys, validators) = cluster_keys(4);
    // Node index 2 (id 3) leads (height 1, round 1).
    let (mut leader, _) = test_node(2, &keys, &validators, ConsensusConfig::default());
    leader.start();
    leader.handle(Event::PacemakerTimeout);
    assert_eq!(leader.role(), Role::Leader);
    assert_eq!(leader.round(), 1);

    // A PrepareQC formed in round 0 before the old leader died.
    let x = utility_block(&keys[LEADER], H1, vec![b"from-round-0".to_vec()]);
    let prepare_qc = make_qc(&keys, 3, HotstuffStep::Prepare, 0, &x);

    let vote = HotstuffMessage::vote(H1, 1, HotstuffStep::NewRound, None, &keys[0])
        .with_justify(Some(prepare_qc.clone()));
    deliver(&mut leader, vote);
    let vote = HotstuffMessage::vote(H1, 1, HotstuffStep::NewRound, None, &keys[3])
        .with_justify(Some(prepare_qc));
    let actions = deliver(&mut leader, vote);

    // The leader adopts X instead of reaping a fresh block.
    let proposal = broadcasts(&actions).pop().expect("Prepare proposal");
    assert_eq!(proposal.step, HotstuffStep::Prepare);
    assert_eq!(proposal.block_hash(), Some(x.hash()));
    assert!(proposal.justify_qc.is_some());
}

#[test]
fn commit_failure_interrupts_the_round() {
    let (keys, validators) = cluster_keys(4);
    let (mut leader, ledger, knobs) =
        test_node_with_knobs(LEADER, &keys, &validators, ConsensusConfig::default());
    leader.start();

    // Drive the leader to the Commit step with hand-made votes.
    for i in [0, 2] {
        deliver(
            &mut leader,
            HotstuffMessage::vote(H1, 0, HotstuffStep::NewRound, None, &keys[i]),
        );
    }
    let block = leader
        .pool()
        .messages(HotstuffStep::Prepare)
        .first()
        .and_then(|m| m.block.clone())
        .expect("leader voted for its own proposal");
    for step in [HotstuffStep::Prepare, HotstuffStep::PreCommit] {
        for i in [0, 2] {
            deliver(
                &mut leader,
                HotstuffMessage::vote(H1, 0, step, Some(block.clone()), &keys[i]),
            );
        }
    }
    assert_eq!(leader.step(), HotstuffStep::Commit);

    knobs.fail_next_commit.store(true, Ordering::SeqCst);
    for i in [0, 2] {
        deliver(
            &mut leader,
            HotstuffMessage::vote(H1, 0, HotstuffStep::Commit, Some(block.clone()), &keys[i]),
        );
    }

    // The commit failed: same height, next round, nothing on the ledger.
    assert_eq!(leader.height(), H1);
    assert_eq!(leader.round(), 1);
    assert_eq!(leader.step(), HotstuffStep::NewRound);
    assert_eq!(ledger.height(), 0);
}

#[test]
fn prepare_failure_interrupts_the_round() {
    let (keys, validators) = cluster_keys(4);
    let (mut leader, _, knobs) =
        test_node_with_knobs(LEADER, &keys, &validators, ConsensusConfig::default());
    leader.start();

    knobs.fail_next_apply.store(true, Ordering::SeqCst);
    for i in [0, 2] {
        deliver(
            &mut leader,
            HotstuffMessage::vote(H1, 0, HotstuffStep::NewRound, None, &keys[i]),
        );
    }
    assert_eq!(leader.round(), 1);
    assert_eq!(leader.step(), HotstuffStep::NewRound);
}

#[test]
fn set_time_is_recorded() {
    let (keys, validators) = cluster_keys(4);
    let (mut node, _) = test_node(0, &keys, &validators, ConsensusConfig::default());
    node.set_time(Duration::from_secs(42));
    assert_eq!(node.now(), Duration::from_secs(42));
}
