use crate::support::{fast_config, Exclusive, Rig};
use mcdi_engine::{EngineConfig, Errno, McdiError, McdiIface, McdiState};
use mcdi_sim::{Behavior, Reply, SimConfig, SimController};
use mcdi_wire::{WireVersion, SEQ_WINDOW};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const CMD_GET_VERSION: u32 = 0x02;

#[test]
fn default_timeout_is_ten_seconds() {
    assert_eq!(EngineConfig::default().rpc_timeout, Duration::from_secs(10));
}

#[test]
fn get_version_round_trip() {
    let rig = Rig::new(fast_config(), SimConfig::default());
    rig.sim
        .on_command(CMD_GET_VERSION, Reply::ok(&[4, 1, 0, 0, 0x2a, 0, 0, 0]));

    let mut out = [0u8; 8];
    let len = rig.iface.rpc(CMD_GET_VERSION, &[], &mut out).unwrap();

    assert_eq!(len, 8);
    assert_eq!(out, [4, 1, 0, 0, 0x2a, 0, 0, 0]);
    let request = rig.sim.last_request().unwrap();
    assert_eq!(request.version, WireVersion::V1);
    assert!(!request.evreq);
}

#[test]
fn concurrent_callers_are_serialised() {
    const THREADS: u32 = 6;
    const PER_THREAD: u32 = 40;

    let sim = Arc::new(SimController::new(SimConfig::default()));
    let transport = Arc::new(Exclusive::new(Arc::clone(&sim)));
    let (iface, _owner) =
        McdiIface::new(Arc::clone(&transport), fast_config().build().unwrap()).unwrap();
    let iface = Arc::new(iface);

    let workers: Vec<_> = (0..THREADS)
        .map(|worker| {
            let iface = Arc::clone(&iface);
            thread::spawn(move || {
                for round in 0..PER_THREAD {
                    let payload = [worker as u8, round as u8, 0xa5, 0x5a];
                    let mut out = [0u8; 4];
                    let len = iface.rpc(0x10, &payload, &mut out).expect("echo");
                    assert_eq!(len, 4);
                    assert_eq!(out, payload, "response matched another caller");
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(transport.overlaps(), 0);
    let stats = iface.stats();
    assert_eq!(stats.requests, u64::from(THREADS * PER_THREAD));
    assert_eq!(stats.succeeded, stats.requests);
    assert_eq!(iface.seqno(), u64::from(THREADS * PER_THREAD));
    assert_eq!(iface.state(), McdiState::Quiescent);
}

#[test]
fn silent_controller_times_out_then_late_reply_is_absorbed() {
    let rig = Rig::new(fast_config(), SimConfig::default());
    rig.sim.script(Behavior::Silent(Reply::ok(&[0xde, 0xad])));

    let err = rig.iface.rpc(CMD_GET_VERSION, &[], &mut [0u8; 8]).unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(rig.iface.credits(), 1);
    assert_eq!(rig.iface.seqno(), 2);

    assert!(rig.sim.deliver_late());
    rig.sim.script(Behavior::Respond(Reply::ok(&[1, 2, 3])));
    let mut out = [0u8; 8];
    let len = rig.iface.rpc(CMD_GET_VERSION, &[], &mut out).unwrap();

    assert_eq!(&out[..len], &[1, 2, 3]);
    assert_eq!(rig.iface.credits(), 0);
    assert_eq!(rig.iface.stats().stale_discarded, 1);
    assert!(rig.owner.drain_recovery(4).is_empty());
}

#[test]
fn stale_replay_inside_one_request_is_absorbed() {
    let rig = Rig::new(fast_config(), SimConfig::default());
    rig.sim.script(Behavior::Silent(Reply::ok(&[0xee])));
    assert!(rig.iface.rpc(0x11, &[], &mut []).is_err());

    rig.sim.script(Behavior::StaleReplay(Reply::ok(&[0x11, 0x22])));
    let mut out = [0u8; 2];
    assert_eq!(rig.iface.rpc(0x11, &[], &mut out), Ok(2));
    assert_eq!(out, [0x11, 0x22]);
}

/// The wire sequence is four bits wide: a late reply that turns up exactly
/// one window later is taken for the current one. This pins that limit.
#[test]
fn stale_reply_aliases_after_a_full_sequence_window() {
    let rig = Rig::new(fast_config(), SimConfig::default());
    rig.sim.script(Behavior::Silent(Reply::ok(&[0xaa])));
    assert!(rig.iface.rpc(0x12, &[], &mut []).is_err());
    let lost_seq = rig.sim.last_request().unwrap().seq;

    // The timeout consumed one sequence; advance until the next request
    // reuses the lost sequence bits.
    while rig.iface.seqno() + 1 < 1 + u64::from(SEQ_WINDOW) {
        rig.iface.rpc(0x12, &[0x01], &mut [0u8; 1]).unwrap();
    }

    assert!(rig.sim.deliver_late());
    let mut out = [0u8; 1];
    assert_eq!(rig.iface.rpc(0x12, &[0xbb], &mut out), Ok(1));
    assert_eq!(rig.sim.last_request().unwrap().seq, lost_seq);
    assert_eq!(out, [0xaa], "aliased stale reply was accepted");

    // The real reply is now the stale one and the banked credit absorbs it.
    let mut out = [0u8; 1];
    assert_eq!(rig.iface.rpc(0x12, &[0xcc], &mut out), Ok(1));
    assert_eq!(out, [0xcc]);
    assert_eq!(rig.iface.credits(), 0);
}

#[test]
fn controller_errors_are_returned_to_caller() {
    let rig = Rig::new(fast_config(), SimConfig::default());
    rig.sim
        .on_command(0x30, Reply::error(mcdi_wire::status::ENOSYS));
    assert_eq!(
        rig.iface.rpc(0x30, &[], &mut []),
        Err(McdiError::Errno(Errno::NoSys))
    );
    rig.sim
        .on_command(0x31, Reply::error(mcdi_wire::status::MAC_EXIST));
    assert_eq!(
        rig.iface.rpc(0x31, &[], &mut []),
        Err(McdiError::Errno(Errno::AddrInUse))
    );
    assert!(rig.owner.drain_recovery(4).is_empty());
}

#[test]
fn oversized_payload_is_rejected_before_sending() {
    let rig = Rig::new(fast_config().max_version(1), SimConfig::default());
    let payload = vec![0u8; 0x100];
    let err = rig.iface.rpc(0x10, &payload, &mut []).unwrap_err();
    assert_eq!(err.errno(), Errno::MsgSize);
    assert!(rig.sim.requests().is_empty());
}
