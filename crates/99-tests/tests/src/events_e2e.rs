use crate::support::{fast_config, Rig};
use mcdi_engine::{DeliveryMode, McdiEvent, McdiState};
use mcdi_sim::{Behavior, Reply, SimConfig};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn events_rig(version: u8) -> Rig {
    Rig::new(
        fast_config()
            .max_version(version)
            .rpc_timeout(Duration::from_millis(500))
            .initial_mode(DeliveryMode::Events),
        SimConfig::default(),
    )
}

#[test]
fn event_completions_carry_results_v1() {
    let rig = events_rig(1);
    for round in 0..20u8 {
        let payload = [round, round ^ 0xff];
        let mut out = [0u8; 2];
        assert_eq!(rig.iface.rpc(0x10, &payload, &mut out), Ok(2));
        assert_eq!(out, payload);
        assert!(rig.sim.last_request().unwrap().evreq);
    }
    assert_eq!(rig.iface.stats().succeeded, 20);
}

#[test]
fn event_completions_read_v2_headers() {
    let rig = events_rig(2);
    let payload = vec![0x42; 600];
    let mut out = vec![0u8; 600];
    assert_eq!(rig.iface.rpc(0x1200, &payload, &mut out), Ok(600));
    assert_eq!(out, payload);
}

#[test]
fn delayed_completion_still_wakes_waiter() {
    let rig = Rig::new(
        fast_config()
            .rpc_timeout(Duration::from_secs(2))
            .initial_mode(DeliveryMode::Events),
        SimConfig {
            response_delay: Duration::from_millis(20),
            raise_events: true,
        },
    );
    let started = Instant::now();
    assert_eq!(rig.iface.rpc(0x10, &[7], &mut [0u8; 1]), Ok(1));
    assert!(started.elapsed() >= Duration::from_millis(20));
}

#[test]
fn switching_to_poll_mid_wait_finishes_once() {
    // Events are suppressed so only the poller can see the response.
    let rig = Rig::new(
        fast_config()
            .rpc_timeout(Duration::from_secs(2))
            .initial_mode(DeliveryMode::Events),
        SimConfig {
            response_delay: Duration::ZERO,
            raise_events: false,
        },
    );

    let iface = Arc::clone(&rig.iface);
    let caller = thread::spawn(move || {
        let mut out = [0u8; 3];
        let result = iface.rpc(0x10, &[1, 2, 3], &mut out);
        (result, out)
    });

    while rig.iface.state() != McdiState::Running {
        thread::yield_now();
    }
    thread::sleep(Duration::from_millis(10));
    rig.iface.mode_poll();

    let (result, out) = caller.join().unwrap();
    assert_eq!(result, Ok(3));
    assert_eq!(out, [1, 2, 3]);
    let stats = rig.iface.stats();
    assert_eq!(stats.succeeded + stats.failed, 1);
    assert_eq!(rig.iface.mode(), DeliveryMode::Poll);
    assert_eq!(rig.iface.state(), McdiState::Quiescent);
}

#[test]
fn mode_round_trip_between_requests() {
    let rig = Rig::new(fast_config(), SimConfig::default());
    assert_eq!(rig.iface.rpc(0x10, &[1], &mut [0u8; 1]), Ok(1));
    assert!(!rig.sim.last_request().unwrap().evreq);

    rig.iface.mode_event();
    assert_eq!(rig.iface.rpc(0x10, &[2], &mut [0u8; 1]), Ok(1));
    assert!(rig.sim.last_request().unwrap().evreq);

    rig.iface.mode_poll();
    assert_eq!(rig.iface.rpc(0x10, &[3], &mut [0u8; 1]), Ok(1));
    assert!(!rig.sim.last_request().unwrap().evreq);
    assert_eq!(rig.iface.stats().mode_switches, 2);
}

#[test]
fn stale_completion_event_is_ignored() {
    let rig = events_rig(1);
    rig.sim.script(Behavior::Silent(Reply::ok(&[9])));
    assert!(rig.iface.rpc(0x10, &[], &mut []).unwrap_err().is_timeout());
    assert_eq!(rig.iface.credits(), 1);

    // The late CMDDONE lands while idle and spends the credit.
    assert!(rig.sim.deliver_late());
    let deadline = Instant::now() + Duration::from_secs(2);
    while rig.iface.credits() != 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(rig.iface.credits(), 0);
    assert_eq!(rig.iface.stats().stale_discarded, 1);
    assert_eq!(rig.iface.state(), McdiState::Quiescent);
}

#[test]
fn notifications_flow_through_the_pump() {
    let rig = events_rig(2);
    rig.sim.raise(McdiEvent::LinkChange(0x0101));
    rig.sim.raise(McdiEvent::SensorEvt(0x77));

    let deadline = Instant::now() + Duration::from_secs(2);
    let mut seen = Vec::new();
    while seen.len() < 2 && Instant::now() < deadline {
        seen.extend(rig.owner.drain_notifications(8));
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(
        seen,
        vec![McdiEvent::LinkChange(0x0101), McdiEvent::SensorEvt(0x77)]
    );
}
