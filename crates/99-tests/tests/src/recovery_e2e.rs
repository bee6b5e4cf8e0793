use crate::support::{fast_config, Rig};
use mcdi_engine::{DeliveryMode, Errno, McdiError, McdiState, RecoveryReason};
use mcdi_sim::{Behavior, Reply, SimConfig};
use mcdi_wire::CMD_REBOOT;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

#[test]
fn reboot_under_polled_request_fails_with_io() {
    let rig = Rig::new(fast_config(), SimConfig::default());
    rig.sim.script(Behavior::Reboot);

    let err = rig.iface.rpc(0x20, &[], &mut [0u8; 4]).unwrap_err();

    assert_eq!(err, McdiError::Errno(Errno::Io));
    assert!(err.is_fatal());
    let request = rig.await_recovery(WAIT).expect("recovery requested");
    assert!(matches!(
        request.reason,
        RecoveryReason::CommandFailed { cmd: 0x20, .. } | RecoveryReason::UnprovokedReboot
    ));
    assert!(rig.iface.is_new_epoch());
    assert_eq!(rig.iface.state(), McdiState::Quiescent);
}

#[test]
fn reboot_under_event_request_fails_with_io() {
    let rig = Rig::new(
        fast_config()
            .rpc_timeout(Duration::from_millis(500))
            .initial_mode(DeliveryMode::Events),
        SimConfig::default(),
    );
    rig.sim.script(Behavior::Reboot);

    let err = rig.iface.rpc(0x21, &[], &mut []).unwrap_err();

    assert_eq!(err.errno(), Errno::Io);
    assert!(rig.await_recovery(WAIT).is_some());
}

#[test]
fn assertion_under_event_request_is_interrupted() {
    let rig = Rig::new(
        fast_config()
            .rpc_timeout(Duration::from_secs(2))
            .initial_mode(DeliveryMode::Events),
        SimConfig::default(),
    );
    rig.sim.script(Behavior::Assert { addr: 0x8000_1234 });

    let err = rig.iface.rpc(0x22, &[], &mut []).unwrap_err();

    assert_eq!(err, McdiError::Errno(Errno::Intr));
    assert_eq!(rig.iface.credits(), 1);
    assert_eq!(rig.iface.stats().assertions, 1);
    assert_eq!(
        rig.await_recovery(WAIT).map(|request| request.reason),
        Some(RecoveryReason::CommandFailed {
            cmd: 0x22,
            errno: Errno::Intr
        })
    );
}

#[test]
fn reboot_command_does_not_request_recovery() {
    let rig = Rig::new(
        fast_config(),
        SimConfig {
            response_delay: Duration::ZERO,
            raise_events: false,
        },
    );
    rig.sim.script(Behavior::Reboot);

    let err = rig.iface.rpc(CMD_REBOOT, &[0; 4], &mut []).unwrap_err();

    assert_eq!(err.errno(), Errno::Io);
    assert!(rig.await_recovery(Duration::from_millis(50)).is_none());
    assert!(rig.iface.is_new_epoch());
}

#[test]
fn idle_reboot_requests_recovery_and_new_epoch() {
    let rig = Rig::new(fast_config(), SimConfig::default());
    rig.iface.rpc(0x10, &[1], &mut [0u8; 1]).unwrap();
    assert!(rig.sim.last_request().unwrap().not_epoch);

    rig.sim.trigger_reboot();

    assert_eq!(
        rig.await_recovery(WAIT).map(|request| request.reason),
        Some(RecoveryReason::UnprovokedReboot)
    );
    assert!(rig.iface.is_new_epoch());
    assert_eq!(rig.iface.state(), McdiState::Quiescent);

    rig.iface.rpc(0x10, &[2], &mut [0u8; 1]).unwrap();
    assert!(!rig.sim.last_request().unwrap().not_epoch);
    rig.iface.rpc(0x10, &[3], &mut [0u8; 1]).unwrap();
    assert!(rig.sim.last_request().unwrap().not_epoch);
}

#[test]
fn interface_recovers_after_failure() {
    let rig = Rig::new(fast_config(), SimConfig::default());
    rig.sim.script(Behavior::Reboot);
    assert!(rig.iface.rpc(0x20, &[], &mut []).is_err());

    rig.sim.script(Behavior::Respond(Reply::ok(&[0x0f])));
    let mut out = [0u8; 1];
    assert_eq!(rig.iface.rpc(0x20, &[], &mut out), Ok(1));
    assert_eq!(out, [0x0f]);
}
