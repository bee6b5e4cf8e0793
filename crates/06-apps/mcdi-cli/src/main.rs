//! Command-line driver that runs the MCDI engine against the simulated
//! controller.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mcdi_engine::{
    event_queue, DeliveryMode, EngineConfig, McdiIface, McdiResult, OwnerChannels,
    RecoveryRequest,
};
use mcdi_sim::{Behavior, Reply, SimConfig, SimController};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, EnvFilter};

const CMD_GET_VERSION: u32 = 0x02;
const VERSION_REPLY: [u8; 8] = [0x04, 0x01, 0x00, 0x00, 0x2a, 0x00, 0x00, 0x00];

/// Text rendering helpers used by the CLI commands.
mod render {
    use mcdi_engine::{
        DeliveryMode, EngineStatsSnapshot, McdiResult, RecoveryReason, RecoveryRequest,
    };
    use mcdi_sim::SimRequest;
    use std::fmt::Write;

    /// Format the outcome of one RPC, with a hexdump of the copied payload.
    pub fn rpc_result(cmd: u32, result: &McdiResult<usize>, out: &[u8]) -> String {
        match result {
            Ok(len) => {
                let mut text = format!("MC command {cmd:#06x}: ok, {len} byte(s)\n");
                text.push_str(&hexdump(&out[..(*len).min(out.len())]));
                text
            }
            Err(err) => format!(
                "MC command {cmd:#06x}: {err} (errno {})\n",
                err.errno().raw()
            ),
        }
    }

    /// Format bytes sixteen to a line.
    pub fn hexdump(bytes: &[u8]) -> String {
        let mut out = String::new();
        for (line, chunk) in bytes.chunks(16).enumerate() {
            let hex: Vec<String> = chunk.iter().map(|byte| format!("{byte:02x}")).collect();
            writeln!(out, "  {:04x}: {}", line * 16, hex.join(" ")).expect("write hexdump");
        }
        out
    }

    /// Format the request as the controller saw it.
    pub fn request(request: &SimRequest) -> String {
        format!(
            "sent cmd={:#06x} seq={} v{} evreq={} not_epoch={}\n",
            request.cmd,
            request.seq,
            request.version.as_u8(),
            request.evreq,
            request.not_epoch
        )
    }

    /// Format the sequence and epoch bookkeeping of the interface.
    pub fn iface_state(seqno: u64, credits: u32, mode: DeliveryMode, new_epoch: bool) -> String {
        format!("seqno={seqno} credits={credits} mode={mode} new_epoch={new_epoch}\n")
    }

    /// Format a recovery request.
    pub fn recovery(request: &RecoveryRequest) -> String {
        match request.reason {
            RecoveryReason::CommandFailed { cmd, errno } => {
                format!("recovery requested: command {cmd:#06x} failed ({errno})\n")
            }
            RecoveryReason::UnprovokedReboot => "recovery requested: unprovoked reboot\n".into(),
            RecoveryReason::UnprovokedAssertion { addr } => {
                format!("recovery requested: assertion at {addr:#010x}\n")
            }
        }
    }

    /// Format the engine counters.
    pub fn stats(stats: &EngineStatsSnapshot) -> String {
        let mut out = String::new();
        writeln!(
            out,
            "requests={} succeeded={} failed={} timeouts={}",
            stats.requests, stats.succeeded, stats.failed, stats.timeouts
        )
        .expect("write request counters");
        writeln!(
            out,
            "stale_discarded={} seq_anomalies={} reboots={} assertions={}",
            stats.stale_discarded, stats.seq_anomalies, stats.reboots, stats.assertions
        )
        .expect("write consistency counters");
        writeln!(
            out,
            "recoveries={} coalesced={} mode_switches={} notifications_dropped={}",
            stats.recoveries,
            stats.recoveries_coalesced,
            stats.mode_switches,
            stats.notifications_dropped
        )
        .expect("write recovery counters");
        out
    }
}

/// Drive the MCDI engine against a simulated management controller.
#[derive(Parser, Debug)]
#[command(author, version, about = "Exercise the MCDI engine", long_about = None)]
struct Cli {
    /// Highest MCDI header version the simulated device negotiates (0-2).
    #[arg(long, default_value_t = 2)]
    max_version: u8,

    /// Completion delivery mode at attach.
    #[arg(long, value_enum, default_value_t = ModeArg::Poll)]
    mode: ModeArg,

    /// Per-request timeout in milliseconds (engine default: 10000).
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Simulated response latency in microseconds.
    #[arg(long, default_value_t = 0, value_name = "US")]
    latency_us: u64,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one command and print the response.
    Rpc {
        /// Command code (decimal or hex, e.g. 0x02).
        #[arg(value_parser = parse_u32, value_name = "CMD")]
        cmd: u32,
        /// Request payload as hex bytes, e.g. 0a0b0c.
        #[arg(value_parser = parse_hex_payload, value_name = "PAYLOAD_HEX")]
        payload: Option<Payload>,
    },
    /// Run a canned failure scenario.
    Scenario {
        /// Scenario to run.
        #[arg(value_enum)]
        name: ScenarioArg,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    /// Poll the response buffer.
    Poll,
    /// Wait for completion events.
    Events,
}

impl From<ModeArg> for DeliveryMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Poll => DeliveryMode::Poll,
            ModeArg::Events => DeliveryMode::Events,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScenarioArg {
    /// The controller never answers.
    Timeout,
    /// A timed-out reply turns up during the next request.
    LateResponse,
    /// The controller reboots under a request and again while idle.
    Reboot,
    /// Completions move from events to polling and back.
    ModeSwitch,
}

#[derive(Clone, Debug, Default)]
struct Payload(Vec<u8>);

struct SimRig {
    sim: Arc<SimController>,
    iface: Arc<McdiIface<Arc<SimController>>>,
    owner: OwnerChannels,
    pump: JoinHandle<u64>,
}

impl SimRig {
    fn attach(cli: &Cli) -> Result<Self> {
        let mut builder = EngineConfig::builder()
            .max_version(cli.max_version)
            .initial_mode(cli.mode.into());
        if let Some(ms) = cli.timeout_ms {
            builder = builder.rpc_timeout(Duration::from_millis(ms));
        }
        let config = builder.build().context("invalid engine configuration")?;
        let depth = config.event_depth;

        let sim = Arc::new(SimController::new(SimConfig {
            response_delay: Duration::from_micros(cli.latency_us),
            raise_events: true,
        }));
        sim.on_command(CMD_GET_VERSION, Reply::ok(&VERSION_REPLY));

        let (iface, owner) =
            McdiIface::new(Arc::clone(&sim), config).context("failed to attach MCDI interface")?;
        let iface = Arc::new(iface);
        let (poster, queue) = event_queue(depth);
        sim.attach_events(poster);
        let pump = queue
            .into_pump(Arc::clone(&iface))
            .spawn()
            .context("failed to spawn event pump")?;

        Ok(Self {
            sim,
            iface,
            owner,
            pump,
        })
    }

    fn rpc(&self, cmd: u32, payload: &[u8]) -> McdiResult<usize> {
        let mut out = vec![0u8; 0x400];
        let result = self.iface.rpc(cmd, payload, &mut out);
        print!("{}", render::rpc_result(cmd, &result, &out));
        if let Some(request) = self.sim.last_request() {
            print!("{}", render::request(&request));
        }
        result
    }

    fn print_state(&self) {
        print!(
            "{}",
            render::iface_state(
                self.iface.seqno(),
                self.iface.credits(),
                self.iface.mode(),
                self.iface.is_new_epoch()
            )
        );
    }

    fn await_recovery(&self, timeout: Duration) -> Option<RecoveryRequest> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(request) = self.owner.drain_recovery(1).pop() {
                return Some(request);
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn print_recoveries(&self) {
        for request in self.owner.drain_recovery(8) {
            print!("{}", render::recovery(&request));
        }
    }

    fn shutdown(self) -> Result<()> {
        self.sim.detach_events();
        let processed = self
            .pump
            .join()
            .map_err(|_| anyhow!("event pump panicked"))?;
        tracing::debug!(processed, "event pump joined");
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let rig = SimRig::attach(&cli)?;
    match &cli.command {
        Command::Rpc { cmd, payload } => {
            let payload = payload.clone().unwrap_or_default();
            let _ = rig.rpc(*cmd, &payload.0);
        }
        Command::Scenario { name } => run_scenario(&rig, *name),
    }
    print!("{}", render::stats(&rig.iface.stats()));
    rig.shutdown()
}

fn init_tracing(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = fmt().with_env_filter(env_filter).try_init();
}

fn run_scenario(rig: &SimRig, scenario: ScenarioArg) {
    match scenario {
        ScenarioArg::Timeout => {
            rig.sim.script(Behavior::Silent(Reply::ok(&VERSION_REPLY)));
            let _ = rig.rpc(CMD_GET_VERSION, &[]);
            rig.print_state();
        }
        ScenarioArg::LateResponse => {
            rig.sim.script(Behavior::Silent(Reply::ok(&[0xde, 0xad])));
            let _ = rig.rpc(CMD_GET_VERSION, &[]);
            rig.print_state();
            if rig.sim.deliver_late() {
                println!("late reply delivered");
            }
            let _ = rig.rpc(CMD_GET_VERSION, &[]);
            rig.print_state();
        }
        ScenarioArg::Reboot => {
            rig.sim.script(Behavior::Reboot);
            let _ = rig.rpc(CMD_GET_VERSION, &[]);
            rig.print_recoveries();
            rig.print_state();

            rig.sim.trigger_reboot();
            match rig.await_recovery(Duration::from_secs(1)) {
                Some(request) => print!("{}", render::recovery(&request)),
                None => println!("no recovery requested for idle reboot"),
            }
            rig.print_state();
            let _ = rig.rpc(CMD_GET_VERSION, &[]);
        }
        ScenarioArg::ModeSwitch => {
            rig.iface.mode_event();
            let _ = rig.rpc(0x10, &[0x01, 0x02]);
            rig.iface.mode_poll();
            let _ = rig.rpc(0x10, &[0x03, 0x04]);
            rig.print_state();
        }
    }
}

fn parse_u32(input: &str) -> Result<u32, String> {
    if let Some(stripped) = input.strip_prefix("0x") {
        u32::from_str_radix(stripped, 16).map_err(|_| format!("invalid hex value '{input}'"))
    } else {
        input
            .parse::<u32>()
            .map_err(|_| format!("invalid number '{input}'"))
    }
}

fn parse_hex_payload(input: &str) -> Result<Payload, String> {
    let digits: Vec<char> = input.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{input}'"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let text: String = pair.iter().collect();
            u8::from_str_radix(&text, 16).map_err(|_| format!("invalid hex byte '{text}'"))
        })
        .collect::<Result<Vec<u8>, String>>()
        .map(Payload)
}

#[cfg(test)]
mod tests {
    use super::{parse_hex_payload, parse_u32, render};
    use insta::assert_snapshot;
    use mcdi_engine::{
        DeliveryMode, EngineStatsSnapshot, Errno, McdiError, RecoveryReason, RecoveryRequest,
        WireVersion,
    };
    use mcdi_sim::SimRequest;

    #[test]
    fn rpc_success_renders_hexdump() {
        let out: Vec<u8> = (0u8..20).collect();
        assert_snapshot!(render::rpc_result(0x02, &Ok(20), &out), @r"
        MC command 0x0002: ok, 20 byte(s)
          0000: 00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f
          0010: 10 11 12 13
        ");
    }

    #[test]
    fn rpc_failure_renders_errno() {
        let result = Err(McdiError::Errno(Errno::Io));
        assert_snapshot!(
            render::rpc_result(0x20, &result, &[]),
            @"MC command 0x0020: MC request failed: I/O error (errno 5)"
        );
    }

    #[test]
    fn request_render_matches_expectation() {
        let request = SimRequest {
            cmd: 0x02,
            seq: 3,
            payload: vec![],
            version: WireVersion::V1,
            evreq: true,
            not_epoch: false,
        };
        assert_snapshot!(
            render::request(&request),
            @"sent cmd=0x0002 seq=3 v1 evreq=true not_epoch=false"
        );
    }

    #[test]
    fn state_and_recovery_render() {
        assert_snapshot!(
            render::iface_state(17, 1, DeliveryMode::Events, true),
            @"seqno=17 credits=1 mode=events new_epoch=true"
        );
        let request = RecoveryRequest {
            reason: RecoveryReason::CommandFailed {
                cmd: 0x20,
                errno: Errno::Intr,
            },
        };
        assert_snapshot!(
            render::recovery(&request),
            @"recovery requested: command 0x0020 failed (interrupted)"
        );
    }

    #[test]
    fn stats_render_matches_expectation() {
        let stats = EngineStatsSnapshot {
            requests: 4,
            succeeded: 2,
            failed: 2,
            timeouts: 1,
            stale_discarded: 1,
            reboots: 1,
            recoveries: 1,
            ..EngineStatsSnapshot::default()
        };
        assert_snapshot!(render::stats(&stats), @r"
        requests=4 succeeded=2 failed=2 timeouts=1
        stale_discarded=1 seq_anomalies=0 reboots=1 assertions=0
        recoveries=1 coalesced=0 mode_switches=0 notifications_dropped=0
        ");
    }

    #[test]
    fn payload_parser_accepts_hex_pairs() {
        assert_eq!(parse_hex_payload("0a0B ff").unwrap().0, vec![0x0a, 0x0b, 0xff]);
        assert!(parse_hex_payload("abc").is_err());
        assert!(parse_hex_payload("zz").is_err());
        assert_eq!(parse_u32("0x3d"), Ok(0x3d));
        assert_eq!(parse_u32("61"), Ok(61));
    }
}
