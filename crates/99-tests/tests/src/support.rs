use mcdi_engine::{
    event_queue, EngineConfig, EngineConfigBuilder, McdiIface, OwnerChannels, RecoveryRequest,
    Transport,
};
use mcdi_sim::{SimConfig, SimController};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Transport wrapper that flags any request sent while another is still
/// awaiting consumption.
pub struct Exclusive<T> {
    inner: T,
    in_flight: AtomicBool,
    overlaps: AtomicUsize,
}

impl<T> Exclusive<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            in_flight: AtomicBool::new(false),
            overlaps: AtomicUsize::new(0),
        }
    }

    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }
}

impl<T: Transport> Transport for Exclusive<T> {
    fn send_request(&self, header: &[u8], payload: &[u8]) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.send_request(header, payload);
    }

    fn read_response(&self, offset: usize, out: &mut [u8]) {
        self.inner.read_response(offset, out);
    }

    fn response_ready(&self) -> bool {
        self.inner.response_ready()
    }

    fn poll_reboot(&self) -> bool {
        self.inner.poll_reboot()
    }

    fn consume_response(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
        self.inner.consume_response();
    }
}

pub fn fast_config() -> EngineConfigBuilder {
    EngineConfig::builder()
        .rpc_timeout(Duration::from_millis(100))
        .spin_window(Duration::from_micros(50))
        .poll_interval(Duration::from_micros(200))
        .status_sleep(Duration::from_millis(1))
        .status_drain(Duration::from_micros(1), 5)
}

pub struct Rig {
    pub sim: Arc<SimController>,
    pub iface: Arc<McdiIface<Arc<SimController>>>,
    pub owner: OwnerChannels,
    pump: Option<JoinHandle<u64>>,
}

impl Rig {
    pub fn new(builder: EngineConfigBuilder, sim_config: SimConfig) -> Self {
        let sim = Arc::new(SimController::new(sim_config));
        let config = builder.build().expect("valid config");
        let depth = config.event_depth;
        let (iface, owner) = McdiIface::new(Arc::clone(&sim), config).expect("attach");
        let iface = Arc::new(iface);
        let (poster, queue) = event_queue(depth);
        sim.attach_events(poster);
        let pump = queue
            .into_pump(Arc::clone(&iface))
            .spawn()
            .expect("spawn event pump");
        Self {
            sim,
            iface,
            owner,
            pump: Some(pump),
        }
    }

    /// Waits up to `timeout` for a recovery request to show up.
    pub fn await_recovery(&self, timeout: Duration) -> Option<RecoveryRequest> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(request) = self.owner.drain_recovery(1).pop() {
                return Some(request);
            }
            thread::sleep(Duration::from_millis(1));
        }
        None
    }
}

impl Drop for Rig {
    fn drop(&mut self) {
        self.sim.detach_events();
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }
    }
}
