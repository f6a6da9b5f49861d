//! The station runtime.
//!
//! One owner for the neighbor table, the solver state and the controller.
//! Three activities reach it: inbound frames (from a reader thread, over a
//! channel), the transmit ticker (every `i_time`) and the contention-window
//! ticker (every `sleep_time`). `select!` serializes them, so the solver
//! always sees one consistent table.

use std::time::{Duration, Instant};

use crossbeam::{select, tick};
use minion::Cancellable;
use slog::{debug, info, warn};

use crate::controller::{ControllerConfig, CwController, CwDecision, CW_MIN};
use crate::datapath::{Actuator, CounterSource, TxqParams};
use crate::neighbors::{NeighborRecord, NeighborTable};
use crate::phy::Standard;
use crate::readers::{Frame, FrameReader};
use crate::serialize::ControlMessage;
use crate::solver;
use crate::udp::Transport;
use crate::{Error, Result, StationId};

/// Driver default for the upper backoff bound, restored at startup.
const INIT_CW_MAX: u32 = 1023;

#[derive(Clone, Debug)]
pub struct ReactConfig {
    pub iface: String,
    pub port: u16,
    /// Control-plane period, seconds.
    pub i_time: f64,
    /// Contention-window period, seconds.
    pub sleep_time: f64,
    pub iperf_rate_kbps: f64,
    /// Write decisions to the driver. Off means compute and log only.
    pub enable_react: bool,
    /// Total airtime shared among neighbors.
    pub capacity: f64,
    pub max_throughput_kbps: f64,
    /// Neighbors silent for this many control periods are dropped.
    pub eviction_periods: u32,
    pub standard: Standard,
    pub controller: ControllerConfig,
}

impl Default for ReactConfig {
    fn default() -> Self {
        ReactConfig {
            iface: String::from("wlan0"),
            port: 2323,
            i_time: 1.0,
            sleep_time: 1.0,
            iperf_rate_kbps: 0.0,
            enable_react: false,
            capacity: 1.0,
            max_throughput_kbps: solver::MAX_THROUGHPUT_KBPS,
            eviction_periods: 5,
            standard: Standard::Dot11g,
            controller: ControllerConfig::default(),
        }
    }
}

impl ReactConfig {
    pub fn eviction_timeout_ns(&self) -> u64 {
        (self.i_time * self.eviction_periods as f64 * 1e9) as u64
    }

    pub fn demand(&self) -> f64 {
        solver::demand_from_rate(self.iperf_rate_kbps, self.capacity, self.max_throughput_kbps)
    }
}

fn secs(s: f64) -> Duration {
    Duration::from_nanos((s * 1e9) as u64)
}

pub struct Runtime<T, D>
where
    T: Transport,
    D: CounterSource + Actuator,
{
    log: slog::Logger,
    cfg: ReactConfig,
    station: StationId,
    transport: T,
    driver: D,
    neighbors: NeighborTable,
    controller: CwController,
    frames: crossbeam::Receiver<Frame>,
    tx_ticker: crossbeam::Receiver<Instant>,
    cw_ticker: crossbeam::Receiver<Instant>,
}

#[cfg(target_os = "linux")]
impl Runtime<crate::udp::Socket, crate::datapath::debugfs::Ath9kDebugfs> {
    pub fn new(log: slog::Logger, cfg: ReactConfig) -> Result<Self> {
        use crate::datapath::debugfs::Ath9kDebugfs;
        use crate::udp::{get_iface_addrs, Socket};

        let addrs = get_iface_addrs(&log, &cfg.iface)
            .ok_or_else(|| Error::Setup(format!("no IPv4 address on {}", cfg.iface)))?;
        let driver = Ath9kDebugfs::bind(log.clone(), &cfg.iface)?;

        let sk = Socket::new(Some(&cfg.iface), cfg.port, addrs.broadcast)
            .map_err(|e| Error::Setup(format!("control socket: {}", e)))?;
        let recv_sk = sk.try_clone()?;

        let (frame_reader, frames) = FrameReader::make(recv_sk, log.clone());
        let _frame_reader_handle = frame_reader.spawn();

        info!(log, "control channel";
            "station" => %addrs.addr,
            "broadcast" => %addrs.broadcast,
            "port" => cfg.port,
        );

        Ok(Runtime::with_parts(
            log,
            cfg,
            StationId::new(addrs.addr.to_string()),
            sk,
            driver,
            frames,
        ))
    }
}

impl<T, D> Runtime<T, D>
where
    T: Transport,
    D: CounterSource + Actuator,
{
    pub fn with_parts(
        log: slog::Logger,
        cfg: ReactConfig,
        station: StationId,
        transport: T,
        mut driver: D,
        frames: crossbeam::Receiver<Frame>,
    ) -> Self {
        let mut neighbors = NeighborTable::default();
        neighbors.upsert(
            station.clone(),
            NeighborRecord {
                timestamp: crate::now_ns(),
                offer: cfg.capacity,
                claim: 0.0,
                demand: cfg.demand(),
            },
        );

        let ctl_cfg = cfg.controller;
        let controller = CwController::new(log.clone(), ctl_cfg);

        if cfg.enable_react {
            let reset = TxqParams {
                queue: ctl_cfg.queue,
                aifs: ctl_cfg.aifs,
                cw_min: CW_MIN,
                cw_max: INIT_CW_MAX,
                burst: ctl_cfg.burst,
            };
            if let Err(e) = driver.set_contention_window(reset) {
                warn!(log, "could not reset access parameters"; "err" => %e);
            }
        }

        let ref_frame = cfg.standard.txtime(6.0, 20.0, 1534);
        info!(log, "REACT ready";
            "station" => %station,
            "i_time" => cfg.i_time,
            "sleep_time" => cfg.sleep_time,
            "demand" => cfg.demand(),
            "enable_react" => cfg.enable_react,
            "standard" => ?cfg.standard,
            "slot_time" => ctl_cfg.slot_time,
            "data_us_6mbps" => ref_frame.data_us,
            "rts_us_6mbps" => ref_frame.rts_us,
        );

        let tx_ticker = tick(secs(cfg.i_time));
        let cw_ticker = tick(secs(cfg.sleep_time));

        Runtime {
            log,
            cfg,
            station,
            transport,
            driver,
            neighbors,
            controller,
            frames,
            tx_ticker,
            cw_ticker,
        }
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    pub fn current_cw(&self) -> u32 {
        self.controller.current_cw()
    }

    /// Own `(offer, claim)`.
    pub fn own_share(&self) -> (f64, f64) {
        self.neighbors
            .get(&self.station)
            .map(|r| (r.offer, r.claim))
            .unwrap_or((self.cfg.capacity, 0.0))
    }

    fn resolve(&mut self) {
        if let Some((offer, claim)) =
            solver::solve(&mut self.neighbors, &self.station, self.cfg.capacity)
        {
            debug!(self.log, "fair share";
                "offer" => offer,
                "claim" => claim,
                "neighbors" => self.neighbors.len(),
            );
        }
    }

    /// Receive cycle: one call per inbound frame.
    pub fn on_frame(&mut self, frame: Frame, now: u64) {
        // our own broadcasts loop back
        if frame.from == self.station {
            return;
        }

        let msg = match ControlMessage::from_slice(&frame.payload) {
            Ok(m) => m,
            Err(e) => {
                debug!(self.log, "dropping control frame"; "from" => %frame.from, "err" => %e);
                return;
            }
        };

        self.neighbors.upsert(
            frame.from,
            NeighborRecord {
                timestamp: now,
                offer: msg.offer,
                claim: msg.claim,
                demand: 0.0,
            },
        );
        self.resolve();
    }

    /// Transmit cycle: refresh self, drop silent neighbors, broadcast.
    pub fn on_transmit_tick(&mut self, now: u64) {
        let demand = self.cfg.demand();
        if let Some(me) = self.neighbors.get_mut(&self.station) {
            me.timestamp = now;
            me.demand = demand;
        }

        let evicted = self
            .neighbors
            .evict_expired(now, self.cfg.eviction_timeout_ns());
        if !evicted.is_empty() {
            info!(self.log, "evicted neighbors";
                "stations" => ?evicted,
                "remaining" => self.neighbors.len(),
            );
            self.resolve();
        }

        let (offer, claim) = self.own_share();
        let msg = ControlMessage {
            t: wall_clock_secs(),
            claim,
            offer,
        };

        if let Err(e) = self.transport.broadcast_send(&msg.as_bytes()) {
            warn!(self.log, "control broadcast failed"; "err" => %e);
        }
    }

    /// Contention-window cycle.
    pub fn on_cw_tick(&mut self) -> Option<CwDecision> {
        let snap = match self.driver.snapshot() {
            Ok(s) => s,
            Err(e) => {
                warn!(self.log, "skipping cw update"; "err" => %e);
                return None;
            }
        };

        let (_, claim) = self.own_share();
        let decision = self.controller.on_snapshot(snap, self.cfg.sleep_time, claim)?;

        if self.cfg.enable_react {
            let ctl = self.controller.config();
            let params = TxqParams {
                queue: ctl.queue,
                aifs: ctl.aifs,
                cw_min: decision.cw,
                cw_max: decision.cw,
                burst: ctl.burst,
            };
            if let Err(e) = self.driver.set_contention_window(params) {
                warn!(self.log, "cw write failed"; "err" => %e);
            }
        }

        Some(decision)
    }
}

enum Event {
    Frame(Frame),
    Transmit,
    Cw,
    ReaderGone,
}

fn wall_clock_secs() -> f64 {
    let t = time::get_time();
    t.sec as f64 + t.nsec as f64 / 1e9
}

impl<T, D> minion::Cancellable for Runtime<T, D>
where
    T: Transport,
    D: CounterSource + Actuator,
{
    type Error = Error;

    fn for_each(&mut self) -> std::result::Result<minion::LoopState, Self::Error> {
        let mut event = None;
        select! {
            recv(self.frames) -> frame => {
                event = Some(frame.map(Event::Frame).unwrap_or(Event::ReaderGone));
            },
            recv(self.tx_ticker) -> _ => {
                event = Some(Event::Transmit);
            },
            recv(self.cw_ticker) -> _ => {
                event = Some(Event::Cw);
            }
        };

        match event {
            Some(Event::Frame(frame)) => self.on_frame(frame, crate::now_ns()),
            Some(Event::Transmit) => self.on_transmit_tick(crate::now_ns()),
            Some(Event::Cw) => {
                self.on_cw_tick();
            }
            Some(Event::ReaderGone) => {
                warn!(self.log, "frame reader exited");
                return Ok(minion::LoopState::Break);
            }
            None => (),
        }

        Ok(minion::LoopState::Continue)
    }
}
