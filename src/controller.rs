//! Contention-window feedback.
//!
//! Every interval the controller differences the MAC counters, estimates how
//! much of the interval went to our own transmissions and how long our
//! backoff sat frozen behind other stations, and inverts the mean backoff
//! per cycle (CW/2 slots) to find the window that would make our occupancy
//! match `claim_capacity × claim`.

use slog::{debug, info};

use crate::phy::{Standard, TxTime};

pub const CW_MIN: u32 = 15;
pub const CW_MAX: u32 = 2047;

/// Best-effort queue.
pub const BE_QUEUE: u32 = 1;

/// Cumulative MAC counters at one instant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub rts_success: u64,
    pub rts_failure: u64,
    pub transmitted_frames: u64,
    pub ack_failures: u64,
    pub failed: u64,
    pub retries: u64,
}

impl CounterSnapshot {
    /// Counts accumulated since `prev`. A counter that went backwards (driver
    /// reload) contributes nothing.
    pub fn delta(&self, prev: &CounterSnapshot) -> CounterSnapshot {
        CounterSnapshot {
            rts_success: self.rts_success.saturating_sub(prev.rts_success),
            rts_failure: self.rts_failure.saturating_sub(prev.rts_failure),
            transmitted_frames: self
                .transmitted_frames
                .saturating_sub(prev.transmitted_frames),
            ack_failures: self.ack_failures.saturating_sub(prev.ack_failures),
            failed: self.failed.saturating_sub(prev.failed),
            retries: self.retries.saturating_sub(prev.retries),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Seconds.
    pub slot_time: f64,
    /// Seconds.
    pub sifs: f64,
    /// Airtime of a successful data exchange, seconds.
    pub per_success_cost: f64,
    /// Airtime of an RTS attempt, seconds.
    pub per_attempt_cost: f64,
    /// Fraction of the fair share we aim to actually occupy.
    pub claim_capacity: f64,
    pub queue: u32,
    pub aifs: u32,
    pub burst: u32,
}

/// Frame size the default exchange costs were measured with.
const REF_FRAME: usize = 1534;

/// Theoretical airtime of a full-size frame at the basic rate.
fn reference_exchange(standard: Standard) -> TxTime {
    match standard {
        Standard::Dot11b => standard.txtime(11.0, 20.0, REF_FRAME),
        Standard::Dot11p => standard.txtime(6.0, 10.0, REF_FRAME),
        Standard::Dot11g | Standard::Dot11a => standard.txtime(6.0, 20.0, REF_FRAME),
    }
}

impl ControllerConfig {
    /// PHY-specific timing. The exchange costs are calibrated on 802.11g and
    /// scaled to `standard` by the ratio of theoretical airtimes.
    pub fn for_standard(standard: Standard) -> Self {
        let t = standard.timing();
        let base = ControllerConfig::default();
        let g = reference_exchange(Standard::Dot11g);
        let x = reference_exchange(standard);

        ControllerConfig {
            slot_time: t.slot_us * 1e-6,
            sifs: t.sifs_us * 1e-6,
            per_success_cost: base.per_success_cost * (x.data_us + x.ack_us) / (g.data_us + g.ack_us),
            per_attempt_cost: base.per_attempt_cost * x.rts_us / g.rts_us,
            ..base
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            slot_time: 9e-6,
            sifs: 16e-6,
            per_success_cost: 0.002_198,
            per_attempt_cost: 0.000_081,
            claim_capacity: 0.8,
            queue: BE_QUEUE,
            aifs: 2,
            burst: 0,
        }
    }
}

/// Everything the controller derived in one interval.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CwDecision {
    pub dd: f64,
    pub data_count: u64,
    pub attempt_count: u64,
    pub busy_tx: f64,
    pub freeze: f64,
    pub freeze_predict: f64,
    pub avg_tx: f64,
    pub psucc: f64,
    pub gross_rate: f64,
    pub tx_goal: f64,
    /// Unclamped window, when one was computed this interval.
    pub cw_raw: Option<f64>,
    pub cw: u32,
    /// Mbit delivered this interval, assuming 1470-byte payloads.
    pub thr: f64,
}

pub struct CwController {
    log: slog::Logger,
    cfg: ControllerConfig,
    current_cw: f64,
    prev: Option<CounterSnapshot>,
}

fn clamp_cw(cw: f64) -> f64 {
    cw.max(CW_MIN as f64).min(CW_MAX as f64)
}

impl CwController {
    pub fn new(log: slog::Logger, cfg: ControllerConfig) -> Self {
        CwController {
            log,
            cfg,
            current_cw: CW_MIN as f64,
            prev: None,
        }
    }

    pub fn current_cw(&self) -> u32 {
        self.current_cw as u32
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.cfg
    }

    /// Feed the latest counters. The first snapshot only sets the baseline.
    pub fn on_snapshot(&mut self, snap: CounterSnapshot, dd: f64, claim: f64) -> Option<CwDecision> {
        let prev = match self.prev.replace(snap) {
            Some(p) => p,
            None => {
                debug!(self.log, "counter baseline"; "rts_success" => snap.rts_success);
                return None;
            }
        };

        let d = snap.delta(&prev);
        let attempts = d.rts_success.saturating_add(d.rts_failure);
        Some(self.decide(dd, d.rts_success, attempts, claim))
    }

    /// One step of the feedback law over an interval of `dd` seconds.
    pub fn decide(&mut self, dd: f64, data_count: u64, attempt_count: u64, claim: f64) -> CwDecision {
        let cfg = &self.cfg;
        let data = data_count as f64;
        let attempts = attempt_count as f64;

        let busy_tx = cfg.per_success_cost * data + cfg.per_attempt_cost * attempts;
        let freeze = dd
            - busy_tx
            - self.current_cw / 2.0 * cfg.slot_time * attempts
            - 2.0 * cfg.sifs;

        let (avg_tx, psucc) = if attempt_count > 0 {
            (busy_tx / attempts, data / attempts)
        } else {
            (0.0, 0.0)
        };

        let gross_rate = cfg.claim_capacity * claim;
        let tx_goal = if avg_tx > 0.0 {
            dd * gross_rate / avg_tx
        } else {
            0.0
        };

        let idle = dd - busy_tx;
        let freeze_predict = if idle != 0.0 {
            freeze / idle * (dd - dd * gross_rate)
        } else {
            0.0
        };

        let cw_raw = if tx_goal > 0.0 {
            let cw = (2.0 / cfg.slot_time) * (dd - tx_goal * avg_tx - freeze_predict) / tx_goal;
            if cw.is_finite() {
                Some(cw)
            } else {
                None
            }
        } else {
            None
        };

        if let Some(cw) = cw_raw {
            self.current_cw = clamp_cw(cw);
        }

        let decision = CwDecision {
            dd,
            data_count,
            attempt_count,
            busy_tx,
            freeze,
            freeze_predict,
            avg_tx,
            psucc,
            gross_rate,
            tx_goal,
            cw_raw,
            cw: self.current_cw(),
            thr: data * 1470.0 * 8.0 / 1e6,
        };

        info!(self.log, "cw decision";
            "dd" => dd,
            "data_count" => data_count,
            "rts_count" => attempt_count,
            "busy_tx" => busy_tx,
            "gross_rate" => gross_rate,
            "avg_tx" => avg_tx,
            "freeze" => freeze,
            "freeze_predict" => freeze_predict,
            "tx_goal" => tx_goal,
            "cw_raw" => ?cw_raw,
            "cw" => decision.cw,
            "psucc" => psucc,
            "thr" => decision.thr,
        );

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::{ControllerConfig, CounterSnapshot, CwController, CW_MAX, CW_MIN};
    use crate::phy::{Standard, TxTime};
    use crate::test_logger;

    fn controller() -> CwController {
        CwController::new(test_logger(), ControllerConfig::default())
    }

    #[test]
    fn no_attempts_keeps_window() {
        let mut c = controller();
        let first = c.decide(1.0, 200, 210, 0.5);
        let prev = first.cw;

        let d = c.decide(1.0, 0, 0, 0.5);
        assert_eq!(d.avg_tx, 0.0);
        assert_eq!(d.psucc, 0.0);
        assert_eq!(d.tx_goal, 0.0);
        assert_eq!(d.cw_raw, None);
        assert_eq!(d.cw, prev);
    }

    #[test]
    fn zero_claim_keeps_window() {
        let mut c = controller();
        let d = c.decide(1.0, 200, 210, 0.0);
        assert_eq!(d.tx_goal, 0.0);
        assert_eq!(d.cw, CW_MIN);
    }

    #[test]
    fn moderate_load_lands_inside_bounds() {
        let mut c = controller();
        let d = c.decide(1.0, 200, 210, 0.5);
        let raw = d.cw_raw.unwrap();
        assert!(raw > CW_MIN as f64 && raw < CW_MAX as f64, "raw={}", raw);
        assert_eq!(d.cw, raw as u32);
        assert!((d.gross_rate - 0.4).abs() < 1e-12);
        assert!((d.psucc - 200.0 / 210.0).abs() < 1e-12);
    }

    #[test]
    fn small_share_backs_off() {
        let mut greedy = controller();
        let mut polite = controller();
        let g = greedy.decide(1.0, 200, 210, 0.6);
        let p = polite.decide(1.0, 200, 210, 0.05);
        assert!(p.cw > g.cw);
    }

    #[test]
    fn output_always_clamped() {
        let counts = [0u64, 1, 3, 10, 50, 200, 400, 1000, 5000, 100_000];
        let claims = [0.0, 1e-6, 0.01, 0.1, 0.5, 0.9, 1.0, 5.0];
        let dds = [1e-3, 0.1, 1.0, 10.0];

        let mut c = controller();
        for &dd in &dds {
            for &data in &counts {
                for &attempts in &counts {
                    for &claim in &claims {
                        let d = c.decide(dd, data, attempts, claim);
                        assert!(d.cw >= CW_MIN && d.cw <= CW_MAX, "cw={}", d.cw);
                        assert!(c.current_cw() >= CW_MIN && c.current_cw() <= CW_MAX);
                    }
                }
            }
        }
    }

    #[test]
    fn first_snapshot_is_baseline() {
        let mut c = controller();
        let s = CounterSnapshot {
            rts_success: 1000,
            rts_failure: 10,
            ..Default::default()
        };
        assert!(c.on_snapshot(s, 1.0, 0.5).is_none());

        let s2 = CounterSnapshot {
            rts_success: 1200,
            rts_failure: 20,
            ..Default::default()
        };
        let d = c.on_snapshot(s2, 1.0, 0.5).unwrap();
        assert_eq!(d.data_count, 200);
        assert_eq!(d.attempt_count, 210);
    }

    #[test]
    fn flat_counters_are_idempotent() {
        let mut c = controller();
        let s = CounterSnapshot {
            rts_success: 1000,
            rts_failure: 10,
            ..Default::default()
        };
        c.on_snapshot(s, 1.0, 0.5);
        c.decide(1.0, 200, 210, 0.5);
        let cw = c.current_cw();

        for _ in 0..5 {
            let d = c.on_snapshot(s, 1.0, 0.5).unwrap();
            assert_eq!(d.cw, cw);
        }
    }

    #[test]
    fn counter_reset_is_not_negative() {
        let old = CounterSnapshot {
            rts_success: 50,
            rts_failure: 5,
            transmitted_frames: 70,
            ..Default::default()
        };
        let new = CounterSnapshot {
            rts_success: 3,
            rts_failure: 1,
            transmitted_frames: 4,
            ..Default::default()
        };
        assert_eq!(new.delta(&old), CounterSnapshot::default());
    }

    #[test]
    fn standard_sets_slot_time() {
        let cfg = ControllerConfig::for_standard(Standard::Dot11b);
        assert!((cfg.slot_time - 20e-6).abs() < 1e-15);
        assert!((cfg.sifs - 10e-6).abs() < 1e-15);
        assert_eq!(cfg.aifs, 2);
    }

    #[test]
    fn exchange_costs_follow_the_phy() {
        let dflt = ControllerConfig::default();
        let g = ControllerConfig::for_standard(Standard::Dot11g);
        assert!((g.per_success_cost - dflt.per_success_cost).abs() < 1e-12);
        assert!((g.per_attempt_cost - dflt.per_attempt_cost).abs() < 1e-12);

        // 10 MHz channels take roughly twice as long per frame
        let p = ControllerConfig::for_standard(Standard::Dot11p);
        assert!(p.per_success_cost > 1.5 * g.per_success_cost);
        assert!(p.per_attempt_cost > g.per_attempt_cost);

        // 11 Mbps DSSS moves a full frame faster than 6 Mbps OFDM
        let b = ControllerConfig::for_standard(Standard::Dot11b);
        assert!(b.per_success_cost < g.per_success_cost);
    }

    #[test]
    fn huge_counter_deltas_saturate() {
        let mut c = controller();
        c.on_snapshot(CounterSnapshot::default(), 1.0, 0.5);

        let s = CounterSnapshot {
            rts_success: u64::max_value() - 1,
            rts_failure: u64::max_value() - 1,
            ..Default::default()
        };
        let d = c.on_snapshot(s, 1.0, 0.5).unwrap();
        assert_eq!(d.attempt_count, u64::max_value());
        assert!(d.cw >= CW_MIN && d.cw <= CW_MAX);
    }
}
