//! mac80211/ath9k debugfs: counters from `statistics/`, access parameters
//! through `ath9k/txq_params`.

use std::path::{Path, PathBuf};
use std::process::Command;

use regex::Regex;
use slog::{debug, warn};

use super::{Actuator, CounterSource, TxqParams};
use crate::controller::CounterSnapshot;
use crate::{Error, Result};

const DEBUGFS_IEEE80211: &str = "/sys/kernel/debug/ieee80211";

/// Find the `phyN` owning `iface` in `iw dev` output.
pub fn parse_iw_dev(iw_dev_out: &str, iface: &str) -> Option<String> {
    let phy_re = Regex::new(r"^phy#(\d+)").ok()?;
    let iface_re = Regex::new(r"^\s+Interface\s+(\S+)").ok()?;

    let mut curr_phy = None;
    for line in iw_dev_out.lines() {
        if let Some(caps) = phy_re.captures(line) {
            curr_phy = caps.get(1).map(|m| format!("phy{}", m.as_str()));
        } else if let Some(caps) = iface_re.captures(line) {
            if caps.get(1).map(|m| m.as_str()) == Some(iface) {
                return curr_phy;
            }
        }
    }

    None
}

pub fn lookup_phy(logger: &slog::Logger, iface: &str) -> Option<String> {
    let iw_dev = match Command::new("iw").arg("dev").output() {
        Ok(out) => out,
        Err(e) => {
            warn!(logger, "iw dev failed to run"; "err" => ?e);
            return None;
        }
    };

    if !iw_dev.status.success() {
        warn!(logger, "iw dev failed"; "code" => ?iw_dev.status.code());
        return None;
    }

    let out = String::from_utf8_lossy(&iw_dev.stdout);
    let phy = parse_iw_dev(&out, iface);
    if phy.is_none() {
        warn!(logger, "iw dev did not list interface"; "iface" => iface);
    }

    phy
}

pub struct Ath9kDebugfs {
    logger: slog::Logger,
    root: PathBuf,
}

impl Ath9kDebugfs {
    pub fn bind(logger: slog::Logger, iface: &str) -> Result<Self> {
        let phy = lookup_phy(&logger, iface)
            .ok_or_else(|| Error::Setup(format!("no wireless phy for {}", iface)))?;
        let root = Path::new(DEBUGFS_IEEE80211).join(&phy);
        debug!(logger, "debugfs"; "iface" => iface, "phy" => phy, "root" => ?root);
        Ok(Self::with_root(logger, root))
    }

    pub fn with_root(logger: slog::Logger, root: PathBuf) -> Self {
        Ath9kDebugfs { logger, root }
    }

    fn read_stat(&self, name: &str) -> Result<u64> {
        let path = self.root.join("statistics").join(name);
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| Error::CounterUnavailable(format!("{}: {}", path.display(), e)))?;
        raw.trim()
            .parse()
            .map_err(|e| Error::CounterUnavailable(format!("{}: {}", path.display(), e)))
    }

    // not every driver exports these
    fn read_optional_stat(&self, name: &str) -> u64 {
        self.read_stat(name).unwrap_or(0)
    }
}

impl CounterSource for Ath9kDebugfs {
    fn snapshot(&mut self) -> Result<CounterSnapshot> {
        Ok(CounterSnapshot {
            rts_success: self.read_stat("dot11RTSSuccessCount")?,
            rts_failure: self.read_stat("dot11RTSFailureCount")?,
            transmitted_frames: self.read_stat("dot11TransmittedFrameCount")?,
            ack_failures: self.read_optional_stat("dot11ACKFailureCount"),
            failed: self.read_optional_stat("failed_count"),
            retries: self.read_optional_stat("retry_count"),
        })
    }
}

impl Actuator for Ath9kDebugfs {
    fn set_contention_window(&mut self, params: TxqParams) -> Result<()> {
        let path = self.root.join("ath9k").join("txq_params");
        debug!(self.logger, "txq_params"; "params" => %params);
        std::fs::write(&path, params.to_string()).map_err(Error::Actuator)
    }
}
