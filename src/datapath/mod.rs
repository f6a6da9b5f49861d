use crate::controller::CounterSnapshot;
use crate::Result;

/// Per-queue channel access parameters, as the driver takes them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxqParams {
    pub queue: u32,
    pub aifs: u32,
    pub cw_min: u32,
    pub cw_max: u32,
    pub burst: u32,
}

impl std::fmt::Display for TxqParams {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.queue, self.aifs, self.cw_min, self.cw_max, self.burst
        )
    }
}

pub trait CounterSource {
    fn snapshot(&mut self) -> Result<CounterSnapshot>;
}

pub trait Actuator {
    fn set_contention_window(&mut self, params: TxqParams) -> Result<()>;
}

pub mod debugfs;
