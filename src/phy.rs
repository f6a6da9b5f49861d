//! 802.11 PHY timing.
//!
//! Times are in microseconds. `bw` is the channel width in MHz; OFDM
//! timings stretch as the channel narrows.

use std::str::FromStr;

use crate::Error;

const ACK_LEN: f64 = 14.0;
const RTS_LEN: f64 = 20.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Standard {
    Dot11b,
    Dot11g,
    Dot11a,
    Dot11p,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timing {
    pub slot_us: f64,
    pub sifs_us: f64,
}

/// Theoretical airtime of one exchange.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TxTime {
    pub data_us: f64,
    pub ack_us: f64,
    pub rts_us: f64,
}

impl Standard {
    pub fn timing(self) -> Timing {
        match self {
            Standard::Dot11b => Timing {
                slot_us: 20.0,
                sifs_us: 10.0,
            },
            Standard::Dot11g | Standard::Dot11a => Timing {
                slot_us: 9.0,
                sifs_us: 16.0,
            },
            Standard::Dot11p => Timing {
                slot_us: 13.0,
                sifs_us: 32.0,
            },
        }
    }

    /// `bitrate` in Mbps, `pkt_size` in bytes covering MAC header, LLC,
    /// payload and FCS.
    pub fn txtime(self, bitrate: f64, bw: f64, pkt_size: usize) -> TxTime {
        let pkt_size = pkt_size as f64;
        let t_pre = 16.0 * 20.0 / bw;
        let t_sig = 4.0 * 20.0 / bw;
        let t_sym = 4.0 * 20.0 / bw;

        match self {
            Standard::Dot11b => TxTime {
                data_us: 192.0 + (pkt_size + 28.0) * 8.0 / bitrate + 1.0,
                ack_us: 192.0 + ACK_LEN * 28.0 / bitrate + 1.0,
                rts_us: 192.0 + RTS_LEN * 28.0 / bitrate + 1.0,
            },
            Standard::Dot11g => {
                let rate = bitrate * bw / 20.0;
                TxTime {
                    data_us: t_pre + t_sig + (t_sym / 2.0 + (22.0 + 8.0 * pkt_size) / rate).ceil(),
                    ack_us: t_pre + t_sig + (ACK_LEN * 8.0 / rate).ceil(),
                    rts_us: t_pre + t_sig + (RTS_LEN * 8.0 / rate).ceil(),
                }
            }
            // control frames go at the nominal rate here
            Standard::Dot11a | Standard::Dot11p => {
                let rate = bitrate * bw / 20.0;
                TxTime {
                    data_us: t_pre + t_sig + (t_sym / 2.0 + (22.0 + 8.0 * pkt_size) / rate).ceil(),
                    ack_us: t_pre + t_sig + (ACK_LEN * 8.0 / bitrate).ceil(),
                    rts_us: t_pre + t_sig + (RTS_LEN * 8.0 / bitrate).ceil(),
                }
            }
        }
    }
}

impl FromStr for Standard {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches("802.").to_lowercase().as_str() {
            "11b" => Ok(Standard::Dot11b),
            "11g" => Ok(Standard::Dot11g),
            "11a" => Ok(Standard::Dot11a),
            "11p" => Ok(Standard::Dot11p),
            x => Err(Error::Setup(format!("unknown 802.11 standard {}", x))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Standard;

    #[test]
    fn ofdm_slot_and_sifs() {
        let t = Standard::Dot11g.timing();
        assert_eq!(t.slot_us, 9.0);
        assert_eq!(t.sifs_us, 16.0);
        assert_eq!(Standard::Dot11a.timing(), t);
        assert_eq!(Standard::Dot11p.timing().sifs_us, 32.0);
    }

    #[test]
    fn dsss_airtime() {
        let t = Standard::Dot11b.txtime(11.0, 20.0, 1534);
        // 192 + 1562*8/11 + 1
        assert!((t.data_us - (193.0 + 1562.0 * 8.0 / 11.0)).abs() < 1e-9);
        assert!(t.rts_us < t.data_us);
    }

    #[test]
    fn ofdm_airtime() {
        let t = Standard::Dot11g.txtime(54.0, 20.0, 1534);
        // 16 + 4 + ceil(2 + (22 + 12272) / 54)
        assert_eq!(t.data_us, 20.0 + (2.0f64 + 12294.0 / 54.0).ceil());
        assert_eq!(t.rts_us, 20.0 + (160.0f64 / 54.0).ceil());
        assert_eq!(t.ack_us, 23.0);
    }

    #[test]
    fn narrow_channels_stretch() {
        let full = Standard::Dot11p.txtime(6.0, 20.0, 500);
        let half = Standard::Dot11p.txtime(6.0, 10.0, 500);
        assert!(half.data_us > full.data_us);
        assert!(half.rts_us > full.rts_us);
    }

    #[test]
    fn parse_standard() {
        assert_eq!("11g".parse::<Standard>().unwrap(), Standard::Dot11g);
        assert_eq!("802.11p".parse::<Standard>().unwrap(), Standard::Dot11p);
        assert!("11n".parse::<Standard>().is_err());
    }
}
