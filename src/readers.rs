use std::time::Duration;

use minion::Cancellable;
use slog::{debug, warn};

use crate::udp::Transport;
use crate::StationId;

const MAX_FRAME: usize = 1500;

/// Pause after a failed receive so a dead socket does not spin the thread.
pub const RECV_BACKOFF: Duration = Duration::from_millis(50);

/// An inbound control frame, not yet validated.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub from: StationId,
    pub payload: Vec<u8>,
}

/// Blocks on the transport and forwards every frame to the runtime.
pub struct FrameReader<T>(T, Vec<u8>, crossbeam::Sender<Frame>, slog::Logger);

impl<T: Transport> FrameReader<T> {
    pub fn make(transport: T, logger: slog::Logger) -> (Self, crossbeam::Receiver<Frame>) {
        let (send, recv) = crossbeam::unbounded();
        let s = FrameReader(transport, vec![0u8; MAX_FRAME], send, logger);
        (s, recv)
    }
}

impl<T: Transport> Cancellable for FrameReader<T> {
    type Error = crate::Error;

    fn for_each(&mut self) -> std::result::Result<minion::LoopState, Self::Error> {
        let (n, from) = match self.0.recv(&mut self.1[..]) {
            Ok(x) => x,
            Err(e) => {
                warn!(self.3, "control frame receive failed"; "err" => %e);
                std::thread::sleep(RECV_BACKOFF);
                return Ok(minion::LoopState::Continue);
            }
        };

        let frame = Frame {
            from,
            payload: self.1[..n].to_vec(),
        };

        if self.2.send(frame).is_err() {
            debug!(self.3, "runtime gone, stopping reader");
            return Ok(minion::LoopState::Break);
        }

        Ok(minion::LoopState::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::{Frame, FrameReader, RECV_BACKOFF};
    use crate::udp::Transport;
    use crate::{test_logger, Error, Result, StationId};
    use minion::Cancellable;
    use std::cell::RefCell;
    use std::time::Instant;

    struct Scripted(RefCell<Vec<Result<(Vec<u8>, StationId)>>>);

    impl Transport for Scripted {
        fn broadcast_send(&self, _payload: &[u8]) -> Result<()> {
            Ok(())
        }

        fn recv(&self, buf: &mut [u8]) -> Result<(usize, StationId)> {
            let (payload, from) = self.0.borrow_mut().remove(0)?;
            buf[..payload.len()].copy_from_slice(&payload);
            Ok((payload.len(), from))
        }
    }

    #[test]
    fn forwards_frames_and_survives_errors() {
        let t = Scripted(RefCell::new(vec![
            Err(Error::Transport(std::io::Error::new(
                std::io::ErrorKind::Other,
                "rx",
            ))),
            Ok((b"hello".to_vec(), StationId::new("10.0.0.9"))),
        ]));
        let (mut r, rx) = FrameReader::make(t, test_logger());

        let start = Instant::now();
        match r.for_each() {
            Ok(minion::LoopState::Continue) => (),
            _ => panic!("reader stopped on transport error"),
        }
        // a failing socket must not be polled in a tight loop
        assert!(start.elapsed() >= RECV_BACKOFF);
        assert!(rx.try_recv().is_err());

        match r.for_each() {
            Ok(minion::LoopState::Continue) => (),
            _ => panic!("reader stopped"),
        }
        assert_eq!(
            rx.try_recv().unwrap(),
            Frame {
                from: StationId::new("10.0.0.9"),
                payload: b"hello".to_vec(),
            }
        );
    }

    #[test]
    fn stops_when_runtime_drops() {
        let t = Scripted(RefCell::new(vec![Ok((
            b"x".to_vec(),
            StationId::new("10.0.0.9"),
        ))]));
        let (mut r, rx) = FrameReader::make(t, test_logger());
        drop(rx);

        match r.for_each() {
            Ok(minion::LoopState::Break) => (),
            _ => panic!("reader kept running"),
        }
    }
}
