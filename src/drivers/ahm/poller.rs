//! Request scheduling for the processor
//!
//! The device has no flow control and no request/response correlation, so
//! the only backpressure is a fixed pause after every request. A full
//! readout walks every channel of the unit, then any monitored send
//! relationships.

use std::time::Duration;

use tracing::{debug, trace};

use crate::feedback::FeedbackRegistry;
use crate::protocol::{ChannelType, Frame, Request};
use crate::state::DeviceUnit;

/// Something frames can be written to
pub trait FrameSink: Send + Sync {
    /// Write one frame; returns false if it was dropped (not connected)
    fn send_frame(&self, frame: Frame) -> bool;
}

/// Fixed inter-request delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPacer {
    delay: Duration,
}

impl RequestPacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Suspend for the configured delay (no timer when zero)
    pub async fn pace(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// Requests for a full state readout, in issue order
///
/// Inputs first (mute then level, ascending channel), then zones the same
/// way, then one query per monitored send relationship. Plain channel mutes
/// are already covered by the channel walk.
pub fn readout_plan(unit: DeviceUnit, monitored: &FeedbackRegistry) -> Vec<Request> {
    let mut plan = Vec::with_capacity(2 * (unit.inputs + unit.zones) as usize + monitored.len());

    for &ch_type in ChannelType::all() {
        for channel in 1..=unit.count(ch_type) {
            plan.push(Request::MuteQuery { ch_type, channel });
            plan.push(Request::LevelQuery { ch_type, channel });
        }
    }

    plan.extend(
        monitored
            .iter()
            .filter(|entry| entry.is_send())
            .filter_map(|entry| entry.request()),
    );
    plan
}

/// Requests refreshing every monitored feedback
pub fn refresh_plan(monitored: &FeedbackRegistry) -> Vec<Request> {
    monitored.iter().filter_map(|entry| entry.request()).collect()
}

/// Encode a plan, dropping requests that cannot be encoded
pub fn encode_plan(plan: &[Request]) -> Vec<Frame> {
    plan.iter()
        .filter_map(|request| match request.encode() {
            Ok(frame) => Some(frame),
            Err(e) => {
                debug!("Dropping request {}: {}", request, e);
                None
            }
        })
        .collect()
}

/// Send frames one at a time, pausing after each
///
/// Stops early once `is_current` reports the connection that started the
/// run is gone, so a stale run never writes to a newer connection.
/// Returns the number of frames handed to the sink.
pub async fn run_paced<S, F>(frames: Vec<Frame>, sink: &S, pacer: &RequestPacer, is_current: F) -> usize
where
    S: FrameSink + ?Sized,
    F: Fn() -> bool,
{
    let total = frames.len();
    let mut sent = 0;

    for frame in frames {
        if !is_current() {
            debug!("Abandoning paced run after {}/{} requests", sent, total);
            return sent;
        }
        trace!("Paced TX {}/{}: {}", sent + 1, total, frame);
        if sink.send_frame(frame) {
            sent += 1;
        }
        pacer.pace().await;
    }

    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::MonitoredFeedback;
    use crate::protocol::SendType;
    use crate::state::UnitType;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::Instant;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(Instant, Frame)>>,
    }

    impl FrameSink for RecordingSink {
        fn send_frame(&self, frame: Frame) -> bool {
            self.sent.lock().push((Instant::now(), frame));
            true
        }
    }

    #[test]
    fn test_readout_plan_order() {
        let plan = readout_plan(UnitType::Ahm16.unit(), &FeedbackRegistry::new());
        assert_eq!(plan.len(), 64);

        assert_eq!(
            plan[0],
            Request::MuteQuery {
                ch_type: ChannelType::Input,
                channel: 1
            }
        );
        assert_eq!(
            plan[1],
            Request::LevelQuery {
                ch_type: ChannelType::Input,
                channel: 1
            }
        );
        assert_eq!(
            plan[31],
            Request::LevelQuery {
                ch_type: ChannelType::Input,
                channel: 16
            }
        );
        assert_eq!(
            plan[32],
            Request::MuteQuery {
                ch_type: ChannelType::Zone,
                channel: 1
            }
        );
        assert_eq!(
            plan[63],
            Request::LevelQuery {
                ch_type: ChannelType::Zone,
                channel: 16
            }
        );
    }

    #[test]
    fn test_readout_plan_includes_monitored_sends() {
        let monitored: FeedbackRegistry = [
            MonitoredFeedback::send_mute(SendType::InputToZone, 3, 5),
            MonitoredFeedback::mute(ChannelType::Input, 2),
        ]
        .into_iter()
        .collect();

        let plan = readout_plan(UnitType::Ahm64.unit(), &monitored);
        assert_eq!(plan.len(), 4 * 64 + 1);
        assert_eq!(
            plan.last(),
            Some(&Request::SendMuteQuery {
                send_type: SendType::InputToZone,
                channel: 3,
                send_channel: 5,
            })
        );

        assert_eq!(refresh_plan(&monitored).len(), 2);
    }

    #[test]
    fn test_encode_plan_drops_bad_requests() {
        let plan = [
            Request::MuteQuery {
                ch_type: ChannelType::Input,
                channel: 0,
            },
            Request::MuteQuery {
                ch_type: ChannelType::Input,
                channel: 1,
            },
        ];
        assert_eq!(encode_plan(&plan).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_paced_spacing() {
        let frames = encode_plan(&readout_plan(UnitType::Ahm16.unit(), &FeedbackRegistry::new()));
        let sink = RecordingSink::default();
        let pacer = RequestPacer::new(Duration::from_millis(150));

        let sent = run_paced(frames.clone(), &sink, &pacer, || true).await;
        assert_eq!(sent, 64);

        let recorded = sink.sent.lock();
        let sent_frames: Vec<Frame> = recorded.iter().map(|(_, f)| f.clone()).collect();
        assert_eq!(sent_frames, frames);
        for pair in recorded.windows(2) {
            assert_eq!(pair[1].0 - pair[0].0, Duration::from_millis(150));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_paced_zero_delay() {
        let frames = encode_plan(&readout_plan(UnitType::Ahm16.unit(), &FeedbackRegistry::new()));
        let sink = RecordingSink::default();
        let start = Instant::now();

        run_paced(frames, &sink, &RequestPacer::new(Duration::ZERO), || true).await;

        assert_eq!(sink.sent.lock().len(), 64);
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_paced_abandons_stale_run() {
        let frames = encode_plan(&readout_plan(UnitType::Ahm16.unit(), &FeedbackRegistry::new()));
        let sink = RecordingSink::default();
        let current = AtomicBool::new(true);
        let pacer = RequestPacer::new(Duration::from_millis(150));

        let run = run_paced(frames, &sink, &pacer, || current.load(Ordering::SeqCst));
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(400)).await;
            current.store(false, Ordering::SeqCst);
        };
        let (sent, _) = tokio::join!(run, cancel);

        // Sent at t=0, 150, 300; the check at 450 sees the torn-down flag
        assert_eq!(sent, 3);
        assert_eq!(sink.sent.lock().len(), 3);
    }
}
