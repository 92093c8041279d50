// ── Transient pulse states ──
//
// Ding/motion sensors and lock entities flip to an active state and
// revert on their own. Each entity owns one `PulseTimer`; starting a new
// pulse aborts the pending one and bumps the generation, so an expiry
// that raced the abort is recognised as stale and ignored. A cancelled
// pulse is inactive, which makes its raced expiry stale too.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::event::{BridgeEvent, EventSender};

#[derive(Debug, Default)]
pub(crate) struct PulseTimer {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl PulseTimer {
    /// Start (or restart) the pulse. Returns the new generation.
    pub(crate) fn start(
        &mut self,
        duration: Duration,
        device_id: &str,
        entity: &str,
        events: &EventSender,
    ) -> u64 {
        self.cancel();
        self.generation += 1;

        let generation = self.generation;
        let events = events.clone();
        let device_id = device_id.to_owned();
        let entity = entity.to_owned();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // Receiver gone means the bridge is shutting down
            let _ = events.send(BridgeEvent::PulseExpired {
                device_id,
                entity,
                generation,
            });
        }));
        generation
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Accept an expiry notice. Returns `true` if it belongs to the live
    /// pulse, which is then over.
    pub(crate) fn expire(&mut self, generation: u64) -> bool {
        if generation == self.generation && self.task.is_some() {
            self.task = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for PulseTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn pulse_expires_after_duration() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = PulseTimer::default();

        let generation = timer.start(Duration::from_secs(5), "d1", "lock", &tx);
        assert!(timer.is_active());

        tokio::time::sleep(Duration::from_secs(5)).await;
        let Some(BridgeEvent::PulseExpired { generation: got, entity, .. }) = rx.recv().await else {
            panic!("expected expiry");
        };
        assert_eq!(got, generation);
        assert_eq!(entity, "lock");
        assert!(timer.expire(got));
        assert!(!timer.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_cancels_pending_pulse() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = PulseTimer::default();

        let first = timer.start(Duration::from_secs(5), "d1", "ding", &tx);
        tokio::time::sleep(Duration::from_secs(3)).await;
        let second = timer.start(Duration::from_secs(5), "d1", "ding", &tx);
        assert_ne!(first, second);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(rx.try_recv().is_err(), "first pulse must not fire");
        assert!(!timer.expire(first), "stale generation is ignored");

        tokio::time::sleep(Duration::from_secs(2)).await;
        let Some(BridgeEvent::PulseExpired { generation, .. }) = rx.recv().await else {
            panic!("expected expiry");
        };
        assert_eq!(generation, second);
        assert!(timer.expire(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_ends_pulse_without_expiry() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = PulseTimer::default();

        let generation = timer.start(Duration::from_secs(5), "d1", "lock", &tx);
        tokio::time::sleep(Duration::from_secs(1)).await;
        timer.cancel();
        assert!(!timer.is_active());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert!(!timer.expire(generation));
    }
}
