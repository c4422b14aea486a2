//! Timing of UDP retransmissions.
//!
//! A call may take `timeout` in total. Within it the client waits at most
//! the current retransmission timeout for a reply before it sends the call
//! again. In exponential mode that wait doubles after every expiry. The
//! schedule only does the arithmetic; the caller passes in the clock.

use std::time::Duration;

use tokio::time::Instant;

use super::config::RetransmissionMode;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetransmitSchedule {
    deadline: Instant,
    resend_timeout: Duration,
    mode: RetransmissionMode,
}

impl RetransmitSchedule {
    pub fn new(
        now: Instant,
        timeout: Duration,
        retransmission_timeout: Duration,
        mode: RetransmissionMode,
    ) -> Self {
        Self { deadline: now + timeout, resend_timeout: retransmission_timeout, mode }
    }

    /// How long to wait for a reply: the retransmission timeout, cut short
    /// by the deadline. Zero once the deadline has passed.
    pub fn wait_time(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now).min(self.resend_timeout)
    }

    /// Called after a wait ran out without a reply.
    pub fn backoff(&mut self) {
        if self.mode == RetransmissionMode::Exponential {
            self.resend_timeout = self.resend_timeout.saturating_mul(2);
        }
    }

    /// True once the call is out of time.
    pub fn expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    pub fn resend_timeout(&self) -> Duration {
        self.resend_timeout
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Plays a call against a silent server and records when each send
    /// happens, in milliseconds since the start.
    fn send_times(timeout: u64, retransmit: u64, mode: RetransmissionMode) -> Vec<u64> {
        let start = Instant::now();
        let mut now = start;
        let mut schedule = RetransmitSchedule::new(
            now,
            Duration::from_millis(timeout),
            Duration::from_millis(retransmit),
            mode,
        );
        let mut sends = Vec::new();
        loop {
            sends.push((now - start).as_millis() as u64);
            now += schedule.wait_time(now);
            schedule.backoff();
            if schedule.expired(now) {
                return sends;
            }
        }
    }

    #[test]
    fn fixed_mode_sends_evenly() {
        assert_eq!(send_times(300, 100, RetransmissionMode::Fixed), vec![0, 100, 200]);
        assert_eq!(send_times(250, 100, RetransmissionMode::Fixed), vec![0, 100, 200]);
        assert_eq!(send_times(1000, 1000, RetransmissionMode::Fixed), vec![0]);
    }

    #[test]
    fn exponential_mode_doubles_the_wait() {
        assert_eq!(send_times(1000, 100, RetransmissionMode::Exponential), vec![0, 100, 300, 700]);
    }

    #[test]
    fn wait_is_cut_by_the_deadline() {
        let now = Instant::now();
        let schedule = RetransmitSchedule::new(
            now,
            Duration::from_millis(150),
            Duration::from_millis(100),
            RetransmissionMode::Fixed,
        );
        assert_eq!(schedule.wait_time(now), Duration::from_millis(100));
        assert_eq!(schedule.wait_time(now + Duration::from_millis(120)), Duration::from_millis(30));
        assert_eq!(schedule.wait_time(now + Duration::from_millis(200)), Duration::ZERO);
        assert!(schedule.expired(now + Duration::from_millis(150)));
    }
}
