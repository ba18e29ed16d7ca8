use crate::agents::update_cycle::CycleRunner;
use crate::error::Result;
use jiff::{SignedDuration, Zoned};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Lifecycle of the background service: `Starting -> Running -> StopPending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRunState {
    Starting,
    Running,
    StopPending,
}

impl fmt::Display for ServiceRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServiceRunState::Starting => "starting",
            ServiceRunState::Running => "running",
            ServiceRunState::StopPending => "stop pending",
        };
        f.write_str(label)
    }
}

/// Requests delivered to a running service by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    Stop,
    Shutdown,
    /// Anything else; logged and ignored
    Other(String),
}

/// Drives update cycles on a fixed interval until a stop or shutdown arrives.
///
/// Timer ticks and control requests are multiplexed on one task, so at most
/// one cycle runs at a time and a stop only takes effect between cycles.
pub struct ServiceController<R: CycleRunner> {
    runner: R,
    interval: Duration,
    state: ServiceRunState,
    observer: Option<Box<dyn FnMut(ServiceRunState)>>,
}

impl<R: CycleRunner> ServiceController<R> {
    pub fn new(runner: R, interval: Duration) -> Self {
        info!("Service {}", ServiceRunState::Starting);
        Self {
            runner,
            interval,
            state: ServiceRunState::Starting,
            observer: None,
        }
    }

    /// Called with the current state when `run` begins and on every transition.
    pub fn on_transition(mut self, observer: impl FnMut(ServiceRunState) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn state(&self) -> ServiceRunState {
        self.state
    }

    /// Run until stopped; returns the number of completed cycles.
    ///
    /// A closed control channel is treated like a stop request.
    pub async fn run(&mut self, mut control: mpsc::UnboundedReceiver<ControlRequest>) -> usize {
        self.publish();
        self.transition(ServiceRunState::Running);
        info!("Checking for updates every {}s", self.interval.as_secs());

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.log_next_check();

        let mut cycles = 0;
        loop {
            tokio::select! {
                biased;

                request = control.recv() => match request {
                    Some(ControlRequest::Stop) | Some(ControlRequest::Shutdown) | None => {
                        debug!("Control request: {:?}", request);
                        break;
                    }
                    Some(ControlRequest::Other(name)) => {
                        warn!("Unexpected control request {name}");
                    }
                },
                _ = ticker.tick() => {
                    self.runner.run_cycle();
                    cycles += 1;
                    self.log_next_check();
                }
            }
        }

        self.transition(ServiceRunState::StopPending);
        cycles
    }

    fn transition(&mut self, next: ServiceRunState) {
        debug_assert!(matches!(
            (self.state, next),
            (ServiceRunState::Starting, ServiceRunState::Running)
                | (ServiceRunState::Running, ServiceRunState::StopPending)
        ));
        info!("Service {} -> {}", self.state, next);
        self.state = next;
        self.publish();
    }

    fn publish(&mut self) {
        if let Some(observer) = self.observer.as_mut() {
            observer(self.state);
        }
    }

    fn log_next_check(&self) {
        let next = SignedDuration::try_from(self.interval)
            .ok()
            .and_then(|interval| Zoned::now().checked_add(interval).ok());
        if let Some(next) = next {
            info!("Next update check at {}", next.strftime("%Y-%m-%d %H:%M:%S"));
        }
    }
}

/// Forward OS termination signals into `tx` as [`ControlRequest`]s.
///
/// Must be called from within a tokio runtime.
#[cfg(unix)]
pub fn spawn_signal_forwarder(tx: mpsc::UnboundedSender<ControlRequest>) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    tokio::spawn(async move {
        loop {
            let request = tokio::select! {
                _ = interrupt.recv() => ControlRequest::Stop,
                _ = terminate.recv() => ControlRequest::Shutdown,
                _ = hangup.recv() => ControlRequest::Other("SIGHUP".to_string()),
            };
            if tx.send(request).is_err() {
                break;
            }
        }
    });
    Ok(())
}

#[cfg(windows)]
pub fn spawn_signal_forwarder(tx: mpsc::UnboundedSender<ControlRequest>) -> Result<()> {
    use tokio::signal::windows::{ctrl_break, ctrl_c, ctrl_close, ctrl_shutdown};

    let mut interrupt = ctrl_c()?;
    let mut brk = ctrl_break()?;
    let mut close = ctrl_close()?;
    let mut shutdown = ctrl_shutdown()?;

    tokio::spawn(async move {
        loop {
            let request = tokio::select! {
                _ = interrupt.recv() => ControlRequest::Stop,
                _ = close.recv() => ControlRequest::Stop,
                _ = shutdown.recv() => ControlRequest::Shutdown,
                _ = brk.recv() => ControlRequest::Other("CTRL_BREAK".to_string()),
            };
            if tx.send(request).is_err() {
                break;
            }
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::update_cycle::CycleSummary;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct CountingRunner {
        runs: usize,
    }

    impl CycleRunner for CountingRunner {
        fn run_cycle(&mut self) -> CycleSummary {
            self.runs += 1;
            CycleSummary::default()
        }
    }

    fn send_after(tx: mpsc::UnboundedSender<ControlRequest>, secs: u64, request: ControlRequest) {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            let _ = tx.send(request);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_on_interval_until_stopped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut controller =
            ServiceController::new(CountingRunner::default(), Duration::from_secs(120));
        assert_eq!(controller.state(), ServiceRunState::Starting);

        send_after(tx, 250, ControlRequest::Stop);
        let cycles = controller.run(rx).await;

        assert_eq!(cycles, 2);
        assert_eq!(controller.runner.runs, 2);
        assert_eq!(controller.state(), ServiceRunState::StopPending);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_first_tick_runs_nothing() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ControlRequest::Shutdown).unwrap();

        let mut controller =
            ServiceController::new(CountingRunner::default(), Duration::from_secs(3600));
        let cycles = controller.run(rx).await;

        assert_eq!(cycles, 0);
        assert_eq!(controller.state(), ServiceRunState::StopPending);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_requests_keep_the_loop_running() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ControlRequest::Other("SIGHUP".to_string())).unwrap();
        send_after(tx, 130, ControlRequest::Stop);

        let mut controller =
            ServiceController::new(CountingRunner::default(), Duration::from_secs(60));
        let cycles = controller.run(rx).await;

        assert_eq!(cycles, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_channel_stops_the_loop() {
        let (tx, rx) = mpsc::unbounded_channel::<ControlRequest>();
        drop(tx);

        let mut controller =
            ServiceController::new(CountingRunner::default(), Duration::from_secs(60));
        assert_eq!(controller.run(rx).await, 0);
        assert_eq!(controller.state(), ServiceRunState::StopPending);
    }

    #[tokio::test(start_paused = true)]
    async fn observer_sees_every_state_in_order() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ControlRequest::Stop).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut controller =
            ServiceController::new(CountingRunner::default(), Duration::from_secs(60))
                .on_transition(move |state| sink.borrow_mut().push(state));
        controller.run(rx).await;

        assert_eq!(
            *seen.borrow(),
            vec![
                ServiceRunState::Starting,
                ServiceRunState::Running,
                ServiceRunState::StopPending
            ]
        );
    }

    #[test]
    fn states_display() {
        assert_eq!(ServiceRunState::StopPending.to_string(), "stop pending");
    }
}
