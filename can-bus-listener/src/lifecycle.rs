//! Bus interface lifecycle
//!
//! Drives the interface through `WaitingForInterface -> Opening -> Listening
//! -> ShuttingDown`. There is no way back once listening has started: any
//! fatal error or an operator interrupt goes straight to shutdown, and
//! shutdown runs exactly once.

use crate::config::BusConfig;
use crate::interface::{BusError, FrameSource, LinkControl};
use crate::interrupt::InterruptFlag;
use crate::processor::CanProcessor;
use crate::publisher::RecordSink;
use std::thread;
use std::time::{Duration, Instant};

/// Lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    WaitingForInterface,
    Opening,
    Listening,
    /// Terminal
    ShuttingDown,
}

/// Timing and naming for one bus lifecycle
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// Network interface name (e.g. "can0")
    pub interface: String,
    /// Give up waiting for the interface after this long
    pub wait_timeout: Duration,
    /// Delay between readiness polls
    pub poll_interval: Duration,
    /// Longest single wait for a frame
    pub receive_timeout: Duration,
}

impl LifecycleSettings {
    pub fn from_config(config: &BusConfig) -> Self {
        Self {
            interface: config.interface.clone(),
            wait_timeout: config.wait_timeout(),
            poll_interval: config.poll_interval(),
            receive_timeout: config.receive_timeout(),
        }
    }
}

pub struct BusLifecycle<L: LinkControl> {
    settings: LifecycleSettings,
    link: L,
    state: BusState,
    shut_down: bool,
}

impl<L: LinkControl> BusLifecycle<L> {
    pub fn new(settings: LifecycleSettings, link: L) -> Self {
        Self {
            settings,
            link,
            state: BusState::WaitingForInterface,
            shut_down: false,
        }
    }

    pub fn state(&self) -> BusState {
        self.state
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Poll the link until it is up, the wait times out, or an interrupt arrives
    pub fn wait_for_interface(&mut self, interrupt: &InterruptFlag) -> Result<(), BusError> {
        self.state = BusState::WaitingForInterface;
        let interface = self.settings.interface.as_str();
        let started = Instant::now();

        loop {
            if interrupt.is_triggered() {
                return Err(BusError::Interrupted);
            }
            if self.link.is_up(interface) {
                log::info!("CAN interface {} is ready.", interface);
                return Ok(());
            }

            let elapsed = started.elapsed();
            if elapsed >= self.settings.wait_timeout {
                break;
            }

            log::warn!("Waiting for {} to be ready...", interface);
            thread::sleep(self.settings.poll_interval.min(self.settings.wait_timeout - elapsed));
        }

        log::error!("CAN interface {} did not come up.", interface);
        Err(BusError::InterfaceTimeout {
            interface: interface.to_string(),
            timeout: self.settings.wait_timeout,
        })
    }

    /// Open the bus channel; any failure is fatal
    pub fn open<S, F>(&mut self, opener: F) -> Result<S, BusError>
    where
        F: FnOnce(&str) -> Result<S, BusError>,
    {
        self.state = BusState::Opening;
        log::info!("Opening CAN interface {}...", self.settings.interface);

        match opener(&self.settings.interface) {
            Ok(source) => {
                log::info!("CAN interface initialized successfully.");
                Ok(source)
            }
            Err(e) => {
                log::error!("Error initializing CAN bus: {}", e);
                Err(e)
            }
        }
    }

    /// Receive and process frames until interrupted
    ///
    /// Each iteration waits at most `receive_timeout` for a frame, then checks
    /// the heartbeat whether or not a frame arrived.
    pub fn listen<F, S>(
        &mut self,
        source: &mut F,
        processor: &mut CanProcessor<S>,
        interrupt: &InterruptFlag,
    ) -> Result<(), BusError>
    where
        F: FrameSource,
        S: RecordSink,
    {
        self.state = BusState::Listening;
        log::info!("Listening for CAN messages...");

        while !interrupt.is_triggered() {
            match source.recv(self.settings.receive_timeout) {
                Ok(Some(frame)) => {
                    processor.process_frame(&frame);
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!("CAN receive failed: {}", e);
                    return Err(e);
                }
            }

            processor.check_heartbeat();
        }

        log::info!("CAN listener stopped by user.");
        Ok(())
    }

    /// Release the interface; failures are logged, and later calls do nothing
    pub fn shutdown(&mut self) {
        self.state = BusState::ShuttingDown;
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        log::info!("Shutting down CAN interface...");
        if let Err(e) = self.link.bring_down(&self.settings.interface) {
            log::error!("Failed to bring down {}: {}", self.settings.interface, e);
        }
    }

    /// Run the whole lifecycle and always finish shut down
    ///
    /// Returns `Ok(())` when stopped by an interrupt, or the fatal error that
    /// ended the run.
    pub fn run<F, S, O>(
        &mut self,
        opener: O,
        processor: &mut CanProcessor<S>,
        interrupt: &InterruptFlag,
    ) -> Result<(), BusError>
    where
        F: FrameSource,
        S: RecordSink,
        O: FnOnce(&str) -> Result<F, BusError>,
    {
        let result = self.start_and_listen(opener, processor, interrupt);
        self.shutdown();

        match result {
            Err(BusError::Interrupted) => {
                log::info!("Stopped by user before listening started.");
                Ok(())
            }
            other => other,
        }
    }

    fn start_and_listen<F, S, O>(
        &mut self,
        opener: O,
        processor: &mut CanProcessor<S>,
        interrupt: &InterruptFlag,
    ) -> Result<(), BusError>
    where
        F: FrameSource,
        S: RecordSink,
        O: FnOnce(&str) -> Result<F, BusError>,
    {
        self.wait_for_interface(interrupt)?;
        let mut source = self.open(opener)?;
        self.listen(&mut source, processor, interrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heartbeat::HeartbeatTracker;
    use crate::publisher::{MemorySink, StatusRecord};
    use pgn_decoder::{PgnDecoder, RawFrame};
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::io;

    /// Link that comes up after a number of polls
    struct ScriptedLink {
        up_after: Option<usize>,
        polls: Cell<usize>,
        teardowns: Cell<usize>,
        fail_teardown: bool,
    }

    impl ScriptedLink {
        fn up_after(polls: usize) -> Self {
            Self {
                up_after: Some(polls),
                polls: Cell::new(0),
                teardowns: Cell::new(0),
                fail_teardown: false,
            }
        }

        fn never_up() -> Self {
            Self {
                up_after: None,
                ..Self::up_after(0)
            }
        }
    }

    impl LinkControl for ScriptedLink {
        fn is_up(&self, _interface: &str) -> bool {
            let polls = self.polls.get() + 1;
            self.polls.set(polls);
            self.up_after.map_or(false, |n| polls > n)
        }

        fn bring_down(&self, interface: &str) -> Result<(), BusError> {
            self.teardowns.set(self.teardowns.get() + 1);
            if self.fail_teardown {
                return Err(BusError::LinkCommand {
                    command: format!("ip link set {} down", interface),
                    reason: "exit status: 1".to_string(),
                });
            }
            Ok(())
        }
    }

    /// Frame source replaying a script, then raising the interrupt
    struct ScriptedSource {
        script: VecDeque<Result<Option<RawFrame>, BusError>>,
        interrupt: InterruptFlag,
    }

    impl FrameSource for ScriptedSource {
        fn recv(&mut self, _timeout: Duration) -> Result<Option<RawFrame>, BusError> {
            match self.script.pop_front() {
                Some(step) => step,
                None => {
                    self.interrupt.trigger();
                    Ok(None)
                }
            }
        }
    }

    fn settings() -> LifecycleSettings {
        LifecycleSettings {
            interface: "vcan0".to_string(),
            wait_timeout: Duration::from_millis(50),
            poll_interval: Duration::from_millis(1),
            receive_timeout: Duration::from_millis(1),
        }
    }

    fn processor(heartbeat_interval: Duration) -> CanProcessor<MemorySink> {
        CanProcessor::new(
            PgnDecoder::default(),
            HeartbeatTracker::new(heartbeat_interval),
            MemorySink::default(),
        )
    }

    fn source(
        script: Vec<Result<Option<RawFrame>, BusError>>,
        interrupt: &InterruptFlag,
    ) -> ScriptedSource {
        ScriptedSource {
            script: script.into(),
            interrupt: interrupt.clone(),
        }
    }

    fn heartbeats(records: &[StatusRecord]) -> usize {
        records
            .iter()
            .filter(|r| matches!(r, StatusRecord::Heartbeat { .. }))
            .count()
    }

    #[test]
    fn test_full_run_until_interrupt() {
        let interrupt = InterruptFlag::new();
        let mut lifecycle = BusLifecycle::new(settings(), ScriptedLink::up_after(2));
        let mut processor = processor(Duration::ZERO);
        let script = vec![
            Ok(Some(RawFrame::extended(0x0CF00400, vec![0, 0, 0, 0x10, 0x27, 0, 0, 0]))),
            Ok(None),
            Ok(Some(RawFrame::standard(0x7E8, vec![0x02]))),
        ];
        let scripted = source(script, &interrupt);

        let result = lifecycle.run(|_| Ok(scripted), &mut processor, &interrupt);
        assert!(result.is_ok());
        assert_eq!(lifecycle.state(), BusState::ShuttingDown);
        assert_eq!(lifecycle.link().polls.get(), 3);
        assert_eq!(lifecycle.link().teardowns.get(), 1);

        let records = &processor.sink().records;
        // A heartbeat check follows every receive, frame or not
        assert_eq!(heartbeats(records), 4);
        assert_eq!(
            records[0],
            StatusRecord::Reading {
                name: "Engine RPM".to_string(),
                value: "1250.00".to_string(),
            }
        );
        assert_eq!(
            records[3],
            StatusRecord::Unknown {
                name: "unknown".to_string(),
                arbitration_id: "2024".to_string(),
            }
        );
        assert_eq!(processor.tracker().messages_received(), 2);
    }

    #[test]
    fn test_interface_timeout_is_fatal() {
        let interrupt = InterruptFlag::new();
        let mut lifecycle = BusLifecycle::new(settings(), ScriptedLink::never_up());
        let mut processor = processor(Duration::from_secs(5));
        let opened = Cell::new(false);

        let result = lifecycle.run(
            |_| {
                opened.set(true);
                Ok(source(Vec::new(), &interrupt))
            },
            &mut processor,
            &interrupt,
        );

        assert!(matches!(result, Err(BusError::InterfaceTimeout { .. })));
        assert!(!opened.get());
        assert!(lifecycle.link().polls.get() > 1);
        assert_eq!(lifecycle.link().teardowns.get(), 1);
        assert_eq!(lifecycle.state(), BusState::ShuttingDown);
    }

    #[test]
    fn test_open_failure_is_fatal() {
        let interrupt = InterruptFlag::new();
        let mut lifecycle = BusLifecycle::new(settings(), ScriptedLink::up_after(0));
        let mut processor = processor(Duration::ZERO);

        let result = lifecycle.run(
            |interface: &str| -> Result<ScriptedSource, BusError> {
                Err(BusError::Open {
                    interface: interface.to_string(),
                    source: io::Error::from(io::ErrorKind::NotFound),
                })
            },
            &mut processor,
            &interrupt,
        );

        assert!(matches!(result, Err(BusError::Open { ref interface, .. }) if interface == "vcan0"));
        assert!(processor.sink().records.is_empty());
        assert_eq!(lifecycle.link().teardowns.get(), 1);
    }

    #[test]
    fn test_receive_error_is_fatal() {
        let interrupt = InterruptFlag::new();
        let mut lifecycle = BusLifecycle::new(settings(), ScriptedLink::up_after(0));
        let mut processor = processor(Duration::from_secs(60));
        let script = vec![
            Ok(Some(RawFrame::extended(0x18FEEE00, vec![0x4B]))),
            Err(BusError::Receive(io::Error::from(io::ErrorKind::NetworkDown))),
            Ok(Some(RawFrame::extended(0x18FEEE00, vec![0x4B]))),
        ];
        let scripted = source(script, &interrupt);

        let result = lifecycle.run(|_| Ok(scripted), &mut processor, &interrupt);
        assert!(matches!(result, Err(BusError::Receive(_))));
        assert_eq!(processor.tracker().messages_received(), 1);
        assert_eq!(lifecycle.link().teardowns.get(), 1);
    }

    #[test]
    fn test_interrupt_while_waiting_exits_cleanly() {
        let interrupt = InterruptFlag::new();
        interrupt.trigger();
        let mut lifecycle = BusLifecycle::new(settings(), ScriptedLink::never_up());
        let mut processor = processor(Duration::ZERO);

        let result = lifecycle.run(|_| Ok(source(Vec::new(), &interrupt)), &mut processor, &interrupt);
        assert!(result.is_ok());
        assert_eq!(lifecycle.link().polls.get(), 0);
        assert_eq!(lifecycle.link().teardowns.get(), 1);
    }

    #[test]
    fn test_shutdown_runs_once() {
        let mut lifecycle = BusLifecycle::new(settings(), ScriptedLink::up_after(0));
        lifecycle.shutdown();
        lifecycle.shutdown();
        assert_eq!(lifecycle.link().teardowns.get(), 1);
        assert_eq!(lifecycle.state(), BusState::ShuttingDown);
    }

    #[test]
    fn test_teardown_failure_is_not_escalated() {
        let interrupt = InterruptFlag::new();
        let link = ScriptedLink {
            fail_teardown: true,
            ..ScriptedLink::up_after(0)
        };
        let mut lifecycle = BusLifecycle::new(settings(), link);
        let mut processor = processor(Duration::ZERO);

        let result = lifecycle.run(|_| Ok(source(Vec::new(), &interrupt)), &mut processor, &interrupt);
        assert!(result.is_ok());
        assert_eq!(lifecycle.link().teardowns.get(), 1);
    }

    #[test]
    fn test_heartbeat_while_bus_is_silent() {
        let interrupt = InterruptFlag::new();
        let mut lifecycle = BusLifecycle::new(settings(), ScriptedLink::up_after(0));
        let mut processor = processor(Duration::ZERO);
        let scripted = source(vec![Ok(None), Ok(None), Ok(None)], &interrupt);

        lifecycle.run(|_| Ok(scripted), &mut processor, &interrupt).unwrap();

        let records = &processor.sink().records;
        assert_eq!(records.len(), 4);
        assert_eq!(heartbeats(records), 4);
        assert!(matches!(
            &records[0],
            StatusRecord::Heartbeat { messages_received, .. } if messages_received == "0"
        ));
    }
}
