//! # Control Loop
//!
//! Receives command datagrams, keeps the drive mode, maps commands onto actuator pulses and
//! writes them out, while keeping the stream supervisor informed of which operator is active.
//!
//! The loop moves through three states:
//!
//! - `Starting`: actuators are set to neutral. Failing to do so is fatal.
//! - `Serving`: one datagram at a time is received and applied. No single bad datagram, transport
//!   error or actuator error ends this state.
//! - `Stopping`: entered once the shutdown flag is raised. The stream is shut down and the
//!   actuators returned to neutral.
//!
//! If no valid command arrives for the command timeout the loop enters safe mode, which returns
//! the actuators to neutral until the next valid command.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc
    },
    thread,
    time::{Duration, Instant}
};

use comms_if::{cmd::DriveCmd, net::MAX_CMD_DATAGRAM_LEN};
use log::{debug, error, info, trace, warn};

use crate::{
    act_map::{ActMapper, ActParamsError, ActuatorPulse},
    cmd_server::CmdSource,
    drive_mode::{DriveMode, ModePolicy},
    params::RcExecParams,
    servo_ctrl::{ActChannel, ServoDriver, ServoError},
    stream::{Launcher, StreamSupervisor},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Pause after a transport error so a persistently failing socket doesn't spin the loop.
const RECV_ERROR_PAUSE: Duration = Duration::from_millis(50);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The vehicle's control loop.
pub struct ControlLoop<D: ServoDriver, S: CmdSource, L: Launcher> {
    state: LoopState,

    driver: D,
    source: S,
    mapper: ActMapper,

    /// `None` when streaming is disabled.
    supervisor: Option<Arc<StreamSupervisor<L>>>,

    mode: DriveMode,
    mode_policy: ModePolicy,

    /// Last pulse written to both channels.
    last_pulse: Option<ActuatorPulse>,

    /// Operator of the last valid command.
    last_peer: Option<SocketAddr>,

    /// Zero disables safe mode.
    cmd_timeout: Duration,
    last_cmd_time: Option<Instant>,
    safe_mode: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Serving,
    Stopping,
}

/// Errors which prevent the control loop from starting.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Invalid actuation parameters: {0}")]
    InvalidParams(#[from] ActParamsError),

    #[error("Could not set the actuators to neutral: {0}")]
    NeutralWrite(#[from] ServoError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<D, S, L> ControlLoop<D, S, L>
where
    D: ServoDriver,
    S: CmdSource,
    L: Launcher
{
    /// Create the loop and set the actuators to neutral.
    ///
    /// The loop starts in safe mode, it leaves it on the first valid command.
    pub fn new(
        driver: D,
        source: S,
        params: &RcExecParams,
        supervisor: Option<Arc<StreamSupervisor<L>>>
    ) -> Result<Self, ControlError> {
        let mapper = ActMapper::new(params.act.clone())?;

        let mut control = Self {
            state: LoopState::Starting,
            driver,
            source,
            mapper,
            supervisor,
            mode: DriveMode::default(),
            mode_policy: params.mode_policy,
            last_pulse: None,
            last_peer: None,
            cmd_timeout: Duration::from_millis(params.cmd_timeout_ms),
            last_cmd_time: None,
            safe_mode: true,
        };

        let neutral = control.mapper.neutral();
        control.write_pulse(neutral)?;

        info!("Actuators set to neutral ({:?})", neutral);

        Ok(control)
    }

    /// Serve commands until `shutdown` is raised, then stop.
    ///
    /// The flag is checked at least once per receive timeout of the command source.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        self.state = LoopState::Serving;

        info!("Serving commands in {:?} mode", self.mode);

        let mut buf = [0u8; MAX_CMD_DATAGRAM_LEN];

        while !shutdown.load(Ordering::SeqCst) {
            match self.source.recv(&mut buf) {
                Ok(Some((len, peer))) => {
                    if shutdown.load(Ordering::SeqCst) {
                        break
                    }
                    self.process_datagram(&buf[..len], peer);
                },
                Ok(None) => (),
                Err(e) => {
                    warn!("{}", e);
                    thread::sleep(RECV_ERROR_PAUSE);
                }
            }

            self.check_cmd_timeout();
        }

        self.stop();
    }

    /// Handle one datagram from `peer`.
    ///
    /// Any datagram moves the stream to `peer`. A malformed payload is then logged and dropped
    /// without touching the drive mode or the actuators, so only valid commands count as an
    /// operator change for the mode policy.
    pub fn process_datagram(&mut self, payload: &[u8], peer: SocketAddr) {
        if let Some(supervisor) = &self.supervisor {
            supervisor.on_client_seen(peer);
        }

        let cmd = match DriveCmd::from_bytes(payload) {
            Ok(c) => c,
            Err(e) => {
                warn!(
                    "Dropping malformed command from {} ({:?}): {}",
                    peer,
                    String::from_utf8_lossy(payload),
                    e
                );
                return
            }
        };

        if self.last_peer != Some(peer) {
            if let Some(prev) = self.last_peer {
                info!("Operator changed from {} to {}", prev, peer);

                if self.mode_policy == ModePolicy::ResetOnNewClient
                    && self.mode != DriveMode::Drive
                {
                    info!("Drive mode reset to {:?} for new operator", DriveMode::Drive);
                    self.mode = DriveMode::Drive;
                }
            }
            else {
                info!("First command from {}", peer);
            }

            self.last_peer = Some(peer);
        }

        trace!("Command from {}: {}", peer, cmd);

        let mode = self.mode.shift(cmd.gear());
        if mode != self.mode {
            info!("Drive mode changed from {:?} to {:?}", self.mode, mode);
            self.mode = mode;
        }

        let pulse = self.mapper.map(&cmd, self.mode);

        if self.safe_mode {
            info!("Received valid command, exiting safe mode");
            self.safe_mode = false;
        }
        self.last_cmd_time = Some(Instant::now());

        match self.write_pulse(pulse) {
            Ok(()) => debug!("Applied {:?}", pulse),
            Err(e) => error!("Could not apply {:?}: {}", pulse, e)
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    pub fn last_pulse(&self) -> Option<ActuatorPulse> {
        self.last_pulse
    }

    pub fn is_safe_mode(&self) -> bool {
        self.safe_mode
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Enter safe mode if the last valid command is too old.
    fn check_cmd_timeout(&mut self) {
        if self.safe_mode || self.cmd_timeout == Duration::from_millis(0) {
            return
        }

        let expired = match self.last_cmd_time {
            Some(t) => t.elapsed() >= self.cmd_timeout,
            None => true
        };

        if !expired {
            return
        }

        warn!("No valid command for {:?}, entering safe mode", self.cmd_timeout);

        // Only latch safe mode once neutral is actually applied, otherwise retry next time
        let neutral = self.mapper.neutral();
        match self.write_pulse(neutral) {
            Ok(()) => self.safe_mode = true,
            Err(e) => error!("Could not set the actuators to neutral: {}", e)
        }
    }

    fn stop(&mut self) {
        self.state = LoopState::Stopping;

        info!("Stopping control loop");

        if let Some(supervisor) = &self.supervisor {
            supervisor.shutdown();
        }

        let neutral = self.mapper.neutral();
        match self.write_pulse(neutral) {
            Ok(()) => info!("Actuators returned to neutral"),
            Err(e) => error!("Could not return the actuators to neutral: {}", e)
        }
    }

    /// Write steering then motor. The pulse is only recorded as applied if both writes succeed.
    ///
    /// If the motor write fails the steering is put back to the last applied pulse, so the
    /// outputs never mix two commands.
    fn write_pulse(&mut self, pulse: ActuatorPulse) -> Result<(), ServoError> {
        self.driver.set_pulse_width(ActChannel::Steering, pulse.servo_us)?;

        if let Err(e) = self.driver.set_pulse_width(ActChannel::Motor, pulse.motor_us) {
            if let Some(prev) = self.last_pulse {
                if prev.servo_us != pulse.servo_us {
                    let restored = self.driver
                        .set_pulse_width(ActChannel::Steering, prev.servo_us);

                    match restored {
                        Ok(()) => warn!(
                            "Motor write failed, steering restored to {} us",
                            prev.servo_us
                        ),
                        Err(re) => error!(
                            "Could not restore steering to {} us: {}",
                            prev.servo_us,
                            re
                        )
                    }
                }
            }
            return Err(e)
        }

        self.last_pulse = Some(pulse);

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        cmd_server::CmdServerError,
        servo_ctrl::sim::SimDriver,
        stream::{ChildExit, ChildHandle, StreamError},
    };
    use std::{collections::VecDeque, sync::Mutex};

    // ---- MOCKS ----

    type Recv = Result<Option<(Vec<u8>, SocketAddr)>, CmdServerError>;

    /// Replays a script of receive results, then raises the shutdown flag.
    struct ScriptSource {
        script: VecDeque<Recv>,
        shutdown: Arc<AtomicBool>,
    }

    impl CmdSource for ScriptSource {
        fn recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, CmdServerError> {
            match self.script.pop_front() {
                Some(Ok(Some((data, peer)))) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(Some((data.len(), peer)))
                },
                Some(Ok(None)) => Ok(None),
                Some(Err(e)) => Err(e),
                None => {
                    self.shutdown.store(true, Ordering::SeqCst);
                    Ok(None)
                }
            }
        }
    }

    #[derive(Default)]
    struct MockLauncher {
        starts: Mutex<Vec<SocketAddr>>,
    }

    struct MockChild;

    impl Launcher for MockLauncher {
        type Child = MockChild;

        fn start(&self, target: SocketAddr) -> Result<MockChild, StreamError> {
            self.starts.lock().unwrap().push(target);
            Ok(MockChild)
        }
    }

    impl ChildHandle for MockChild {
        fn id(&self) -> u32 {
            1
        }

        fn terminate(&mut self) -> Result<(), StreamError> {
            Ok(())
        }

        fn try_wait(&mut self) -> Result<Option<ChildExit>, StreamError> {
            Ok(None)
        }

        fn wait(&mut self) -> Result<ChildExit, StreamError> {
            Ok(ChildExit::Code(0))
        }
    }

    /// Driver whose motor channel can be made to fail.
    #[derive(Default)]
    struct FlakyDriver {
        sim: SimDriver,
        fail_motor: bool,
    }

    impl ServoDriver for FlakyDriver {
        fn set_pulse_width(&mut self, channel: ActChannel, pulse_us: u16) -> Result<(), ServoError> {
            if self.fail_motor && channel == ActChannel::Motor {
                return Err(ServoError::I2c)
            }
            self.sim.set_pulse_width(channel, pulse_us)
        }
    }

    // ---- HELPERS ----

    type TestLoop<D> = ControlLoop<D, ScriptSource, MockLauncher>;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn datagram(data: &[u8], peer: &str) -> Recv {
        Ok(Some((data.to_vec(), addr(peer))))
    }

    fn build<D: ServoDriver>(
        driver: D,
        params: &RcExecParams,
        script: Vec<Recv>,
    ) -> (TestLoop<D>, Arc<AtomicBool>, Arc<StreamSupervisor<MockLauncher>>) {
        let shutdown = Arc::new(AtomicBool::new(false));
        let source = ScriptSource {
            script: script.into_iter().collect(),
            shutdown: shutdown.clone(),
        };
        let supervisor = Arc::new(StreamSupervisor::new(
            MockLauncher::default(),
            Duration::from_millis(0)
        ));

        let control = ControlLoop::new(driver, source, params, Some(supervisor.clone())).unwrap();

        (control, shutdown, supervisor)
    }

    fn sim_loop() -> TestLoop<SimDriver> {
        build(SimDriver::new(), &RcExecParams::default(), vec![]).0
    }

    fn motor(control: &TestLoop<SimDriver>) -> Option<u16> {
        control.driver().pulse(ActChannel::Motor)
    }

    // ---- TESTS ----

    #[test]
    fn test_new_writes_neutral() {
        let control = sim_loop();

        assert_eq!(control.state(), LoopState::Starting);
        assert_eq!(control.mode(), DriveMode::Drive);
        assert!(control.is_safe_mode());
        assert_eq!(
            control.driver().history(),
            &[(ActChannel::Steering, 1500), (ActChannel::Motor, 1500)]
        );
    }

    #[test]
    fn test_new_fails_on_neutral_write() {
        let driver = FlakyDriver { fail_motor: true, ..Default::default() };
        let shutdown = Arc::new(AtomicBool::new(false));
        let source = ScriptSource { script: VecDeque::new(), shutdown };

        let res: Result<ControlLoop<_, _, MockLauncher>, _> =
            ControlLoop::new(driver, source, &RcExecParams::default(), None);

        assert!(matches!(res, Err(ControlError::NeutralWrite(ServoError::I2c))));
    }

    #[test]
    fn test_new_rejects_bad_params() {
        let mut params = RcExecParams::default();
        params.act.dead_band_us = 0;

        let shutdown = Arc::new(AtomicBool::new(false));
        let source = ScriptSource { script: VecDeque::new(), shutdown };

        let res: Result<ControlLoop<_, _, MockLauncher>, _> =
            ControlLoop::new(SimDriver::new(), source, &params, None);

        assert!(matches!(res, Err(ControlError::InvalidParams(_))));
    }

    #[test]
    fn test_valid_command_applied() {
        let mut control = sim_loop();

        control.process_datagram(b"999 1999 0 1", addr("10.0.0.2:4000"));

        assert_eq!(motor(&control), Some(2000));
        assert_eq!(control.last_pulse().map(|p| p.motor_us), Some(2000));
        assert!(!control.is_safe_mode());
    }

    #[test]
    fn test_malformed_commands_change_nothing() {
        let mut control = sim_loop();
        let peer = addr("10.0.0.2:4000");

        control.process_datagram(b"999 0 0 -1", peer);
        let pulse = control.last_pulse();
        let writes = control.driver().history().len();

        let bad: [&[u8]; 5] = [b"1 2 3", b"1 2 3 4 5", b"a b c d", b"999 0 0 2", b"\xff\xfe 1 2"];
        for payload in bad.iter() {
            control.process_datagram(payload, peer);
        }

        assert_eq!(control.mode(), DriveMode::Reverse);
        assert_eq!(control.last_pulse(), pulse);
        assert_eq!(control.driver().history().len(), writes);
    }

    #[test]
    fn test_reverse_is_sticky() {
        let mut control = sim_loop();
        let peer = addr("10.0.0.2:4000");

        control.process_datagram(b"999 0 0 -1", peer);
        control.process_datagram(b"999 1999 0 0", peer);
        assert_eq!(motor(&control), Some(1000));

        control.process_datagram(b"999 1999 0 1", peer);
        assert_eq!(control.mode(), DriveMode::Drive);
        assert_eq!(motor(&control), Some(2000));
    }

    #[test]
    fn test_mode_policy() {
        let a = addr("10.0.0.2:4000");
        let b = addr("10.0.0.3:4000");

        // Sticky keeps reverse across operators
        let mut control = sim_loop();
        control.process_datagram(b"999 0 0 -1", a);
        control.process_datagram(b"999 1999 0 0", b);
        assert_eq!(motor(&control), Some(1000));

        let params = RcExecParams {
            mode_policy: ModePolicy::ResetOnNewClient,
            ..Default::default()
        };
        let mut control = build(SimDriver::new(), &params, vec![]).0;
        control.process_datagram(b"999 0 0 -1", a);
        control.process_datagram(b"999 1999 0 0", b);
        assert_eq!(control.mode(), DriveMode::Drive);
        assert_eq!(motor(&control), Some(2000));
    }

    #[test]
    fn test_malformed_from_new_operator_keeps_mode() {
        let params = RcExecParams {
            mode_policy: ModePolicy::ResetOnNewClient,
            ..Default::default()
        };
        let (mut control, _, supervisor) = build(SimDriver::new(), &params, vec![]);
        let a = addr("10.0.0.2:4000");
        let b = addr("10.0.0.3:4000");

        control.process_datagram(b"999 0 0 -1", a);
        let pulse = control.last_pulse();

        control.process_datagram(b"garbage", b);

        // The stream follows, the mode and outputs don't
        assert_eq!(supervisor.active_peer(), Some(b));
        assert_eq!(control.mode(), DriveMode::Reverse);
        assert_eq!(control.last_pulse(), pulse);

        // The first valid command from the new operator applies the policy
        control.process_datagram(b"999 1999 0 0", b);
        assert_eq!(control.mode(), DriveMode::Drive);
    }

    #[test]
    fn test_run_until_shutdown() {
        let script = vec![
            datagram(b"999 1999 0 1", "10.0.0.2:4000"),
            Ok(None),
            Err(CmdServerError::Recv(std::io::Error::from(std::io::ErrorKind::Other))),
            datagram(b"garbage", "10.0.0.3:4000"),
            datagram(b"0 500 0 0", "10.0.0.3:4000"),
        ];

        let (mut control, shutdown, supervisor) =
            build(SimDriver::new(), &RcExecParams::default(), script);

        control.run(&shutdown);

        assert_eq!(control.state(), LoopState::Stopping);
        assert!(supervisor.is_shut_down());
        assert_eq!(supervisor.active_peer(), None);

        // Both commands were applied, then neutral on the way out
        let history = control.driver().history();
        assert!(history.contains(&(ActChannel::Motor, 2000)));
        assert!(history.contains(&(ActChannel::Steering, 500)));
        assert_eq!(
            &history[history.len() - 2..],
            &[(ActChannel::Steering, 1500), (ActChannel::Motor, 1500)]
        );
    }

    #[test]
    fn test_stream_follows_operator() {
        let (mut control, _, supervisor) =
            build(SimDriver::new(), &RcExecParams::default(), vec![]);

        // Even an invalid datagram identifies the operator
        control.process_datagram(b"bad", addr("10.0.0.2:4000"));
        assert_eq!(supervisor.active_peer(), Some(addr("10.0.0.2:4000")));

        control.process_datagram(b"999 0 0 0", addr("10.0.0.3:4000"));
        assert_eq!(supervisor.active_peer(), Some(addr("10.0.0.3:4000")));
    }

    #[test]
    fn test_safe_mode_on_timeout() {
        let params = RcExecParams { cmd_timeout_ms: 30, ..Default::default() };
        let mut control = build(SimDriver::new(), &params, vec![]).0;
        let peer = addr("10.0.0.2:4000");

        control.process_datagram(b"0 1999 0 -1", peer);
        assert_eq!(motor(&control), Some(1000));

        // Not yet expired
        control.check_cmd_timeout();
        assert!(!control.is_safe_mode());

        thread::sleep(Duration::from_millis(40));
        control.check_cmd_timeout();

        assert!(control.is_safe_mode());
        assert_eq!(motor(&control), Some(1500));
        assert_eq!(control.driver().pulse(ActChannel::Steering), Some(1500));

        // Neutral is only written once
        let writes = control.driver().history().len();
        control.check_cmd_timeout();
        assert_eq!(control.driver().history().len(), writes);

        // Mode survives safe mode, and the next command leaves it
        assert_eq!(control.mode(), DriveMode::Reverse);
        control.process_datagram(b"999 1999 0 0", peer);
        assert!(!control.is_safe_mode());
        assert_eq!(motor(&control), Some(1000));
    }

    #[test]
    fn test_failed_motor_write_restores_steering() {
        let mut control = build(FlakyDriver::default(), &RcExecParams::default(), vec![]).0;
        let peer = addr("10.0.0.2:4000");

        control.process_datagram(b"999 1999 0 1", peer);
        let applied = control.last_pulse();
        assert_eq!(applied.map(|p| p.motor_us), Some(2000));

        control.driver.fail_motor = true;
        control.process_datagram(b"0 1999 0 0", peer);

        // Outputs still show the last fully applied command
        assert_eq!(control.last_pulse(), applied);
        assert_eq!(
            control.driver().sim.pulse(ActChannel::Steering),
            applied.map(|p| p.servo_us)
        );
        assert_eq!(control.driver().sim.pulse(ActChannel::Motor), Some(2000));
    }
}
