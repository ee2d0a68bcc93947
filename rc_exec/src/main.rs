//! # Vehicle Control Executable
//!
//! This executable runs on the vehicle and is responsible for:
//! - Recieving steering, throttle, brake and gear commands from the operator
//! - Driving the steering servo and the ESC
//! - Streaming video back to whichever operator is sending commands
//!
//! The executable runs until it recieves SIGINT or SIGTERM, at which point the stream is stopped
//! and the actuators are returned to neutral.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc
    },
    time::Duration
};
use comms_if::net::NetParams;
use log::{info, warn};
use color_eyre::{Result, eyre::WrapErr};

// Internal
use rc_lib::{
    cmd_server::CmdServer,
    control::ControlLoop,
    params::RcExecParams,
    servo_ctrl,
    stream::{CommandLauncher, StreamSupervisor},
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {

    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    // Initialise session
    let session = Session::new(
        "rc_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Vehicle Control Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams = util::params::load("net.toml")
        .wrap_err("Could not load the network parameters")?;
    let params: RcExecParams = util::params::load("rc_exec.toml")
        .wrap_err("Could not load the control parameters")?;

    info!("Parameters loaded");

    // ---- HARDWARE INITIALISATION ----

    let driver = servo_ctrl::open(&params.servo)
        .wrap_err_with(|| format!("Failed to open the {:?} servo driver", params.servo))?;

    info!("Servo driver initialised");

    // ---- SERVER INITIALISATION ----

    let server = CmdServer::new(&net_params)
        .wrap_err("Failed to initialise the command server")?;

    info!("Command server listening on {}", net_params.cmd_endpoint);

    // ---- STREAM INITIALISATION ----

    let supervisor = match params.stream.enabled {
        true => {
            info!(
                "Streaming with {} to {}",
                params.stream.program,
                match params.stream.video_port {
                    Some(p) => format!("port {} of the operator", p),
                    None => "the operator's command port".into()
                }
            );
            Some(Arc::new(StreamSupervisor::new(
                CommandLauncher::new(&params.stream),
                Duration::from_millis(params.stream.restart_backoff_ms)
            )))
        },
        false => {
            warn!("Video streaming is disabled");
            None
        }
    };

    // ---- SIGNAL HANDLING ----

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        let supervisor = supervisor.clone();

        ctrlc::set_handler(move || {
            // Only the first signal stops the stream, later ones are no-ops
            if !shutdown.swap(true, Ordering::SeqCst) {
                warn!("Shutdown requested");

                if let Some(supervisor) = &supervisor {
                    supervisor.shutdown();
                }
            }
        }).wrap_err("Failed to install the signal handler")?;
    }

    // ---- MAIN LOOP ----

    let mut control = ControlLoop::new(driver, server, &params, supervisor)
        .wrap_err("Failed to initialise the control loop")?;

    info!("Initialisation complete, entering main loop in safe mode");

    control.run(&shutdown);

    info!("End of execution");

    Ok(())
}
