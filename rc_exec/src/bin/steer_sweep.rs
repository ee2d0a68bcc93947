//! # Steering sweep bench test
//!
//! Sweeps the steering servo from centre to full right, to full left and back to centre, over and
//! over, until interrupted. The servo is re-centred before exiting. The motor channel is held at
//! neutral throughout.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc
    },
    thread,
    time::Duration
};

use color_eyre::{Result, eyre::{WrapErr, eyre}};
use log::{info, warn};
use structopt::StructOpt;

use rc_lib::{
    params::RcExecParams,
    servo_ctrl::{self, ActChannel, ServoDriver},
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "steer_sweep", about = "Sweep the steering servo across its range")]
struct Opt {
    /// Pulse width change between positions in microseconds
    #[structopt(short, long, default_value = "25")]
    step_us: u16,

    /// Time to hold each position in milliseconds
    #[structopt(short, long, default_value = "20")]
    delay_ms: u64,

    /// Parameter file, relative to the params directory
    #[structopt(short, long, default_value = "rc_exec.toml")]
    params: String,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    let opt = Opt::from_args();

    if opt.step_us == 0 {
        return Err(eyre!("The step must be at least 1 us"))
    }

    let session = Session::new("steer_sweep", "sessions")
        .wrap_err("Failed to create the session")?;
    logger_init(LevelFilter::Info, &session)
        .wrap_err("Failed to initialise logging")?;

    let params: RcExecParams = util::params::load(&opt.params)
        .wrap_err("Could not load the control parameters")?;
    params.act.validate()
        .wrap_err("Invalid actuation parameters")?;

    let mut driver = servo_ctrl::open(&params.servo)
        .wrap_err("Failed to open the servo driver")?;

    let centre = params.act.servo_centre_us();
    let points = sweep_points(params.act.servo_min_us, params.act.servo_max_us, opt.step_us);

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .wrap_err("Failed to install the signal handler")?;
    }

    driver.set_pulse_width(ActChannel::Motor, params.act.motor_neutral_us)
        .wrap_err("Could not set the motor to neutral")?;

    info!(
        "Sweeping steering {} -> {} -> {} -> {} us in {} us steps, ctrl-c to stop",
        centre,
        params.act.servo_max_us,
        params.act.servo_min_us,
        centre,
        opt.step_us
    );

    'sweep: loop {
        for pulse in points.iter() {
            if stop.load(Ordering::SeqCst) {
                break 'sweep
            }

            if let Err(e) = driver.set_pulse_width(ActChannel::Steering, *pulse) {
                warn!("Could not set steering to {} us: {}", pulse, e);
            }

            thread::sleep(Duration::from_millis(opt.delay_ms));
        }
    }

    info!("Stopping, re-centring steering");

    driver.set_pulse_width(ActChannel::Steering, centre)
        .wrap_err("Could not re-centre the steering")?;

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// One sweep cycle: centre up to `max`, down to `min`, back up to (but not including) centre.
///
/// The end points are always included even if they aren't a whole number of steps away.
fn sweep_points(min: u16, max: u16, step: u16) -> Vec<u16> {
    let centre = ((min as u32 + max as u32) / 2) as u16;
    let mut points = Vec::new();

    let mut p = centre;
    while p < max {
        points.push(p);
        p = p.saturating_add(step);
    }

    let mut p = max;
    while p > min {
        points.push(p);
        p = p.saturating_sub(step).max(min);
    }

    let mut p = min;
    while p < centre {
        points.push(p);
        p = p.saturating_add(step);
    }

    points
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sweep_points() {
        let points = sweep_points(500, 2500, 25);

        assert_eq!(points.first(), Some(&1500));
        assert!(points.contains(&2500));
        assert!(points.contains(&500));
        assert_eq!(points.last(), Some(&1475));

        // 40 steps up, 80 down, 40 back up
        assert_eq!(points.len(), 160);
        assert!(points.windows(2).all(|w| (w[0] as i32 - w[1] as i32).abs() == 25));
    }

    #[test]
    fn test_uneven_step() {
        let points = sweep_points(1000, 2000, 300);

        assert_eq!(points, vec![1500, 1800, 2000, 1700, 1400, 1100, 1000, 1300]);
    }
}
