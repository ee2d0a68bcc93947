//! Simple command client test
//!
//! Sends the same drive command to a vehicle at a fixed rate, standing in for the operator
//! station during bench tests.

use std::convert::TryFrom;
use std::net::UdpSocket;
use std::time::Duration;

use comms_if::cmd::{DriveCmd, Gear};
use comms_if::net::DEFAULT_CMD_PORT;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "test_cmd_client", about = "Send drive commands to a vehicle")]
struct Opt {
    /// Address of the vehicle
    #[structopt(short, long, default_value = "127.0.0.1")]
    host: String,

    /// Command port of the vehicle
    #[structopt(short, long, default_value = "8080")]
    port: u16,

    /// Period between commands in milliseconds
    #[structopt(long, default_value = "100")]
    period_ms: u64,

    /// Number of commands to send, 0 sends forever
    #[structopt(short, long, default_value = "0")]
    count: u64,

    /// Steering value
    #[structopt(long, default_value = "999")]
    steering: i32,

    /// Throttle value
    #[structopt(long, default_value = "0")]
    throttle: i32,

    /// Brake value
    #[structopt(long, default_value = "0")]
    brake: i32,

    /// Gear request sent with the first command only: -1 reverse, 0 hold, 1 drive
    #[structopt(long, default_value = "0", allow_hyphen_values = true)]
    gear: i32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::from_args();

    let gear = Gear::try_from(opt.gear)?;

    // Bind to any local port, the vehicle streams video back to whichever address we send from
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect((opt.host.as_str(), opt.port))?;

    if opt.port != DEFAULT_CMD_PORT {
        println!("Note: vehicle default command port is {}", DEFAULT_CMD_PORT);
    }
    println!("Sending from {} to {}:{}", socket.local_addr()?, opt.host, opt.port);

    let mut sent = 0u64;
    loop {
        // Only the first command carries the gear request so repeated sends don't re-shift
        let cmd = DriveCmd::new(
            opt.steering,
            opt.throttle,
            opt.brake,
            if sent == 0 { gear } else { Gear::Hold }
        );

        match socket.send(cmd.to_string().as_bytes()) {
            Ok(_) => println!("sent: {}", cmd),
            Err(e) => println!("could not send: {}", e)
        }

        sent += 1;
        if opt.count != 0 && sent >= opt.count {
            break;
        }

        std::thread::sleep(Duration::from_millis(opt.period_ms));
    }

    Ok(())
}
