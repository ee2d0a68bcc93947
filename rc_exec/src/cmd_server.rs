//! # Command Server Module
//!
//! This module abstracts over the networking side of the control executable. Commands arrive as
//! single UDP datagrams from the operator. The server does not track connections, the peer
//! address of each datagram is handed to the caller, which decides what a change of operator
//! means.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    io::ErrorKind,
    net::{SocketAddr, UdpSocket},
    time::Duration
};

use comms_if::net::NetParams;
use log::debug;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A source of command datagrams.
pub trait CmdSource {
    /// Receive one datagram into `buf`.
    ///
    /// Returns `Ok(None)` if nothing arrived before the source's timeout, so the caller gets
    /// control back regularly.
    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, CmdServerError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// UDP command server.
pub struct CmdServer {
    socket: UdpSocket,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur in the [`CmdServer`]
#[derive(thiserror::Error, Debug)]
pub enum CmdServerError {
    #[error("Could not bind the command socket to {0}: {1}")]
    Bind(String, std::io::Error),

    #[error("Could not set the command socket timeout: {0}")]
    SetTimeout(std::io::Error),

    #[error("Could not receive from the command socket: {0}")]
    Recv(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CmdServer {

    /// Create a new instance of the command server.
    ///
    /// This function will not wait for a command from the operator before returning.
    pub fn new(params: &NetParams) -> Result<Self, CmdServerError> {
        let socket = UdpSocket::bind(&params.cmd_endpoint)
            .map_err(|e| CmdServerError::Bind(params.cmd_endpoint.clone(), e))?;

        // A zero duration is rejected by the socket, so clamp to 1 ms
        let timeout = Duration::from_millis(params.recv_timeout_ms.max(1));
        socket.set_read_timeout(Some(timeout))
            .map_err(CmdServerError::SetTimeout)?;

        Ok(Self { socket })
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }
}

impl CmdSource for CmdServer {
    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, CmdServerError> {
        match self.socket.recv_from(buf) {
            Ok((len, peer)) => Ok(Some((len, peer))),
            Err(e) => match e.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => {
                    Ok(None)
                },
                // Windows reports an ICMP port unreachable from an earlier send as a reset
                ErrorKind::ConnectionReset => {
                    debug!("Ignoring connection reset on command socket");
                    Ok(None)
                },
                _ => Err(CmdServerError::Recv(e))
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
