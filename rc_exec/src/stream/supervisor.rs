//! Stream supervisor
//!
//! At most one stream process exists at any time, targeting the operator that sent the most
//! recent command datagram. The supervisor is shared between the control loop and the signal
//! handler, so all of its state sits behind a mutex and every operation takes `&self`.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::{
    net::SocketAddr,
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant}
};

use log::{error, info, warn};

use super::{ChildHandle, Launcher};

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

/// Owns the stream process for the current operator.
pub struct StreamSupervisor<L: Launcher> {
    launcher: L,

    restart_backoff: Duration,

    state: Mutex<State<L::Child>>,
}

/// A running stream to one operator.
struct StreamSession<C> {
    peer: SocketAddr,
    child: C,
}

struct State<C> {
    session: Option<StreamSession<C>>,

    /// Operator and time of the last failed start or unexpected exit.
    last_failure: Option<(SocketAddr, Instant)>,

    /// Latched by [`StreamSupervisor::shutdown`].
    shut_down: bool,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl<L: Launcher> StreamSupervisor<L> {
    pub fn new(launcher: L, restart_backoff: Duration) -> Self {
        Self {
            launcher,
            restart_backoff,
            state: Mutex::new(State {
                session: None,
                last_failure: None,
                shut_down: false,
            }),
        }
    }

    /// Notify the supervisor that a command datagram arrived from `peer`.
    ///
    /// - Same operator with a running stream: nothing happens.
    /// - Same operator whose stream exited on its own: the stream is restarted, subject to the
    ///   restart backoff.
    /// - Different operator: the current stream is stopped and reaped before a new one is started
    ///   for `peer`.
    ///
    /// Start failures are logged and leave no session, a later call retries once the backoff has
    /// passed. After [`shutdown`](Self::shutdown) this does nothing.
    ///
    /// Stopping the old stream blocks the caller until it exits, which with
    /// [`CommandLauncher`](super::CommandLauncher) is at most `stop_grace_ms` plus the kill.
    pub fn on_client_seen(&self, peer: SocketAddr) {
        let mut state = self.lock();

        if state.shut_down {
            return
        }

        let mut exited = false;

        if let Some(session) = state.session.as_mut() {
            if session.peer == peer {
                match session.child.try_wait() {
                    Ok(None) => return,
                    Ok(Some(exit)) => {
                        warn!(
                            "Stream process {} for {} exited unexpectedly ({})",
                            session.child.id(),
                            peer,
                            exit
                        );
                        exited = true;
                    },
                    Err(e) => {
                        warn!("Could not check stream process state: {}", e);
                        return
                    }
                }
            }
            else {
                info!("Operator changed from {} to {}, restarting stream", session.peer, peer);
            }
        }

        if let Some(session) = state.session.take() {
            if exited {
                state.last_failure = Some((peer, Instant::now()));
            }
            else {
                stop_session(session);
            }
        }

        if let Some((failed_peer, at)) = state.last_failure {
            if failed_peer == peer && at.elapsed() < self.restart_backoff {
                return
            }
        }

        match self.launcher.start(peer) {
            Ok(child) => {
                info!("Started stream process {} to {}", child.id(), peer);
                state.session = Some(StreamSession { peer, child });
                state.last_failure = None;
            },
            Err(e) => {
                error!("Could not start stream to {}: {}", peer, e);
                state.last_failure = Some((peer, Instant::now()));
            }
        }
    }

    /// Stop and reap the current stream, if any. A later [`on_client_seen`](Self::on_client_seen)
    /// may start a new one.
    pub fn stop(&self) {
        let mut state = self.lock();

        if let Some(session) = state.session.take() {
            stop_session(session);
        }
    }

    /// Stop the current stream and refuse to start any more.
    ///
    /// Safe to call from a signal handling thread while the control loop is running.
    pub fn shutdown(&self) {
        let mut state = self.lock();

        state.shut_down = true;

        if let Some(session) = state.session.take() {
            stop_session(session);
        }
    }

    /// Operator currently receiving the stream.
    pub fn active_peer(&self) -> Option<SocketAddr> {
        self.lock().session.as_ref().map(|s| s.peer)
    }

    pub fn is_active(&self) -> bool {
        self.lock().session.is_some()
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock().shut_down
    }

    /// A panic while holding the lock can only leave a session half replaced, which the next
    /// call handles like any other state, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, State<L::Child>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<L: Launcher> Drop for StreamSupervisor<L> {
    fn drop(&mut self) {
        self.stop();
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Terminate and reap a session's process.
fn stop_session<C: ChildHandle>(session: StreamSession<C>) {
    let StreamSession { peer, mut child } = session;
    let id = child.id();

    info!("Stopping stream process {} for {}", id, peer);

    if let Err(e) = child.terminate() {
        error!("{}", e);
    }

    // Wait even if the signal failed so the process is always reaped
    match child.wait() {
        Ok(exit) => info!("Stream process {} stopped ({})", id, exit),
        Err(e) => error!("{}", e)
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
