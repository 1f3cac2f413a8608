//! Thread-per-connection serving for the two authorities.

use std::fmt::Debug;
use std::io;
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use rand::thread_rng;

use crate::error::Result;
use crate::registration::{RegistrationAuthority, RegistrationOutcome};
use crate::voting::{VoteCollector, VoteOutcome};

/// A role that answers one peer per connection.
pub trait Session: Send + Sync + 'static {
    type Outcome: Debug + Send + 'static;

    fn run(&self, stream: &TcpStream) -> Result<Self::Outcome>;
}

impl Session for RegistrationAuthority {
    type Outcome = RegistrationOutcome;

    fn run(&self, stream: &TcpStream) -> Result<RegistrationOutcome> {
        self.serve(stream, &mut thread_rng())
    }
}

impl Session for VoteCollector {
    type Outcome = VoteOutcome;

    fn run(&self, stream: &TcpStream) -> Result<VoteOutcome> {
        let outcome = self.serve(stream, &mut thread_rng())?;
        let tally = self.tally();
        info!("tally: {} yes, {} no", tally.yes, tally.no);
        Ok(outcome)
    }
}

fn bound(stream: &TcpStream, timeout: Option<Duration>) -> io::Result<()> {
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)
}

/// Opens a client connection whose reads and writes give up after `timeout`.
pub fn connect<A: ToSocketAddrs>(address: A, timeout: Option<Duration>) -> io::Result<TcpStream> {
    let stream = TcpStream::connect(address)?;
    bound(&stream, timeout)?;
    Ok(stream)
}

/// Handles one connection on its own thread.
///
/// Every blocking read and write is bounded by `timeout`; a failure ends this
/// session only.
pub fn spawn_session<S: Session>(
    context: Arc<S>,
    stream: TcpStream,
    timeout: Option<Duration>,
) -> JoinHandle<Result<S::Outcome>> {
    thread::spawn(move || {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown peer".to_owned());
        bound(&stream, timeout)?;

        let result = context.run(&stream);
        match &result {
            Ok(outcome) => debug!("session with {} ended: {:?}", peer, outcome),
            Err(e) => warn!("session with {} aborted: {}", peer, e),
        }
        result
    })
}

/// Accepts connections until the listener fails.
pub fn accept_loop<S: Session>(
    listener: TcpListener,
    context: Arc<S>,
    timeout: Option<Duration>,
) -> io::Result<()> {
    info!("listening on {}", listener.local_addr()?);
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                spawn_session(Arc::clone(&context), stream, timeout);
            }
            Err(e) => warn!("failed to accept connection: {}", e),
        }
    }
    Ok(())
}
