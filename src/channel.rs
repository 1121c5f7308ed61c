//! Byte transports between a proxy and its stub
//!
//! A [`Channel`] carries one request and returns one reply per call. Two
//! in-process channels are provided: [`LoopbackChannel`] runs the stub on the
//! calling thread, [`ThreadedChannel`] serves it from a dedicated worker.

use crate::errors::{ErrorKind, MarshalError};
use crate::interop::{Selector, WireMessage};
use crate::logging::{debug, warn};
use crate::status::HResult;
use crate::stub::Stub;
use flume::{bounded, unbounded, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Why a round trip did not produce a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer is gone
    Disconnected,
    /// The transport itself failed
    Failed(String),
    /// The peer received the call but could not process it; carries the
    /// peer's own reason, callers see [`HResult::RPC_E_SERVERFAULT`]
    RemoteFault(HResult),
}

impl TransportError {
    /// Status a caller sees for this failure
    pub fn status(&self) -> HResult {
        match self {
            Self::Disconnected => HResult::RPC_E_DISCONNECTED,
            Self::Failed(_) => HResult::CALL_FAILED,
            Self::RemoteFault(_) => HResult::RPC_E_SERVERFAULT,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "channel disconnected"),
            Self::Failed(reason) => write!(f, "transport failure: {}", reason),
            Self::RemoteFault(status) => write!(f, "remote fault: {}", status),
        }
    }
}

impl std::error::Error for TransportError {}

pub trait Channel: Send + Sync {
    /// Negotiate an outbound buffer able to hold `len` payload bytes
    fn get_buffer(&self, len: usize) -> Result<Vec<u8>, TransportError>;

    /// Deliver a request and block for its reply
    fn send_receive(&self, request: WireMessage) -> Result<WireMessage, TransportError>;

    /// Sever the connection; later calls fail with [`TransportError::Disconnected`]
    fn disconnect(&self);

    fn is_connected(&self) -> bool;
}

fn check_size(len: usize, limit: usize) -> Result<(), TransportError> {
    if len > limit {
        return Err(TransportError::Failed(format!(
            "message of {} bytes exceeds limit of {}",
            len, limit
        )));
    }
    Ok(())
}

fn fault(stub: &Stub, selector: Selector, err: MarshalError) -> TransportError {
    if let ErrorKind::Transport(transport) = err.kind {
        return transport;
    }
    let cause = err.status();
    warn!(iid = %stub.iid(), ?selector, error = %err, %cause, "stub rejected call");
    TransportError::RemoteFault(cause)
}

/// Channel that invokes its stub directly on the calling thread
pub struct LoopbackChannel {
    stub: Mutex<Option<Arc<Stub>>>,
    max_message_size: usize,
}

impl LoopbackChannel {
    pub fn new(stub: Arc<Stub>, max_message_size: usize) -> Self {
        Self { stub: Mutex::new(Some(stub)), max_message_size }
    }

    fn stub(&self) -> Result<Arc<Stub>, TransportError> {
        self.stub.lock().clone().ok_or(TransportError::Disconnected)
    }
}

impl Channel for LoopbackChannel {
    fn get_buffer(&self, len: usize) -> Result<Vec<u8>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        check_size(len, self.max_message_size)?;
        Ok(Vec::with_capacity(len))
    }

    fn send_receive(&self, request: WireMessage) -> Result<WireMessage, TransportError> {
        check_size(request.len(), self.max_message_size)?;
        let stub = self.stub()?;
        let selector = request.selector;
        let reply = stub.invoke(&request).map_err(|e| fault(&stub, selector, e))?;
        check_size(reply.len(), self.max_message_size)?;
        Ok(reply)
    }

    fn disconnect(&self) {
        let stub = self.stub.lock().take();
        if let Some(stub) = stub {
            debug!(iid = %stub.iid(), "loopback channel disconnected");
            stub.release();
        }
    }

    fn is_connected(&self) -> bool {
        self.stub.lock().is_some()
    }
}

impl Drop for LoopbackChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

struct Request {
    message: WireMessage,
    reply: Sender<Result<WireMessage, TransportError>>,
}

/// Channel whose stub runs on its own worker thread
pub struct ThreadedChannel {
    sender: Mutex<Option<Sender<Request>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    max_message_size: usize,
    timeout: Option<Duration>,
}

impl ThreadedChannel {
    /// Move `stub` onto a new worker thread
    pub fn spawn(stub: Arc<Stub>, max_message_size: usize) -> Result<Self, TransportError> {
        let (tx, rx) = unbounded::<Request>();
        let name = format!("stub-{}", stub.iid());

        let worker = thread::Builder::new()
            .name(name)
            .spawn(move || {
                while let Ok(request) = rx.recv() {
                    let result = stub
                        .invoke(&request.message)
                        .map_err(|e| fault(&stub, request.message.selector, e));
                    // The caller stopped waiting, so nobody will import what the reply exports
                    if let Err(flume::SendError(Ok(reply))) = request.reply.send(result) {
                        warn!(iid = %stub.iid(), selector = ?reply.selector, "reply not delivered");
                        if let Err(err) = stub.discard_reply(&reply) {
                            warn!(iid = %stub.iid(), error = %err, "could not release reply");
                        }
                    }
                }
                debug!(iid = %stub.iid(), "stub worker stopped");
                stub.release();
            })
            .map_err(|e| TransportError::Failed(e.to_string()))?;

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            max_message_size,
            timeout: None,
        })
    }

    /// Fail calls whose reply takes longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Channel for ThreadedChannel {
    fn get_buffer(&self, len: usize) -> Result<Vec<u8>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        check_size(len, self.max_message_size)?;
        Ok(Vec::with_capacity(len))
    }

    fn send_receive(&self, request: WireMessage) -> Result<WireMessage, TransportError> {
        check_size(request.len(), self.max_message_size)?;
        let sender = self.sender.lock().clone().ok_or(TransportError::Disconnected)?;

        let (tx, rx) = bounded(1);
        sender
            .send(Request { message: request, reply: tx })
            .map_err(|_| TransportError::Disconnected)?;

        let reply = match self.timeout {
            Some(timeout) => rx.recv_timeout(timeout).map_err(|e| match e {
                flume::RecvTimeoutError::Timeout => {
                    TransportError::Failed(format!("no reply within {:?}", timeout))
                }
                flume::RecvTimeoutError::Disconnected => TransportError::Disconnected,
            })?,
            None => rx.recv().map_err(|_| TransportError::Disconnected)?,
        }?;

        check_size(reply.len(), self.max_message_size)?;
        Ok(reply)
    }

    fn disconnect(&self) {
        // Dropping the last sender ends the worker loop
        if self.sender.lock().take().is_none() {
            return;
        }
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.sender.lock().is_some()
    }
}

impl Drop for ThreadedChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}
