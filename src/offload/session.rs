//! Capability session with the coprocessor.

use crate::offload::firmware::EmulatedLink;
use crate::offload::memory::SharedMemory;
use crate::offload::protocol::{Message, Opcode, Status};
use crate::trace::{trace_event, trace_warn};
use crate::util::{CornerMatchError, CornerMatchResult};

/// Transport carrying [`Message`]s to and from the coprocessor.
pub trait Link: Send {
    /// Posts a message.
    fn send(&mut self, message: Message) -> CornerMatchResult<()>;
    /// Blocks until the next message arrives.
    fn recv(&mut self) -> CornerMatchResult<Message>;
}

/// Lifecycle of a [`Session`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No handle to the coprocessor yet.
    Unattached,
    /// Handle acquired, no capability.
    Attached,
    /// Capability open; requests may be sent.
    Ready,
    /// Closed; nothing more may be sent.
    Terminated,
}

impl SessionState {
    fn label(self) -> &'static str {
        match self {
            SessionState::Unattached => "unattached",
            SessionState::Attached => "attached",
            SessionState::Ready => "ready",
            SessionState::Terminated => "terminated",
        }
    }
}

/// Synchronous request/response session over a [`Link`].
///
/// At most one request is outstanding; every exchange takes `&mut self`.
pub struct Session {
    link: Option<Box<dyn Link>>,
    memory: SharedMemory,
    state: SessionState,
    outstanding: Option<u32>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("outstanding", &self.outstanding)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Wraps a link and the pool shared with the far side.
    pub fn new(link: Box<dyn Link>, memory: SharedMemory) -> Self {
        Self {
            link: Some(link),
            memory,
            state: SessionState::Unattached,
            outstanding: None,
        }
    }

    /// Starts the emulated coprocessor with a pool of `pool_bytes` and
    /// brings the session to `Ready`.
    pub fn emulated(pool_bytes: usize) -> CornerMatchResult<Self> {
        let memory = SharedMemory::new(pool_bytes)?;
        let link = EmulatedLink::spawn(memory.clone())?;
        let mut session = Session::new(Box::new(link), memory);
        session.attach()?;
        session.create_capability()?;
        Ok(session)
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Pool shared with the coprocessor.
    pub fn memory(&self) -> &SharedMemory {
        &self.memory
    }

    fn misuse(&self, operation: &'static str) -> CornerMatchError {
        CornerMatchError::InvalidSessionState {
            operation,
            state: self.state.label(),
        }
    }

    /// `Unattached -> Attached`.
    pub fn attach(&mut self) -> CornerMatchResult<()> {
        if self.state != SessionState::Unattached {
            return Err(self.misuse("attach"));
        }
        self.state = SessionState::Attached;
        Ok(())
    }

    /// Opens the capability: `Attached -> Ready`.
    pub fn create_capability(&mut self) -> CornerMatchResult<()> {
        if self.state != SessionState::Attached {
            return Err(self.misuse("create a capability"));
        }
        self.post(Message::request(Opcode::Open, 0, 0))?;
        self.await_reply(Opcode::Open)?;
        self.state = SessionState::Ready;
        trace_event!("offload_session_ready");
        Ok(())
    }

    /// Sends a request; requires `Ready` and no outstanding request.
    pub fn send(&mut self, message: Message) -> CornerMatchResult<()> {
        if self.state != SessionState::Ready {
            return Err(self.misuse("send"));
        }
        if self.outstanding.is_some() {
            return Err(self.misuse("send with a request outstanding"));
        }
        self.post(message)
    }

    /// Blocks for the reply to the outstanding request.
    ///
    /// A reply with another opcode or a FAILED status is an error.
    pub fn get_message(&mut self, expected: Opcode) -> CornerMatchResult<Message> {
        if self.state != SessionState::Ready {
            return Err(self.misuse("receive"));
        }
        self.await_reply(expected)
    }

    /// [`Session::send`] followed by [`Session::get_message`].
    pub fn request(&mut self, opcode: Opcode, params: u32, words: u32) -> CornerMatchResult<Message> {
        self.send(Message::request(opcode, params, words))?;
        self.get_message(opcode)
    }

    /// Closes the capability. Idempotent; also runs on drop.
    pub fn terminate(&mut self) -> CornerMatchResult<()> {
        let was_ready = self.state == SessionState::Ready && self.outstanding.is_none();
        self.state = SessionState::Terminated;
        let result = if was_ready {
            self.post(Message::request(Opcode::Close, 0, 0))
                .and_then(|()| self.await_reply(Opcode::Close).map(|_| ()))
        } else {
            Ok(())
        };
        self.outstanding = None;
        self.link = None;
        result
    }

    fn link(&mut self) -> CornerMatchResult<&mut Box<dyn Link>> {
        self.link.as_mut().ok_or(CornerMatchError::LinkClosed)
    }

    fn post(&mut self, message: Message) -> CornerMatchResult<()> {
        self.link()?.send(message)?;
        self.outstanding = Some(message.opcode);
        Ok(())
    }

    fn await_reply(&mut self, expected: Opcode) -> CornerMatchResult<Message> {
        let reply = self.link()?.recv();
        self.outstanding = None;
        let reply = reply?;
        if reply.opcode != expected.code() {
            trace_warn!(
                "reply opcode {} does not match request {:?}",
                reply.opcode,
                expected
            );
            return Err(CornerMatchError::UnexpectedOpcode {
                expected: expected.code(),
                got: reply.opcode,
            });
        }
        if reply.status() == Status::Failed {
            trace_warn!("coprocessor reported failure for {:?}", expected);
            return Err(CornerMatchError::RemoteFailure {
                opcode: reply.opcode,
            });
        }
        Ok(reply)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(err) = self.terminate() {
            trace_warn!("session terminate failed: {err}");
        }
    }
}
