//! The pass_persist request cycle.
//!
//! net-snmp writes a command line (`PING`, `get`, `getnext`, `set`) followed by the OID line
//! and, for `set`, a value line. Each query becomes one RADIUS request; the reply is
//! converted back and written to the agent before the next command is read.
//!
//! The cycle is an explicit state machine:
//!
//! ```text
//! AwaitQuery -> BuildRequest -> Transmit -> AwaitReply -> Decode -> Respond -> AwaitQuery
//!                                   ^            |
//!                                   +- timeout --+
//! ```
//!
//! Query and reply problems are answered with `NONE` and the loop carries on. Transport
//! failures, an exhausted retry budget and output failures end the loop with a
//! [`FatalError`].

use std::{io, net::SocketAddr, str::FromStr, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    crypto::{Secret, DIGEST_LENGTH},
    dictionary::Dictionary,
    oid::OidError,
    pairs::Pair,
    radius::{CodecError, Code, Packet},
    schema::SnmpAttributes,
    session::{RequestSlot, SlotBusy},
    shutdown::Shutdown,
    translate::{get_response, pairs_from_oid, set_response, ResponseError, RESPONSE_NONE},
    transport::Transport,
    value::Value,
};

/// Answer to `PING`.
pub const RESPONSE_PONG: &str = "PONG";

/// A command line from the agent.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Ping,
    Get,
    GetNext,
    Set,
    /// The empty line net-snmp sends when it is done with us.
    Exit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown command \"{0}\"")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PING" => Ok(Command::Ping),
            "get" => Ok(Command::Get),
            "getnext" => Ok(Command::GetNext),
            "set" => Ok(Command::Set),
            "" => Ok(Command::Exit),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

/// Commands that are forwarded to the server.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Get,
    GetNext,
    Set,
}

impl Operation {
    /// Value of FreeRADIUS-SNMP-Operation for this operation.
    pub fn code(self) -> u32 {
        match self {
            Operation::Get => 1,
            Operation::GetNext => 2,
            Operation::Set => 3,
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::GetNext => "getnext",
            Operation::Set => "set",
        }
    }
}

/// Errors that end the request loop.
#[derive(Error, Debug)]
pub enum FatalError {
    #[error("Failed sending: {0}")]
    Send(#[source] io::Error),

    #[error("Waiting for reply failed: {0}")]
    Wait(#[source] io::Error),

    #[error("Server didn't respond after {attempts} attempts")]
    NoResponse { attempts: u32 },

    #[error("Failed encoding request: {0}")]
    Encode(#[from] CodecError),

    #[error("Failed converting pairs to varbind response: {0}")]
    Response(#[from] ResponseError),

    #[error("Failed reading from agent: {0}")]
    Read(#[source] io::Error),

    #[error("Failed writing to agent: {0}")]
    Write(#[source] io::Error),

    #[error(transparent)]
    Slot(#[from] SlotBusy),
}

/// Fixed parameters of the request cycle.
#[derive(Clone, Debug)]
pub struct Settings {
    pub code: Code,
    pub server: SocketAddr,
    pub secret: Secret,
    /// Send attempts per request.
    pub retries: u32,
    /// Wait per attempt.
    pub timeout: Duration,
    /// Identifier of the first request.
    pub first_id: u8,
}

struct Query {
    operation: Operation,
    oid: String,
    value: Option<String>,
}

struct PendingRequest {
    operation: Operation,
    packet: Packet,
    wire: Vec<u8>,
}

enum State {
    AwaitQuery,
    BuildRequest(Query),
    Transmit { pending: PendingRequest, attempt: u32 },
    AwaitReply { pending: PendingRequest, attempt: u32 },
    Decode { pending: PendingRequest, data: Vec<u8> },
    Respond { operation: Operation, reply: Packet },
    Stopping,
}

/// Drives queries from `input` through `transport` and writes responses to `output`.
pub struct Controller<R, W, T> {
    dict: Arc<Dictionary>,
    attrs: SnmpAttributes,
    settings: Settings,
    input: R,
    output: W,
    transport: T,
    slot: RequestSlot,
    shutdown: Arc<Shutdown>,
}

impl<R, W, T> Controller<R, W, T>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    T: Transport,
{
    pub fn new(
        dict: Arc<Dictionary>,
        attrs: SnmpAttributes,
        settings: Settings,
        input: R,
        output: W,
        transport: T,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        let slot = RequestSlot::new(settings.first_id);
        Controller {
            dict,
            attrs,
            settings,
            input,
            output,
            transport,
            slot,
            shutdown,
        }
    }

    /// Takes the controller apart, returning the unread input, the output and the transport.
    pub fn into_parts(self) -> (R, W, T) {
        (self.input, self.output, self.transport)
    }

    /// Runs cycles until end of input, the exit command or a shutdown request.
    ///
    /// # Errors
    /// Returns `FatalError` for failures the loop cannot recover from.
    pub async fn run(&mut self) -> Result<(), FatalError> {
        log::debug!("Entering pass_persist loop");
        let mut state = State::AwaitQuery;
        loop {
            state = match state {
                State::AwaitQuery => self.await_query().await?,
                State::BuildRequest(query) => self.build_request(query).await?,
                State::Transmit { pending, attempt } => self.transmit(pending, attempt).await?,
                State::AwaitReply { pending, attempt } => self.await_reply(pending, attempt).await?,
                State::Decode { pending, data } => self.decode(pending, data).await?,
                State::Respond { operation, reply } => self.respond(operation, reply).await?,
                State::Stopping => break,
            };
        }
        log::debug!("Leaving pass_persist loop");
        Ok(())
    }

    async fn await_query(&mut self) -> Result<State, FatalError> {
        let Some(line) = self.next_line().await? else {
            return Ok(State::Stopping);
        };
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                log::error!("{}", e);
                self.write_line(RESPONSE_NONE).await?;
                return Ok(State::AwaitQuery);
            }
        };

        let operation = match command {
            Command::Exit => {
                log::debug!("Empty command, exiting");
                return Ok(State::Stopping);
            }
            Command::Ping => {
                self.write_line(RESPONSE_PONG).await?;
                return Ok(State::AwaitQuery);
            }
            Command::Get => Operation::Get,
            Command::GetNext => Operation::GetNext,
            Command::Set => Operation::Set,
        };

        let Some(oid) = self.next_line().await? else {
            return Ok(State::Stopping);
        };
        // The whole line is the value, whatever its type.
        let value = if operation == Operation::Set {
            let Some(line) = self.next_line().await? else {
                return Ok(State::Stopping);
            };
            Some(line)
        } else {
            None
        };
        Ok(State::BuildRequest(Query { operation, oid, value }))
    }

    async fn build_request(&mut self, query: Query) -> Result<State, FatalError> {
        let mut pairs = match pairs_from_oid(
            &self.dict,
            self.attrs.snmp_root,
            &query.oid,
            query.value.as_deref(),
        ) {
            Ok(pairs) => pairs,
            Err(e) => {
                report_oid_error(query.operation, &query.oid, &e);
                self.write_line(RESPONSE_NONE).await?;
                return Ok(State::AwaitQuery);
            }
        };

        pairs.push(Pair::new(self.attrs.operation, Value::Integer(query.operation.code())));
        pairs.push(Pair::new(
            self.attrs.message_authenticator,
            Value::Octets(vec![0; DIGEST_LENGTH]),
        ));

        let id = self.slot.acquire()?;
        let mut packet = Packet::new(self.settings.code, id, pairs);
        let wire = packet.encode_request(&self.dict, &self.settings.secret)?;
        log::info!(
            "Sending {} Id {} to {} length {}",
            packet.code,
            packet.id,
            self.settings.server,
            wire.len()
        );
        log::debug!("{}", packet.pairs.describe(&self.dict));

        Ok(State::Transmit {
            pending: PendingRequest {
                operation: query.operation,
                packet,
                wire,
            },
            attempt: 1,
        })
    }

    async fn transmit(&mut self, pending: PendingRequest, attempt: u32) -> Result<State, FatalError> {
        self.transport.send(&pending.wire).await.map_err(|e| {
            log::error!("Failed sending: {}", e);
            FatalError::Send(e)
        })?;
        Ok(State::AwaitReply { pending, attempt })
    }

    async fn await_reply(&mut self, pending: PendingRequest, attempt: u32) -> Result<State, FatalError> {
        let readable = self
            .transport
            .wait_readable(self.settings.timeout)
            .await
            .map_err(|e| {
                log::error!("Waiting for reply failed: {}", e);
                FatalError::Wait(e)
            })?;

        if !readable {
            if attempt >= self.settings.retries {
                log::error!("Server didn't respond");
                return Err(FatalError::NoResponse { attempts: attempt });
            }
            log::debug!(
                "Response timeout.  Retrying {}/{}...",
                attempt + 1,
                self.settings.retries
            );
            return Ok(State::Transmit {
                pending,
                attempt: attempt + 1,
            });
        }

        match self.transport.recv(self.settings.timeout).await {
            Ok(data) => Ok(State::Decode { pending, data }),
            Err(e) => {
                log::error!("Failed receiving reply: {}", e);
                self.abandon().await
            }
        }
    }

    async fn decode(&mut self, pending: PendingRequest, data: Vec<u8>) -> Result<State, FatalError> {
        match Packet::decode_reply(&self.dict, &data, &pending.packet, &self.settings.secret) {
            Ok(reply) => {
                log::info!(
                    "Received {} Id {} from {} length {}",
                    reply.code,
                    reply.id,
                    self.settings.server,
                    data.len()
                );
                log::debug!("{}", reply.pairs.describe(&self.dict));
                Ok(State::Respond {
                    operation: pending.operation,
                    reply,
                })
            }
            Err(e) => {
                log::error!("Failed decoding reply: {}", e);
                self.abandon().await
            }
        }
    }

    async fn respond(&mut self, operation: Operation, reply: Packet) -> Result<State, FatalError> {
        self.slot.release();
        let text = match operation {
            Operation::Get | Operation::GetNext => {
                let varbinds = get_response(&self.dict, self.attrs.oid_root, self.attrs.snmp_type, &reply.pairs)
                    .map_err(|e| {
                        log::error!("Failed converting pairs to varbind response: {}", e);
                        e
                    })?;
                log::debug!("Returning {} varbind(s)", varbinds.count);
                varbinds.text
            }
            Operation::Set => set_response(&self.dict, self.attrs.failure, &reply.pairs),
        };
        self.write(&text).await?;
        Ok(State::AwaitQuery)
    }

    /// Ends the cycle of a request whose reply was unusable.
    async fn abandon(&mut self) -> Result<State, FatalError> {
        self.slot.release();
        self.write_line(RESPONSE_NONE).await?;
        Ok(State::AwaitQuery)
    }

    /// Reads one line without its terminator; `None` at end of input or on shutdown.
    async fn next_line(&mut self) -> Result<Option<String>, FatalError> {
        let shutdown = self.shutdown.clone();
        if shutdown.is_triggered() {
            return Ok(None);
        }

        let mut line = String::new();
        let read = tokio::select! {
            read = self.input.read_line(&mut line) => read.map_err(FatalError::Read)?,
            _ = shutdown.triggered() => return Ok(None),
        };
        if read == 0 {
            log::debug!("End of input");
            return Ok(None);
        }

        let trimmed = line.trim_end_matches(['\n', '\r']);
        log::trace!("read: {}", trimmed);
        Ok(Some(trimmed.to_string()))
    }

    async fn write_line(&mut self, line: &str) -> Result<(), FatalError> {
        self.write(format!("{}\n", line).as_bytes()).await
    }

    async fn write(&mut self, text: &[u8]) -> Result<(), FatalError> {
        for line in String::from_utf8_lossy(text).lines() {
            log::trace!("said: {}", line);
        }
        self.output.write_all(text).await.map_err(FatalError::Write)?;
        self.output.flush().await.map_err(FatalError::Write)
    }
}

fn report_oid_error(operation: Operation, oid: &str, error: &OidError) {
    log::error!("Failed evaluating {} OID:", operation.verb());
    log::error!("{}", oid);
    log::error!("{}^ {}", " ".repeat(error.offset), error);
}
