//! In-memory PDM chain that speaks the device side of the protocol.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use pdmlink_frame::{
    decode_request, encode_response, Address, Command, FrameFormat, ProtocolVersion, Register,
    RegisterValue, Request, Status,
};
use pdmlink_transport::{Connector, Transport, TransportError};

use crate::link::{Link, LinkConfig};

/// How the chain answers the next request.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// Answer like a module would.
    Emulate,
    /// Fault status, no data.
    Status(Status),
    /// Emulated answer with a damaged checksum byte.
    Corrupt,
    /// Emulated answer claiming to come from another address.
    From(Address),
    /// These exact bytes.
    Raw(Vec<u8>),
    /// No answer at all.
    Silence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    Request(Address),
    Response(Address),
}

struct Chain {
    format: FrameFormat,
    version: ProtocolVersion,
    first_address: Address,
    mode: u8,
    registers: HashMap<(Address, u16), Vec<u8>>,
    script: VecDeque<Reply>,
    requests: Vec<Request>,
    frames: Vec<Vec<u8>>,
    events: Vec<Event>,
    rx: VecDeque<u8>,
    responding: Address,
    connects: usize,
    failing_opens: usize,
    drip: bool,
}

/// Shared handle on a simulated chain; every transport it opens talks to the
/// same modules.
#[derive(Clone)]
pub(crate) struct FakeChain {
    chain: Arc<Mutex<Chain>>,
}

impl FakeChain {
    pub(crate) fn new(format: FrameFormat, version: ProtocolVersion) -> Self {
        Self {
            chain: Arc::new(Mutex::new(Chain {
                format,
                version,
                first_address: 1,
                mode: 0,
                registers: HashMap::new(),
                script: VecDeque::new(),
                requests: Vec::new(),
                frames: Vec::new(),
                events: Vec::new(),
                rx: VecDeque::new(),
                responding: 0,
                connects: 0,
                failing_opens: 0,
                drip: false,
            })),
        }
    }

    /// Standard frames, protocol 3.4.
    pub(crate) fn standard() -> Self {
        Self::new(FrameFormat::STANDARD, ProtocolVersion::V3_4)
    }

    fn lock(&self) -> MutexGuard<'_, Chain> {
        self.chain.lock().unwrap()
    }

    pub(crate) fn format(&self) -> FrameFormat {
        self.lock().format
    }

    /// Preload a register on module `address`.
    pub(crate) fn set(&self, address: Address, register: Register, value: RegisterValue) {
        let since = register.introduced_in().unwrap();
        let code = register.spec(since).unwrap().code;
        let mut bytes = Vec::new();
        value.put(&mut bytes);
        self.lock().registers.insert((address, code), bytes);
    }

    /// Raw register bytes currently held by module `address`.
    pub(crate) fn register(&self, address: Address, register: Register) -> Option<Vec<u8>> {
        let since = register.introduced_in().unwrap();
        let code = register.spec(since).unwrap().code;
        self.lock().registers.get(&(address, code)).cloned()
    }

    pub(crate) fn set_mode(&self, mode: u8) {
        self.lock().mode = mode;
    }

    /// Queue replies for the next requests; afterwards the chain emulates.
    pub(crate) fn script(&self, replies: impl IntoIterator<Item = Reply>) {
        self.lock().script.extend(replies);
    }

    /// Hand out response bytes one per read.
    pub(crate) fn drip(&self) {
        self.lock().drip = true;
    }

    pub(crate) fn fail_opens(&self, count: usize) {
        self.lock().failing_opens = count;
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    pub(crate) fn frames(&self) -> Vec<Vec<u8>> {
        self.lock().frames.clone()
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub(crate) fn connects(&self) -> usize {
        self.lock().connects
    }

    pub(crate) fn clear_log(&self) {
        let mut chain = self.lock();
        chain.requests.clear();
        chain.frames.clear();
        chain.events.clear();
    }

    pub(crate) fn connector(&self) -> impl Connector + 'static {
        let fake = self.clone();
        move || -> pdmlink_transport::Result<Box<dyn Transport>> {
            let mut chain = fake.lock();
            if chain.failing_opens > 0 {
                chain.failing_opens -= 1;
                return Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    "no such device",
                )));
            }
            chain.connects += 1;
            Ok(Box::new(FakeTransport {
                fake: fake.clone(),
                closed: false,
            }))
        }
    }

    /// A link in the chain's frame format with otherwise default settings.
    pub(crate) fn link(&self) -> Arc<Link> {
        self.link_with(LinkConfig {
            format: self.format(),
            ..LinkConfig::default()
        })
    }

    pub(crate) fn link_with(&self, config: LinkConfig) -> Arc<Link> {
        Arc::new(Link::new(self.connector(), config))
    }
}

impl Chain {
    fn emulate(&mut self, request: &Request) -> (Status, Vec<u8>) {
        match request.command {
            Command::ReadAddress => (Status::OK, vec![self.first_address]),
            Command::ReadProtocolVersion => {
                (Status::OK, vec![self.version.major, self.version.minor])
            }
            Command::WriteInstruction => match request.register_code() {
                Some(code) => {
                    self.registers
                        .insert((request.address, code), request.data[2..].to_vec());
                    (Status::OK, Vec::new())
                }
                None => (Status::BAD_LENGTH, Vec::new()),
            },
            Command::ReadInstruction => match request.register_code() {
                Some(code) => match self.registers.get(&(request.address, code)) {
                    Some(value) => (Status::OK, value.clone()),
                    None => (Status::QUERY_ERROR, Vec::new()),
                },
                None => (Status::BAD_LENGTH, Vec::new()),
            },
            Command::ReadCwPulse => (Status::OK, vec![self.mode]),
            Command::ReadErrorCode | Command::ReadMeasure => (Status::OK, vec![0]),
            Command::ApplyAllInstructions | Command::SaveAllInstructions => {
                (Status::OK, Vec::new())
            }
        }
    }

    fn respond(&mut self, request: &Request) {
        let reply = self.script.pop_front().unwrap_or(Reply::Emulate);
        let format = self.format;
        let mut out = BytesMut::new();
        let encode = |out: &mut BytesMut, address: Address, status: Status, data: &[u8]| {
            encode_response(&format, address, status, data, out).unwrap();
        };

        match reply {
            Reply::Emulate => {
                let (status, data) = self.emulate(request);
                encode(&mut out, request.address, status, &data);
            }
            Reply::Status(status) => encode(&mut out, request.address, status, &[]),
            Reply::Corrupt => {
                let (status, data) = self.emulate(request);
                encode(&mut out, request.address, status, &data);
                let last = out.len() - 1;
                out[last] ^= 0x01;
            }
            Reply::From(address) => {
                let (status, data) = self.emulate(request);
                encode(&mut out, address, status, &data);
            }
            Reply::Raw(bytes) => out.put_slice(&bytes),
            Reply::Silence => return,
        }

        self.responding = request.address;
        self.rx.extend(out.iter().copied());
    }
}

struct FakeTransport {
    fake: FakeChain,
    closed: bool,
}

impl Transport for FakeTransport {
    fn write(&mut self, data: &[u8]) -> pdmlink_transport::Result<()> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut chain = self.fake.lock();
        chain.frames.push(data.to_vec());

        let format = chain.format;
        let mut buf = BytesMut::from(data);
        if let Ok(Some(request)) = decode_request(&format, &mut buf) {
            chain.events.push(Event::Request(request.address));
            chain.respond(&request);
            chain.requests.push(request);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> pdmlink_transport::Result<usize> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let n = {
            let mut chain = self.fake.lock();
            if chain.rx.is_empty() {
                return Ok(0);
            }
            let n = if chain.drip {
                1
            } else {
                buf.len().min(chain.rx.len())
            };
            for slot in buf.iter_mut().take(n) {
                *slot = chain.rx.pop_front().unwrap();
            }
            if chain.rx.is_empty() {
                let address = chain.responding;
                chain.events.push(Event::Response(address));
            }
            n
        };
        // Give other threads a chance to reach the bus between bytes.
        std::thread::yield_now();
        Ok(n)
    }

    fn discard_input(&mut self) -> pdmlink_transport::Result<()> {
        self.fake.lock().rx.clear();
        Ok(())
    }

    fn close(&mut self) -> pdmlink_transport::Result<()> {
        self.closed = true;
        Ok(())
    }

    fn transport_name(&self) -> &'static str {
        "fake"
    }
}
