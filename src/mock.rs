//! In-memory peers for tests.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::bitfield::Bitfield;
use crate::client::{Connector, Session};
use crate::error::{Error, Result};
use crate::hash::InfoHash;
use crate::message::{Message, MessageId};
use crate::peer::{Peer, PeerId};

/// What the mock peer does on the next read.
#[derive(Debug, Clone)]
pub enum Step {
    Deliver(Message),
    /// Answer one outstanding request.
    Serve,
    /// Fail the read as a dropped connection would.
    Fail,
    /// Block for a while, then fail as a read timeout would.
    Hang(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Request { index: u32, begin: u32, length: u32 },
    Receive(MessageId),
    Have(u32),
}

pub struct MockSession {
    peer: Peer,
    content: Arc<Vec<u8>>,
    piece_length: u32,
    choked: bool,
    bitfield: Bitfield,
    script: VecDeque<Step>,
    outstanding: VecDeque<(u32, u32, u32)>,
    newest_first: bool,
    corrupt: Vec<u32>,
    pub events: Vec<Event>,
    pub max_outstanding: usize,
}

impl MockSession {
    /// A peer seeding `content`, which unchokes us on the first read.
    pub fn new(content: Vec<u8>, piece_length: u32) -> Self {
        Self::shared(
            Peer::new(0, Ipv4Addr::LOCALHOST, 6881),
            Arc::new(content),
            piece_length,
        )
    }

    fn shared(peer: Peer, content: Arc<Vec<u8>>, piece_length: u32) -> Self {
        MockSession {
            peer,
            content,
            piece_length,
            choked: true,
            bitfield: Bitfield::new(),
            script: VecDeque::from(vec![Step::Deliver(Message::new(MessageId::Unchoke))]),
            outstanding: VecDeque::new(),
            newest_first: false,
            corrupt: vec![],
            events: vec![],
            max_outstanding: 0,
        }
    }

    pub fn with_script(mut self, script: Vec<Step>) -> Self {
        self.script = script.into();
        self
    }

    /// Answer the most recent request first.
    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    pub fn requests(&self) -> Vec<(u32, u32, u32)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Request {
                    index,
                    begin,
                    length,
                } => Some((*index, *begin, *length)),
                _ => None,
            })
            .collect()
    }

    fn serve(&mut self) -> Result<Message> {
        let next = if self.newest_first {
            self.outstanding.pop_back()
        } else {
            self.outstanding.pop_front()
        };
        let (index, begin, length) = next.ok_or_else(silent)?;

        let start = (index * self.piece_length + begin) as usize;
        let mut block = self.content[start..start + length as usize].to_vec();
        if self.corrupt.contains(&index) {
            block[0] ^= 0xff;
        }

        let mut payload = index.to_be_bytes().to_vec();
        payload.extend_from_slice(&begin.to_be_bytes());
        payload.extend_from_slice(&block);
        Ok(Message::new_with_payload(MessageId::Piece, payload))
    }
}

fn silent() -> Error {
    Error::Io(io::Error::new(io::ErrorKind::TimedOut, "peer went silent"))
}

impl Session for MockSession {
    fn peer(&self) -> &Peer {
        &self.peer
    }

    fn read_message(&mut self) -> Result<Message> {
        let message = match self.script.pop_front().unwrap_or(Step::Serve) {
            Step::Deliver(message) => message,
            Step::Serve => self.serve()?,
            Step::Fail => return Err(silent()),
            Step::Hang(duration) => {
                thread::sleep(duration);
                return Err(silent());
            }
        };
        self.events.push(Event::Receive(message.id));
        Ok(message)
    }

    fn send_request(&mut self, index: u32, begin: u32, length: u32) -> Result<()> {
        self.events.push(Event::Request {
            index,
            begin,
            length,
        });
        self.outstanding.push_back((index, begin, length));
        self.max_outstanding = self.max_outstanding.max(self.outstanding.len());
        Ok(())
    }

    fn send_have(&mut self, index: u32) -> Result<()> {
        self.events.push(Event::Have(index));
        Ok(())
    }

    fn is_choked(&self) -> bool {
        self.choked
    }

    fn set_choked(&mut self, choked: bool) {
        self.choked = choked;
    }

    fn bitfield(&self) -> &Bitfield {
        &self.bitfield
    }

    fn bitfield_mut(&mut self) -> &mut Bitfield {
        &mut self.bitfield
    }
}

/// How one mock peer behaves once connected.
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    /// Refuse the connection.
    pub refuse: bool,
    /// Pieces served with a flipped byte.
    pub corrupt: Vec<u32>,
    /// Announced pieces, empty means unknown.
    pub bitfield: Bitfield,
    /// Scripted reads replacing the initial unchoke.
    pub script: Vec<Step>,
}

/// Connects to mock peers seeding the same content, keyed by peer id.
pub struct MockConnector {
    content: Arc<Vec<u8>>,
    piece_length: u32,
    behaviors: HashMap<u32, Behavior>,
}

impl MockConnector {
    pub fn new(content: Vec<u8>, piece_length: u32) -> Self {
        MockConnector {
            content: Arc::new(content),
            piece_length,
            behaviors: HashMap::new(),
        }
    }

    pub fn with_behavior(mut self, peer_id: u32, behavior: Behavior) -> Self {
        self.behaviors.insert(peer_id, behavior);
        self
    }
}

impl Connector for MockConnector {
    type Session = MockSession;

    fn connect(&self, peer: &Peer, _peer_id: PeerId, _info_hash: InfoHash) -> Result<MockSession> {
        let behavior = self.behaviors.get(&peer.id).cloned().unwrap_or_default();
        if behavior.refuse {
            return Err(Error::Connect {
                addr: peer.addr(),
                source: Box::new(Error::Io(io::ErrorKind::ConnectionRefused.into())),
            });
        }

        let mut session =
            MockSession::shared(peer.clone(), self.content.clone(), self.piece_length);
        session.corrupt = behavior.corrupt;
        session.bitfield = behavior.bitfield;
        if !behavior.script.is_empty() {
            session.script = behavior.script.into();
        }
        Ok(session)
    }
}
