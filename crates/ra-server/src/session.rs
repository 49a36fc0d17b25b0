//! One client session: login, then a request/response loop over a
//! [`LocalConnection`] opened on the served store.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};

use ra_connection::{Connection, LocalConnection, SearchOptions, SharedRegistry};
use ra_protocol::{
    decode_size, encode_size, split_first_string, split_strings, Credentials, LoginGreeting,
    Message, MessageSocket, Opcode, ProtocolError, MAX_MESSAGE_SIZE,
};
use ra_types::TextRules;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::auth::{AuthProvider, Identity};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Whether the loop keeps reading requests.
enum Flow {
    Continue,
    Close,
}

pub struct Session<S> {
    socket: MessageSocket<S>,
    store: LocalConnection,
    identity: Identity,
    peer: String,
}

impl<S: Read + Write> Session<S> {
    /// Run the login exchange on `stream`.
    ///
    /// A refused login is answered before the error is returned, so the
    /// client sees a refusal rather than a closed socket.
    pub fn login(
        stream: S,
        peer: impl Into<String>,
        config: &ServerConfig,
        auth: &dyn AuthProvider,
        registry: SharedRegistry,
    ) -> ServerResult<Self> {
        let peer = peer.into();
        let mut socket = MessageSocket::new(stream);
        let request = socket.recv_expect(Opcode::Login)?;
        let identity = match Credentials::from_payload(&request.payload)
            .map_err(ServerError::from)
            .and_then(|credentials| auth.authenticate(&credentials))
        {
            Ok(identity) => identity,
            Err(e) => {
                warn!(%peer, error = %e, "login refused");
                socket.send(&Message::new(Opcode::Login, &b"RA-DENIED"[..]))?;
                return Err(e);
            }
        };

        // The wire already carries LF line endings; no conversion here.
        let store =
            LocalConnection::open_shared(&config.store_root, TextRules::none(), registry)?;
        let greeting = LoginGreeting {
            separator: store.separator(),
            root: store.root().to_string(),
        };
        socket.send(&Message::new(Opcode::Login, greeting.to_payload()))?;
        info!(%peer, user = %identity.name, "session opened");
        Ok(Self {
            socket,
            store,
            identity,
            peer,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Serve requests until the client logs out or goes away.
    pub fn run(mut self) -> ServerResult<()> {
        loop {
            let request = match self.socket.recv() {
                Ok(request) => request,
                Err(ProtocolError::PeerClosed) => {
                    debug!(peer = %self.peer, "client went away");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            debug!(peer = %self.peer, opcode = %request.opcode, "request");
            if let Flow::Close = self.dispatch(request)? {
                info!(peer = %self.peer, user = %self.identity.name, "session closed");
                return Ok(());
            }
        }
    }

    fn dispatch(&mut self, request: Message) -> ServerResult<Flow> {
        let opcode = request.opcode;
        match opcode {
            Opcode::Logout => {
                self.socket.send(&Message::empty(Opcode::Logout))?;
                return Ok(Flow::Close);
            }
            Opcode::ArchiveObject => self.send_archive(&request)?,
            Opcode::PasteObject => self.receive_archive(&request)?,
            Opcode::ArchiveBlock => {
                return Err(ProtocolError::FramingError(
                    "archive block outside a transfer".into(),
                )
                .into())
            }
            _ => {
                let reply = match self.answer(&request) {
                    Ok(reply) => reply,
                    Err(e) if e.is_recoverable() => {
                        warn!(peer = %self.peer, %opcode, error = %e, "request failed");
                        Message::fail(opcode)
                    }
                    Err(e) => return Err(e),
                };
                self.reply(reply)?;
            }
        }
        Ok(Flow::Continue)
    }

    /// Send `reply`, downgrading it to `fail` if it cannot be framed.
    fn reply(&mut self, reply: Message) -> ServerResult<()> {
        match self.socket.send(&reply) {
            Err(e @ ProtocolError::MessageTooLarge { .. }) => {
                warn!(peer = %self.peer, opcode = %reply.opcode, error = %e, "response dropped");
                self.socket.send(&Message::fail(reply.opcode))?;
                Ok(())
            }
            res => res.map_err(Into::into),
        }
    }

    /// Handle one single-message request.
    fn answer(&mut self, request: &Message) -> ServerResult<Message> {
        let op = request.opcode;
        let store = &mut self.store;
        let reply = match op {
            Opcode::GetDir => match store.list_files_raw(&one_path(request)?)? {
                Some(names) => ok_strings(op, &names),
                None => Message::fail(op),
            },
            Opcode::GetExtensions => {
                let exts = store.get_extensions(&one_path(request)?)?;
                let mut fields = Vec::with_capacity(exts.len() * 3);
                for ext in exts {
                    fields.push(ext.name);
                    fields.push(ext.path);
                    fields.push(ext.kind.bits().to_string());
                }
                ok_strings(op, &fields)
            }
            Opcode::FetchFile => match store.read_file(&one_path(request)?)? {
                Some(data) => Message::ok(op, &data),
                None => Message::fail(op),
            },
            Opcode::PutFile => {
                let (path, data) = split_first_string(&request.payload)?;
                status(op, store.write_file(&path, data)?)
            }
            Opcode::MkDir => status(op, store.make_dir(&one_path(request)?)?),
            Opcode::Unlink => status(op, store.delete_file(&one_path(request)?)?),
            Opcode::DelTree => status(op, store.del_tree(&one_path(request)?)?),
            Opcode::PrototypeObject => status(op, store.prototype_object(&one_path(request)?)?),
            Opcode::RenameObject => {
                let [path, name] = fields::<2>(request)?;
                let mut path = path;
                if store.rename_obj(&mut path, &name)? {
                    ok_strings(op, &[path])
                } else {
                    Message::fail(op)
                }
            }
            Opcode::GetUuid => match store.get_or_mint_uuid(&one_path(request)?)? {
                Some((guid, minted)) => {
                    let minted = if minted { "1" } else { "0" };
                    Message::ok_strings(op, &[guid.to_string().as_str(), minted])
                }
                None => Message::fail(op),
            },
            Opcode::ReconcileUuids => status(op, store.reconcile_guids(&one_path(request)?)?),
            Opcode::SearchBegin => {
                let [start, pattern, flags] = fields::<3>(request)?;
                let options = SearchOptions::from_flags(&flags);
                found(op, store.search_begin(&start, &pattern, options)?)
            }
            Opcode::SearchContinue => found(op, store.search_next()?),
            Opcode::SearchEnd => {
                store.search_end()?;
                Message::ok(op, b"")
            }
            // A second login on an open session is refused.
            Opcode::Login => Message::new(op, &b"RA-DENIED"[..]),
            Opcode::Logout
            | Opcode::ArchiveObject
            | Opcode::ArchiveBlock
            | Opcode::PasteObject => Message::fail(op),
        };
        Ok(reply)
    }

    /// `ArchiveObject`: pack into a scoped temporary, announce its size,
    /// then stream it.
    fn send_archive(&mut self, request: &Message) -> ServerResult<()> {
        let op = request.opcode;
        let prepared = (|| -> ServerResult<Option<(NamedTempFile, u32)>> {
            let [src, flag] = fields::<2>(request)?;
            let blob = tempfile::Builder::new()
                .prefix("ra-archive-")
                .suffix(".tar.zst")
                .tempfile()?;
            if !self.store.archive(&src, flag == "1", blob.path())? {
                return Ok(None);
            }
            let size = blob.as_file().metadata()?.len();
            let size = u32::try_from(size)
                .ok()
                .filter(|s| (*s as usize) <= MAX_MESSAGE_SIZE)
                .ok_or(ProtocolError::MessageTooLarge {
                    size: size as usize,
                    max: MAX_MESSAGE_SIZE,
                })?;
            Ok(Some((blob, size)))
        })();

        let (blob, size) = match prepared {
            Ok(Some(ready)) => ready,
            Ok(None) => {
                self.socket.send(&Message::fail(op))?;
                return Ok(());
            }
            Err(e) if e.is_recoverable() => {
                warn!(peer = %self.peer, error = %e, "archive failed");
                self.socket.send(&Message::fail(op))?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.socket.send(&Message::ok(op, &encode_size(size)))?;
        let mut reader = BufReader::new(File::open(blob.path())?);
        self.socket.send_blocks(&mut reader, u64::from(size))?;
        debug!(peer = %self.peer, size, "archive streamed");
        Ok(())
    }

    /// `PasteObject`: drain the announced blocks into a scoped temporary,
    /// then unpack it below the requested parent.
    fn receive_archive(&mut self, request: &Message) -> ServerResult<()> {
        let op = request.opcode;
        // Without a readable size the block stream cannot be skipped.
        let (size, rest) = decode_size(&request.payload)?;
        let blob = tempfile::Builder::new()
            .prefix("ra-upload-")
            .suffix(".tar.zst")
            .tempfile()?;
        {
            let mut out = BufWriter::new(blob.as_file());
            self.socket.recv_blocks(&mut out, u64::from(size))?;
            out.flush()?;
        }

        let unpacked = split_strings(rest)
            .map_err(ServerError::from)
            .and_then(|fields| {
                let dst = fields.into_iter().next().ok_or_else(|| {
                    ProtocolError::MalformedPayload("paste request lacks a destination".into())
                })?;
                Ok(self.store.dearchive(blob.path(), &dst)?)
            });
        let reply = match unpacked {
            Ok(Some(target)) => ok_strings(op, &[target]),
            Ok(None) => Message::fail(op),
            Err(e) if e.is_recoverable() => {
                warn!(peer = %self.peer, error = %e, "upload could not be unpacked");
                Message::fail(op)
            }
            Err(e) => return Err(e),
        };
        self.socket.send(&reply)?;
        Ok(())
    }
}

fn fields<const N: usize>(request: &Message) -> ServerResult<[String; N]> {
    let fields = request.strings()?;
    let count = fields.len();
    fields.try_into().map_err(|_| {
        ProtocolError::MalformedPayload(format!(
            "{} takes {N} fields, got {count}",
            request.opcode
        ))
        .into()
    })
}

fn one_path(request: &Message) -> ServerResult<String> {
    let [path] = fields::<1>(request)?;
    Ok(path)
}

fn ok_strings(op: Opcode, fields: &[String]) -> Message {
    let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
    Message::ok_strings(op, &refs)
}

fn status(op: Opcode, done: bool) -> Message {
    if done {
        Message::ok(op, b"")
    } else {
        Message::fail(op)
    }
}

fn found(op: Opcode, hit: Option<String>) -> Message {
    match hit {
        Some(path) => ok_strings(op, &[path]),
        None => Message::fail(op),
    }
}
