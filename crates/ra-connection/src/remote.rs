//! Connection backend speaking the wire protocol to a remote server.
//!
//! One instance owns one TCP stream for its whole life. Every operation is
//! a single synchronous request/response exchange, except archive transfers
//! which stream `ArchiveBlock` messages after a header exchange. The first
//! protocol error marks the connection broken; every later call fails with
//! [`RaError::Broken`] without touching the stream.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::path::Path;

use bytes::Bytes;
use ra_ordering::{effective_order, OrderingError};
use ra_protocol::{
    decode_size, encode_size, join_strings, split_strings, Credentials, LoginGreeting, Message,
    MessageSocket, Opcode, ProtocolError, ProtocolResult, MAX_MESSAGE_SIZE,
};
use ra_registry::{Marker, UuidRegistry};
use ra_types::layout::{is_control_file, HYPEROBJECT_FILE, ORDERING_FILE, REGISTRY_FILE};
use ra_types::text::{to_crlf, to_lf};
use ra_types::{validate_object_name, Extension, ExtensionKind, Guid, PathRules, TextRules};
use tracing::{debug, info, warn};

use crate::connection::{Connection, HyperobjectInfo};
use crate::error::{RaError, RaResult};
use crate::search::SearchOptions;

/// A store served by a remote `ra` server.
pub struct RemoteConnection {
    socket: MessageSocket<TcpStream>,
    addr: String,
    rules: PathRules,
    text: TextRules,
    registry: UuidRegistry,
    broken: bool,
    logged_out: bool,
}

impl RemoteConnection {
    /// Connect to `host:port` and log in.
    ///
    /// The connection adopts the separator and root the server announces.
    /// Any failure here is [`RaError::Connect`]; there is no retry.
    pub fn connect(
        host: &str,
        port: u16,
        credentials: &Credentials,
        text: TextRules,
    ) -> RaResult<Self> {
        let addr = format!("{host}:{port}");
        let fail = |reason: String| RaError::Connect {
            addr: addr.clone(),
            reason,
        };

        let stream = TcpStream::connect(&addr).map_err(|e| fail(e.to_string()))?;
        stream.set_nodelay(true).map_err(|e| fail(e.to_string()))?;
        let mut socket = MessageSocket::new(stream);
        let reply = socket
            .call(&Message::new(Opcode::Login, credentials.to_payload()))
            .map_err(|e| fail(e.to_string()))?;
        let greeting = LoginGreeting::from_payload(&reply.payload)
            .map_err(|e| fail(e.to_string()))?
            .ok_or_else(|| fail(format!("login refused for user {}", credentials.user)))?;

        let mut conn = Self {
            socket,
            addr: addr.clone(),
            rules: PathRules::new(greeting.separator, greeting.root),
            text,
            registry: UuidRegistry::new(),
            broken: false,
            logged_out: false,
        };
        conn.load_uuid_base().map_err(|e| fail(e.to_string()))?;
        info!(
            addr = %conn.addr,
            user = %credentials.user,
            root = conn.rules.root(),
            entries = conn.registry.len(),
            "remote store connected"
        );
        Ok(conn)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Whether an earlier protocol error made this connection unusable.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Log out and close the stream.
    pub fn close(mut self) -> RaResult<()> {
        self.logout()
    }

    fn logout(&mut self) -> RaResult<()> {
        if self.logged_out || self.broken {
            return Ok(());
        }
        self.logged_out = true;
        let res = self.socket.call(&Message::empty(Opcode::Logout));
        self.guard(res)?;
        debug!(addr = %self.addr, "logged out");
        Ok(())
    }

    fn guard<T>(&mut self, res: ProtocolResult<T>) -> RaResult<T> {
        res.map_err(|e| {
            warn!(addr = %self.addr, error = %e, "protocol error, connection marked broken");
            self.broken = true;
            RaError::Protocol(e)
        })
    }

    fn ensure_usable(&self) -> RaResult<()> {
        if self.broken {
            Err(RaError::Broken)
        } else {
            Ok(())
        }
    }

    /// One request/response exchange. `None` when the server reports
    /// failure, otherwise the response body after the status byte.
    fn request(&mut self, request: Message) -> RaResult<Option<Bytes>> {
        self.ensure_usable()?;
        let res = self.socket.call(&request).and_then(|reply| {
            let (ok, _) = reply.status()?;
            Ok(ok.then(|| reply.payload.slice(1..)))
        });
        self.guard(res)
    }

    fn request_path(&mut self, opcode: Opcode, path: &str) -> RaResult<Option<Bytes>> {
        self.rules.validate(path)?;
        self.request(Message::with_strings(opcode, &[path]))
    }

    fn request_strings(&mut self, request: Message) -> RaResult<Option<Vec<String>>> {
        let Some(body) = self.request(request)? else {
            return Ok(None);
        };
        let res = split_strings(&body);
        self.guard(res).map(Some)
    }

    fn request_first_string(&mut self, request: Message) -> RaResult<Option<String>> {
        let Some(fields) = self.request_strings(request)? else {
            return Ok(None);
        };
        match fields.into_iter().next() {
            Some(first) => Ok(Some(first)),
            None => self.guard(Err(ProtocolError::MalformedPayload(
                "response lacks its string field".into(),
            ))),
        }
    }

    fn fetch(&mut self, path: &str) -> RaResult<Option<Bytes>> {
        self.request_path(Opcode::FetchFile, path)
    }

    fn store(&mut self, path: &str, data: &[u8]) -> RaResult<bool> {
        self.rules.validate(path)?;
        let mut payload = join_strings(&[path]);
        payload.extend_from_slice(data);
        Ok(self.request(Message::new(Opcode::PutFile, payload))?.is_some())
    }

    fn raw_file_list(&mut self, path: &str) -> RaResult<Option<Vec<String>>> {
        self.rules.validate(path)?;
        self.request_strings(Message::with_strings(Opcode::GetDir, &[path]))
    }

    fn relative(&self, path: &str) -> Option<String> {
        self.rules.relative(path)
    }
}

fn parse_extensions(fields: Vec<String>) -> ProtocolResult<Vec<Extension>> {
    if fields.len() % 3 != 0 {
        return Err(ProtocolError::MalformedPayload(format!(
            "extension list of {} fields is not made of triples",
            fields.len()
        )));
    }
    let mut out = Vec::with_capacity(fields.len() / 3);
    let mut iter = fields.into_iter();
    while let (Some(name), Some(path), Some(bits)) = (iter.next(), iter.next(), iter.next()) {
        let kind = bits
            .parse::<u32>()
            .ok()
            .and_then(|b| ExtensionKind::from_bits(b).ok())
            .ok_or_else(|| ProtocolError::MalformedPayload(format!("bad kind bits {bits:?}")))?;
        out.push(Extension::new(name, path, kind));
    }
    Ok(out)
}

impl Drop for RemoteConnection {
    fn drop(&mut self) {
        if let Err(e) = self.logout() {
            debug!(addr = %self.addr, error = %e, "logout on drop failed");
        }
    }
}

impl Connection for RemoteConnection {
    fn backend(&self) -> &'static str {
        "remote"
    }

    fn rules(&self) -> &PathRules {
        &self.rules
    }

    fn supports_copy_paste(&self) -> bool {
        false
    }

    fn supports_tar(&self) -> bool {
        true
    }

    fn supports_hyper_copy(&self) -> bool {
        true
    }

    fn get_extensions(&mut self, path: &str) -> RaResult<Vec<Extension>> {
        self.rules.validate(path)?;
        let Some(fields) =
            self.request_strings(Message::with_strings(Opcode::GetExtensions, &[path]))?
        else {
            return Ok(Vec::new());
        };
        let res = parse_extensions(fields);
        self.guard(res)
    }

    fn get_file_list(&mut self, path: &str) -> RaResult<Vec<String>> {
        let files = self.raw_file_list(path)?.unwrap_or_default();
        Ok(files.into_iter().filter(|f| !is_control_file(f)).collect())
    }

    fn get_ordering(&mut self, path: &str) -> RaResult<Vec<String>> {
        let actual: Vec<String> = self
            .get_extensions(path)?
            .into_iter()
            .map(|e| e.name)
            .collect();
        let record = self.rules.join(&self.rules.ext_dir(path), ORDERING_FILE);
        let listed = match self.fetch(&record)? {
            Some(body) => ra_ordering::parse(&String::from_utf8_lossy(&body)),
            None => Vec::new(),
        };
        Ok(effective_order(&listed, &actual))
    }

    fn write_ordering(&mut self, path: &str, names: &[String]) -> RaResult<bool> {
        self.rules.validate(path)?;
        if let Some(bad) = names
            .iter()
            .find(|n| n.is_empty() || n.contains('\n') || n.contains('\r'))
        {
            return Err(OrderingError::InvalidName(bad.clone()).into());
        }
        let ext_dir = self.rules.ext_dir(path);
        // Fails harmlessly when the directory is already there.
        self.request_path(Opcode::MkDir, &ext_dir)?;
        let record = self.rules.join(&ext_dir, ORDERING_FILE);
        self.store(&record, ra_ordering::render(names).as_bytes())
    }

    fn rename_obj(&mut self, path: &mut String, new_name: &str) -> RaResult<bool> {
        self.rules.validate(path)?;
        validate_object_name(new_name)?;
        let request = Message::with_strings(Opcode::RenameObject, &[path.as_str(), new_name]);
        let Some(new_path) = self.request_first_string(request)? else {
            return Ok(false);
        };
        info!(from = %path, to = %new_path, "object renamed");
        *path = new_path;
        Ok(true)
    }

    fn get_file(&mut self, path: &str, local: &Path, convert: bool) -> RaResult<bool> {
        let Some(body) = self.fetch(path)? else {
            return Ok(false);
        };
        if convert && self.text.is_text(path) {
            fs::write(local, to_crlf(&body))?;
        } else {
            fs::write(local, &body)?;
        }
        Ok(true)
    }

    fn put_file(&mut self, local: &Path, path: &str, convert: bool) -> RaResult<bool> {
        self.rules.validate(path)?;
        let data = match fs::read(local) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if convert && self.text.is_text(path) {
            self.store(path, &to_lf(&data))
        } else {
            self.store(path, &data)
        }
    }

    fn make_ext(&mut self, parent: &str, name: &str) -> RaResult<Option<String>> {
        self.rules.validate(parent)?;
        validate_object_name(name)?;
        let child = self.rules.child(parent, name);
        Ok(self.request_path(Opcode::MkDir, &child)?.map(|_| child))
    }

    fn make_hyperobject(
        &mut self,
        parent: &str,
        name: &str,
        guid: Guid,
    ) -> RaResult<Option<String>> {
        let Some(child) = self.make_ext(parent, name)? else {
            return Ok(None);
        };
        let marker = self.rules.join(&child, HYPEROBJECT_FILE);
        if !self.store(&marker, Marker::new(guid, name).render().as_bytes())? {
            warn!(path = %child, "hyperobject marker could not be written");
            return Ok(None);
        }
        info!(path = %child, %guid, "hyperobject created");
        Ok(Some(child))
    }

    fn del_tree(&mut self, path: &str) -> RaResult<bool> {
        Ok(self.request_path(Opcode::DelTree, path)?.is_some())
    }

    fn prototype_object(&mut self, path: &str) -> RaResult<bool> {
        Ok(self.request_path(Opcode::PrototypeObject, path)?.is_some())
    }

    fn compare_files(&mut self, a: &str, b: &str) -> RaResult<bool> {
        let left = self.fetch(a)?;
        let right = self.fetch(b)?;
        Ok(matches!((left, right), (Some(l), Some(r)) if l == r))
    }

    fn delete_file(&mut self, path: &str) -> RaResult<bool> {
        Ok(self.request_path(Opcode::Unlink, path)?.is_some())
    }

    fn paste(&mut self, _src: &str, _dst_parent: &str, _recursive: bool) -> RaResult<Option<String>> {
        Err(RaError::NotSupported("paste"))
    }

    fn archive(&mut self, src: &str, recursive: bool, blob: &Path) -> RaResult<bool> {
        self.rules.validate(src)?;
        self.ensure_usable()?;
        let mut out = BufWriter::new(File::create(blob)?);
        let flag = if recursive { "1" } else { "0" };
        let request = Message::with_strings(Opcode::ArchiveObject, &[src, flag]);
        let res = self.socket.call(&request).and_then(|reply| {
            let (ok, body) = reply.status()?;
            if !ok {
                return Ok(false);
            }
            let (size, _) = decode_size(body)?;
            self.socket.recv_blocks(&mut out, u64::from(size))?;
            Ok(true)
        });
        let done = self.guard(res)?;
        debug!(src, recursive, done, "remote archive received");
        Ok(done)
    }

    fn dearchive(&mut self, blob: &Path, dst_parent: &str) -> RaResult<Option<String>> {
        self.rules.validate(dst_parent)?;
        self.ensure_usable()?;
        let file = File::open(blob)?;
        let size = file.metadata()?.len();
        let size32 = u32::try_from(size)
            .ok()
            .filter(|s| (*s as usize) <= MAX_MESSAGE_SIZE)
            .ok_or(ProtocolError::MessageTooLarge {
                size: size as usize,
                max: MAX_MESSAGE_SIZE,
            })?;
        let mut payload = encode_size(size32).to_vec();
        payload.extend_from_slice(&join_strings(&[dst_parent]));

        let mut reader = BufReader::new(file);
        let socket = &mut self.socket;
        let res = (|| -> ProtocolResult<Option<String>> {
            socket.send(&Message::new(Opcode::PasteObject, payload))?;
            socket.send_blocks(&mut reader, size)?;
            let reply = socket.recv_expect(Opcode::PasteObject)?;
            let (ok, body) = reply.status()?;
            if !ok {
                return Ok(None);
            }
            Ok(split_strings(body)?.into_iter().next())
        })();
        let target = self.guard(res)?;
        debug!(dst_parent, ?target, "remote archive sent");
        Ok(target)
    }

    fn search_begin(
        &mut self,
        start: &str,
        pattern: &str,
        options: SearchOptions,
    ) -> RaResult<Option<String>> {
        self.rules.validate(start)?;
        let flags = options.to_flags();
        self.request_first_string(Message::with_strings(
            Opcode::SearchBegin,
            &[start, pattern, flags.as_str()],
        ))
    }

    fn search_next(&mut self) -> RaResult<Option<String>> {
        self.request_first_string(Message::empty(Opcode::SearchContinue))
    }

    fn search_end(&mut self) -> RaResult<()> {
        self.request(Message::empty(Opcode::SearchEnd))?;
        Ok(())
    }

    fn is_hyperobject(&mut self, path: &str) -> RaResult<bool> {
        let files = self.raw_file_list(path)?.unwrap_or_default();
        Ok(files.iter().any(|f| f == HYPEROBJECT_FILE))
    }

    fn get_hyperobject_info(&mut self, path: &str) -> RaResult<Option<HyperobjectInfo>> {
        self.rules.validate(path)?;
        let marker_path = self.rules.join(path, HYPEROBJECT_FILE);
        let Some(body) = self.fetch(&marker_path)? else {
            return Ok(None);
        };
        let marker = Marker::parse(&String::from_utf8_lossy(&body), &marker_path)?;
        Ok(Some(HyperobjectInfo {
            target_path: self.lookup_path(&marker.guid),
            guid: marker.guid,
            name: marker.name,
        }))
    }

    fn lookup_path(&self, guid: &Guid) -> Option<String> {
        self.registry
            .lookup(guid)
            .map(|relative| self.rules.absolute(relative))
    }

    fn get_uuid(&mut self, path: &str) -> RaResult<Option<Guid>> {
        self.rules.validate(path)?;
        let Some(fields) = self.request_strings(Message::with_strings(Opcode::GetUuid, &[path]))?
        else {
            return Ok(None);
        };
        let parsed = match fields.as_slice() {
            [guid, minted] => Guid::parse(guid)
                .map(|g| (g, minted == "1"))
                .map_err(|e| ProtocolError::MalformedPayload(e.to_string())),
            _ => Err(ProtocolError::MalformedPayload(
                "GetUuid response is not [guid, minted]".into(),
            )),
        };
        let (guid, minted) = self.guard(parsed)?;
        if minted {
            if let Some(relative) = self.relative(path) {
                self.registry.insert(guid, relative);
            }
        }
        Ok(Some(guid))
    }

    fn reconcile_guids(&mut self, path: &str) -> RaResult<bool> {
        if self.request_path(Opcode::ReconcileUuids, path)?.is_none() {
            return Ok(false);
        }
        self.reload_uuid_base()?;
        Ok(true)
    }

    fn fix_oofs(&mut self) -> RaResult<bool> {
        Err(RaError::NotSupported("fix_oofs"))
    }

    fn load_uuid_base(&mut self) -> RaResult<()> {
        let root = self.rules.root().to_string();
        let file = self.rules.join(&root, REGISTRY_FILE);
        self.registry = match self.fetch(&file)? {
            Some(body) => UuidRegistry::parse(&String::from_utf8_lossy(&body)),
            None => UuidRegistry::new(),
        };
        debug!(entries = self.registry.len(), "remote registry loaded");
        Ok(())
    }
}
