//! A PostgreSQL wire-protocol server small enough to script from a test.
//!
//! It completes the startup handshake without authentication, then either
//! goes silent or answers every parameterless extended-protocol query with
//! one fixed table in binary format. Nothing is parsed beyond message
//! framing, so the SQL text is ignored.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const SSL_REQUEST: i32 = 80_877_103;
const GSSENC_REQUEST: i32 = 80_877_104;

/// Type OIDs of the built-in types used by the tests.
pub mod oid {
    pub const BOOL: u32 = 16;
    pub const BYTEA: u32 = 17;
    pub const INT8: u32 = 20;
    pub const INT4: u32 = 23;
    pub const TEXT: u32 = 25;
    pub const JSON: u32 = 114;
    pub const XML: u32 = 142;
    pub const FLOAT8: u32 = 701;
    pub const VARCHAR: u32 = 1043;
    pub const DATE: u32 = 1082;
    pub const TIMESTAMP: u32 = 1114;
    pub const NUMERIC: u32 = 1700;
    pub const UUID: u32 = 2950;
    pub const JSONB: u32 = 3802;
}

/// Binary-format cell encoders. `None` is SQL NULL.
pub mod cell {
    pub type Cell = Option<Vec<u8>>;

    pub fn null() -> Cell {
        None
    }

    pub fn bool(value: bool) -> Cell {
        Some(vec![u8::from(value)])
    }

    pub fn int4(value: i32) -> Cell {
        Some(value.to_be_bytes().to_vec())
    }

    pub fn int8(value: i64) -> Cell {
        Some(value.to_be_bytes().to_vec())
    }

    pub fn float8(value: f64) -> Cell {
        Some(value.to_be_bytes().to_vec())
    }

    pub fn text(value: &str) -> Cell {
        Some(value.as_bytes().to_vec())
    }

    pub fn bytes(value: &[u8]) -> Cell {
        Some(value.to_vec())
    }

    /// Days since 2000-01-01.
    pub fn date(days: i32) -> Cell {
        int4(days)
    }

    /// Microseconds since 2000-01-01 00:00:00.
    pub fn timestamp(micros: i64) -> Cell {
        int8(micros)
    }

    pub fn uuid(value: [u8; 16]) -> Cell {
        Some(value.to_vec())
    }

    /// JSONB carries a version byte ahead of the text.
    pub fn jsonb(value: &str) -> Cell {
        let mut raw = vec![1];
        raw.extend_from_slice(value.as_bytes());
        Some(raw)
    }

    /// NUMERIC in base-10000 digit groups.
    pub fn numeric(weight: i16, negative: bool, scale: u16, digits: &[u16]) -> Cell {
        let mut raw = Vec::with_capacity(8 + digits.len() * 2);
        raw.extend_from_slice(&(digits.len() as u16).to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&(if negative { 0x4000u16 } else { 0 }).to_be_bytes());
        raw.extend_from_slice(&scale.to_be_bytes());
        for digit in digits {
            raw.extend_from_slice(&digit.to_be_bytes());
        }
        Some(raw)
    }
}

/// Columns and rows returned for every query.
#[derive(Debug, Clone, Default)]
pub struct FakeTable {
    columns: Vec<(String, u32)>,
    rows: Vec<Vec<cell::Cell>>,
}

impl FakeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, name: &str, type_oid: u32) -> Self {
        self.columns.push((name.to_string(), type_oid));
        self
    }

    /// Append a row. Cells are matched to columns by position.
    pub fn row(mut self, cells: Vec<cell::Cell>) -> Self {
        self.rows.push(cells);
        self
    }
}

#[derive(Debug, Clone)]
enum Behaviour {
    Silent,
    Serving(Arc<FakeTable>),
}

/// A running fake server bound to a local port. Dropping it stops accepting.
#[derive(Debug)]
pub struct FakePostgres {
    port: u16,
    connections: Arc<AtomicUsize>,
    acceptor: JoinHandle<()>,
}

impl FakePostgres {
    /// Finish startup on every connection, then never answer again.
    pub async fn silent() -> io::Result<Self> {
        Self::start(Behaviour::Silent).await
    }

    /// Answer every query with `table`.
    pub async fn serving(table: FakeTable) -> io::Result<Self> {
        Self::start(Behaviour::Serving(Arc::new(table))).await
    }

    async fn start(behaviour: Behaviour) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let connections = Arc::new(AtomicUsize::new(0));

        let accepted = connections.clone();
        let acceptor = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                let behaviour = behaviour.clone();
                tokio::spawn(async move {
                    let _ = handle(socket, behaviour).await;
                });
            }
        });

        Ok(Self {
            port,
            connections,
            acceptor,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for FakePostgres {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

fn message(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(body.len() + 5);
    framed.push(tag);
    framed.extend_from_slice(&((body.len() + 4) as i32).to_be_bytes());
    framed.extend_from_slice(body);
    framed
}

fn ready_for_query() -> Vec<u8> {
    message(b'Z', b"I")
}

fn row_description(table: &FakeTable) -> Vec<u8> {
    if table.columns.is_empty() {
        return message(b'n', &[]);
    }
    let mut body = Vec::new();
    body.extend_from_slice(&(table.columns.len() as i16).to_be_bytes());
    for (name, type_oid) in &table.columns {
        body.extend_from_slice(name.as_bytes());
        body.push(0);
        body.extend_from_slice(&0i32.to_be_bytes()); // table oid
        body.extend_from_slice(&0i16.to_be_bytes()); // attribute number
        body.extend_from_slice(&type_oid.to_be_bytes());
        body.extend_from_slice(&(-1i16).to_be_bytes()); // type size
        body.extend_from_slice(&(-1i32).to_be_bytes()); // type modifier
        body.extend_from_slice(&0i16.to_be_bytes()); // format
    }
    message(b'T', &body)
}

fn data_rows(table: &FakeTable) -> Vec<u8> {
    let mut out = Vec::new();
    for row in &table.rows {
        let mut body = Vec::new();
        body.extend_from_slice(&(row.len() as i16).to_be_bytes());
        for value in row {
            match value {
                Some(raw) => {
                    body.extend_from_slice(&(raw.len() as i32).to_be_bytes());
                    body.extend_from_slice(raw);
                }
                None => body.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }
        out.extend(message(b'D', &body));
    }
    let tag = format!("SELECT {}\0", table.rows.len());
    out.extend(message(b'C', tag.as_bytes()));
    out
}

async fn read_body(socket: &mut TcpStream, len: i32) -> io::Result<Vec<u8>> {
    let len = usize::try_from(len)
        .ok()
        .and_then(|len| len.checked_sub(4))
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad message length"))?;
    let mut body = vec![0u8; len];
    socket.read_exact(&mut body).await?;
    Ok(body)
}

async fn startup(socket: &mut TcpStream) -> io::Result<()> {
    loop {
        let len = socket.read_i32().await?;
        let body = read_body(socket, len).await?;
        let code = body
            .get(..4)
            .map(|code| i32::from_be_bytes([code[0], code[1], code[2], code[3]]))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "short startup"))?;
        if code == SSL_REQUEST || code == GSSENC_REQUEST {
            socket.write_all(b"N").await?;
            continue;
        }
        break;
    }

    let mut reply = message(b'R', &0i32.to_be_bytes());
    let mut key_data = Vec::with_capacity(8);
    key_data.extend_from_slice(&4242i32.to_be_bytes());
    key_data.extend_from_slice(&7i32.to_be_bytes());
    reply.extend(message(b'K', &key_data));
    reply.extend(ready_for_query());
    socket.write_all(&reply).await
}

async fn handle(mut socket: TcpStream, behaviour: Behaviour) -> io::Result<()> {
    startup(&mut socket).await?;

    let table = match behaviour {
        Behaviour::Serving(table) => table,
        Behaviour::Silent => {
            // Hold the connection open, reading and discarding until the peer leaves.
            let mut sink = [0u8; 1024];
            while socket.read(&mut sink).await? > 0 {}
            return Ok(());
        }
    };

    loop {
        let tag = match socket.read_u8().await {
            Ok(tag) => tag,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        };
        let len = socket.read_i32().await?;
        let body = read_body(&mut socket, len).await?;

        let reply = match tag {
            b'P' => message(b'1', &[]),
            b'D' if body.first() == Some(&b'S') => {
                let mut reply = message(b't', &0i16.to_be_bytes());
                reply.extend(row_description(&table));
                reply
            }
            b'D' => row_description(&table),
            b'B' => message(b'2', &[]),
            b'E' => data_rows(&table),
            b'C' => message(b'3', &[]),
            b'S' => ready_for_query(),
            b'Q' => {
                let mut reply = message(b'C', b"OK\0");
                reply.extend(ready_for_query());
                reply
            }
            b'X' => return Ok(()),
            _ => Vec::new(),
        };
        socket.write_all(&reply).await?;
    }
}
