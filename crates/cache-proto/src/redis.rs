//! Incremental parse/compose of the RESP-like request/response structs.
//!
//! Framing is bit-exact RESP (§6): bulk strings (`$len\r\n...\r\n`), arrays
//! (`*count\r\n...`), simple strings (`+...\r\n`), errors (`-...\r\n`), and
//! integers (`:n\r\n`). Everything here is hand-written over a byte cursor
//! rather than derived from an annotated struct, because the protocol needs
//! to suspend mid-frame on a short read and resume later — a declarative
//! binary-struct decoder assumes the whole buffer is already present and
//! has no notion of "not enough bytes yet".

use cache_buf::DynBuf;

use crate::error::CodecError;
use crate::request::{ByteView, ParseState, Request, RequestKind, RequestLifecycle};
use crate::response::{Response, ResponseKind};

/// Largest array element count this codec will accept for a command
/// (1 command token + up to [`crate::request::MAX_BATCH_SIZE`] keys).
const MAX_ARGC: u64 = crate::request::MAX_BATCH_SIZE as u64 + 1;

/// Outcome of attempting to parse one frame.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseOutcome<T> {
    /// Not enough bytes are buffered yet; try again once more arrive. The
    /// read cursor is left exactly where it was.
    Incomplete,
    /// A full frame was parsed and consumed.
    Parsed(T),
}

/// A cursor over a borrowed byte slice, used internally while a frame is
/// being scanned. Never escapes this module.
///
/// `data` is the buffer's readable region, which starts at the buffer's
/// read cursor rather than at absolute offset `0`. `base` records that read
/// cursor so [`ByteView`]s built from `pos` (relative to `data`) can be
/// converted back to the absolute offsets [`ByteView::resolve`] expects.
struct Scanner<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Scanner<'a> {
    fn new(data: &'a [u8], base: usize) -> Self {
        Scanner { data, pos: 0, base }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }
}

enum Crlf {
    Ok,
    Incomplete,
    Invalid,
}

/// Requires `\r\n` at the cursor. If only `\r` is visible and no further
/// byte is readable, reports `Incomplete` rather than guessing.
fn try_crlf(s: &mut Scanner) -> Crlf {
    match s.peek() {
        None => Crlf::Incomplete,
        Some(b'\r') => match s.data.get(s.pos + 1) {
            None => Crlf::Incomplete,
            Some(b'\n') => {
                s.advance(2);
                Crlf::Ok
            }
            Some(_) => Crlf::Invalid,
        },
        Some(_) => Crlf::Invalid,
    }
}

enum NumStatus {
    Ok(u64),
    Incomplete,
    Invalid,
    Empty,
    Overflow,
}

/// Parses decimal digits up to a CRLF, pre-checking each digit against
/// `max` so overflow is caught before it happens rather than after
/// wrapping.
fn check_uint(s: &mut Scanner, max: u64) -> NumStatus {
    let start = s.pos;
    let mut num: u64 = 0;
    let mut digits = 0usize;
    loop {
        match s.peek() {
            None => {
                s.pos = start;
                return NumStatus::Incomplete;
            }
            Some(b) if b.is_ascii_digit() => {
                let d = (b - b'0') as u64;
                if num > max / 10 || (num == max / 10 && d > max % 10) {
                    return NumStatus::Overflow;
                }
                num = num * 10 + d;
                digits += 1;
                s.advance(1);
            }
            Some(b'\r') => {
                if digits == 0 {
                    s.pos = start;
                    return NumStatus::Empty;
                }
                return match try_crlf(s) {
                    Crlf::Ok => NumStatus::Ok(num),
                    Crlf::Incomplete => {
                        s.pos = start;
                        NumStatus::Incomplete
                    }
                    Crlf::Invalid => NumStatus::Invalid,
                };
            }
            Some(_) => {
                s.pos = start;
                return NumStatus::Invalid;
            }
        }
    }
}

enum BulkStatus {
    Ok(ByteView),
    /// A RESP null bulk (`$-1\r\n`).
    Null,
    Incomplete,
    Invalid,
}

/// Parses `$<len>\r\n<bytes>\r\n`, exposing `(offset, len)` as a
/// [`ByteView`] without copying.
fn parse_bulk(s: &mut Scanner) -> BulkStatus {
    let start = s.pos;
    match s.peek() {
        None => return BulkStatus::Incomplete,
        Some(b'$') => s.advance(1),
        Some(_) => return BulkStatus::Invalid,
    }

    // "$-1\r\n" (null bulk) is the one place a leading '-' is legal here.
    if s.peek() == Some(b'-') {
        let save = s.pos;
        s.advance(1);
        match check_uint(s, 1) {
            NumStatus::Ok(1) => return BulkStatus::Null,
            NumStatus::Incomplete => {
                s.pos = start;
                return BulkStatus::Incomplete;
            }
            _ => {
                s.pos = save;
            }
        }
    }

    let len = match check_uint(s, u32::MAX as u64) {
        NumStatus::Ok(n) => n as usize,
        NumStatus::Incomplete => {
            s.pos = start;
            return BulkStatus::Incomplete;
        }
        NumStatus::Empty | NumStatus::Invalid | NumStatus::Overflow => {
            s.pos = start;
            return BulkStatus::Invalid;
        }
    };

    if s.remaining() < len + 2 {
        s.pos = start;
        return BulkStatus::Incomplete;
    }
    let local_offset = s.pos;
    s.advance(len);
    match try_crlf(s) {
        Crlf::Ok => BulkStatus::Ok(ByteView {
            offset: s.base + local_offset,
            len,
        }),
        Crlf::Incomplete => {
            s.pos = start;
            BulkStatus::Incomplete
        }
        Crlf::Invalid => {
            s.pos = start;
            BulkStatus::Invalid
        }
    }
}

enum BulkNumStatus {
    Ok(u64),
    Incomplete,
    Invalid,
}

/// Parses a bulk string and validates it is an all-digit unsigned integer,
/// guarding against overflow the same way [`check_uint`] does.
fn parse_bulk_numeric(s: &mut Scanner, max: u64) -> BulkNumStatus {
    let start = s.pos;
    let view = match parse_bulk(s) {
        BulkStatus::Ok(v) => v,
        BulkStatus::Incomplete => {
            s.pos = start;
            return BulkNumStatus::Incomplete;
        }
        BulkStatus::Null | BulkStatus::Invalid => return BulkNumStatus::Invalid,
    };
    let local_offset = view.offset - s.base;
    let bytes = &s.data[local_offset..local_offset + view.len];
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return BulkNumStatus::Invalid;
    }
    let mut num: u64 = 0;
    for &b in bytes {
        let d = (b - b'0') as u64;
        if num > max / 10 || (num == max / 10 && d > max % 10) {
            return BulkNumStatus::Invalid;
        }
        num = num * 10 + d;
    }
    BulkNumStatus::Ok(num)
}

fn classify_command(bytes: &[u8]) -> Option<RequestKind> {
    match bytes.len() {
        3 => match bytes {
            b"get" => Some(RequestKind::Get),
            b"set" => Some(RequestKind::Set),
            _ => None,
        },
        4 => match bytes {
            b"mget" => Some(RequestKind::Mget),
            b"quit" => Some(RequestKind::Quit),
            _ => None,
        },
        5 => match bytes {
            b"flush" => Some(RequestKind::Flush),
            _ => None,
        },
        6 => match bytes {
            b"delete" => Some(RequestKind::Delete),
            b"incrby" => Some(RequestKind::Incr),
            b"decrby" => Some(RequestKind::Decr),
            _ => None,
        },
        _ => None,
    }
}

/// Parses one request from `buf`'s readable region.
///
/// On [`ParseOutcome::Incomplete`] the read cursor is left untouched. On a
/// parse error the cursor is also left untouched (nothing was consumed, so
/// there is nothing to restore) and the connection should be closed per
/// §7. On success the cursor advances past exactly the consumed frame.
pub fn parse_request(buf: &mut DynBuf) -> Result<ParseOutcome<Request>, CodecError> {
    let base = buf.read_cursor();
    let data = buf.readable();
    let mut s = Scanner::new(data, base);

    if s.remaining() == 0 {
        return Ok(ParseOutcome::Incomplete);
    }
    if s.peek() != Some(b'*') {
        return Err(CodecError::Invalid("expected RESP array header"));
    }
    s.advance(1);

    let argc = match check_uint(&mut s, MAX_ARGC) {
        NumStatus::Ok(n) => n,
        NumStatus::Incomplete => return Ok(ParseOutcome::Incomplete),
        NumStatus::Overflow => return Err(CodecError::Overflow),
        NumStatus::Empty | NumStatus::Invalid => {
            return Err(CodecError::Invalid("malformed array header"));
        }
    };
    if argc == 0 {
        return Err(CodecError::Invalid("empty command array"));
    }

    let cmd_view = match parse_bulk(&mut s) {
        BulkStatus::Ok(v) => v,
        BulkStatus::Incomplete => return Ok(ParseOutcome::Incomplete),
        BulkStatus::Null | BulkStatus::Invalid => {
            return Err(CodecError::Invalid("malformed command token"));
        }
    };
    let cmd_local_offset = cmd_view.offset - base;
    let cmd_bytes = &data[cmd_local_offset..cmd_local_offset + cmd_view.len];
    let kind = classify_command(cmd_bytes).ok_or(CodecError::Invalid("unknown command"))?;

    let mut req = Request::new(kind);
    let nargs = argc - 1;

    match kind {
        RequestKind::Get | RequestKind::Mget => {
            if nargs == 0 || nargs as usize > crate::request::MAX_BATCH_SIZE {
                return Err(CodecError::Invalid("wrong number of keys"));
            }
            for _ in 0..nargs {
                match parse_bulk(&mut s) {
                    BulkStatus::Ok(v) => req.keys.push(v),
                    BulkStatus::Incomplete => return Ok(ParseOutcome::Incomplete),
                    BulkStatus::Null | BulkStatus::Invalid => {
                        return Err(CodecError::Invalid("malformed key"));
                    }
                }
            }
        }
        RequestKind::Delete => {
            if nargs != 1 {
                return Err(CodecError::Invalid("delete takes exactly one key"));
            }
            match parse_bulk(&mut s) {
                BulkStatus::Ok(v) => req.keys.push(v),
                BulkStatus::Incomplete => return Ok(ParseOutcome::Incomplete),
                BulkStatus::Null | BulkStatus::Invalid => {
                    return Err(CodecError::Invalid("malformed key"));
                }
            }
        }
        RequestKind::Incr | RequestKind::Decr => {
            if nargs != 2 {
                return Err(CodecError::Invalid("incrby/decrby takes a key and a delta"));
            }
            match parse_bulk(&mut s) {
                BulkStatus::Ok(v) => req.keys.push(v),
                BulkStatus::Incomplete => return Ok(ParseOutcome::Incomplete),
                BulkStatus::Null | BulkStatus::Invalid => {
                    return Err(CodecError::Invalid("malformed key"));
                }
            }
            match parse_bulk_numeric(&mut s, u64::MAX) {
                BulkNumStatus::Ok(n) => req.delta = Some(n),
                BulkNumStatus::Incomplete => return Ok(ParseOutcome::Incomplete),
                BulkNumStatus::Invalid => return Err(CodecError::Invalid("malformed delta")),
            }
        }
        RequestKind::Set => {
            if nargs != 2 {
                return Err(CodecError::Invalid("set takes a key and a value"));
            }
            match parse_bulk(&mut s) {
                BulkStatus::Ok(v) => req.keys.push(v),
                BulkStatus::Incomplete => return Ok(ParseOutcome::Incomplete),
                BulkStatus::Null | BulkStatus::Invalid => {
                    return Err(CodecError::Invalid("malformed key"));
                }
            }
            req.pstate = ParseState::Val;
            match parse_bulk(&mut s) {
                BulkStatus::Ok(v) => req.value = Some(v),
                BulkStatus::Incomplete => return Ok(ParseOutcome::Incomplete),
                BulkStatus::Null | BulkStatus::Invalid => {
                    return Err(CodecError::Invalid("malformed value"));
                }
            }
        }
        RequestKind::Flush | RequestKind::Quit => {
            if nargs != 0 {
                return Err(CodecError::Invalid("flush/quit take no arguments"));
            }
        }
        RequestKind::Gets | RequestKind::Add | RequestKind::Replace | RequestKind::Append
        | RequestKind::Prepend | RequestKind::Cas => {
            unreachable!("classify_command never produces a memcache-only kind")
        }
    }

    let consumed = s.pos;
    buf.advance_read(consumed);
    req.rstate = RequestLifecycle::Parsed;
    Ok(ParseOutcome::Parsed(req))
}

// --- composition -----------------------------------------------------

const UINT64_MAXLEN: usize = 20;
const UINT32_MAXLEN: usize = 10;

fn write_bulk(buf: &mut DynBuf, s: &[u8]) -> Result<(), CodecError> {
    let upper_bound = 1 + UINT32_MAXLEN + 2 + s.len() + 2;
    buf.ensure_writable(upper_bound)?;
    let header = format!("${}\r\n", s.len());
    buf.put_slice(header.as_bytes())?;
    buf.put_slice(s)?;
    buf.put_slice(b"\r\n")?;
    Ok(())
}

fn write_null_bulk(buf: &mut DynBuf) -> Result<(), CodecError> {
    buf.ensure_writable(5)?;
    buf.put_slice(b"$-1\r\n")?;
    Ok(())
}

fn write_simple(buf: &mut DynBuf, text: &[u8], prefix: u8) -> Result<(), CodecError> {
    let upper_bound = 1 + text.len() + 2;
    buf.ensure_writable(upper_bound)?;
    buf.put_slice(&[prefix])?;
    buf.put_slice(text)?;
    buf.put_slice(b"\r\n")?;
    Ok(())
}

fn write_i64(buf: &mut DynBuf, n: i64) -> Result<(), CodecError> {
    let upper_bound = 1 + UINT64_MAXLEN + 1 + 2;
    buf.ensure_writable(upper_bound)?;
    let text = format!(":{n}\r\n");
    buf.put_slice(text.as_bytes())?;
    Ok(())
}

fn write_length(buf: &mut DynBuf, n: usize) -> Result<(), CodecError> {
    let upper_bound = 1 + UINT64_MAXLEN + 2;
    buf.ensure_writable(upper_bound)?;
    let text = format!("*{n}\r\n");
    buf.put_slice(text.as_bytes())?;
    Ok(())
}

/// Writes a bare RESP array-count header (`*n\r\n`) with no elements.
/// Used by dispatch to frame `MGET`'s reply before composing one
/// [`Response`] per requested key.
pub fn compose_array_len(buf: &mut DynBuf, n: usize) -> Result<(), CodecError> {
    write_length(buf, n)
}

/// Composes a single [`Response`] into `buf` as one RESP value.
///
/// Multi-value replies (`MGET`'s array of results) are composed by the
/// dispatch layer calling this once per element after writing the array
/// header with [`write_length`]; there is no dedicated "VALUE ... END"
/// framing in RESP, that shape is specific to the memcached dialect.
pub fn compose_response(resp: &Response, buf: &mut DynBuf) -> Result<(), CodecError> {
    use ResponseKind::*;
    match resp.kind {
        Some(ResponseKind::Ok | Stored | Deleted) => write_simple(buf, b"OK", b'+'),
        Some(NotFound | NotStored | Exists) => write_null_bulk(buf),
        Some(End) => write_null_bulk(buf),
        Some(Value) => {
            if resp.cas {
                write_length(buf, 2)?;
                write_bulk(buf, &resp.value)?;
                write_i64(buf, resp.vcas as i64)
            } else {
                write_bulk(buf, &resp.value)
            }
        }
        Some(Numeric) => write_i64(buf, resp.vint as i64),
        Some(ClientError) => write_simple(buf, &resp.value, b'-'),
        Some(ServerError) => write_simple(buf, &resp.value, b'-'),
        Some(Stat) => write_bulk(buf, &resp.value),
        None => write_null_bulk(buf),
    }
}

/// Composes a [`Request`] back into wire form, resolving its views against
/// `src`. Used for round-trip tests and by any client-side tooling built on
/// this codec; the running server itself only ever parses requests.
pub fn compose_request(req: &Request, src: &DynBuf, buf: &mut DynBuf) -> Result<(), CodecError> {
    let cmd: &[u8] = match req.kind {
        RequestKind::Get => b"get",
        RequestKind::Mget => b"mget",
        RequestKind::Set => b"set",
        RequestKind::Delete => b"delete",
        RequestKind::Incr => b"incrby",
        RequestKind::Decr => b"decrby",
        RequestKind::Flush => b"flush",
        RequestKind::Quit => b"quit",
        _ => return Err(CodecError::Invalid("kind has no redis-dialect encoding")),
    };

    // FLUSH/QUIT take no arguments and compose as a bare bulk string, not a
    // one-element array (matches the reference `compose_req`'s REQ_FLUSH/
    // REQ_QUIT case).
    if matches!(req.kind, RequestKind::Flush | RequestKind::Quit) {
        return write_bulk(buf, cmd);
    }

    let argc = 1 + req.keys.len() + req.value.is_some() as usize + req.delta.is_some() as usize;
    write_length(buf, argc)?;
    write_bulk(buf, cmd)?;
    for key in &req.keys {
        write_bulk(buf, key.resolve(src))?;
    }
    if let Some(value) = &req.value {
        write_bulk(buf, value.resolve(src))?;
    }
    if let Some(delta) = req.delta {
        write_bulk(buf, delta.to_string().as_bytes())?;
    }
    Ok(())
}

/// A decoded RESP value, for parsing composed responses (§4.2 supplement:
/// the reference parser stubs this out, but the round-trip property in §8
/// is stated for responses too, so this implementation is symmetric with
/// [`parse_request`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    Simple(Vec<u8>),
    Error(Vec<u8>),
    Integer(i64),
    Bulk(Vec<u8>),
    NullBulk,
    Array(Vec<RespValue>),
}

/// Parses one RESP value from `buf`'s readable region, recursing for
/// arrays. Follows the same incomplete/atomic-framing contract as
/// [`parse_request`].
pub fn parse_response(buf: &mut DynBuf) -> Result<ParseOutcome<RespValue>, CodecError> {
    let base = buf.read_cursor();
    let data = buf.readable();
    let mut s = Scanner::new(data, base);
    match parse_value(&mut s) {
        Ok(Some(value)) => {
            let consumed = s.pos;
            buf.advance_read(consumed);
            Ok(ParseOutcome::Parsed(value))
        }
        Ok(None) => Ok(ParseOutcome::Incomplete),
        Err(e) => Err(e),
    }
}

fn parse_value(s: &mut Scanner) -> Result<Option<RespValue>, CodecError> {
    let sigil = match s.peek() {
        None => return Ok(None),
        Some(b) => b,
    };
    match sigil {
        b'+' | b'-' => {
            s.advance(1);
            let start = s.pos;
            loop {
                match s.peek() {
                    None => return Ok(None),
                    Some(b'\r') => match try_crlf(s) {
                        Crlf::Ok => {
                            let text = s.data[start..s.pos - 2].to_vec();
                            return Ok(Some(if sigil == b'+' {
                                RespValue::Simple(text)
                            } else {
                                RespValue::Error(text)
                            }));
                        }
                        Crlf::Incomplete => return Ok(None),
                        Crlf::Invalid => {
                            return Err(CodecError::Invalid("malformed simple/error line"));
                        }
                    },
                    Some(_) => s.advance(1),
                }
            }
        }
        b':' => {
            s.advance(1);
            let neg = s.peek() == Some(b'-');
            if neg {
                s.advance(1);
            }
            match check_uint(s, i64::MAX as u64) {
                NumStatus::Ok(n) => Ok(Some(RespValue::Integer(if neg {
                    -(n as i64)
                } else {
                    n as i64
                }))),
                NumStatus::Incomplete => Ok(None),
                _ => Err(CodecError::Invalid("malformed integer")),
            }
        }
        b'$' => match parse_bulk(s) {
            BulkStatus::Ok(v) => {
                let local_offset = v.offset - s.base;
                Ok(Some(RespValue::Bulk(
                    s.data[local_offset..local_offset + v.len].to_vec(),
                )))
            }
            BulkStatus::Null => Ok(Some(RespValue::NullBulk)),
            BulkStatus::Incomplete => Ok(None),
            BulkStatus::Invalid => Err(CodecError::Invalid("malformed bulk string")),
        },
        b'*' => {
            s.advance(1);
            let count = match check_uint(s, MAX_ARGC * MAX_ARGC) {
                NumStatus::Ok(n) => n,
                NumStatus::Incomplete => return Ok(None),
                _ => return Err(CodecError::Invalid("malformed array header")),
            };
            let mut elems = Vec::with_capacity(count as usize);
            for _ in 0..count {
                match parse_value(s)? {
                    Some(v) => elems.push(v),
                    None => return Ok(None),
                }
            }
            Ok(Some(RespValue::Array(elems)))
        }
        _ => Err(CodecError::Invalid("unrecognized RESP sigil")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(buf: &mut DynBuf, bytes: &[u8]) {
        buf.put_slice(bytes).unwrap();
    }

    #[test]
    fn s2_parse_get() {
        let mut buf = DynBuf::create(64, 4096);
        feed(&mut buf, b"*2\r\n$3\r\nget\r\n$3\r\nfoo\r\n");
        match parse_request(&mut buf).unwrap() {
            ParseOutcome::Parsed(req) => {
                assert_eq!(req.kind, RequestKind::Get);
                assert_eq!(req.keys.len(), 1);
                assert_eq!(req.keys[0].resolve(&buf), b"foo");
                assert_eq!(buf.readable_size(), 0);
            }
            _ => panic!("expected Parsed"),
        }
    }

    #[test]
    fn s3_parse_set() {
        let mut buf = DynBuf::create(64, 4096);
        feed(&mut buf, b"*3\r\n$3\r\nset\r\n$3\r\nfoo\r\n$3\r\nXYZ\r\n");
        match parse_request(&mut buf).unwrap() {
            ParseOutcome::Parsed(req) => {
                assert_eq!(req.kind, RequestKind::Set);
                assert_eq!(req.keys[0].resolve(&buf), b"foo");
                assert_eq!(req.value.unwrap().resolve(&buf), b"XYZ");
            }
            _ => panic!("expected Parsed"),
        }
    }

    #[test]
    fn s4_parse_incrby() {
        let mut buf = DynBuf::create(64, 4096);
        feed(&mut buf, b"*3\r\n$6\r\nincrby\r\n$3\r\nfoo\r\n$3\r\n909\r\n");
        match parse_request(&mut buf).unwrap() {
            ParseOutcome::Parsed(req) => {
                assert_eq!(req.kind, RequestKind::Incr);
                assert_eq!(req.keys[0].resolve(&buf), b"foo");
                assert_eq!(req.delta, Some(909));
            }
            _ => panic!("expected Parsed"),
        }
    }

    #[test]
    fn s5_incomplete_then_complete() {
        let full = b"*3\r\n$3\r\nset\r\n$3\r\nfoo\r\n$3\r\nXYZ\r\n";
        let mut buf = DynBuf::create(64, 4096);
        feed(&mut buf, &full[..10]);
        let before = buf.read_cursor();
        match parse_request(&mut buf).unwrap() {
            ParseOutcome::Incomplete => {}
            _ => panic!("expected Incomplete"),
        }
        assert_eq!(buf.read_cursor(), before);

        feed(&mut buf, &full[10..]);
        match parse_request(&mut buf).unwrap() {
            ParseOutcome::Parsed(req) => {
                assert_eq!(req.kind, RequestKind::Set);
                assert_eq!(req.value.unwrap().resolve(&buf), b"XYZ");
            }
            _ => panic!("expected Parsed"),
        }
    }

    #[test]
    fn atomic_framing_on_every_prefix() {
        let full = b"*2\r\n$3\r\nget\r\n$3\r\nfoo\r\n";
        for n in 0..full.len() {
            let mut buf = DynBuf::create(64, 4096);
            feed(&mut buf, &full[..n]);
            let before = buf.read_cursor();
            match parse_request(&mut buf).unwrap() {
                ParseOutcome::Incomplete => {}
                ParseOutcome::Parsed(_) => panic!("prefix of len {n} should not parse"),
            }
            assert_eq!(buf.read_cursor(), before, "cursor moved on prefix {n}");
        }
    }

    #[test]
    fn s1_compose_quit_request() {
        let src = DynBuf::create(8, 64);
        let req = Request::new(RequestKind::Quit);
        let mut out = DynBuf::create(64, 4096);
        compose_request(&req, &src, &mut out).unwrap();
        assert_eq!(out.readable(), b"$4\r\nquit\r\n");
    }

    #[test]
    fn request_round_trip() {
        let mut buf = DynBuf::create(64, 4096);
        feed(&mut buf, b"*3\r\n$6\r\nincrby\r\n$3\r\nfoo\r\n$3\r\n909\r\n");
        let req = match parse_request(&mut buf).unwrap() {
            ParseOutcome::Parsed(r) => r,
            _ => panic!(),
        };
        let mut composed = DynBuf::create(64, 4096);
        compose_request(&req, &buf, &mut composed).unwrap();

        let mut reparsed_buf = DynBuf::create(64, 4096);
        feed(&mut reparsed_buf, composed.readable());
        let req2 = match parse_request(&mut reparsed_buf).unwrap() {
            ParseOutcome::Parsed(r) => r,
            _ => panic!(),
        };
        assert_eq!(req.kind, req2.kind);
        assert_eq!(req.keys[0].resolve(&buf), req2.keys[0].resolve(&reparsed_buf));
        assert_eq!(req.delta, req2.delta);
    }

    #[test]
    fn unknown_command_is_invalid() {
        let mut buf = DynBuf::create(64, 4096);
        feed(&mut buf, b"*1\r\n$7\r\nbogus!!\r\n");
        assert_eq!(
            parse_request(&mut buf),
            Err(CodecError::Invalid("unknown command"))
        );
    }

    #[test]
    fn compose_value_response_with_cas() {
        let resp = Response::value(b"foo", b"bar", 7, Some(42));
        let mut buf = DynBuf::create(64, 4096);
        compose_response(&resp, &mut buf).unwrap();
        assert_eq!(buf.readable(), b"*2\r\n$3\r\nbar\r\n:42\r\n");
    }

    #[test]
    fn compose_numeric_response() {
        let resp = Response::numeric(ResponseKind::Numeric, 909);
        let mut buf = DynBuf::create(64, 4096);
        compose_response(&resp, &mut buf).unwrap();
        assert_eq!(buf.readable(), b":909\r\n");
    }

    #[test]
    fn parse_response_simple_and_bulk() {
        let mut buf = DynBuf::create(64, 4096);
        feed(&mut buf, b"+OK\r\n$3\r\nfoo\r\n");
        match parse_response(&mut buf).unwrap() {
            ParseOutcome::Parsed(RespValue::Simple(s)) => assert_eq!(s, b"OK"),
            _ => panic!(),
        }
        match parse_response(&mut buf).unwrap() {
            ParseOutcome::Parsed(RespValue::Bulk(s)) => assert_eq!(s, b"foo"),
            _ => panic!(),
        }
    }
}
