//! Incremental parse/compose of the memcached ASCII request/response structs
//! (§4.3). Framing is line-terminated ASCII with SP-separated fields rather
//! than RESP's length-prefixed arrays, but the same `HDR`/`VAL` two-phase
//! shape and atomic-consume-on-complete discipline apply: a header line is
//! scanned for, then (for `set`-family commands) a length-prefixed data
//! block is checked for in full before anything is consumed.

use cache_buf::DynBuf;

use crate::error::CodecError;
use crate::redis::ParseOutcome;
use crate::request::{ByteView, ParseState, Request, RequestKind, RequestLifecycle};
use crate::response::{Response, ResponseKind};

const NOREPLY: &[u8] = b"noreply";

/// Scans `data` for the first `\r\n`, returning the index of the `\r`.
/// `None` means the line isn't fully buffered yet.
fn find_crlf(data: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i + 1 < data.len() {
        if data[i] == b'\r' && data[i + 1] == b'\n' {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn split_fields(line: &[u8]) -> Vec<&[u8]> {
    line.split(|&b| b == b' ').filter(|t| !t.is_empty()).collect()
}

fn parse_u32(tok: &[u8]) -> Option<u32> {
    if tok.is_empty() || !tok.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(tok).ok()?.parse().ok()
}

fn parse_u64(tok: &[u8]) -> Option<u64> {
    if tok.is_empty() || !tok.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(tok).ok()?.parse().ok()
}

fn parse_i64(tok: &[u8]) -> Option<i64> {
    let (neg, digits) = match tok.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, tok),
    };
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let n: i64 = std::str::from_utf8(digits).ok()?.parse().ok()?;
    Some(if neg { -n } else { n })
}

fn classify_command(token: &[u8]) -> Option<RequestKind> {
    Some(match token {
        b"get" => RequestKind::Get,
        b"gets" => RequestKind::Gets,
        b"set" => RequestKind::Set,
        b"add" => RequestKind::Add,
        b"replace" => RequestKind::Replace,
        b"append" => RequestKind::Append,
        b"prepend" => RequestKind::Prepend,
        b"cas" => RequestKind::Cas,
        b"delete" => RequestKind::Delete,
        b"incr" => RequestKind::Incr,
        b"decr" => RequestKind::Decr,
        b"flush_all" => RequestKind::Flush,
        b"quit" => RequestKind::Quit,
        _ => return None,
    })
}

fn is_set_family(kind: RequestKind) -> bool {
    matches!(
        kind,
        RequestKind::Set
            | RequestKind::Add
            | RequestKind::Replace
            | RequestKind::Append
            | RequestKind::Prepend
            | RequestKind::Cas
    )
}

/// Parses one request from `buf`'s readable region. Same incomplete/atomic
/// framing contract as [`crate::redis::parse_request`].
pub fn parse_request(buf: &mut DynBuf) -> Result<ParseOutcome<Request>, CodecError> {
    let base = buf.read_cursor();
    let data = buf.readable();

    let line_end = match find_crlf(data) {
        Some(i) => i,
        None => return Ok(ParseOutcome::Incomplete),
    };
    let line = &data[..line_end];
    let header_len = line_end + 2;

    let fields = split_fields(line);
    let Some(&cmd_tok) = fields.first() else {
        return Err(CodecError::Invalid("empty command line"));
    };
    let kind = classify_command(cmd_tok).ok_or(CodecError::Invalid("unknown command"))?;

    let mut req = Request::new(kind);

    match kind {
        RequestKind::Get | RequestKind::Gets => {
            let keys = &fields[1..];
            if keys.is_empty() || keys.len() > crate::request::MAX_BATCH_SIZE {
                return Err(CodecError::Invalid("wrong number of keys"));
            }
            for &k in keys {
                req.keys.push(view_of(data, base, k));
            }
            commit(buf, header_len);
            req.rstate = RequestLifecycle::Parsed;
            return Ok(ParseOutcome::Parsed(req));
        }
        RequestKind::Delete => {
            if fields.len() < 2 || fields.len() > 3 {
                return Err(CodecError::Invalid("delete takes a key and optional noreply"));
            }
            req.keys.push(view_of(data, base, fields[1]));
            req.noreply = parse_noreply(&fields, 2)?;
            commit(buf, header_len);
            req.rstate = RequestLifecycle::Parsed;
            return Ok(ParseOutcome::Parsed(req));
        }
        RequestKind::Incr | RequestKind::Decr => {
            if fields.len() < 3 || fields.len() > 4 {
                return Err(CodecError::Invalid("incr/decr takes a key and a delta"));
            }
            req.keys.push(view_of(data, base, fields[1]));
            req.delta = Some(parse_u64(fields[2]).ok_or(CodecError::Invalid("malformed delta"))?);
            req.noreply = parse_noreply(&fields, 3)?;
            commit(buf, header_len);
            req.rstate = RequestLifecycle::Parsed;
            return Ok(ParseOutcome::Parsed(req));
        }
        RequestKind::Flush => {
            req.noreply = fields.last() == Some(&NOREPLY);
            commit(buf, header_len);
            req.rstate = RequestLifecycle::Parsed;
            return Ok(ParseOutcome::Parsed(req));
        }
        RequestKind::Quit => {
            if fields.len() != 1 {
                return Err(CodecError::Invalid("quit takes no arguments"));
            }
            commit(buf, header_len);
            req.rstate = RequestLifecycle::Parsed;
            return Ok(ParseOutcome::Parsed(req));
        }
        _ if is_set_family(kind) => {}
        _ => unreachable!("classify_command only produces handled kinds"),
    }

    // set/add/replace/append/prepend/cas: <cmd> <key> <flags> <exptime> <bytes> [<cas unique>] [noreply]
    let min_fields = if kind == RequestKind::Cas { 6 } else { 5 };
    let max_fields = min_fields + 1;
    if fields.len() < min_fields || fields.len() > max_fields {
        return Err(CodecError::Invalid("malformed storage command"));
    }
    req.keys.push(view_of(data, base, fields[1]));
    req.flags = parse_u32(fields[2]).ok_or(CodecError::Invalid("malformed flags"))?;
    req.exptime = parse_i64(fields[3]).ok_or(CodecError::Invalid("malformed exptime"))?;
    let nbytes = parse_u32(fields[4]).ok_or(CodecError::Invalid("malformed byte count"))? as usize;

    if kind == RequestKind::Cas {
        req.cas_unique =
            Some(parse_u64(fields[5]).ok_or(CodecError::Invalid("malformed cas token"))?);
    }
    req.noreply = parse_noreply(&fields, min_fields)?;
    req.pstate = ParseState::Val;

    let total_len = header_len + nbytes + 2;
    if data.len() < total_len {
        return Ok(ParseOutcome::Incomplete);
    }
    if &data[header_len + nbytes..total_len] != b"\r\n" {
        return Err(CodecError::Invalid("data block missing trailing CRLF"));
    }
    req.value = Some(ByteView {
        offset: base + header_len,
        len: nbytes,
    });

    commit(buf, total_len);
    req.rstate = RequestLifecycle::Parsed;
    Ok(ParseOutcome::Parsed(req))
}

fn view_of(data: &[u8], base: usize, token: &[u8]) -> ByteView {
    let local_offset = token.as_ptr() as usize - data.as_ptr() as usize;
    ByteView {
        offset: base + local_offset,
        len: token.len(),
    }
}

/// The optional trailing `noreply` token, if present at exactly
/// `fields[expect_at]`.
fn parse_noreply(fields: &[&[u8]], expect_at: usize) -> Result<bool, CodecError> {
    match fields.len().checked_sub(expect_at) {
        None | Some(0) => Ok(false),
        Some(1) if fields[expect_at] == NOREPLY => Ok(true),
        _ => Err(CodecError::Invalid("malformed trailing token")),
    }
}

fn commit(buf: &mut DynBuf, n: usize) {
    buf.advance_read(n);
}

// --- composition -----------------------------------------------------

fn write_line(buf: &mut DynBuf, text: &[u8]) -> Result<(), CodecError> {
    buf.ensure_writable(text.len() + 2)?;
    buf.put_slice(text)?;
    buf.put_slice(b"\r\n")?;
    Ok(())
}

fn write_value(buf: &mut DynBuf, resp: &Response) -> Result<(), CodecError> {
    let header = if resp.cas {
        format!(
            "VALUE {} {} {} {}",
            String::from_utf8_lossy(&resp.key),
            resp.flag,
            resp.value.len(),
            resp.vcas
        )
    } else {
        format!(
            "VALUE {} {} {}",
            String::from_utf8_lossy(&resp.key),
            resp.flag,
            resp.value.len()
        )
    };
    buf.ensure_writable(header.len() + 2 + resp.value.len() + 2)?;
    buf.put_slice(header.as_bytes())?;
    buf.put_slice(b"\r\n")?;
    buf.put_slice(&resp.value)?;
    buf.put_slice(b"\r\n")?;
    Ok(())
}

/// Composes a single [`Response`] into `buf` in the memcached ASCII form.
/// The multi-`VALUE` + trailing `END` shape of a `get`/`gets` reply is built
/// by the dispatch layer calling this once per found key followed once more
/// with a [`ResponseKind::End`] response.
pub fn compose_response(resp: &Response, buf: &mut DynBuf) -> Result<(), CodecError> {
    match resp.kind {
        Some(ResponseKind::Ok) => write_line(buf, b"OK"),
        Some(ResponseKind::Stored) => write_line(buf, b"STORED"),
        Some(ResponseKind::NotStored) => write_line(buf, b"NOT_STORED"),
        Some(ResponseKind::Exists) => write_line(buf, b"EXISTS"),
        Some(ResponseKind::NotFound) => write_line(buf, b"NOT_FOUND"),
        Some(ResponseKind::Deleted) => write_line(buf, b"DELETED"),
        Some(ResponseKind::End) => write_line(buf, b"END"),
        Some(ResponseKind::Value) => write_value(buf, resp),
        Some(ResponseKind::Numeric) => {
            let text = resp.vint.to_string();
            write_line(buf, text.as_bytes())
        }
        Some(ResponseKind::ClientError) => {
            let mut line = Vec::with_capacity(14 + resp.value.len());
            line.extend_from_slice(b"CLIENT_ERROR ");
            line.extend_from_slice(&resp.value);
            write_line(buf, &line)
        }
        Some(ResponseKind::ServerError) => {
            let mut line = Vec::with_capacity(14 + resp.value.len());
            line.extend_from_slice(b"SERVER_ERROR ");
            line.extend_from_slice(&resp.value);
            write_line(buf, &line)
        }
        Some(ResponseKind::Stat) => {
            let mut line = Vec::with_capacity(5 + resp.value.len());
            line.extend_from_slice(b"STAT ");
            line.extend_from_slice(&resp.value);
            write_line(buf, &line)
        }
        None => Result::Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(buf: &mut DynBuf, bytes: &[u8]) {
        buf.put_slice(bytes).unwrap();
    }

    #[test]
    fn parse_get_single_key() {
        let mut buf = DynBuf::create(64, 4096);
        feed(&mut buf, b"get foo\r\n");
        match parse_request(&mut buf).unwrap() {
            ParseOutcome::Parsed(req) => {
                assert_eq!(req.kind, RequestKind::Get);
                assert_eq!(req.keys[0].resolve(&buf), b"foo");
                assert_eq!(buf.readable_size(), 0);
            }
            _ => panic!("expected Parsed"),
        }
    }

    #[test]
    fn parse_mget_style_multikey_get() {
        let mut buf = DynBuf::create(64, 4096);
        feed(&mut buf, b"get foo bar baz\r\n");
        match parse_request(&mut buf).unwrap() {
            ParseOutcome::Parsed(req) => {
                let keys: Vec<_> = req.keys.iter().map(|k| k.resolve(&buf).to_vec()).collect();
                assert_eq!(keys, vec![b"foo".to_vec(), b"bar".to_vec(), b"baz".to_vec()]);
            }
            _ => panic!("expected Parsed"),
        }
    }

    #[test]
    fn parse_set_with_data_block() {
        let mut buf = DynBuf::create(64, 4096);
        feed(&mut buf, b"set foo 7 0 3\r\nXYZ\r\n");
        match parse_request(&mut buf).unwrap() {
            ParseOutcome::Parsed(req) => {
                assert_eq!(req.kind, RequestKind::Set);
                assert_eq!(req.keys[0].resolve(&buf), b"foo");
                assert_eq!(req.flags, 7);
                assert_eq!(req.exptime, 0);
                assert_eq!(req.value.unwrap().resolve(&buf), b"XYZ");
                assert!(!req.noreply);
                assert_eq!(buf.readable_size(), 0);
            }
            _ => panic!("expected Parsed"),
        }
    }

    #[test]
    fn parse_set_noreply() {
        let mut buf = DynBuf::create(64, 4096);
        feed(&mut buf, b"set foo 0 0 3 noreply\r\nXYZ\r\n");
        match parse_request(&mut buf).unwrap() {
            ParseOutcome::Parsed(req) => assert!(req.noreply),
            _ => panic!("expected Parsed"),
        }
    }

    #[test]
    fn parse_cas_with_token() {
        let mut buf = DynBuf::create(64, 4096);
        feed(&mut buf, b"cas foo 0 0 3 909\r\nXYZ\r\n");
        match parse_request(&mut buf).unwrap() {
            ParseOutcome::Parsed(req) => {
                assert_eq!(req.kind, RequestKind::Cas);
                assert_eq!(req.cas_unique, Some(909));
            }
            _ => panic!("expected Parsed"),
        }
    }

    #[test]
    fn incomplete_header_then_incomplete_data_then_complete() {
        let mut buf = DynBuf::create(64, 4096);
        feed(&mut buf, b"set foo 0 0 3");
        let before = buf.read_cursor();
        assert!(matches!(
            parse_request(&mut buf).unwrap(),
            ParseOutcome::Incomplete
        ));
        assert_eq!(buf.read_cursor(), before);

        feed(&mut buf, b"\r\nXY");
        assert!(matches!(
            parse_request(&mut buf).unwrap(),
            ParseOutcome::Incomplete
        ));
        assert_eq!(buf.read_cursor(), before);

        feed(&mut buf, b"Z\r\n");
        match parse_request(&mut buf).unwrap() {
            ParseOutcome::Parsed(req) => assert_eq!(req.value.unwrap().resolve(&buf), b"XYZ"),
            _ => panic!("expected Parsed"),
        }
    }

    #[test]
    fn delete_with_noreply() {
        let mut buf = DynBuf::create(64, 4096);
        feed(&mut buf, b"delete foo noreply\r\n");
        match parse_request(&mut buf).unwrap() {
            ParseOutcome::Parsed(req) => {
                assert_eq!(req.kind, RequestKind::Delete);
                assert!(req.noreply);
            }
            _ => panic!("expected Parsed"),
        }
    }

    #[test]
    fn incr_parses_delta() {
        let mut buf = DynBuf::create(64, 4096);
        feed(&mut buf, b"incr foo 909\r\n");
        match parse_request(&mut buf).unwrap() {
            ParseOutcome::Parsed(req) => {
                assert_eq!(req.kind, RequestKind::Incr);
                assert_eq!(req.delta, Some(909));
            }
            _ => panic!("expected Parsed"),
        }
    }

    #[test]
    fn unknown_command_is_invalid() {
        let mut buf = DynBuf::create(64, 4096);
        feed(&mut buf, b"bogus foo\r\n");
        assert_eq!(
            parse_request(&mut buf),
            Err(CodecError::Invalid("unknown command"))
        );
    }

    #[test]
    fn compose_value_with_cas() {
        let resp = Response::value(b"foo", b"bar", 7, Some(42));
        let mut buf = DynBuf::create(64, 4096);
        compose_response(&resp, &mut buf).unwrap();
        assert_eq!(buf.readable(), b"VALUE foo 7 3 42\r\nbar\r\n");
    }

    #[test]
    fn compose_value_without_cas() {
        let resp = Response::value(b"foo", b"bar", 7, None);
        let mut buf = DynBuf::create(64, 4096);
        compose_response(&resp, &mut buf).unwrap();
        assert_eq!(buf.readable(), b"VALUE foo 7 3\r\nbar\r\n");
    }

    #[test]
    fn compose_stored_and_end() {
        let mut buf = DynBuf::create(64, 4096);
        compose_response(&Response::simple(ResponseKind::Stored), &mut buf).unwrap();
        compose_response(&Response::simple(ResponseKind::End), &mut buf).unwrap();
        assert_eq!(buf.readable(), b"STORED\r\nEND\r\n");
    }

    #[test]
    fn compose_client_error() {
        let resp = Response::client_error(b"bad command line format");
        let mut buf = DynBuf::create(64, 4096);
        compose_response(&resp, &mut buf).unwrap();
        assert_eq!(buf.readable(), b"CLIENT_ERROR bad command line format\r\n");
    }
}
