//! Glue / Dispatch (§4.6): parsed `Request` → `ItemStore` operation →
//! composed `Response`, one function per wire dialect. Both functions
//! return whether the connection should close (`QUIT`) after the response
//! (if any) is flushed.

use cache_buf::DynBuf;
use cache_proto::{
    memcache_compose_response, redis_compose_array_len, redis_compose_response, Request,
    RequestKind, Response, ResponseKind,
};
use cache_store::StoreError;

use crate::context::CoreContext;
use crate::error::CoreError;

const OVERSIZED_MSG: &[u8] = b"object too large for cache";
const NOMEM_MSG: &[u8] = b"out of memory storing object";
const NON_NUMERIC_MSG: &[u8] = b"cannot increment or decrement non-numeric value";

fn store_err_response(ctx: &mut CoreContext, err: StoreError) -> Response {
    match err {
        StoreError::Oversized => Response::client_error(OVERSIZED_MSG),
        StoreError::NoMem => {
            ctx.stats.slab.oom.incr();
            log::warn!("store out of memory, rejecting insert");
            Response::server_error(NOMEM_MSG)
        }
    }
}

fn parse_ascii_u64(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Applies an INCR/DECR delta with the saturation rule from §9: wraps on
/// overflow, clamps to zero on underflow.
fn apply_delta(old: u64, delta: u64, incr: bool) -> u64 {
    if incr {
        old.wrapping_add(delta)
    } else {
        old.saturating_sub(delta)
    }
}

/// Shared INCR/DECR handling for both front-ends (§4.6): fetch, validate
/// the stored value is numeric, apply the delta, and write the new ASCII
/// representation back in place.
fn incr_decr(ctx: &mut CoreContext, key: &[u8], delta: u64, incr: bool, now: i64) -> Response {
    let Some(item) = ctx.store.get(key, now) else {
        ctx.stats.item.misses.incr();
        return Response::simple(ResponseKind::NotFound);
    };
    let Some(old) = parse_ascii_u64(&item.value) else {
        return Response::client_error(NON_NUMERIC_MSG);
    };
    let new = apply_delta(old, delta, incr);
    let text = new.to_string();
    if ctx.store.update(key, text.as_bytes()) {
        Response::numeric(ResponseKind::Numeric, new)
    } else {
        Response::simple(ResponseKind::NotFound)
    }
}

fn expect_key<'a>(req: &'a Request, src: &'a DynBuf) -> &'a [u8] {
    req.key()
        .expect("parser guarantees a key for this command")
        .resolve(src)
}

fn expect_value<'a>(req: &'a Request, src: &'a DynBuf) -> &'a [u8] {
    req.value
        .expect("parser guarantees a value for this command")
        .resolve(src)
}

/// Dispatches one RESP-dialect request, writing its response into `out`.
/// Returns `true` if the connection should close (`QUIT`); `QUIT` writes
/// no response of its own.
pub fn dispatch_redis(
    req: &Request,
    src: &DynBuf,
    ctx: &mut CoreContext,
    now: i64,
    out: &mut DynBuf,
) -> Result<bool, CoreError> {
    match req.kind {
        RequestKind::Get => {
            let key = expect_key(req, src);
            let resp = match ctx.store.get(key, now) {
                Some(item) => {
                    ctx.stats.item.hits.incr();
                    Response::value(&item.key, &item.value, item.dataflag, None)
                }
                None => {
                    ctx.stats.item.misses.incr();
                    Response::simple(ResponseKind::NotFound)
                }
            };
            redis_compose_response(&resp, out)?;
            Ok(false)
        }
        RequestKind::Mget => {
            redis_compose_array_len(out, req.keys.len())?;
            for key_view in &req.keys {
                let key = key_view.resolve(src);
                let resp = match ctx.store.get(key, now) {
                    Some(item) => {
                        ctx.stats.item.hits.incr();
                        Response::value(&item.key, &item.value, item.dataflag, None)
                    }
                    None => {
                        ctx.stats.item.misses.incr();
                        Response::simple(ResponseKind::NotFound)
                    }
                };
                redis_compose_response(&resp, out)?;
            }
            Ok(false)
        }
        RequestKind::Set => {
            let key = expect_key(req, src);
            let value = expect_value(req, src);
            let resp = match ctx.store.insert(key, value, 0, 0, now) {
                Ok(()) => {
                    ctx.stats.item.inserts.incr();
                    Response::simple(ResponseKind::Stored)
                }
                Err(e) => store_err_response(ctx, e),
            };
            redis_compose_response(&resp, out)?;
            Ok(false)
        }
        RequestKind::Delete => {
            let key = expect_key(req, src);
            let resp = if ctx.store.delete(key) {
                ctx.stats.item.deletes.incr();
                Response::simple(ResponseKind::Deleted)
            } else {
                Response::simple(ResponseKind::NotFound)
            };
            redis_compose_response(&resp, out)?;
            Ok(false)
        }
        RequestKind::Incr | RequestKind::Decr => {
            let key = expect_key(req, src).to_vec();
            let delta = req.delta.expect("parser guarantees a delta");
            let resp = incr_decr(ctx, &key, delta, req.kind == RequestKind::Incr, now);
            redis_compose_response(&resp, out)?;
            Ok(false)
        }
        RequestKind::Flush => {
            ctx.store.flush(now);
            redis_compose_response(&Response::simple(ResponseKind::Ok), out)?;
            Ok(false)
        }
        RequestKind::Quit => Ok(true),
        _ => unreachable!("the redis parser never produces a memcache-only kind"),
    }
}

/// Writes `resp` to `out` unless `noreply` suppresses it entirely (the
/// memcache front-end's `noreply` semantics, §4.2/§4.6).
fn emit(out: &mut DynBuf, noreply: bool, resp: &Response) -> Result<(), CoreError> {
    if noreply {
        return Ok(());
    }
    memcache_compose_response(resp, out)?;
    Ok(())
}

/// Dispatches one memcache-dialect request, writing its response(s) into
/// `out`. Returns `true` if the connection should close (`QUIT`).
pub fn dispatch_memcache(
    req: &Request,
    src: &DynBuf,
    ctx: &mut CoreContext,
    now: i64,
    out: &mut DynBuf,
) -> Result<bool, CoreError> {
    match req.kind {
        RequestKind::Get | RequestKind::Gets => {
            let with_cas = req.kind == RequestKind::Gets;
            for key_view in &req.keys {
                let key = key_view.resolve(src);
                match ctx.store.get(key, now) {
                    Some(item) => {
                        ctx.stats.item.hits.incr();
                        let cas = if with_cas { Some(item.cas) } else { None };
                        let resp = Response::value(&item.key, &item.value, item.dataflag, cas);
                        memcache_compose_response(&resp, out)?;
                    }
                    None => ctx.stats.item.misses.incr(),
                }
            }
            memcache_compose_response(&Response::simple(ResponseKind::End), out)?;
            Ok(false)
        }
        RequestKind::Set => {
            let key = expect_key(req, src);
            let value = expect_value(req, src);
            let resp = match ctx.store.insert(key, value, req.flags, req.exptime, now) {
                Ok(()) => {
                    ctx.stats.item.inserts.incr();
                    Response::simple(ResponseKind::Stored)
                }
                Err(e) => store_err_response(ctx, e),
            };
            emit(out, req.noreply, &resp)?;
            Ok(false)
        }
        RequestKind::Add => {
            let key = expect_key(req, src);
            let value = expect_value(req, src);
            let resp = if ctx.store.get(key, now).is_some() {
                Response::simple(ResponseKind::NotStored)
            } else {
                match ctx.store.insert(key, value, req.flags, req.exptime, now) {
                    Ok(()) => {
                        ctx.stats.item.inserts.incr();
                        Response::simple(ResponseKind::Stored)
                    }
                    Err(e) => store_err_response(ctx, e),
                }
            };
            emit(out, req.noreply, &resp)?;
            Ok(false)
        }
        RequestKind::Replace => {
            let key = expect_key(req, src);
            let value = expect_value(req, src);
            let resp = if ctx.store.get(key, now).is_none() {
                Response::simple(ResponseKind::NotStored)
            } else {
                match ctx.store.insert(key, value, req.flags, req.exptime, now) {
                    Ok(()) => {
                        ctx.stats.item.inserts.incr();
                        Response::simple(ResponseKind::Stored)
                    }
                    Err(e) => store_err_response(ctx, e),
                }
            };
            emit(out, req.noreply, &resp)?;
            Ok(false)
        }
        RequestKind::Append | RequestKind::Prepend => {
            let append = req.kind == RequestKind::Append;
            let key = expect_key(req, src);
            let extra = expect_value(req, src);
            let resp = match ctx.store.annex(key, extra, append, now) {
                None => Response::simple(ResponseKind::NotStored),
                Some(Ok(())) => Response::simple(ResponseKind::Stored),
                Some(Err(e)) => store_err_response(ctx, e),
            };
            emit(out, req.noreply, &resp)?;
            Ok(false)
        }
        RequestKind::Cas => {
            let key = expect_key(req, src);
            let value = expect_value(req, src);
            let token = req.cas_unique.expect("parser guarantees a cas token for CAS");
            let resp = match ctx.store.get(key, now) {
                None => Response::simple(ResponseKind::NotFound),
                Some(item) if item.cas != token => Response::simple(ResponseKind::Exists),
                Some(_) => match ctx.store.insert(key, value, req.flags, req.exptime, now) {
                    Ok(()) => {
                        ctx.stats.item.inserts.incr();
                        Response::simple(ResponseKind::Stored)
                    }
                    Err(e) => store_err_response(ctx, e),
                },
            };
            emit(out, req.noreply, &resp)?;
            Ok(false)
        }
        RequestKind::Delete => {
            let key = expect_key(req, src);
            let resp = if ctx.store.delete(key) {
                ctx.stats.item.deletes.incr();
                Response::simple(ResponseKind::Deleted)
            } else {
                Response::simple(ResponseKind::NotFound)
            };
            emit(out, req.noreply, &resp)?;
            Ok(false)
        }
        RequestKind::Incr | RequestKind::Decr => {
            let key = expect_key(req, src).to_vec();
            let delta = req.delta.expect("parser guarantees a delta");
            let resp = incr_decr(ctx, &key, delta, req.kind == RequestKind::Incr, now);
            emit(out, req.noreply, &resp)?;
            Ok(false)
        }
        RequestKind::Flush => {
            ctx.store.flush(now);
            emit(out, req.noreply, &Response::simple(ResponseKind::Ok))?;
            Ok(false)
        }
        RequestKind::Quit => Ok(true),
        RequestKind::Mget => unreachable!("the memcache parser never produces Mget"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use cache_proto::{memcache_parse_request, redis_parse_request, ParseOutcome};

    fn ctx() -> CoreContext {
        CoreContext::new(Config {
            slab_size: 4096,
            ..Config::default()
        })
    }

    fn feed(buf: &mut DynBuf, bytes: &[u8]) {
        buf.put_slice(bytes).unwrap();
    }

    #[test]
    fn redis_set_then_get_round_trips_through_dispatch() {
        let mut c = ctx();
        let mut inbuf = DynBuf::create(64, 4096);
        feed(&mut inbuf, b"*3\r\n$3\r\nset\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");
        let req = match redis_parse_request(&mut inbuf).unwrap() {
            ParseOutcome::Parsed(r) => r,
            _ => panic!("expected Parsed"),
        };
        let mut out = DynBuf::create(64, 4096);
        dispatch_redis(&req, &inbuf, &mut c, 100, &mut out).unwrap();
        assert_eq!(out.readable(), b"+OK\r\n");

        let mut inbuf2 = DynBuf::create(64, 4096);
        feed(&mut inbuf2, b"*2\r\n$3\r\nget\r\n$3\r\nfoo\r\n");
        let req2 = match redis_parse_request(&mut inbuf2).unwrap() {
            ParseOutcome::Parsed(r) => r,
            _ => panic!("expected Parsed"),
        };
        let mut out2 = DynBuf::create(64, 4096);
        dispatch_redis(&req2, &inbuf2, &mut c, 100, &mut out2).unwrap();
        assert_eq!(out2.readable(), b"$3\r\nbar\r\n");
    }

    #[test]
    fn redis_mget_wraps_results_in_an_array() {
        let mut c = ctx();
        c.store.insert(b"a", b"1", 0, 0, 100).unwrap();
        let mut inbuf = DynBuf::create(64, 4096);
        feed(&mut inbuf, b"*3\r\n$4\r\nmget\r\n$1\r\na\r\n$1\r\nb\r\n");
        let req = match redis_parse_request(&mut inbuf).unwrap() {
            ParseOutcome::Parsed(r) => r,
            _ => panic!("expected Parsed"),
        };
        let mut out = DynBuf::create(64, 4096);
        dispatch_redis(&req, &inbuf, &mut c, 100, &mut out).unwrap();
        assert_eq!(out.readable(), b"*2\r\n$1\r\n1\r\n$-1\r\n");
    }

    #[test]
    fn memcache_add_then_add_again_is_not_stored() {
        let mut c = ctx();
        let mut inbuf = DynBuf::create(64, 4096);
        feed(&mut inbuf, b"add foo 0 0 3\r\nbar\r\n");
        let req = match memcache_parse_request(&mut inbuf).unwrap() {
            ParseOutcome::Parsed(r) => r,
            _ => panic!("expected Parsed"),
        };
        let mut out = DynBuf::create(64, 4096);
        dispatch_memcache(&req, &inbuf, &mut c, 100, &mut out).unwrap();
        assert_eq!(out.readable(), b"STORED\r\n");

        let mut inbuf2 = DynBuf::create(64, 4096);
        feed(&mut inbuf2, b"add foo 0 0 3\r\nbaz\r\n");
        let req2 = match memcache_parse_request(&mut inbuf2).unwrap() {
            ParseOutcome::Parsed(r) => r,
            _ => panic!("expected Parsed"),
        };
        let mut out2 = DynBuf::create(64, 4096);
        dispatch_memcache(&req2, &inbuf2, &mut c, 100, &mut out2).unwrap();
        assert_eq!(out2.readable(), b"NOT_STORED\r\n");
    }

    #[test]
    fn memcache_cas_mismatch_reports_exists() {
        let mut c = ctx();
        c.store.insert(b"foo", b"bar", 0, 0, 100).unwrap();
        let mut inbuf = DynBuf::create(64, 4096);
        feed(&mut inbuf, b"cas foo 0 0 3 999999\r\nbaz\r\n");
        let req = match memcache_parse_request(&mut inbuf).unwrap() {
            ParseOutcome::Parsed(r) => r,
            _ => panic!("expected Parsed"),
        };
        let mut out = DynBuf::create(64, 4096);
        dispatch_memcache(&req, &inbuf, &mut c, 100, &mut out).unwrap();
        assert_eq!(out.readable(), b"EXISTS\r\n");
    }

    #[test]
    fn memcache_noreply_suppresses_response() {
        let mut c = ctx();
        let mut inbuf = DynBuf::create(64, 4096);
        feed(&mut inbuf, b"set foo 0 0 3 noreply\r\nbar\r\n");
        let req = match memcache_parse_request(&mut inbuf).unwrap() {
            ParseOutcome::Parsed(r) => r,
            _ => panic!("expected Parsed"),
        };
        let mut out = DynBuf::create(64, 4096);
        dispatch_memcache(&req, &inbuf, &mut c, 100, &mut out).unwrap();
        assert_eq!(out.readable_size(), 0);
        assert!(c.store.get(b"foo", 100).is_some());
    }

    #[test]
    fn incr_saturates_on_underflow_and_wraps_on_overflow() {
        let mut c = ctx();
        c.store.insert(b"n", b"5", 0, 0, 100).unwrap();
        let mut inbuf = DynBuf::create(64, 4096);
        feed(&mut inbuf, b"decr n 10\r\n");
        let req = match memcache_parse_request(&mut inbuf).unwrap() {
            ParseOutcome::Parsed(r) => r,
            _ => panic!("expected Parsed"),
        };
        let mut out = DynBuf::create(64, 4096);
        dispatch_memcache(&req, &inbuf, &mut c, 100, &mut out).unwrap();
        assert_eq!(out.readable(), b"0\r\n");
    }

    #[test]
    fn incr_on_non_numeric_value_is_a_client_error() {
        let mut c = ctx();
        c.store.insert(b"n", b"not-a-number", 0, 0, 100).unwrap();
        let mut inbuf = DynBuf::create(64, 4096);
        feed(&mut inbuf, b"incr n 1\r\n");
        let req = match memcache_parse_request(&mut inbuf).unwrap() {
            ParseOutcome::Parsed(r) => r,
            _ => panic!("expected Parsed"),
        };
        let mut out = DynBuf::create(64, 4096);
        dispatch_memcache(&req, &inbuf, &mut c, 100, &mut out).unwrap();
        assert_eq!(
            out.readable(),
            b"CLIENT_ERROR cannot increment or decrement non-numeric value\r\n"
        );
    }

    #[test]
    fn redis_quit_closes_without_a_response() {
        let mut c = ctx();
        let mut inbuf = DynBuf::create(64, 4096);
        feed(&mut inbuf, b"*1\r\n$4\r\nquit\r\n");
        let req = match redis_parse_request(&mut inbuf).unwrap() {
            ParseOutcome::Parsed(r) => r,
            _ => panic!("expected Parsed"),
        };
        let mut out = DynBuf::create(64, 4096);
        let close = dispatch_redis(&req, &inbuf, &mut c, 100, &mut out).unwrap();
        assert!(close);
        assert_eq!(out.readable_size(), 0);
    }
}
