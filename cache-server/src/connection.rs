//! Per-connection task (§5 ambient plumbing): owns one inbound/outbound
//! `DynBuf` pair and loops read → codec → dispatch → write, matching the
//! single-threaded-cooperative model the core assumes — `Incomplete` is the
//! only suspension point, supplied here by `tokio`'s scheduler instead of
//! the reference implementation's hand-rolled reactor.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context};
use cache_buf::DynBuf;
use cache_core::{dispatch_memcache, dispatch_redis, CodecStats};
use cache_proto::{memcache_parse_request, redis_parse_request, CodecError, ParseOutcome};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::server::SharedContext;

/// Which front-end dialect a connection speaks, sniffed from its first
/// byte: RESP frames always open with `*`, the memcache ASCII dialect
/// never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Redis,
    Memcache,
}

fn sniff(byte: u8) -> Dialect {
    if byte == b'*' {
        Dialect::Redis
    } else {
        Dialect::Memcache
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

const READ_CHUNK: usize = 4096;

pub async fn handle_connection(mut socket: TcpStream, ctx: SharedContext) -> anyhow::Result<()> {
    let (buf_init_size, buf_max_size) = {
        let locked = ctx.lock().await;
        (locked.config.buf_init_size, locked.config.buf_max_size())
    };
    let mut inbuf = DynBuf::create(buf_init_size, buf_max_size);
    let mut outbuf = DynBuf::create(buf_init_size, buf_max_size);

    loop {
        inbuf.ensure_writable(READ_CHUNK)?;
        let n = socket
            .read(inbuf.writable_mut())
            .await
            .context("read from socket failed")?;
        if n == 0 {
            return Ok(());
        }
        inbuf.advance_write(n);
        {
            let locked = ctx.lock().await;
            locked.stats.server.bytes_in.add(n as u64);
        }

        loop {
            if inbuf.readable_size() == 0 {
                break;
            }
            let dialect = sniff(inbuf.readable()[0]);
            let now = now_secs();

            let close = match dialect {
                Dialect::Redis => match redis_parse_request(&mut inbuf) {
                    Ok(ParseOutcome::Incomplete) => {
                        ctx.lock().await.stats.codec_redis.parse_incomplete.incr();
                        break;
                    }
                    Ok(ParseOutcome::Parsed(req)) => {
                        let mut locked = ctx.lock().await;
                        locked.stats.codec_redis.requests_parsed.incr();
                        dispatch_redis(&req, &inbuf, &mut *locked, now, &mut outbuf)?
                    }
                    Err(e) => {
                        record_parse_error(&ctx, Dialect::Redis, &e).await;
                        outbuf.put_slice(b"-ERR protocol error\r\n")?;
                        flush(&mut socket, &mut outbuf, &ctx).await?;
                        return Err(anyhow!("redis codec error: {e}"));
                    }
                },
                Dialect::Memcache => match memcache_parse_request(&mut inbuf) {
                    Ok(ParseOutcome::Incomplete) => {
                        ctx.lock().await.stats.codec_memcache.parse_incomplete.incr();
                        break;
                    }
                    Ok(ParseOutcome::Parsed(req)) => {
                        let mut locked = ctx.lock().await;
                        locked.stats.codec_memcache.requests_parsed.incr();
                        dispatch_memcache(&req, &inbuf, &mut *locked, now, &mut outbuf)?
                    }
                    Err(e) => {
                        record_parse_error(&ctx, Dialect::Memcache, &e).await;
                        outbuf.put_slice(b"ERROR\r\n")?;
                        flush(&mut socket, &mut outbuf, &ctx).await?;
                        return Err(anyhow!("memcache codec error: {e}"));
                    }
                },
            };

            if outbuf.readable_size() > 0 {
                flush(&mut socket, &mut outbuf, &ctx).await?;
            }
            if close {
                return Ok(());
            }
        }

        inbuf.compact();
    }
}

async fn record_parse_error(ctx: &SharedContext, dialect: Dialect, err: &CodecError) {
    let locked = ctx.lock().await;
    let stats: &CodecStats = match dialect {
        Dialect::Redis => &locked.stats.codec_redis,
        Dialect::Memcache => &locked.stats.codec_memcache,
    };
    match err {
        CodecError::Overflow => stats.parse_overflow.incr(),
        CodecError::Invalid(_) | CodecError::BufOverflow(_) => stats.parse_invalid.incr(),
    }
}

async fn flush(socket: &mut TcpStream, outbuf: &mut DynBuf, ctx: &SharedContext) -> anyhow::Result<()> {
    let n = outbuf.readable_size();
    socket
        .write_all(outbuf.readable())
        .await
        .context("write to socket failed")?;
    outbuf.reset();
    let locked = ctx.lock().await;
    locked.stats.server.bytes_out.add(n as u64);
    Ok(())
}
