//! Incremental, zero-copy wire codecs for the two front-end dialects this
//! cache speaks: a RESP-like framing for the Redis-ish front-end
//! ([`redis`]) and the memcached ASCII line protocol ([`memcache`]).
//!
//! Both codecs share the same [`Request`]/[`Response`] structs and the same
//! atomic-framing discipline: a parse that can't complete because the
//! buffer is short leaves the read cursor untouched, and a parse that
//! fails outright (malformed input) does too, so the caller can always
//! recover the exact bytes it started with.

mod error;
mod memcache;
mod redis;
mod request;
mod response;

pub use error::CodecError;
pub use memcache::{compose_response as memcache_compose_response, parse_request as memcache_parse_request};
pub use redis::{
    compose_array_len as redis_compose_array_len, compose_request as redis_compose_request,
    compose_response as redis_compose_response, parse_request as redis_parse_request,
    parse_response as redis_parse_response, ParseOutcome, RespValue,
};
pub use request::{ByteView, ParseState, Request, RequestKind, RequestLifecycle, MAX_BATCH_SIZE};
pub use response::{Response, ResponseKind};
