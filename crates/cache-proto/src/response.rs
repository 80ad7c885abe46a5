//! Composed response structure shared by both wire dialects.

/// Response discriminant (§3.3). Owns its byte payloads rather than viewing
/// an inbound buffer: response bytes come from item-store data (which lives
/// in slab memory, not a connection's `DynBuf`) or from literal text, so
/// there is nothing to avoid copying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Ok,
    End,
    Stored,
    Exists,
    Deleted,
    NotFound,
    NotStored,
    Value,
    Numeric,
    ClientError,
    ServerError,
    Stat,
}

/// A fully composed response, ready to be serialized by either codec.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    pub kind: Option<ResponseKind>,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub flag: u32,
    pub vint: u64,
    pub cas: bool,
    pub vcas: u64,
    /// Discriminates whether `vint` (numeric reply) or `value` (string
    /// reply) is the meaningful payload for `Numeric`-adjacent kinds.
    pub num: bool,
}

impl Response {
    pub fn simple(kind: ResponseKind) -> Self {
        Response {
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn numeric(kind: ResponseKind, vint: u64) -> Self {
        Response {
            kind: Some(kind),
            vint,
            num: true,
            ..Default::default()
        }
    }

    pub fn value(key: &[u8], value: &[u8], flag: u32, cas: Option<u64>) -> Self {
        Response {
            kind: Some(ResponseKind::Value),
            key: key.to_vec(),
            value: value.to_vec(),
            flag,
            cas: cas.is_some(),
            vcas: cas.unwrap_or(0),
            ..Default::default()
        }
    }

    pub fn client_error(msg: &[u8]) -> Self {
        Response {
            kind: Some(ResponseKind::ClientError),
            value: msg.to_vec(),
            ..Default::default()
        }
    }

    pub fn server_error(msg: &[u8]) -> Self {
        Response {
            kind: Some(ResponseKind::ServerError),
            value: msg.to_vec(),
            ..Default::default()
        }
    }
}
