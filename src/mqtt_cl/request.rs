use crate::mqtt_cl::packet::Publish;
use crate::mqtt_cl::token::Token;

/// Work handed from [`AsyncClient`](crate::mqtt_cl::AsyncClient) to its session task.
///
/// The token travels with the request and is completed by the session.
pub(crate) enum Request {
    Publish { token: Token, packet: Publish },
    Disconnect { token: Token },
}

impl Request {
    pub(crate) fn token(&self) -> &Token {
        match self {
            Request::Publish { token, .. } | Request::Disconnect { token } => token,
        }
    }
}
