//! Dialect selection for upgraded sockets.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::codec::Dialect;
use crate::conversation::Conversation;
use crate::hub::Hub;
use crate::request::UpgradeRequest;

/// Picks the wire dialect from `Sec-WebSocket-Version`.
///
/// | Version | Dialect |
/// |---------|---------|
/// | 7..=12 | `hybi-07-12` |
/// | 13..=16 | `hybi-16` |
/// | 17 and later | `hybi-17` |
/// | missing, unparsable or below 7 | `legacy` |
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolSelector;

impl ProtocolSelector {
    /// Create the conversation for an upgraded socket.
    ///
    /// Nothing is read or written here; binding starts when the returned
    /// conversation is run.
    pub fn select<S>(
        hub: &Arc<Hub>,
        socket: S,
        request: UpgradeRequest,
        head: Bytes,
    ) -> Conversation<S>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let dialect = Dialect::from_request(&request);
        debug!(
            dialect = %dialect,
            version = ?request.version(),
            url = %request.url(),
            "dialect selected"
        );
        Conversation::new(hub, socket, request, head, dialect)
    }
}
