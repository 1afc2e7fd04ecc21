//! The wire schema and draft data model shared between the director and its
//! clients. Everything on the socket is a JSON [`message::Message`] envelope;
//! the payload formats, card model and round timing live here so both sides
//! stay consistent.

use std::time::Duration;

pub mod cards;
pub mod message;
pub mod timer;

/// The buffer size for the director's event queue.
pub const CHANNEL_BUFFER_SIZE: usize = 256;

/// The buffer size of a client's outbound mailbox. A client whose mailbox
/// fills up gets disconnected instead of stalling the director.
pub const CLIENT_MAILBOX_SIZE: usize = 100;

/// Time allowed to write a single message to the peer.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Time allowed to read the next frame from the peer. Any inbound frame
/// (pongs included) refreshes the deadline.
pub const PONG_WAIT: Duration = Duration::from_secs(60);

/// Period between keep-alive pings. Must stay below [`PONG_WAIT`].
pub const PING_PERIOD: Duration = Duration::from_secs(PONG_WAIT.as_secs() * 9 / 10);

/// Maximum frame size accepted from a peer.
pub const MAX_MESSAGE_SIZE: usize = 512;

/// Name of the session cookie that lets a dropped client resume its seat.
pub const DRAFT_COOKIE_NAME: &str = "pwr9_draft";

/// Lifetime of the session cookie. A client that stays away longer loses the
/// claim on its seat.
pub const COOKIE_MAX_AGE: Duration = Duration::from_secs(30 * 60);
