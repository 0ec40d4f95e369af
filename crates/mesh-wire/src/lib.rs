// Copyright (c) 2024 Omerta Mesh Contributors

//! Framing of control frames and encrypted datagrams: the tagged [`Frame`]
//! enum carried as plaintext, the outer [`envelope::EnvelopeHeader`], and
//! the errors both can produce.

pub mod envelope;
pub mod error;
pub mod frame;

pub use envelope::EnvelopeHeader;
pub use error::WireError;
pub use frame::{Frame, GossipEntry, RelayDenyReason, TimeSyncHint, MAX_CHANNEL_NAME_LEN};
