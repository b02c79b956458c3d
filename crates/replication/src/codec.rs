//! Frame codec for the replication stream.
//!
//! Each frame is a 4-byte big-endian length followed by one JSON-encoded
//! [`Transaction`], the same document the log stores per line.

use std::borrow::Borrow;

use bytes::{Bytes, BytesMut};
use geostore_core::Transaction;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::error::ReplicationError;

/// Largest frame accepted from a peer.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Length-delimited JSON transaction codec.
#[derive(Debug)]
pub struct TransactionCodec {
    inner: LengthDelimitedCodec,
}

impl TransactionCodec {
    /// Codec with the default frame limit.
    pub fn new() -> Self {
        TransactionCodec {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(MAX_FRAME_LENGTH)
                .new_codec(),
        }
    }
}

impl Default for TransactionCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TransactionCodec {
    type Item = Transaction;
    type Error = ReplicationError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Transaction>, ReplicationError> {
        match self.inner.decode(src)? {
            Some(frame) => serde_json::from_slice(&frame)
                .map(Some)
                .map_err(ReplicationError::Decode),
            None => Ok(None),
        }
    }
}

impl<T: Borrow<Transaction>> Encoder<T> for TransactionCodec {
    type Error = ReplicationError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), ReplicationError> {
        let json = serde_json::to_vec(item.borrow()).map_err(ReplicationError::Encode)?;
        self.inner.encode(Bytes::from(json), dst)?;
        Ok(())
    }
}
