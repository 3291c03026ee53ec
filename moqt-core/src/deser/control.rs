use crate::coding::{Decode, DecodeError, Encode};
use crate::message::Message;
use bytes::{Buf, BytesMut};

/// Drives `ReadingType -> ReadingLength -> ReadingBody -> ReadingType ...`
/// over a control stream's accumulated bytes, delivering each fully-parsed
/// [`Message`] to `handler`.
///
/// `Message::decode` already implements the whole type+length+body read as
/// one peek-then-commit step (it never consumes on `DecodeError::More`), so
/// this driver just loops calling it until the buffer runs dry.
pub struct ControlDeserializer<F: FnMut(Message)> {
    buf: BytesMut,
    handler: F,
}

impl<F: FnMut(Message)> ControlDeserializer<F> {
    pub fn new(handler: F) -> Self {
        Self {
            buf: BytesMut::new(),
            handler,
        }
    }

    /// Feeds newly-received bytes in. Returns `Err` only for a fatal
    /// condition (unknown message type, framing mismatch); the stream must
    /// be closed in that case. `Ok` may still have delivered zero or more
    /// messages to the handler before returning.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        self.buf.extend_from_slice(bytes);

        loop {
            let mut cursor = &self.buf[..];
            let before = cursor.remaining();

            match Message::decode(&mut cursor) {
                Ok(msg) => {
                    let consumed = before - cursor.remaining();
                    self.buf.advance(consumed);
                    (self.handler)(msg);
                }
                Err(DecodeError::More(_)) => return Ok(()),
                Err(e) => {
                    log::trace!(
                        "control stream decode failed: {e}, buffer = {}",
                        crate::coding::hex_dump(&self.buf, 64)
                    );
                    return Err(e);
                }
            }
        }
    }

    /// Bytes buffered but not yet consumed into a complete message.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Serializes a [`Message`] the way a peer writing to the control stream
/// would: exactly the bytes `ControlDeserializer` expects to read back.
pub fn encode_control_message(msg: &Message) -> Result<BytesMut, crate::coding::EncodeError> {
    let mut buf = BytesMut::new();
    msg.encode(&mut buf)?;
    Ok(buf)
}
