//! Incremental protocol codec SPI: decoders built on [`DecodingState`]
//! chains, plus the encoder half that turns outbound messages into
//! bytes for the write queue.

pub mod primitives;
pub mod state;

pub use primitives::{
    ConsumeToDelimiterDecodingState, Endianness, FixedLengthDecodingState,
    SingleByteDecodingState, Uint16DecodingState, Uint32DecodingState, Uint64DecodingState,
};
pub use state::{DecodingState, DecodingStateMachine};

use bytes::BytesMut;

use crate::buffer::Buffer;
use crate::error::DecodeError;
use crate::session::Session;

/// Turns bytes read off the wire into protocol messages, one session at
/// a time. A fresh `ProtocolDecoder` instance is attached to each
/// session (see `codec::state::DecodingStateMachine`, which most
/// implementations delegate to internally).
pub trait ProtocolDecoder: Send {
    type Message;

    /// Feeds newly-read bytes to the decoder. Complete messages are
    /// pushed into `out`; partial messages are retained internally
    /// until more bytes arrive.
    fn decode(
        &mut self,
        session: &Session<Self::Message>,
        input: &mut Buffer,
        out: &mut Vec<Self::Message>,
    ) -> Result<(), DecodeError>;

    /// Called once when the session's input stream ends. Decoders with
    /// no trailing state to flush can accept the default no-op.
    fn finish_decode(
        &mut self,
        _session: &Session<Self::Message>,
        _out: &mut Vec<Self::Message>,
    ) -> Result<(), DecodeError> {
        Ok(())
    }

    /// Called once a session's decoder is being torn down, after
    /// `finish_decode`, to release any resources held beyond the
    /// decoder's own fields. Most decoders have nothing to do here.
    fn dispose(&mut self, _session: &Session<Self::Message>) {}
}

/// Turns an outbound message into bytes appended to `out`, ready to be
/// queued on the session's write queue.
pub trait ProtocolEncoder: Send {
    type Message;

    fn encode(&mut self, session: &Session<Self::Message>, message: &Self::Message, out: &mut BytesMut);
}

/// A `ProtocolDecoder` built directly on a [`DecodingStateMachine`],
/// for the common case where no per-session decoder state beyond the
/// machine itself is needed.
pub struct StateMachineDecoder<M> {
    machine: DecodingStateMachine<M>,
}

impl<M> StateMachineDecoder<M> {
    pub fn new(machine: DecodingStateMachine<M>) -> Self {
        StateMachineDecoder { machine }
    }
}

impl<M: Send> ProtocolDecoder for StateMachineDecoder<M> {
    type Message = M;

    fn decode(
        &mut self,
        _session: &Session<M>,
        input: &mut Buffer,
        out: &mut Vec<M>,
    ) -> Result<(), DecodeError> {
        self.machine.decode(input, out)
    }

    fn finish_decode(&mut self, _session: &Session<M>, out: &mut Vec<M>) -> Result<(), DecodeError> {
        self.machine.finish_decode(out)
    }
}
