//! The required primitive `DecodingState`s: single byte, fixed-width
//! integers, fixed-length byte runs, and consume-to-delimiter.
//!
//! Each primitive accumulates bytes across as many `decode` calls as it
//! takes for enough input to arrive (arbitrary fragmentation), then
//! hands its product to a caller-supplied continuation that decides
//! what state runs next — this is the Rust stand-in for the source
//! hierarchy's abstract-subclass-per-protocol-field pattern: a closure
//! instead of a subclass.

use crate::buffer::Buffer;
use crate::codec::state::DecodingState;
use crate::error::DecodeError;

type BoxState<M> = Box<dyn DecodingState<Item = M>>;
type Continuation<M, V> =
    Box<dyn FnOnce(V, &mut Vec<M>) -> Result<Option<BoxState<M>>, DecodeError> + Send>;

/// Consumes exactly one byte, then hands it to `next`.
pub struct SingleByteDecodingState<M> {
    next: Continuation<M, u8>,
}

impl<M: Send + 'static> SingleByteDecodingState<M> {
    pub fn new(
        next: impl FnOnce(u8, &mut Vec<M>) -> Result<Option<BoxState<M>>, DecodeError>
            + Send
            + 'static,
    ) -> Self {
        SingleByteDecodingState {
            next: Box::new(next),
        }
    }
}

impl<M: Send + 'static> DecodingState for SingleByteDecodingState<M> {
    type Item = M;

    fn decode(
        self: Box<Self>,
        input: &mut Buffer,
        out: &mut Vec<M>,
    ) -> Result<Option<BoxState<M>>, DecodeError> {
        if !input.has_remaining() {
            return Ok(Some(self));
        }
        let byte = input.get_u8();
        (self.next)(byte, out)
    }

    fn finish_decode(
        self: Box<Self>,
        _out: &mut Vec<M>,
    ) -> Result<Option<BoxState<M>>, DecodeError> {
        Err(DecodeError::UnexpectedEof(
            "unexpected end of session while waiting for a single byte".into(),
        ))
    }
}

/// Accumulates exactly `needed` bytes (across as many calls as it
/// takes), then hands the collected run to `next`.
pub struct FixedLengthDecodingState<M> {
    needed: usize,
    collected: Vec<u8>,
    next: Continuation<M, Vec<u8>>,
}

impl<M: Send + 'static> FixedLengthDecodingState<M> {
    pub fn new(
        needed: usize,
        next: impl FnOnce(Vec<u8>, &mut Vec<M>) -> Result<Option<BoxState<M>>, DecodeError>
            + Send
            + 'static,
    ) -> Self {
        FixedLengthDecodingState {
            needed,
            collected: Vec::with_capacity(needed),
            next: Box::new(next),
        }
    }
}

impl<M: Send + 'static> DecodingState for FixedLengthDecodingState<M> {
    type Item = M;

    fn decode(
        mut self: Box<Self>,
        input: &mut Buffer,
        out: &mut Vec<M>,
    ) -> Result<Option<BoxState<M>>, DecodeError> {
        let missing = self.needed - self.collected.len();
        if missing > 0 && input.has_remaining() {
            let take = missing.min(input.remaining());
            let start = self.collected.len();
            self.collected.resize(start + take, 0);
            input.get_bytes(&mut self.collected[start..start + take]);
        }
        if self.collected.len() < self.needed {
            return Ok(Some(self));
        }
        let collected = std::mem::take(&mut self.collected);
        (self.next)(collected, out)
    }

    fn finish_decode(
        self: Box<Self>,
        _out: &mut Vec<M>,
    ) -> Result<Option<BoxState<M>>, DecodeError> {
        Err(DecodeError::UnexpectedEof(format!(
            "needed {} bytes, only {} were available before the stream ended",
            self.needed,
            self.collected.len()
        )))
    }
}

/// Byte order for the fixed-width integer primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

macro_rules! integer_decoding_state {
    ($name:ident, $int:ty, $width:expr) => {
        #[doc = concat!("Reads a ", stringify!($width), "-byte ", stringify!($int), ", then hands the parsed value to `next`.")]
        pub struct $name<M> {
            endianness: Endianness,
            collected: Vec<u8>,
            next: Continuation<M, $int>,
        }

        impl<M: Send + 'static> $name<M> {
            fn new(
                endianness: Endianness,
                next: impl FnOnce(
                        $int,
                        &mut Vec<M>,
                    ) -> Result<Option<BoxState<M>>, DecodeError>
                    + Send
                    + 'static,
            ) -> Self {
                $name {
                    endianness,
                    collected: Vec::with_capacity($width),
                    next: Box::new(next),
                }
            }

            pub fn big_endian(
                next: impl FnOnce(
                        $int,
                        &mut Vec<M>,
                    ) -> Result<Option<BoxState<M>>, DecodeError>
                    + Send
                    + 'static,
            ) -> Self {
                Self::new(Endianness::Big, next)
            }

            pub fn little_endian(
                next: impl FnOnce(
                        $int,
                        &mut Vec<M>,
                    ) -> Result<Option<BoxState<M>>, DecodeError>
                    + Send
                    + 'static,
            ) -> Self {
                Self::new(Endianness::Little, next)
            }
        }

        impl<M: Send + 'static> DecodingState for $name<M> {
            type Item = M;

            fn decode(
                mut self: Box<Self>,
                input: &mut Buffer,
                out: &mut Vec<M>,
            ) -> Result<Option<BoxState<M>>, DecodeError> {
                let missing = $width - self.collected.len();
                if missing > 0 && input.has_remaining() {
                    let take = missing.min(input.remaining());
                    let start = self.collected.len();
                    self.collected.resize(start + take, 0);
                    input.get_bytes(&mut self.collected[start..start + take]);
                }
                if self.collected.len() < $width {
                    return Ok(Some(self));
                }
                let mut array = [0u8; $width];
                array.copy_from_slice(&self.collected);
                let value = match self.endianness {
                    Endianness::Big => <$int>::from_be_bytes(array),
                    Endianness::Little => <$int>::from_le_bytes(array),
                };
                (self.next)(value, out)
            }

            fn finish_decode(
                self: Box<Self>,
                _out: &mut Vec<M>,
            ) -> Result<Option<BoxState<M>>, DecodeError> {
                Err(DecodeError::UnexpectedEof(format!(
                    "needed {} bytes for a {}, only {} were available before the stream ended",
                    $width,
                    stringify!($int),
                    self.collected.len()
                )))
            }
        }
    };
}

integer_decoding_state!(Uint16DecodingState, u16, 2);
integer_decoding_state!(Uint32DecodingState, u32, 4);
integer_decoding_state!(Uint64DecodingState, u64, 8);

/// Accumulates bytes until `delimiter` is seen, then hands the
/// collected run (excluding the delimiter) to `next`.
pub struct ConsumeToDelimiterDecodingState<M> {
    delimiter: u8,
    collected: Vec<u8>,
    next: Continuation<M, Vec<u8>>,
}

impl<M: Send + 'static> ConsumeToDelimiterDecodingState<M> {
    pub fn new(
        delimiter: u8,
        next: impl FnOnce(Vec<u8>, &mut Vec<M>) -> Result<Option<BoxState<M>>, DecodeError>
            + Send
            + 'static,
    ) -> Self {
        ConsumeToDelimiterDecodingState {
            delimiter,
            collected: Vec::new(),
            next: Box::new(next),
        }
    }
}

impl<M: Send + 'static> DecodingState for ConsumeToDelimiterDecodingState<M> {
    type Item = M;

    fn decode(
        mut self: Box<Self>,
        input: &mut Buffer,
        out: &mut Vec<M>,
    ) -> Result<Option<BoxState<M>>, DecodeError> {
        while input.has_remaining() {
            let byte = input.get_u8();
            if byte == self.delimiter {
                let collected = std::mem::take(&mut self.collected);
                return (self.next)(collected, out);
            }
            self.collected.push(byte);
        }
        Ok(Some(self))
    }

    fn finish_decode(
        self: Box<Self>,
        _out: &mut Vec<M>,
    ) -> Result<Option<BoxState<M>>, DecodeError> {
        Err(DecodeError::UnexpectedEof(format!(
            "delimiter {:#04x} not seen before the stream ended, {} bytes buffered",
            self.delimiter,
            self.collected.len()
        )))
    }
}
