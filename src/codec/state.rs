//! The `DecodingState` substrate: the composable incremental parser
//! primitives a `DecodingStateMachine` chains together.
//!
//! A state consumes `self` on every transition (`self: Box<Self>`), so
//! "the next state" is whatever `Box` comes back out — including the
//! very same allocation if the state decided it needs to run again
//! (e.g. it didn't have enough bytes yet). That reuse is exactly what
//! lets the machine detect "no progress": if the returned box is the
//! same allocation *and* the input's position didn't move, the decode
//! call produced nothing and the loop must stop rather than spin.

use crate::buffer::Buffer;
use crate::error::DecodeError;

/// One node of an incremental, byte-level parser.
///
/// `decode` may consume zero or more bytes from `input`, push zero or
/// more items into `out` (used by states that directly produce final
/// output, which is rare — most primitives instead push their product
/// into the state machine's child-product list, see
/// [`DecodingStateMachine`]), and returns the next state to run, or
/// `Ok(None)` to signal that this was the last state in the machine's
/// composition.
pub trait DecodingState: Send {
    type Item;

    fn decode(
        self: Box<Self>,
        input: &mut Buffer,
        out: &mut Vec<Self::Item>,
    ) -> Result<Option<Box<dyn DecodingState<Item = Self::Item>>>, DecodeError>;

    /// Called when the input stream ends (session closing, or the
    /// enclosing machine is being torn down) while this state is still
    /// current. The default fails with "unexpected end of input";
    /// states that can legitimately complete on EOF (rare) override
    /// this.
    fn finish_decode(
        self: Box<Self>,
        _out: &mut Vec<Self::Item>,
    ) -> Result<Option<Box<dyn DecodingState<Item = Self::Item>>>, DecodeError> {
        Err(DecodeError::UnexpectedEof(
            "no further bytes are available to this decoding state".into(),
        ))
    }
}

type BoxState<M> = Box<dyn DecodingState<Item = M>>;

/// Drives a composed chain of [`DecodingState`]s: obtains a fresh chain
/// from `init` the first time it's needed, feeds it bytes across
/// however many `decode` calls it takes to complete one message, then
/// hands the accumulated child products to `finish` to build the final
/// output and resets itself for the next message.
///
/// `M` is the item type shared by every primitive state in the chain
/// (their intermediate products) as well as the final output type
/// `finish` produces — for most protocols this is simply the raw bytes
/// a sub-field decoded to, with `finish` doing the final assembly.
pub struct DecodingStateMachine<M> {
    current: Option<BoxState<M>>,
    child_products: Vec<M>,
    init: Box<dyn FnMut() -> BoxState<M> + Send>,
    finish: Box<dyn FnMut(Vec<M>, &mut Vec<M>) -> Result<(), DecodeError> + Send>,
    initialized: bool,
}

impl<M> DecodingStateMachine<M> {
    /// `init` builds a fresh initial state for one message; `finish` is
    /// called once that chain completes (some state returned `None`),
    /// with the child products accumulated along the way, and must push
    /// the final message(s) into `out`.
    pub fn new(
        init: impl FnMut() -> BoxState<M> + Send + 'static,
        finish: impl FnMut(Vec<M>, &mut Vec<M>) -> Result<(), DecodeError> + Send + 'static,
    ) -> Self {
        DecodingStateMachine {
            current: None,
            child_products: Vec::new(),
            init: Box::new(init),
            finish: Box::new(finish),
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Feeds `input` to the current chain, possibly running it through
    /// several states, until either a complete message has been
    /// produced into `out`, the input is exhausted, or a state makes no
    /// progress (in which case the partially-consumed chain is
    /// preserved for the next call).
    pub fn decode(&mut self, input: &mut Buffer, out: &mut Vec<M>) -> Result<(), DecodeError> {
        if self.current.is_none() {
            self.current = Some((self.init)());
            self.initialized = true;
        }

        loop {
            let pos_before = input.position();
            let state = self.current.take().expect("checked above");
            let addr_before = state_address(&state);

            match state.decode(input, &mut self.child_products) {
                Ok(Some(next)) => {
                    let addr_after = state_address(&next);
                    let pos_after = input.position();
                    let no_progress = pos_after == pos_before && addr_after == addr_before;
                    self.current = Some(next);
                    if no_progress || pos_after == input.limit() {
                        return Ok(());
                    }
                    // else: more bytes remain and the state changed or
                    // consumed something — keep looping within this call.
                }
                Ok(None) => {
                    self.complete(out)?;
                    return Ok(());
                }
                Err(e) => {
                    self.current = None;
                    self.reset();
                    return Err(e);
                }
            }
        }
    }

    /// Finalises decoding when the input stream ends while a chain is
    /// still in progress (session closing). Mirrors `decode`'s
    /// termination handling.
    pub fn finish_decode(&mut self, out: &mut Vec<M>) -> Result<(), DecodeError> {
        let Some(state) = self.current.take() else {
            return Ok(());
        };
        match state.finish_decode(&mut self.child_products) {
            Ok(_) => self.complete(out),
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    fn complete(&mut self, out: &mut Vec<M>) -> Result<(), DecodeError> {
        let products = std::mem::take(&mut self.child_products);
        let result = (self.finish)(products, out);
        self.reset();
        result
    }

    /// Clears child products and marks the machine uninitialized so the
    /// next `decode` call starts a fresh chain via `init` — the
    /// `destroy`-then-ready-for-`init`-again cycle the spec requires.
    fn reset(&mut self) {
        self.child_products.clear();
        self.current = None;
        self.initialized = false;
    }
}

fn state_address<M>(state: &BoxState<M>) -> *const () {
    let reference: &(dyn DecodingState<Item = M>) = state.as_ref();
    reference as *const _ as *const ()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::primitives::{FixedLengthDecodingState, Uint32DecodingState};

    fn length_prefixed_machine() -> DecodingStateMachine<Vec<u8>> {
        DecodingStateMachine::new(
            || {
                Box::new(Uint32DecodingState::big_endian(|len, out| {
                    out.push(len.to_be_bytes().to_vec());
                    Ok(Some(Box::new(FixedLengthDecodingState::new(
                        len as usize,
                        |body, out| {
                            out.push(body);
                            Ok(None)
                        },
                    ))
                        as Box<dyn DecodingState<Item = Vec<u8>>>))
                }))
            },
            |mut children, out| {
                // children[0] is the 4-byte length prefix, children[1] is the body.
                let body = children.pop().expect("body product");
                out.push(body);
                Ok(())
            },
        )
    }

    #[test]
    fn decodes_one_frame_delivered_whole() {
        let mut machine = length_prefixed_machine();
        let mut input = Buffer::wrap(vec![0, 0, 0, 5, b'h', b'e', b'l', b'l', b'o']);
        let mut out = Vec::new();
        machine.decode(&mut input, &mut out).unwrap();
        assert_eq!(out, vec![b"hello".to_vec()]);
    }

    #[test]
    fn decodes_fragmented_one_byte_at_a_time() {
        let mut machine = length_prefixed_machine();
        let bytes = [0u8, 0, 0, 5, b'h', b'e', b'l', b'l', b'o'];
        let mut out = Vec::new();
        for &byte in &bytes {
            let mut input = Buffer::wrap(vec![byte]);
            machine.decode(&mut input, &mut out).unwrap();
        }
        assert_eq!(out, vec![b"hello".to_vec()]);
    }

    #[test]
    fn resets_and_decodes_next_message() {
        let mut machine = length_prefixed_machine();
        let mut input = Buffer::wrap(vec![
            0, 0, 0, 5, b'h', b'e', b'l', b'l', b'o', 0, 0, 0, 3, b'a', b'b', b'c',
        ]);
        let mut out = Vec::new();
        machine.decode(&mut input, &mut out).unwrap();
        assert!(!machine.is_initialized());
        machine.decode(&mut input, &mut out).unwrap();
        assert_eq!(out, vec![b"hello".to_vec(), b"abc".to_vec()]);
    }
}
