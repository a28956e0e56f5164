//! A reactive, non-blocking network I/O framework built on a sharded
//! selector-loop runtime: one [`SelectorProcessor`](processor::SelectorProcessor)
//! per worker thread, each driving its own set of [`Session`](session::Session)s
//! through a bidirectional [`FilterChain`](filter::FilterChain) in front
//! of an application [`IoHandler`](handler::IoHandler).
//!
//! Protocol framing is expressed incrementally via [`DecodingState`](codec::DecodingState)
//! chains composed into a [`DecodingStateMachine`](codec::DecodingStateMachine),
//! so a decoder never needs to know how a message got fragmented across
//! reads. Every asynchronous outcome — connect, write, close — resolves
//! through a one-shot, thread-blocking [`Future`](future::Future), not
//! `std::future::Future`: nothing in this crate requires an executor.
//!
//! ```no_run
//! use std::sync::Arc;
//! use reactor_net::codec::{DecodingStateMachine, StateMachineDecoder, Uint32DecodingState, FixedLengthDecodingState, DecodingState};
//! use reactor_net::handler::IoHandler;
//! use reactor_net::service::IoServer;
//!
//! struct Echo;
//! impl IoHandler for Echo {
//!     type Message = Vec<u8>;
//!     fn message_received(&self, session: &reactor_net::session::Session<Vec<u8>>, message: Vec<u8>) {
//!         let _ = session.write(message);
//!     }
//! }
//!
//! # fn build() -> std::io::Result<()> {
//! let server = IoServer::<Vec<u8>>::new(2)?;
//! server.bind(
//!     "127.0.0.1:0".parse().unwrap(),
//!     Arc::new(Echo),
//!     Vec::new(),
//!     || StateMachineDecoder::new(DecodingStateMachine::new(
//!         || Box::new(Uint32DecodingState::big_endian(|len, out| {
//!             out.push(len.to_be_bytes().to_vec());
//!             Ok(Some(Box::new(FixedLengthDecodingState::new(len as usize, |body, out| {
//!                 out.push(body);
//!                 Ok(None)
//!             })) as Box<dyn DecodingState<Item = Vec<u8>>>))
//!         })),
//!         |mut children, out| {
//!             out.push(children.pop().expect("body"));
//!             Ok(())
//!         },
//!     )),
//!     LengthPrefixedEncoder,
//! )?;
//! # Ok(())
//! # }
//!
//! struct LengthPrefixedEncoder;
//! impl reactor_net::codec::ProtocolEncoder for LengthPrefixedEncoder {
//!     type Message = Vec<u8>;
//!     fn encode(&mut self, _session: &reactor_net::session::Session<Vec<u8>>, message: &Vec<u8>, out: &mut bytes::BytesMut) {
//!         out.extend_from_slice(&(message.len() as u32).to_be_bytes());
//!         out.extend_from_slice(message);
//!     }
//! }
//! ```

pub mod attribute;
pub mod buffer;
pub mod codec;
pub mod error;
pub mod filter;
pub mod future;
pub mod handler;
pub mod processor;
pub mod service;
pub mod session;
pub mod strategy;
mod write_queue;

pub use error::{DecodeError, Error, Result};
