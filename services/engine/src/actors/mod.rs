//! Actor framework for the engine.
//!
//! The engine confines every mutation of cache, tracker and job state to a
//! single actor so that the lookup-then-mutate sequences of a load never
//! interleave.
//!
//! ## Design Principles
//!
//! - **One actor owns the state**: the engine actor owns the active tracker,
//!   memory cache, job registry and job pool
//! - **Serial processing**: messages are handled one at a time, in mailbox order
//! - **Marshalled completion**: worker tasks never touch engine state; they post
//!   their outcome back to the mailbox

mod framework;

pub use framework::{
    mailbox, spawn, Actor, ActorContext, ActorError, ActorHandle, ActorRef, Mailbox, Message,
};
