//! Independent and project agnostic libraries
//!
//! Any of the submodules in this module could be extracted into their own crate. They only
//! depend on the transport abstraction from [`communication::transport`] and carry no knowledge
//! about a concrete messaging system.

pub mod communication;
