//! Re-export public algorithms.

pub mod communicator;
pub mod reduction;
pub mod wire;

pub use communicator::{Communicator, NoComm, ThreadComm};
pub use reduction::ReduceOp;
