//! Trial generation and the files it is delivered in.

pub mod assembler;
pub mod chunker;
pub mod slots;
pub mod trial;
pub mod writer;
