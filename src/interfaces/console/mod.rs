//! Console transport: a CSV command script in, reply lines out.

pub mod command_reader;
pub mod replies;
pub mod session;
