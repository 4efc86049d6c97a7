//! G-code tokenizing and command decoding

pub mod command;
pub mod dispatcher;
pub mod line;

pub use command::Command;
pub use dispatcher::CommandTrie;
pub use line::GcodeLine;
