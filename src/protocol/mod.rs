pub mod codec;
pub mod command;

pub use codec::{decode, encode, has_frame, read_frame, receive, send, take_frame, write_frame};
pub use command::{Command, Envelope, Reply};
