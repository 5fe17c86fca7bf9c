//! Wire protocol between the session and the store: JSON commands out, JSON
//! pages back.

pub mod command;
pub mod error;
pub mod response;

pub use command::{build, Action, Command, PAGE_LIMIT};
pub use error::{CommandError, DecodeError};
pub use response::{check_ack, parse, parse_page};
