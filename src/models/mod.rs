pub mod note;
pub mod page;

pub use note::{Item, NewNote};
pub use page::PageResult;
