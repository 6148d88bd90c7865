pub mod chapter;
pub mod page;
