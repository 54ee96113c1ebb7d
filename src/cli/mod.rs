pub mod backend;
pub mod save;
