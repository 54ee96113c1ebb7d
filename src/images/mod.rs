pub mod fetch;
pub mod normalize;

pub use fetch::fetch_and_package;
pub use normalize::normalize;
