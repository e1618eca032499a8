pub mod cors;
pub mod owner;

pub use owner::OwnerId;
