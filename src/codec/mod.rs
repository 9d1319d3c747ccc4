pub mod reference;
pub mod wire;

pub use reference::ReferenceCodec;
pub use wire::{from_wire, to_wire};
