pub mod header;
mod mbc;

pub use self::header::{CartridgeHeader, MbcKind};
pub use self::mbc::Cartridge;
