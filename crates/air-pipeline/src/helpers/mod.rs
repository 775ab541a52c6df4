// Internal helper modules — not re-exported from lib.rs.

pub mod letterbox;
pub mod seek;
pub mod yuv;