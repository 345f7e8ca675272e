pub mod compress;
pub mod delta;
pub mod vbyte;
pub mod quantize;
