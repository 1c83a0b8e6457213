/*

Reference VM
============

Copyright (c) 2020 Dannii Willis
MIT licenced
https://github.com/curiousdannii/ifvms.js

*/

// A small keyed stack VM implementing the decoder and fold emulator interfaces.
// It is what the analysis is exercised against.

pub mod assembler;
pub mod decoder;
pub mod emulator;
pub mod opcodes;

pub use assembler::Assembler;
pub use decoder::KeyedDecoder;
pub use emulator::Emulator;

// The byte mask for one position of code encoded under a key
pub fn key_mask(key: u32, position: u32) -> u8 {
    let mixed = key ^ position.wrapping_mul(0x9E37_79B9);
    (mixed ^ (mixed >> 8) ^ (mixed >> 16) ^ (mixed >> 24)) as u8
}
