/*

Reference VM Decoder
====================

Copyright (c) 2020 Dannii Willis
MIT licenced
https://github.com/curiousdannii/ifvms.js

*/

use std::io::Cursor;

use bytes::Buf;

use super::key_mask;
use crate::arch::*;
use crate::error::{Error, Result};

// Every byte is masked with a stream derived from the export key and its own position
#[derive(Copy, Clone, Debug, Default)]
pub struct KeyedDecoder;

impl Decoder for KeyedDecoder {
    // Decode one instruction
    fn decode(&self, image: &mut Cursor<Box<[u8]>>, isa: &InstructionSet, key: u32) -> Result<DecodedInstruction> {

        // Start decoding the instruction
        let addr = image.position() as u32;

        // Opcode definition
        let code = read_byte(image, key)?;
        let opcode = *isa.opcode(code).ok_or(Error::UnknownOpcode {
            offset: addr,
            opcode: code,
        })?;

        // Read the operand
        let operand = match opcode.operand {
            OperandKind::None => Operand::None,
            OperandKind::Register => {
                let var = read_byte(image, key)?;
                match Register::from_u8(var) {
                    Some(register) => Operand::Register(register),
                    None => return Err(Error::InvalidRegister {offset: addr, register: var}),
                }
            },
            OperandKind::ImmediateDword => Operand::Immediate(read_immediate(image, key, 4)?),
            OperandKind::ImmediateQword => Operand::Immediate(read_immediate(image, key, 8)?),
        };

        // Next instruction
        let size = image.position() as u32 - addr;

        Ok(DecodedInstruction {
            opcode,
            operand,
            size,
        })
    }
}

fn read_byte(image: &mut Cursor<Box<[u8]>>, key: u32) -> Result<u8> {
    let position = image.position() as u32;
    if image.remaining() == 0 {
        return Err(Error::OutOfBounds {offset: position});
    }
    Ok(image.get_u8() ^ key_mask(key, position))
}

// Little endian
fn read_immediate(image: &mut Cursor<Box<[u8]>>, key: u32, width: u32) -> Result<u64> {
    let mut value = 0u64;
    for byte in 0..width {
        value |= (read_byte(image, key)? as u64) << (byte * 8);
    }
    Ok(value)
}
