/*

Reference VM Assembler
======================

Copyright (c) 2020 Dannii Willis
MIT licenced
https://github.com/curiousdannii/ifvms.js

*/

use bytes::BufMut;

use super::key_mask;
use crate::arch::*;
use crate::error::{Error, Result};

// Encodes instructions the way KeyedDecoder reads them
pub struct Assembler<'a> {
    isa: &'a InstructionSet,
    key: u32,
    code: Vec<u8>,
}

impl<'a> Assembler<'a> {
    pub fn new(isa: &'a InstructionSet, key: u32) -> Assembler<'a> {
        Assembler {
            isa,
            key,
            code: Vec::new(),
        }
    }

    // Code emitted from here on is encoded under a different export key
    pub fn set_key(&mut self, key: u32) {
        self.key = key;
    }

    pub fn position(&self) -> u32 {
        self.code.len() as u32
    }

    // Returns the offset of the new instruction
    pub fn emit(&mut self, code: u8, operand: Operand) -> Result<u32> {
        let offset = self.position();
        let opcode = *self.isa.opcode(code).ok_or(Error::UnknownOpcode {offset, opcode: code})?;
        let bytes = operand_bytes(offset, &opcode, operand)?;
        self.put(code);
        for byte in bytes {
            self.put(byte);
        }
        Ok(offset)
    }

    // Rewrite the operand of an already emitted instruction, for forward jumps
    pub fn patch(&mut self, offset: u32, operand: Operand) -> Result<()> {
        let position = offset as usize;
        let encoded = match self.code.get(position) {
            Some(&byte) => byte,
            None => return Err(Error::OutOfBounds {offset}),
        };
        let code = encoded ^ key_mask(self.key, offset);
        let opcode = *self.isa.opcode(code).ok_or(Error::UnknownOpcode {offset, opcode: code})?;
        let bytes = operand_bytes(offset, &opcode, operand)?;
        if position + 1 + bytes.len() > self.code.len() {
            return Err(Error::OutOfBounds {offset});
        }
        for (index, byte) in bytes.into_iter().enumerate() {
            let at = position + 1 + index;
            self.code[at] = byte ^ key_mask(self.key, at as u32);
        }
        Ok(())
    }

    pub fn finish(self) -> Box<[u8]> {
        self.code.into_boxed_slice()
    }

    fn put(&mut self, byte: u8) {
        let mask = key_mask(self.key, self.position());
        self.code.put_u8(byte ^ mask);
    }
}

fn operand_bytes(offset: u32, opcode: &OpCode, operand: Operand) -> Result<Vec<u8>> {
    match (opcode.operand, operand) {
        (OperandKind::None, Operand::None) => Ok(Vec::new()),
        (OperandKind::Register, Operand::Register(register)) => Ok(vec![register.index() as u8]),
        (OperandKind::ImmediateDword, Operand::Immediate(value)) => Ok((value as u32).to_le_bytes().to_vec()),
        (OperandKind::ImmediateQword, Operand::Immediate(value)) => Ok(value.to_le_bytes().to_vec()),
        _ => Err(Error::OperandMismatch {offset}),
    }
}
