/*

Reference VM Emulator
=====================

Copyright (c) 2020 Dannii Willis
MIT licenced
https://github.com/curiousdannii/ifvms.js

*/

use super::opcodes::*;
use crate::arch::*;
use crate::error::FoldError;
use crate::graph::Instruction;

const DWORD_MASK: u64 = 0xFFFF_FFFF;

// Concrete machine state for replaying the producers of a value
#[derive(Clone, Debug, Default)]
pub struct Emulator {
    registers: [u64; 16],
    stack: Vec<u64>,
}

impl Emulator {
    pub fn new() -> Emulator {
        Emulator::default()
    }

    // Registers read by a replayed sequence start with these values
    pub fn with_registers(presets: &[(Register, u64)]) -> Emulator {
        let mut emulator = Emulator::new();
        for &(register, value) in presets {
            emulator.registers[register.index()] = value;
        }
        emulator
    }

    pub fn register(&self, register: Register) -> u64 {
        self.registers[register.index()]
    }

    pub fn stack(&self) -> &[u64] {
        &self.stack
    }

    pub fn execute(&mut self, instruction: &Instruction) -> Result<(), FoldError> {
        let offset = instruction.offset;
        self.registers[Register::IP.index()] = instruction.next() as u64;
        match (instruction.opcode.code, instruction.operand) {
            (NOP, _) => {}
            (PUSHR_OBJECT, Operand::Register(register)) | (PUSHR_QWORD, Operand::Register(register)) => {
                self.stack.push(self.registers[register.index()]);
            }
            (PUSHR_DWORD, Operand::Register(register)) => {
                self.stack.push(self.registers[register.index()] & DWORD_MASK);
            }
            (PUSHI_DWORD, Operand::Immediate(value)) => self.stack.push(value & DWORD_MASK),
            (PUSHI_QWORD, Operand::Immediate(value)) => self.stack.push(value),
            (POP, Operand::Register(register)) => {
                let value = self.pop(offset)?;
                self.registers[register.index()] = value;
            }
            (ADD_DWORD, _) => self.binary(offset, |a, b| a.wrapping_add(b) & DWORD_MASK)?,
            (ADD_QWORD, _) => self.binary(offset, |a, b| a.wrapping_add(b))?,
            (SUB_DWORD, _) => self.binary(offset, |a, b| a.wrapping_sub(b) & DWORD_MASK)?,
            (MUL_DWORD, _) => self.binary(offset, |a, b| a.wrapping_mul(b) & DWORD_MASK)?,
            (XOR_DWORD, _) => self.binary(offset, |a, b| (a ^ b) & DWORD_MASK)?,
            (NOR_DWORD, _) => self.binary(offset, |a, b| !(a | b) & DWORD_MASK)?,
            (SHL_DWORD, _) => self.binary(offset, |a, b| ((a as u32).wrapping_shl(b as u32)) as u64)?,
            (SHR_DWORD, _) => self.binary(offset, |a, b| ((a as u32).wrapping_shr(b as u32)) as u64)?,
            _ => {
                return Err(FoldError::Unsupported {
                    offset,
                    mnemonic: instruction.opcode.mnemonic,
                })
            }
        }
        Ok(())
    }

    fn pop(&mut self, offset: u32) -> Result<u64, FoldError> {
        self.stack.pop().ok_or(FoldError::StackUnderflow {offset})
    }

    // The deeper operand is the left hand side
    fn binary<F: Fn(u64, u64) -> u64>(&mut self, offset: u32, op: F) -> Result<(), FoldError> {
        let right = self.pop(offset)?;
        let left = self.pop(offset)?;
        self.stack.push(op(left, right));
        Ok(())
    }
}

impl FoldEmulator for Emulator {
    fn fold(&self, sequence: &[&Instruction]) -> Result<u64, FoldError> {
        let mut emulator = self.clone();
        emulator.stack.clear();
        for instruction in sequence {
            emulator.execute(instruction)?;
        }
        emulator.stack.last().copied().ok_or(FoldError::EmptyStack)
    }
}
