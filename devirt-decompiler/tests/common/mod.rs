/*

Test helpers
============

Copyright (c) 2020 Dannii Willis
MIT licenced
https://github.com/curiousdannii/ifvms.js

*/

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::rc::Rc;

use devirt_decompiler::arch::{EntryPoint, InstructionSet, Operand, Register};
use devirt_decompiler::logging::{Logger, Severity};
use devirt_decompiler::vm::opcodes::get_opcode_definitions;
use devirt_decompiler::vm::{Assembler, Emulator, KeyedDecoder};
use devirt_decompiler::{Disassembler, InstructionGraph, Result};

pub const KEY: u32 = 0x5EED_1234;

pub fn imm(value: u64) -> Operand {
    Operand::Immediate(value)
}

pub fn reg(register: Register) -> Operand {
    Operand::Register(register)
}

pub const NONE: Operand = Operand::None;

pub fn assemble(isa: &InstructionSet, key: u32, program: &[(u8, Operand)]) -> Box<[u8]> {
    let mut asm = Assembler::new(isa, key);
    for &(code, operand) in program {
        asm.emit(code, operand).unwrap();
    }
    asm.finish()
}

// Assemble with the reference opcode table and disassemble from offset 0
pub fn disassemble(program: &[(u8, Operand)]) -> Result<InstructionGraph> {
    disassemble_with(program, Emulator::new(), Rc::new(RecordingLogger::default()))
}

pub fn disassemble_with(program: &[(u8, Operand)], emulator: Emulator, logger: Rc<dyn Logger>) -> Result<InstructionGraph> {
    let isa = get_opcode_definitions();
    let image = assemble(&isa, KEY, program);
    Disassembler::new(image, &isa, KeyedDecoder, emulator)
        .with_logger(logger)
        .disassemble(&[EntryPoint {offset: 0, key: KEY}])
}

// Offsets reachable from the entries by following recorded successors
pub fn reachable(graph: &InstructionGraph, entries: &[u32]) -> BTreeSet<u32> {
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<u32> = entries.iter().copied().collect();
    while let Some(offset) = queue.pop_front() {
        if !seen.insert(offset) {
            continue;
        }
        if let Some(instruction) = graph.get(offset) {
            queue.extend(instruction.successors());
        }
    }
    seen
}

pub fn set(offsets: &[u32]) -> BTreeSet<u32> {
    offsets.iter().copied().collect()
}

#[derive(Default)]
pub struct RecordingLogger {
    pub messages: RefCell<Vec<(Severity, String)>>,
}

impl RecordingLogger {
    pub fn at(&self, severity: Severity) -> Vec<String> {
        self.messages
            .borrow()
            .iter()
            .filter(|(level, _)| *level == severity)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, severity: Severity, message: fmt::Arguments<'_>) {
        self.messages.borrow_mut().push((severity, message.to_string()));
    }
}
