/*

VM Architecture
===============

Copyright (c) 2020 Dannii Willis
MIT licenced
https://github.com/curiousdannii/ifvms.js

*/

// The pieces of a protected VM that the analysis treats as given: the
// register file, the opcode classification table, the keyed decoder and the
// concrete emulator used to fold computed values.

use std::fmt;
use std::io::Cursor;

use fnv::FnvHashMap;

use super::error::{FoldError, Result};
use super::graph::Instruction;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Register {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    BP,
    SP,
    IP,
    FL,
    K1,
    K2,
    M1,
    M2,
}
use Register::*;

impl Register {
    pub const ALL: [Register; 16] = [R0, R1, R2, R3, R4, R5, R6, R7, BP, SP, IP, FL, K1, K2, M1, M2];

    pub fn from_u8(value: u8) -> Option<Register> {
        Register::ALL.get(value as usize).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            R0 => "R0",
            R1 => "R1",
            R2 => "R2",
            R3 => "R3",
            R4 => "R4",
            R5 => "R5",
            R6 => "R6",
            R7 => "R7",
            BP => "BP",
            SP => "SP",
            IP => "IP",
            FL => "FL",
            K1 => "K1",
            K2 => "K2",
            M1 => "M1",
            M2 => "M2",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Coarse VM-level type of a value
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Object,
    Dword,
    Qword,
}

impl ValueType {
    // Two different kinds only agree on being some object
    pub fn join(self, other: ValueType) -> ValueType {
        if self == other {
            self
        } else {
            ValueType::Object
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlowControl {
    Next,
    Jump,
    Call,
    ConditionalJump,
    Return,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PopBehaviour {
    None,
    Pop1,
    Pop2,
    Variable,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PushBehaviour {
    None,
    Push1,
    Variable,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperandKind {
    None,
    Register,
    ImmediateDword,
    ImmediateQword,
}

impl OperandKind {
    // Encoded width in bytes
    pub fn size(self) -> u32 {
        match self {
            OperandKind::None => 0,
            OperandKind::Register => 1,
            OperandKind::ImmediateDword => 4,
            OperandKind::ImmediateQword => 8,
        }
    }
}

// One row of the opcode classification table
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OpCode {
    pub code: u8,
    pub mnemonic: &'static str,
    pub flow: FlowControl,
    pub pop: PopBehaviour,
    pub push: PushBehaviour,
    pub operand: OperandKind,
    pub value_type: ValueType,
}

impl OpCode {
    // Whether the last popped value is loaded into IP
    pub fn transfers_control(&self) -> bool {
        match self.flow {
            FlowControl::Jump | FlowControl::Call | FlowControl::ConditionalJump => true,
            FlowControl::Next | FlowControl::Return => false,
        }
    }

    pub fn has_variable_arity(&self) -> bool {
        self.pop == PopBehaviour::Variable || self.push == PushBehaviour::Variable
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    None,
    Register(Register),
    Immediate(u64),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Register(register) => write!(f, "{}", register),
            Operand::Immediate(value) => write!(f, "{:#x}", value),
        }
    }
}

// What a variable-arity call consumes and produces, selected at run time
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CallSignature {
    pub name: &'static str,
    pub arguments: usize,
    pub returns: Option<ValueType>,
}

#[derive(Default)]
pub struct InstructionSet {
    opcodes: FnvHashMap<u8, OpCode>,
    calls: FnvHashMap<u64, CallSignature>,
}

impl InstructionSet {
    pub fn new() -> InstructionSet {
        InstructionSet::default()
    }

    pub fn insert(&mut self, opcode: OpCode) {
        self.opcodes.insert(opcode.code, opcode);
    }

    pub fn insert_call(&mut self, selector: u64, signature: CallSignature) {
        self.calls.insert(selector, signature);
    }

    pub fn opcode(&self, code: u8) -> Option<&OpCode> {
        self.opcodes.get(&code)
    }

    pub fn call_signature(&self, selector: u64) -> Option<&CallSignature> {
        self.calls.get(&selector)
    }

    pub fn len(&self) -> usize {
        self.opcodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opcodes.is_empty()
    }
}

// An exported function: where it starts and the key its code is encoded with
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EntryPoint {
    pub offset: u32,
    pub key: u32,
}

pub struct DecodedInstruction {
    pub opcode: OpCode,
    pub operand: Operand,
    pub size: u32,
}

pub trait Decoder {
    // Decode one instruction starting at the image's current position
    fn decode(&self, image: &mut Cursor<Box<[u8]>>, isa: &InstructionSet, key: u32) -> Result<DecodedInstruction>;
}

pub trait FoldEmulator {
    // Replay the sequence concretely and return the value left on top of the stack
    fn fold(&self, sequence: &[&Instruction]) -> std::result::Result<u64, FoldError>;
}
