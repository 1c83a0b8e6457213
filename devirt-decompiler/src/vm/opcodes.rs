/*

Reference VM Opcodes
====================

Copyright (c) 2020 Dannii Willis
MIT licenced
https://github.com/curiousdannii/ifvms.js

*/

use crate::arch::*;
use crate::arch::FlowControl::*;
use crate::arch::ValueType::*;

pub const NOP: u8 = 0x00;
pub const PUSHR_OBJECT: u8 = 0x01;
pub const PUSHR_DWORD: u8 = 0x02;
pub const PUSHR_QWORD: u8 = 0x03;
pub const PUSHI_DWORD: u8 = 0x04;
pub const PUSHI_QWORD: u8 = 0x05;
pub const POP: u8 = 0x06;
pub const ADD_DWORD: u8 = 0x10;
pub const ADD_QWORD: u8 = 0x11;
pub const SUB_DWORD: u8 = 0x12;
pub const MUL_DWORD: u8 = 0x13;
pub const XOR_DWORD: u8 = 0x14;
pub const NOR_DWORD: u8 = 0x15;
pub const SHL_DWORD: u8 = 0x16;
pub const SHR_DWORD: u8 = 0x17;
pub const LIND_DWORD: u8 = 0x20;
pub const SIND_DWORD: u8 = 0x21;
pub const JMP: u8 = 0x30;
pub const JZ: u8 = 0x31;
pub const JNZ: u8 = 0x32;
pub const CALL: u8 = 0x33;
pub const RET: u8 = 0x34;
pub const VCALL: u8 = 0x40;

// VCALL selectors
pub const VCALL_EXIT: u64 = 0;
pub const VCALL_BOX: u64 = 1;
pub const VCALL_UNBOX: u64 = 2;
pub const VCALL_ECALL: u64 = 3;

fn opcode(code: u8, mnemonic: &'static str, flow: FlowControl, pop: PopBehaviour, push: PushBehaviour, operand: OperandKind, value_type: ValueType) -> OpCode {
    OpCode {code, mnemonic, flow, pop, push, operand, value_type}
}

fn simple(code: u8, mnemonic: &'static str) -> OpCode {
    opcode(code, mnemonic, Next, PopBehaviour::None, PushBehaviour::None, OperandKind::None, Object)
}

fn push_register(code: u8, mnemonic: &'static str, value_type: ValueType) -> OpCode {
    opcode(code, mnemonic, Next, PopBehaviour::None, PushBehaviour::Push1, OperandKind::Register, value_type)
}

fn push_immediate(code: u8, mnemonic: &'static str, operand: OperandKind, value_type: ValueType) -> OpCode {
    opcode(code, mnemonic, Next, PopBehaviour::None, PushBehaviour::Push1, operand, value_type)
}

fn pop_register(code: u8, mnemonic: &'static str) -> OpCode {
    opcode(code, mnemonic, Next, PopBehaviour::Pop1, PushBehaviour::None, OperandKind::Register, Object)
}

fn unary(code: u8, mnemonic: &'static str, value_type: ValueType) -> OpCode {
    opcode(code, mnemonic, Next, PopBehaviour::Pop1, PushBehaviour::Push1, OperandKind::None, value_type)
}

fn binary(code: u8, mnemonic: &'static str, value_type: ValueType) -> OpCode {
    opcode(code, mnemonic, Next, PopBehaviour::Pop2, PushBehaviour::Push1, OperandKind::None, value_type)
}

fn store(code: u8, mnemonic: &'static str) -> OpCode {
    opcode(code, mnemonic, Next, PopBehaviour::Pop2, PushBehaviour::None, OperandKind::None, Object)
}

fn branch(code: u8, mnemonic: &'static str, flow: FlowControl, pop: PopBehaviour) -> OpCode {
    opcode(code, mnemonic, flow, pop, PushBehaviour::None, OperandKind::None, Dword)
}

fn end_block(code: u8, mnemonic: &'static str) -> OpCode {
    opcode(code, mnemonic, Return, PopBehaviour::None, PushBehaviour::None, OperandKind::None, Object)
}

fn variable_call(code: u8, mnemonic: &'static str) -> OpCode {
    opcode(code, mnemonic, Next, PopBehaviour::Variable, PushBehaviour::Variable, OperandKind::None, Object)
}

fn signature(name: &'static str, arguments: usize, returns: Option<ValueType>) -> CallSignature {
    CallSignature {name, arguments, returns}
}

pub fn get_opcode_definitions() -> InstructionSet {
    let mut isa = InstructionSet::new();

    // Stack and registers
    /* nop */ isa.insert(simple(NOP, "NOP"));
    /* pushr_object */ isa.insert(push_register(PUSHR_OBJECT, "PUSHR_OBJECT", Object));
    /* pushr_dword */ isa.insert(push_register(PUSHR_DWORD, "PUSHR_DWORD", Dword));
    /* pushr_qword */ isa.insert(push_register(PUSHR_QWORD, "PUSHR_QWORD", Qword));
    /* pushi_dword */ isa.insert(push_immediate(PUSHI_DWORD, "PUSHI_DWORD", OperandKind::ImmediateDword, Dword));
    /* pushi_qword */ isa.insert(push_immediate(PUSHI_QWORD, "PUSHI_QWORD", OperandKind::ImmediateQword, Qword));
    /* pop */ isa.insert(pop_register(POP, "POP"));

    // Arithmetic
    /* add_dword */ isa.insert(binary(ADD_DWORD, "ADD_DWORD", Dword));
    /* add_qword */ isa.insert(binary(ADD_QWORD, "ADD_QWORD", Qword));
    /* sub_dword */ isa.insert(binary(SUB_DWORD, "SUB_DWORD", Dword));
    /* mul_dword */ isa.insert(binary(MUL_DWORD, "MUL_DWORD", Dword));
    /* xor_dword */ isa.insert(binary(XOR_DWORD, "XOR_DWORD", Dword));
    /* nor_dword */ isa.insert(binary(NOR_DWORD, "NOR_DWORD", Dword));
    /* shl_dword */ isa.insert(binary(SHL_DWORD, "SHL_DWORD", Dword));
    /* shr_dword */ isa.insert(binary(SHR_DWORD, "SHR_DWORD", Dword));

    // Memory
    /* lind_dword */ isa.insert(unary(LIND_DWORD, "LIND_DWORD", Dword));
    /* sind_dword */ isa.insert(store(SIND_DWORD, "SIND_DWORD"));

    // Control flow, the target is always on top of the stack
    /* jmp */ isa.insert(branch(JMP, "JMP", Jump, PopBehaviour::Pop1));
    /* jz */ isa.insert(branch(JZ, "JZ", ConditionalJump, PopBehaviour::Pop2));
    /* jnz */ isa.insert(branch(JNZ, "JNZ", ConditionalJump, PopBehaviour::Pop2));
    /* call */ isa.insert(branch(CALL, "CALL", Call, PopBehaviour::Pop1));
    /* ret */ isa.insert(end_block(RET, "RET"));

    // VM services, selected by the value on top of the stack
    /* vcall */ isa.insert(variable_call(VCALL, "VCALL"));
    /* exit */ isa.insert_call(VCALL_EXIT, signature("exit", 0, None));
    /* box */ isa.insert_call(VCALL_BOX, signature("box", 1, Some(Object)));
    /* unbox */ isa.insert_call(VCALL_UNBOX, signature("unbox", 1, Some(Qword)));
    /* ecall */ isa.insert_call(VCALL_ECALL, signature("ecall", 2, Some(Object)));

    isa
}
