/*

AST tests
=========

Copyright (c) 2020 Dannii Willis
MIT licenced
https://github.com/curiousdannii/ifvms.js

*/

mod common;

use std::rc::Rc;

use common::*;
use devirt_decompiler::arch::{Register::*, ValueType};
use devirt_decompiler::ast::{Expression, ExpressionSite, Statement, VariableId};
use devirt_decompiler::vm::opcodes::*;
use devirt_decompiler::vm::Emulator;
use devirt_decompiler::{AstBuilder, CompilationUnit, Error, InstructionGraph, Severity};

fn build(graph: &InstructionGraph) -> CompilationUnit {
    AstBuilder::new(graph).build(0).unwrap()
}

fn assigned(unit: &CompilationUnit, statement: usize) -> &str {
    match &unit.statements[statement] {
        Statement::Assignment {variable, ..} => &unit.variables.get(*variable).unwrap().name,
        Statement::Expression(expression) => panic!("expected an assignment, got {:?}", expression),
    }
}

fn read_of(expression: &Expression) -> VariableId {
    match expression {
        Expression::Variable(read) => read.variable,
        other => panic!("expected a variable read, got {:?}", other),
    }
}

#[test]
fn registers_are_predeclared() {
    let graph = disassemble(&[(RET, NONE)]).unwrap();
    let unit = build(&graph);
    assert_eq!(unit.variables.len(), 16);
    assert_eq!(unit.variables.iter().next().unwrap().name, "R0");
    assert_eq!(unit.variables.by_name("M2").unwrap().value_type, ValueType::Object);
    assert_eq!(unit.statements.len(), 1);
}

#[test]
fn shared_producer_gets_one_variable() {
    let graph = disassemble(&[
        /* 00 */ (PUSHI_DWORD, imm(5)),
        /* 05 */ (POP, reg(R0)),
        /* 07 */ (PUSHR_DWORD, reg(R0)),
        /* 09 */ (POP, reg(R1)),
        /* 11 */ (RET, NONE),
    ])
    .unwrap();
    let unit = build(&graph);

    assert_eq!(unit.variables.len(), 17);
    let variable = unit.variables.by_name("v_0005_0").unwrap();
    let readers: Vec<_> = variable.readers().iter().copied().collect();
    assert_eq!(
        readers,
        vec![
            ExpressionSite {offset: 5, slot: 0},
            ExpressionSite {offset: 9, slot: 0},
        ]
    );
    assert_eq!(assigned(&unit, 0), "v_0005_0");

    let id = unit.variables.id("v_0005_0").unwrap();
    assert_eq!(read_of(&unit.statements[1].expression().arguments()[0]), id);
    assert_eq!(read_of(&unit.statements[3].expression().arguments()[0]), id);
}

#[test]
fn single_use_is_inlined_and_register_binds_materialize() {
    let graph = disassemble(&[
        /* 00 */ (PUSHI_DWORD, imm(3)),
        /* 05 */ (LIND_DWORD, NONE),
        /* 06 */ (POP, reg(R0)),
        /* 08 */ (RET, NONE),
    ])
    .unwrap();
    let unit = build(&graph);

    // The load feeds a register, so it is stored even though it is read once
    assert_eq!(unit.variables.len(), 17);
    assert!(unit.variables.by_name("v_0005_0").is_none());
    assert_eq!(unit.statements.len(), 3);
    assert_eq!(assigned(&unit, 0), "v_0006_0");

    let load = unit.statements[0].expression();
    assert_eq!(load.offset(), Some(5));
    assert_eq!(load.arguments().len(), 1);
    assert_eq!(load.arguments()[0].offset(), Some(0));
    assert!(load.arguments()[0].arguments().is_empty());

    assert_eq!(
        unit.to_string(),
        "/* 0005/LIND_DWORD */ v_0006_0=LIND_DWORD(PUSHI_DWORD(0x3));\n\
         /* 0006/POP */ POP(R0,v_0006_0);\n\
         /* 0008/RET */ RET();\n"
    );
}

#[test]
fn linear_chain_keeps_offset_order() {
    let graph = disassemble(&[
        /* 00 */ (PUSHR_DWORD, reg(R0)),
        /* 02 */ (PUSHR_DWORD, reg(R1)),
        /* 04 */ (ADD_DWORD, NONE),
        /* 05 */ (RET, NONE),
    ])
    .unwrap();
    let unit = build(&graph);

    let offsets: Vec<_> = unit.statements.iter().map(|statement| statement.expression().offset()).collect();
    assert_eq!(offsets, vec![Some(0), Some(2), Some(4), Some(5)]);

    let add = unit.statements[2].expression();
    assert_eq!(add.arguments().len(), 2);
    assert_eq!(read_of(&add.arguments()[0]), unit.variables.id(assigned(&unit, 0)).unwrap());
    assert_eq!(read_of(&add.arguments()[1]), unit.variables.id(assigned(&unit, 1)).unwrap());
    match &unit.statements[2] {
        Statement::Expression(_) => {}
        other => panic!("unread sum should not be stored, got {:?}", other),
    }
}

#[test]
fn computed_jump_end_to_end() {
    let program = vec![
        /* 00 */ (PUSHR_DWORD, reg(R0)),
        /* 02 */ (PUSHR_DWORD, reg(R1)),
        /* 04 */ (ADD_DWORD, NONE),
        /* 05 */ (JMP, NONE),
    ];
    let emulator = Emulator::with_registers(&[(R0, 0xFFFF_FFFF), (R1, 1)]);
    let graph = disassemble_with(&program, emulator, Rc::new(RecordingLogger::default())).unwrap();

    assert_eq!(graph.len(), 4);
    assert_eq!(graph.get(5).unwrap().jump_targets(), Some(&set(&[0])));

    let unit = build(&graph);
    assert_eq!(unit.statements.len(), 4);
    assert_eq!(assigned(&unit, 2), "v_0005_0");
    assert_eq!(unit.statements[2].expression().offset(), Some(4));
    match &unit.statements[3] {
        Statement::Expression(expression) => {
            assert_eq!(expression.offset(), Some(5));
            let target = read_of(&expression.arguments()[0]);
            assert_eq!(unit.variables.get(target).unwrap().name, "v_0005_0");
        }
        other => panic!("expected a bare jump, got {:?}", other),
    }
}

#[test]
fn joined_producers_share_a_variable() {
    let graph = disassemble(&[
        /* 00 */ (PUSHI_DWORD, imm(0)),
        /* 05 */ (PUSHI_DWORD, imm(22)),
        /* 10 */ (JZ, NONE),
        /* 11 */ (PUSHI_DWORD, imm(28)),
        /* 16 */ (PUSHI_DWORD, imm(27)),
        /* 21 */ (JMP, NONE),
        /* 22 */ (PUSHI_DWORD, imm(29)),
        /* 27 */ (JMP, NONE),
        /* 28 */ (RET, NONE),
        /* 29 */ (RET, NONE),
    ])
    .unwrap();
    let unit = build(&graph);

    let text = unit.to_string();
    assert!(text.contains("/* 000b/PUSHI_DWORD */ v_001b_0=PUSHI_DWORD(0x1c);"));
    assert!(text.contains("/* 0016/PUSHI_DWORD */ v_001b_0=PUSHI_DWORD(0x1d);"));
    assert!(text.contains("/* 000a/JZ */ JZ(PUSHI_DWORD(0x0),v_000a_1);"));
    assert!(text.contains("/* 001b/JMP */ JMP(v_001b_0);"));

    // Each offset is converted once even though 27 is reached twice
    assert_eq!(unit.statements.len(), 9);
    assert_eq!(text.matches("/* 001b/JMP */").count(), 1);
}

#[test]
fn calls_consume_their_selector() {
    let graph = disassemble(&[
        /* 00 */ (PUSHI_QWORD, imm(5)),
        /* 09 */ (PUSHI_DWORD, imm(VCALL_BOX)),
        /* 14 */ (VCALL, NONE),
        /* 15 */ (POP, reg(R4)),
        /* 17 */ (RET, NONE),
    ])
    .unwrap();
    let unit = build(&graph);

    match unit.statements[0].expression() {
        Expression::Call(call) => {
            assert_eq!(call.offset, 14);
            assert_eq!(call.descriptor.signature.name, "box");
            assert_eq!(call.arguments.len(), 1);
        }
        other => panic!("expected a call, got {:?}", other),
    }
    assert_eq!(unit.variables.by_name("v_000f_0").unwrap().value_type, ValueType::Object);
    assert_eq!(
        unit.to_string(),
        "/* 000e/VCALL */ v_000f_0=VCALL.box(PUSHI_QWORD(0x5));\n\
         /* 000f/POP */ POP(R4,v_000f_0);\n\
         /* 0011/RET */ RET();\n"
    );
}

#[test]
fn call_converts_both_arms_once() {
    let graph = disassemble(&[
        /* 00 */ (PUSHI_DWORD, imm(7)),
        /* 05 */ (CALL, NONE),
        /* 06 */ (RET, NONE),
        /* 07 */ (RET, NONE),
    ])
    .unwrap();
    let unit = build(&graph);

    // The return address comes first, then the call target
    let offsets: Vec<_> = unit.statements.iter().map(|statement| statement.expression().offset()).collect();
    assert_eq!(offsets, vec![Some(0), Some(5), Some(6), Some(7)]);
    assert_eq!(
        unit.to_string(),
        "/* 0000/PUSHI_DWORD */ v_0005_0=PUSHI_DWORD(0x7);\n\
         /* 0005/CALL */ CALL(v_0005_0);\n\
         /* 0006/RET */ RET();\n\
         /* 0007/RET */ RET();\n"
    );
}

#[test]
fn building_twice_is_deterministic() {
    let graph = disassemble(&[
        /* 00 */ (PUSHI_DWORD, imm(1)),
        /* 05 */ (PUSHI_DWORD, imm(18)),
        /* 10 */ (JZ, NONE),
        /* 11 */ (PUSHI_DWORD, imm(7)),
        /* 16 */ (POP, reg(R2)),
        /* 18 */ (RET, NONE),
    ])
    .unwrap();
    assert_eq!(build(&graph).to_string(), build(&graph).to_string());
}

#[test]
fn missing_start_is_fatal() {
    let graph = disassemble(&[(RET, NONE)]).unwrap();
    match AstBuilder::new(&graph).build(0x40) {
        Err(Error::MissingInstruction {offset}) => assert_eq!(offset, 0x40),
        other => panic!("expected a missing instruction, got {:?}", other.map(|unit| unit.statements.len())),
    }
}

#[test]
fn logs_a_summary() {
    let graph = disassemble(&[(PUSHI_DWORD, imm(2)), (POP, reg(R7)), (RET, NONE)]).unwrap();
    let logger = Rc::new(RecordingLogger::default());
    AstBuilder::new(&graph).with_logger(logger.clone()).build(0).unwrap();

    assert_eq!(logger.at(Severity::Info), vec![String::from("built 3 statements and 17 variables from 0x0000")]);
    assert!(logger.at(Severity::Debug).iter().any(|message| message.starts_with("introducing v_0005_0")));
}
