/*

devirt-decompiler - core library
================================

Copyright (c) 2020 Dannii Willis
MIT licenced
https://github.com/curiousdannii/ifvms.js

*/

// Recovers code from a stack-based protection VM.
//
// The `Disassembler` finds every instruction reachable from a set of
// exports, tracking where each consumed value came from, and the
// `AstBuilder` turns the resulting `InstructionGraph` into a flat list of
// statements over named variables.

pub mod arch;
pub mod ast;
pub mod disassembler;
pub mod error;
pub mod graph;
pub mod logging;
pub mod state;
pub mod vm;

pub use arch::{EntryPoint, InstructionSet, Register, ValueType};
pub use ast::{AstBuilder, CompilationUnit};
pub use disassembler::Disassembler;
pub use error::{Error, FoldError, Result};
pub use graph::{Instruction, InstructionGraph};
pub use logging::{Logger, NullLogger, Severity, TracingLogger};
