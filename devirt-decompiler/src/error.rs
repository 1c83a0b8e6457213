/*

Errors
======

Copyright (c) 2020 Dannii Willis
MIT licenced
https://github.com/curiousdannii/ifvms.js

*/

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

// Every analysis failure is fatal and names the offset it happened at
#[derive(Debug, Error)]
pub enum Error {
    #[error("read past the end of the image at {offset:#06x}")]
    OutOfBounds {offset: u32},

    #[error("unknown opcode {opcode:#04x} at {offset:#06x}")]
    UnknownOpcode {offset: u32, opcode: u8},

    #[error("operand does not fit the opcode encoded at {offset:#06x}")]
    OperandMismatch {offset: u32},

    #[error("invalid register {register:#04x} at {offset:#06x}")]
    InvalidRegister {offset: u32, register: u8},

    #[error("stack underflow at {offset:#06x}")]
    StackUnderflow {offset: u32},

    #[error("stack depth mismatch at {offset:#06x}: expected {expected}, found {found}")]
    StackMismatch {
        offset: u32,
        expected: usize,
        found: usize,
    },

    #[error("unable to resolve jump target at {offset:#06x}")]
    UnresolvedTarget {
        offset: u32,
        #[source]
        source: FoldError,
    },

    #[error("unable to resolve call selector at {offset:#06x}")]
    UnresolvedSelector {
        offset: u32,
        #[source]
        source: FoldError,
    },

    #[error("no call signature for selector {selector:#x} at {offset:#06x}")]
    UnknownCall {offset: u32, selector: u64},

    #[error("unsupported variable stack effect at {offset:#06x}")]
    UnsupportedStackEffect {offset: u32},

    #[error("no instruction at {offset:#06x}")]
    MissingInstruction {offset: u32},

    #[error("dependency {slot} of {offset:#06x} has no producer")]
    UnboundDependency {offset: u32, slot: usize},

    #[error("cyclic expression through {offset:#06x}")]
    CyclicExpression {offset: u32},
}

// Why the fold emulator could not produce a constant
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FoldError {
    #[error("nothing left on the stack")]
    EmptyStack,

    #[error("stack underflow replaying {offset:#06x}")]
    StackUnderflow {offset: u32},

    #[error("folded value {value:#x} is not a code offset")]
    OutOfRange {value: u64},

    #[error("{mnemonic} at {offset:#06x} cannot be folded")]
    Unsupported {
        offset: u32,
        mnemonic: &'static str,
    },
}
