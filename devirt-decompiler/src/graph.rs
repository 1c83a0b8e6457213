/*

Instruction Graph
=================

Copyright (c) 2020 Dannii Willis
MIT licenced
https://github.com/curiousdannii/ifvms.js

*/

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};

use super::arch::{CallSignature, FlowControl, OpCode, Operand};
use super::state::{AbstractState, SymbolicValue};

// One consumed value, and through its sources the instructions that may have produced it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub value: SymbolicValue,
}

impl Dependency {
    pub fn producers(&self) -> &BTreeSet<u32> {
        self.value.sources()
    }
}

// The resolved selector of a variable-arity call
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CallDescriptor {
    pub selector: u64,
    pub signature: CallSignature,
}

// Facts the disassembler works out about an opcode beyond its encoding
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inferred {
    Nothing,
    JumpTargets(BTreeSet<u32>),
    Call(CallDescriptor),
}

#[derive(Clone, Debug)]
pub struct Instruction {
    pub offset: u32,
    pub opcode: OpCode,
    pub operand: Operand,
    pub size: u32,
    pub state: AbstractState,
    pub dependencies: Vec<Dependency>,
    pub inferred: Inferred,
}

impl Instruction {
    pub fn next(&self) -> u32 {
        self.offset + self.size
    }

    pub fn jump_targets(&self) -> Option<&BTreeSet<u32>> {
        match &self.inferred {
            Inferred::JumpTargets(targets) => Some(targets),
            _ => None,
        }
    }

    pub fn call(&self) -> Option<&CallDescriptor> {
        match &self.inferred {
            Inferred::Call(descriptor) => Some(descriptor),
            _ => None,
        }
    }

    // Offsets control can reach next; taken targets come before the fall-through
    pub fn successors(&self) -> Vec<u32> {
        let mut successors = Vec::new();
        match self.opcode.flow {
            FlowControl::Next => successors.push(self.next()),
            FlowControl::Jump => {
                if let Some(targets) = self.jump_targets() {
                    successors.extend(targets.iter().copied());
                }
            }
            FlowControl::Call | FlowControl::ConditionalJump => {
                if let Some(targets) = self.jump_targets() {
                    successors.extend(targets.iter().copied());
                }
                successors.push(self.next());
            }
            FlowControl::Return => {}
        }
        successors
    }
}

// Every reachable instruction, keyed and ordered by offset
#[derive(Clone, Debug, Default)]
pub struct InstructionGraph {
    instructions: BTreeMap<u32, Instruction>,
}

impl InstructionGraph {
    pub fn get(&self, offset: u32) -> Option<&Instruction> {
        self.instructions.get(&offset)
    }

    pub fn contains(&self, offset: u32) -> bool {
        self.instructions.contains_key(&offset)
    }

    pub fn iter(&self) -> btree_map::Values<'_, u32, Instruction> {
        self.instructions.values()
    }

    pub fn offsets(&self) -> Vec<u32> {
        self.instructions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl std::iter::FromIterator<Instruction> for InstructionGraph {
    fn from_iter<I: IntoIterator<Item = Instruction>>(iter: I) -> InstructionGraph {
        InstructionGraph {
            instructions: iter.into_iter().map(|instruction| (instruction.offset, instruction)).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a InstructionGraph {
    type Item = &'a Instruction;
    type IntoIter = btree_map::Values<'a, u32, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.values()
    }
}
