/*

Disassembler
============

Copyright (c) 2020 Dannii Willis
MIT licenced
https://github.com/curiousdannii/ifvms.js

*/

// Recovers every instruction reachable from a set of entry points.
//
// Jump targets in protected code are computed on the stack, so decoding runs
// as an abstract interpreter: each offset records the symbolic state it was
// reached with, states arriving along other paths are merged until nothing
// changes, and the producers of every jump target are replayed through a
// concrete emulator to recover the address.

use std::collections::BTreeSet;
use std::convert::TryFrom;
use std::io::Cursor;
use std::rc::Rc;

use fnv::FnvHashMap;

use super::arch::*;
use super::error::{Error, FoldError, Result};
use super::graph::*;
use super::logging::{Logger, NullLogger};
use super::state::{AbstractState, SymbolicValue};

pub struct Disassembler<'a, D, E> {
    image: Cursor<Box<[u8]>>,
    isa: &'a InstructionSet,
    decoder: D,
    emulator: E,
    logger: Rc<dyn Logger>,
    instructions: FnvHashMap<u32, Instruction>,
}

impl<'a, D: Decoder, E: FoldEmulator> Disassembler<'a, D, E> {
    pub fn new(image: Box<[u8]>, isa: &'a InstructionSet, decoder: D, emulator: E) -> Disassembler<'a, D, E> {
        Disassembler {
            image: Cursor::new(image),
            isa,
            decoder,
            emulator,
            logger: Rc::new(NullLogger),
            instructions: FnvHashMap::default(),
        }
    }

    pub fn with_logger(mut self, logger: Rc<dyn Logger>) -> Disassembler<'a, D, E> {
        self.logger = logger;
        self
    }

    // Disassemble everything reachable from the entry points
    pub fn disassemble(mut self, entries: &[EntryPoint]) -> Result<InstructionGraph> {
        for entry in entries {
            self.logger.info(format_args!("disassembling export at {:#06x} (key {:#010x})", entry.offset, entry.key));
            if let Err(err) = self.run_agenda(entry) {
                self.logger.error(format_args!("{}", err));
                return Err(err);
            }
        }
        let instructions = std::mem::take(&mut self.instructions);
        let graph: InstructionGraph = instructions.into_iter().map(|(_, instruction)| instruction).collect();
        self.logger.info(format_args!("discovered {} instructions", graph.len()));
        Ok(graph)
    }

    fn run_agenda(&mut self, entry: &EntryPoint) -> Result<()> {
        let mut agenda = vec![AbstractState::new(entry.offset, entry.key)];
        while let Some(incoming) = agenda.pop() {
            let offset = incoming.ip();
            let state = match self.instructions.get_mut(&offset) {
                Some(instruction) => {
                    let (merged, changed) = instruction.state.merge(&incoming)?;
                    if !changed {
                        continue;
                    }
                    self.logger.debug(format_args!("state at {:#06x} changed, propagating", offset));
                    instruction.state = merged.clone();
                    merged
                }
                None => {
                    let instruction = self.decode(offset, &incoming)?;
                    self.logger.debug(format_args!("{:#06x}: {} {}", offset, instruction.opcode, instruction.operand));
                    self.instructions.insert(offset, instruction);
                    incoming
                }
            };
            agenda.extend(self.step(offset, state)?);
        }
        Ok(())
    }

    fn decode(&mut self, offset: u32, state: &AbstractState) -> Result<Instruction> {
        if offset as usize >= self.image.get_ref().len() {
            return Err(Error::OutOfBounds {offset});
        }
        self.image.set_position(offset as u64);
        let decoded = self.decoder.decode(&mut self.image, self.isa, state.key())?;
        Ok(Instruction {
            offset,
            opcode: decoded.opcode,
            operand: decoded.operand,
            size: decoded.size,
            state: state.clone(),
            dependencies: Vec::new(),
            inferred: Inferred::Nothing,
        })
    }

    // Apply the instruction's stack effect to the state and derive the successor states
    fn step(&mut self, offset: u32, mut state: AbstractState) -> Result<Vec<AbstractState>> {
        let (opcode, operand) = match self.instructions.get(&offset) {
            Some(instruction) => (instruction.opcode, instruction.operand),
            None => return Err(Error::MissingInstruction {offset}),
        };

        state.set_register(Register::IP, SymbolicValue::produced_by(offset, ValueType::Dword));

        let call = if opcode.has_variable_arity() {
            Some(self.resolve_call(offset, &opcode, &state)?)
        } else {
            None
        };

        // Pop, deepest operand first once reversed
        let pops = match (opcode.pop, &call) {
            (PopBehaviour::None, _) => 0,
            (PopBehaviour::Pop1, _) => 1,
            (PopBehaviour::Pop2, _) => 2,
            (PopBehaviour::Variable, Some(descriptor)) => descriptor.signature.arguments + 1,
            (PopBehaviour::Variable, None) => return Err(Error::UnsupportedStackEffect {offset}),
        };
        let mut popped = Vec::with_capacity(pops);
        for _ in 0..pops {
            popped.push(state.pop().ok_or(Error::StackUnderflow {offset})?);
        }
        popped.reverse();

        if let (PopBehaviour::Pop1, Operand::Register(register)) = (opcode.pop, operand) {
            state.set_register(register, popped[0].clone());
        }

        // Push
        let pushes = match (opcode.push, &call) {
            (PushBehaviour::None, _) => None,
            (PushBehaviour::Push1, _) => Some(opcode.value_type),
            (PushBehaviour::Variable, Some(descriptor)) => descriptor.signature.returns,
            (PushBehaviour::Variable, None) => return Err(Error::UnsupportedStackEffect {offset}),
        };
        if let Some(value_type) = pushes {
            let value = match operand {
                Operand::Register(register) if !state.register(register).is_entry_value() => state.register(register).clone(),
                _ => SymbolicValue::produced_by(offset, value_type),
            };
            state.push(value);
        }

        self.record_dependencies(offset, popped)?;

        if let Some(descriptor) = call {
            if let Some(instruction) = self.instructions.get_mut(&offset) {
                instruction.inferred = Inferred::Call(descriptor);
            }
        }
        if opcode.transfers_control() {
            self.resolve_targets(offset)?;
        }

        let successors = match self.instructions.get(&offset) {
            Some(instruction) => instruction.successors(),
            None => Vec::new(),
        };
        Ok(successors
            .into_iter()
            .map(|target| {
                let mut successor = state.clone();
                successor.set_ip(target);
                successor
            })
            .collect())
    }

    // Slot-wise union with whatever earlier visits recorded
    fn record_dependencies(&mut self, offset: u32, popped: Vec<SymbolicValue>) -> Result<()> {
        let instruction = match self.instructions.get_mut(&offset) {
            Some(instruction) => instruction,
            None => return Err(Error::MissingInstruction {offset}),
        };
        if instruction.dependencies.is_empty() {
            instruction.dependencies = popped.into_iter().map(|value| Dependency {value}).collect();
            return Ok(());
        }
        if instruction.dependencies.len() != popped.len() {
            return Err(Error::UnsupportedStackEffect {offset});
        }
        for (dependency, value) in instruction.dependencies.iter_mut().zip(popped) {
            let (merged, _) = dependency.value.merge(&value);
            dependency.value = merged;
        }
        Ok(())
    }

    // The target is the last operand popped by a control transfer
    fn resolve_targets(&mut self, offset: u32) -> Result<()> {
        let target = {
            let instruction = match self.instructions.get(&offset) {
                Some(instruction) => instruction,
                None => return Err(Error::MissingInstruction {offset}),
            };
            let value = match instruction.dependencies.last() {
                Some(dependency) => &dependency.value,
                None => return Err(Error::UnresolvedTarget {offset, source: FoldError::EmptyStack}),
            };
            self.fold(value).map_err(|source| Error::UnresolvedTarget {offset, source})?
        };
        let target = u32::try_from(target).map_err(|_| Error::UnresolvedTarget {
            offset,
            source: FoldError::OutOfRange {value: target},
        })?;

        if let Some(instruction) = self.instructions.get_mut(&offset) {
            match &mut instruction.inferred {
                Inferred::JumpTargets(targets) => {
                    if targets.insert(target) {
                        self.logger.warning(format_args!("{:#06x} gained jump target {:#06x} after a merge", offset, target));
                    }
                }
                inferred => {
                    self.logger.info(format_args!("{:#06x} jumps to {:#06x}", offset, target));
                    let mut targets = BTreeSet::new();
                    targets.insert(target);
                    *inferred = Inferred::JumpTargets(targets);
                }
            }
        }
        Ok(())
    }

    // Variable-arity opcodes pick their signature with a selector on top of the stack
    fn resolve_call(&self, offset: u32, opcode: &OpCode, state: &AbstractState) -> Result<CallDescriptor> {
        if opcode.pop != PopBehaviour::Variable {
            return Err(Error::UnsupportedStackEffect {offset});
        }
        let value = state.peek().ok_or(Error::StackUnderflow {offset})?;
        let selector = self.fold(value).map_err(|source| Error::UnresolvedSelector {offset, source})?;
        let signature = *self.isa.call_signature(selector).ok_or(Error::UnknownCall {offset, selector})?;
        self.logger.debug(format_args!("{:#06x} calls {} ({} arguments)", offset, signature.name, signature.arguments));
        Ok(CallDescriptor {
            selector,
            signature,
        })
    }

    // Replay the transitive producers of a value, in offset order, through the emulator
    fn fold(&self, value: &SymbolicValue) -> std::result::Result<u64, FoldError> {
        let mut closure = BTreeSet::new();
        let mut pending: Vec<u32> = value.sources().iter().copied().collect();
        while let Some(source) = pending.pop() {
            if !closure.insert(source) {
                continue;
            }
            if let Some(producer) = self.instructions.get(&source) {
                for dependency in &producer.dependencies {
                    pending.extend(dependency.producers().iter().copied());
                }
            }
        }
        let sequence: Vec<&Instruction> = closure.iter().filter_map(|offset| self.instructions.get(offset)).collect();
        self.emulator.fold(&sequence)
    }
}
