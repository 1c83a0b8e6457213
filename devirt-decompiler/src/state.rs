/*

Abstract State
==============

Copyright (c) 2020 Dannii Willis
MIT licenced
https://github.com/curiousdannii/ifvms.js

*/

use std::collections::BTreeSet;

use super::arch::{Register, ValueType};
use super::error::{Error, Result};

// A run-time value we can't know, tracked by the instructions that may produce it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolicValue {
    sources: BTreeSet<u32>,
    value_type: ValueType,
}

impl SymbolicValue {
    // A register's value on entry to the function: nothing produced it
    pub fn entry(value_type: ValueType) -> SymbolicValue {
        SymbolicValue {
            sources: BTreeSet::new(),
            value_type,
        }
    }

    pub fn produced_by(offset: u32, value_type: ValueType) -> SymbolicValue {
        let mut sources = BTreeSet::new();
        sources.insert(offset);
        SymbolicValue {
            sources,
            value_type,
        }
    }

    pub fn sources(&self) -> &BTreeSet<u32> {
        &self.sources
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn is_entry_value(&self) -> bool {
        self.sources.is_empty()
    }

    // Union of both sources; reports whether anything was added to self
    pub fn merge(&self, other: &SymbolicValue) -> (SymbolicValue, bool) {
        let mut merged = self.clone();
        let mut changed = false;
        for &source in &other.sources {
            changed |= merged.sources.insert(source);
        }
        let value_type = self.value_type.join(other.value_type);
        changed |= value_type != self.value_type;
        merged.value_type = value_type;
        (merged, changed)
    }
}

// Symbolic registers and operand stack at one code offset
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AbstractState {
    ip: u32,
    key: u32,
    registers: Vec<SymbolicValue>,
    stack: Vec<SymbolicValue>,
}

impl AbstractState {
    pub fn new(ip: u32, key: u32) -> AbstractState {
        AbstractState {
            ip,
            key,
            registers: vec![SymbolicValue::entry(ValueType::Object); Register::ALL.len()],
            stack: Vec::new(),
        }
    }

    pub fn ip(&self) -> u32 {
        self.ip
    }

    pub fn set_ip(&mut self, ip: u32) {
        self.ip = ip;
    }

    pub fn key(&self) -> u32 {
        self.key
    }

    pub fn register(&self, register: Register) -> &SymbolicValue {
        &self.registers[register.index()]
    }

    pub fn set_register(&mut self, register: Register, value: SymbolicValue) {
        self.registers[register.index()] = value;
    }

    pub fn stack(&self) -> &[SymbolicValue] {
        &self.stack
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn push(&mut self, value: SymbolicValue) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Option<SymbolicValue> {
        self.stack.pop()
    }

    pub fn peek(&self) -> Option<&SymbolicValue> {
        self.stack.last()
    }

    // Join the state already recorded at this offset with one arriving along another path.
    // IP is left alone: it is rebound to the instruction on every visit.
    pub fn merge(&self, other: &AbstractState) -> Result<(AbstractState, bool)> {
        if self.stack.len() != other.stack.len() {
            return Err(Error::StackMismatch {
                offset: self.ip,
                expected: self.stack.len(),
                found: other.stack.len(),
            });
        }

        let mut merged = self.clone();
        let mut changed = false;

        for (slot, value) in other.stack.iter().enumerate() {
            let (joined, grew) = merged.stack[slot].merge(value);
            merged.stack[slot] = joined;
            changed |= grew;
        }

        for register in Register::ALL.iter().copied() {
            if register == Register::IP {
                continue;
            }
            let (joined, grew) = merged.register(register).merge(other.register(register));
            merged.set_register(register, joined);
            changed |= grew;
        }

        Ok((merged, changed))
    }
}
