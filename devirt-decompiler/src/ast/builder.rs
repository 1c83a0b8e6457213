/*

AST Builder
===========

Copyright (c) 2020 Dannii Willis
MIT licenced
https://github.com/curiousdannii/ifvms.js

*/

// Turns a disassembled instruction graph into statements and expression trees.
//
// A produced value is inlined into its reader when that is the only place it
// is ever read. It is stored in a variable instead when it is read more than
// once, when it snapshots a register (the register may be rebound before the
// reader runs), when a reader binds it to a register (including the jump target
// loaded into IP) or when it meets another producer at a join.

use std::rc::Rc;

use fnv::{FnvHashMap, FnvHashSet};

use super::*;
use crate::arch::{Operand, PopBehaviour, PushBehaviour, Register, ValueType};
use crate::error::{Error, Result};
use crate::graph::{Dependency, Instruction, InstructionGraph};
use crate::logging::{Logger, NullLogger};

// One read of a produced value
#[derive(Copy, Clone, Debug)]
struct Read {
    register_bound: bool,
    joined: bool,
}

pub struct AstBuilder<'a> {
    graph: &'a InstructionGraph,
    logger: Rc<dyn Logger>,
}

impl<'a> AstBuilder<'a> {
    pub fn new(graph: &'a InstructionGraph) -> AstBuilder<'a> {
        AstBuilder {
            graph,
            logger: Rc::new(NullLogger),
        }
    }

    pub fn with_logger(mut self, logger: Rc<dyn Logger>) -> AstBuilder<'a> {
        self.logger = logger;
        self
    }

    pub fn build(&self, start: u32) -> Result<CompilationUnit> {
        let mut variables = VariableTable::default();
        for register in Register::ALL.iter() {
            variables.insert(register.name().to_string(), ValueType::Object);
        }

        let reads = self.collect_reads();
        let mut materialized = FnvHashSet::default();
        let mut inlined = FnvHashSet::default();
        for instruction in self.graph {
            let offset = instruction.offset;
            let producer_reads = reads.get(&offset).map(|reads| reads.as_slice()).unwrap_or(&[]);
            if must_materialize(instruction, producer_reads) {
                materialized.insert(offset);
            } else if producer_reads.len() == 1 {
                inlined.insert(offset);
            }
        }

        let bindings = self.introduce_variables(&materialized, &mut variables);

        let mut converter = Converter {
            graph: self.graph,
            bindings,
            inlined,
            variables,
            in_progress: FnvHashSet::default(),
        };
        let statements = converter.convert(start)?;

        self.logger.info(format_args!(
            "built {} statements and {} variables from {:#06x}",
            statements.len(),
            converter.variables.len(),
            start
        ));
        Ok(CompilationUnit {
            statements,
            variables: converter.variables,
        })
    }

    fn collect_reads(&self) -> FnvHashMap<u32, Vec<Read>> {
        let mut reads: FnvHashMap<u32, Vec<Read>> = FnvHashMap::default();
        for reader in self.graph {
            let last = reader.dependencies.len().saturating_sub(1);
            for (slot, dependency) in reader.dependencies.iter().enumerate() {
                let pops_to_register =
                    reader.opcode.pop == PopBehaviour::Pop1 && matches!(reader.operand, Operand::Register(_));
                let register_bound = pops_to_register || (reader.opcode.transfers_control() && slot == last);
                let joined = dependency.producers().len() > 1;
                for &producer in dependency.producers() {
                    reads.entry(producer).or_insert_with(Vec::new).push(Read {
                        register_bound,
                        joined,
                    });
                }
            }
        }
        reads
    }

    // Producers meeting in one slot share a variable; it is named after the first slot that reads them
    fn introduce_variables(
        &self,
        materialized: &FnvHashSet<u32>,
        variables: &mut VariableTable,
    ) -> FnvHashMap<u32, VariableId> {
        fn find(parents: &mut FnvHashMap<u32, u32>, offset: u32) -> u32 {
            let mut node = offset;
            loop {
                let parent = *parents.get(&node).unwrap_or(&node);
                if parent == node {
                    return node;
                }
                let grandparent = *parents.get(&parent).unwrap_or(&parent);
                parents.insert(node, grandparent);
                node = parent;
            }
        }

        let slot_producers = |dependency: &Dependency| -> Vec<u32> {
            dependency
                .producers()
                .iter()
                .copied()
                .filter(|producer| materialized.contains(producer))
                .collect()
        };

        let mut parents = FnvHashMap::default();
        for reader in self.graph {
            for dependency in &reader.dependencies {
                let producers = slot_producers(dependency);
                if let Some((&first, rest)) = producers.split_first() {
                    for &producer in rest {
                        let a = find(&mut parents, first);
                        let b = find(&mut parents, producer);
                        if a != b {
                            parents.insert(a.max(b), a.min(b));
                        }
                    }
                }
            }
        }

        let mut classes: FnvHashMap<u32, VariableId> = FnvHashMap::default();
        for reader in self.graph {
            for (slot, dependency) in reader.dependencies.iter().enumerate() {
                let producers = slot_producers(dependency);
                let root = match producers.first() {
                    Some(&first) => find(&mut parents, first),
                    None => continue,
                };
                if !classes.contains_key(&root) {
                    let name = format!("v_{:04x}_{}", reader.offset, slot);
                    self.logger.debug(format_args!("introducing {} for {:?}", name, producers));
                    let id = variables.insert(name, dependency.value.value_type());
                    classes.insert(root, id);
                }
            }
        }

        let mut bindings = FnvHashMap::default();
        for &producer in materialized {
            let root = find(&mut parents, producer);
            if let Some(&id) = classes.get(&root) {
                bindings.insert(producer, id);
            }
        }
        bindings
    }
}

fn must_materialize(producer: &Instruction, reads: &[Read]) -> bool {
    let reads_register = match producer.operand {
        Operand::Register(_) => producer.opcode.push != PushBehaviour::None,
        _ => false,
    };
    reads.len() > 1 || reads_register || reads.iter().any(|read| read.register_bound || read.joined)
}

struct Converter<'a> {
    graph: &'a InstructionGraph,
    bindings: FnvHashMap<u32, VariableId>,
    inlined: FnvHashSet<u32>,
    variables: VariableTable,
    in_progress: FnvHashSet<u32>,
}

impl<'a> Converter<'a> {
    // Walk the control flow from the start, converting each offset at most once
    fn convert(&mut self, start: u32) -> Result<Vec<Statement>> {
        let graph = self.graph;
        let mut statements = Vec::new();
        let mut converted = FnvHashSet::default();
        let mut agenda = vec![start];

        while let Some(offset) = agenda.pop() {
            if !converted.insert(offset) {
                continue;
            }
            let instruction = graph.get(offset).ok_or(Error::MissingInstruction {offset})?;

            // Inlined producers appear inside their reader instead
            if !self.inlined.contains(&offset) {
                let expression = self.expression(instruction)?;
                statements.push(match self.bindings.get(&offset) {
                    Some(&variable) => Statement::Assignment {
                        variable,
                        expression,
                    },
                    None => Statement::Expression(expression),
                });
            }

            // Fall-through comes last so it is popped first
            for successor in instruction.successors() {
                if !converted.contains(&successor) {
                    agenda.push(successor);
                }
            }
        }
        Ok(statements)
    }

    fn expression(&mut self, instruction: &'a Instruction) -> Result<Expression> {
        let offset = instruction.offset;
        if !self.in_progress.insert(offset) {
            return Err(Error::CyclicExpression {offset});
        }

        // A call's selector is spent choosing the signature
        let slots = match instruction.call() {
            Some(descriptor) => descriptor.signature.arguments,
            None => instruction.dependencies.len(),
        };
        let mut arguments = Vec::with_capacity(slots);
        for (slot, dependency) in instruction.dependencies.iter().take(slots).enumerate() {
            arguments.push(self.argument(offset, slot, dependency)?);
        }
        self.in_progress.remove(&offset);

        Ok(match instruction.call() {
            Some(descriptor) => Expression::Call(CallExpression {
                offset,
                opcode: instruction.opcode,
                descriptor: *descriptor,
                arguments,
            }),
            None => Expression::Instruction(InstructionExpression {
                offset,
                opcode: instruction.opcode,
                operand: instruction.operand,
                arguments,
            }),
        })
    }

    fn argument(&mut self, offset: u32, slot: usize, dependency: &Dependency) -> Result<Expression> {
        let graph = self.graph;
        let producers = dependency.producers();

        let bound = producers.iter().filter_map(|producer| self.bindings.get(producer)).next().copied();
        if let Some(variable) = bound {
            let site = ExpressionSite {offset, slot};
            self.variables.add_reader(variable, site);
            return Ok(Expression::Variable(VariableExpression {variable, site}));
        }

        match producers.iter().next() {
            Some(&producer) if producers.len() == 1 && self.inlined.contains(&producer) => {
                let instruction = graph.get(producer).ok_or(Error::MissingInstruction {offset: producer})?;
                self.expression(instruction)
            }
            _ => Err(Error::UnboundDependency {offset, slot}),
        }
    }
}
