/*

AST
===

Copyright (c) 2020 Dannii Willis
MIT licenced
https://github.com/curiousdannii/ifvms.js

*/

use std::collections::BTreeSet;
use std::fmt;

use fnv::FnvHashMap;

use super::arch::{OpCode, Operand, ValueType};
use super::graph::CallDescriptor;

pub mod builder;

pub use builder::AstBuilder;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableId(usize);

impl VariableId {
    pub fn index(self) -> usize {
        self.0
    }
}

// Where a variable is read: an argument slot of the instruction at an offset
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpressionSite {
    pub offset: u32,
    pub slot: usize,
}

#[derive(Clone, Debug)]
pub struct Variable {
    pub name: String,
    pub value_type: ValueType,
    readers: BTreeSet<ExpressionSite>,
}

impl Variable {
    pub fn readers(&self) -> &BTreeSet<ExpressionSite> {
        &self.readers
    }
}

// Variables by name, in the order they were introduced
#[derive(Clone, Debug, Default)]
pub struct VariableTable {
    variables: Vec<Variable>,
    names: FnvHashMap<String, VariableId>,
}

impl VariableTable {
    // Returns the existing variable if the name is taken
    pub fn insert(&mut self, name: String, value_type: ValueType) -> VariableId {
        if let Some(&id) = self.names.get(&name) {
            return id;
        }
        let id = VariableId(self.variables.len());
        self.names.insert(name.clone(), id);
        self.variables.push(Variable {
            name,
            value_type,
            readers: BTreeSet::new(),
        });
        id
    }

    pub fn get(&self, id: VariableId) -> Option<&Variable> {
        self.variables.get(id.0)
    }

    pub fn id(&self, name: &str) -> Option<VariableId> {
        self.names.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&Variable> {
        self.id(name).and_then(|id| self.get(id))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Variable> {
        self.variables.iter()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub(crate) fn add_reader(&mut self, id: VariableId, site: ExpressionSite) {
        if let Some(variable) = self.variables.get_mut(id.0) {
            variable.readers.insert(site);
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstructionExpression {
    pub offset: u32,
    pub opcode: OpCode,
    pub operand: Operand,
    pub arguments: Vec<Expression>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallExpression {
    pub offset: u32,
    pub opcode: OpCode,
    pub descriptor: CallDescriptor,
    pub arguments: Vec<Expression>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VariableExpression {
    pub variable: VariableId,
    pub site: ExpressionSite,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expression {
    Instruction(InstructionExpression),
    Call(CallExpression),
    Variable(VariableExpression),
}

impl Expression {
    // Offset of the instruction this node was built from, if any
    pub fn offset(&self) -> Option<u32> {
        match self {
            Expression::Instruction(expression) => Some(expression.offset),
            Expression::Call(expression) => Some(expression.offset),
            Expression::Variable(_) => None,
        }
    }

    pub fn arguments(&self) -> &[Expression] {
        match self {
            Expression::Instruction(expression) => expression.arguments.as_slice(),
            Expression::Call(expression) => expression.arguments.as_slice(),
            Expression::Variable(_) => &[],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    Assignment {
        variable: VariableId,
        expression: Expression,
    },
    Expression(Expression),
}

impl Statement {
    pub fn expression(&self) -> &Expression {
        match self {
            Statement::Assignment {expression, ..} => expression,
            Statement::Expression(expression) => expression,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CompilationUnit {
    pub statements: Vec<Statement>,
    pub variables: VariableTable,
}

impl CompilationUnit {
    fn output_expression(&self, expression: &Expression) -> String {
        fn args_join(arguments: Vec<String>, joiner: &str) -> String {
            match arguments.len() {
                0 => String::new(),
                1 => arguments[0].clone(),
                _ => arguments.join(joiner),
            }
        }

        match expression {
            Expression::Instruction(inst) => {
                let mut arguments = Vec::new();
                if inst.operand != Operand::None {
                    arguments.push(inst.operand.to_string());
                }
                arguments.extend(inst.arguments.iter().map(|argument| self.output_expression(argument)));
                format!("{}({})", inst.opcode, args_join(arguments, ","))
            }
            Expression::Call(call) => {
                let arguments = call.arguments.iter().map(|argument| self.output_expression(argument)).collect();
                format!("{}.{}({})", call.opcode, call.descriptor.signature.name, args_join(arguments, ","))
            }
            Expression::Variable(read) => match self.variables.get(read.variable) {
                Some(variable) => variable.name.clone(),
                None => format!("<var {}>", read.variable.index()),
            },
        }
    }
}

// One line per statement, tagged with the offset and mnemonic it came from
impl fmt::Display for CompilationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            let expression = statement.expression();
            let tag = match expression {
                Expression::Instruction(inst) => format!("{:04x}/{}", inst.offset, inst.opcode),
                Expression::Call(call) => format!("{:04x}/{}", call.offset, call.opcode),
                Expression::Variable(_) => String::from("----"),
            };
            let code = self.output_expression(expression);
            match statement {
                Statement::Assignment {variable, ..} => {
                    let name = self.variables.get(*variable).map(|variable| variable.name.as_str()).unwrap_or("?");
                    writeln!(f, "/* {} */ {}={};", tag, name, code)?;
                }
                Statement::Expression(_) => writeln!(f, "/* {} */ {};", tag, code)?,
            }
        }
        Ok(())
    }
}
