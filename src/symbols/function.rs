use std::collections::HashMap;

use serde::Serialize;

use super::array::Array;
use super::label::Label;
use super::variable::{DataType, Scope, Variable};
use crate::ident;
use crate::version::KsmVersion;

#[derive(Debug, Clone, Serialize)]
pub struct Function {
    pub name: String,
    pub identifier: u32,
    pub is_public: bool,
    pub temp_var_flags: u32,
    pub accumulator: Option<u32>,
    pub labels_by_id: HashMap<u32, usize>,
    pub labels_by_address: HashMap<u32, usize>,
    pub labels_by_name: HashMap<String, usize>,
    pub labels: Vec<Label>,
    pub local_arrays_by_id: HashMap<u32, usize>,
    pub local_arrays_by_address: HashMap<u32, usize>,
    pub local_arrays_by_name: HashMap<String, usize>,
    pub local_arrays: Vec<Array>,
    pub declared_locals: Vec<Variable>,
    pub declared_locals_by_name: HashMap<String, usize>,
    pub special_label: Option<u32>,
    pub code_offset: u32,
    pub code_end: u32,
}

impl Function {
    pub fn new(name: impl Into<String>, identifier: u32, is_public: bool) -> Self {
        Function {
            name: name.into(),
            identifier,
            is_public,
            temp_var_flags: 0,
            accumulator: None,
            labels_by_id: HashMap::new(),
            labels_by_address: HashMap::new(),
            labels_by_name: HashMap::new(),
            labels: Vec::new(),
            local_arrays_by_id: HashMap::new(),
            local_arrays_by_address: HashMap::new(),
            local_arrays_by_name: HashMap::new(),
            local_arrays: Vec::new(),
            declared_locals: Vec::new(),
            declared_locals_by_name: HashMap::new(),
            special_label: None,
            code_offset: 0,
            code_end: 0,
        }
    }

    /// Allocates (or returns the existing) implicit accumulator local that
    /// receives every called function's return value. The identifier is
    /// assigned once and never reassigned.
    pub fn accumulator_id(&mut self) -> u32 {
        if let Some(id) = self.accumulator {
            return id;
        }
        let id = self.declare_local("accumulator", DataType::None);
        self.accumulator = Some(id);
        id
    }

    /// Declares a new local variable, or returns the identifier of an
    /// existing one with the same name.
    pub fn declare_local(&mut self, name: impl Into<String>, data_type: DataType) -> u32 {
        let name = name.into();
        if let Some(&idx) = self.declared_locals_by_name.get(&name) {
            return self.declared_locals[idx].identifier.unwrap();
        }
        let index = self.declared_locals.len();
        let id = ident::local_id(index as u32);
        let var = Variable::named(name.clone(), Scope::Local, data_type, id);
        self.declared_locals_by_name.insert(name, index);
        self.declared_locals.push(var);
        id
    }

    pub fn local_by_name(&self, name: &str) -> Option<&Variable> {
        self.declared_locals_by_name.get(name).map(|&i| &self.declared_locals[i])
    }

    /// Allocates the lowest clear bit in `temp_var_flags` as a new temp
    /// variable slot.
    pub fn allocate_temp(&mut self, version: KsmVersion) -> u32 {
        let mut slot = 0u32;
        while self.temp_var_flags & (1 << slot) != 0 {
            slot += 1;
            assert!(slot < 32, "temp variable slots exhausted");
        }
        self.temp_var_flags |= 1 << slot;
        ident::temp_id(slot, version)
    }

    pub fn add_label(&mut self, label: Label, identifier: Option<u32>, address: Option<u32>) -> usize {
        let index = self.labels.len();
        if let Some(id) = identifier {
            self.labels_by_id.insert(id, index);
        }
        if let Some(addr) = address {
            self.labels_by_address.insert(addr, index);
        }
        self.labels.push(label);
        index
    }

    pub fn label_by_name(&self, name: &str) -> Option<&Label> {
        self.labels_by_name.get(name).map(|&i| &self.labels[i])
    }

    /// Declares (or returns the identifier of an already-declared) label by
    /// its user-given name. `identifier` is only used on first declaration,
    /// drawn from the shared static/label identifier counter (see
    /// `Tables::next_identifier_slot`). Used for `goto` references, which
    /// may forward-reference a label not yet defined by name.
    pub fn declare_label(&mut self, name: impl Into<String>, identifier: u32) -> u32 {
        let name = name.into();
        if let Some(&idx) = self.labels_by_name.get(&name) {
            return self.labels[idx].identifier.unwrap();
        }
        let label = Label { identifier: Some(identifier), address: None, alias: name.clone(), defined: false };
        let index = self.add_label(label, Some(identifier), None);
        self.labels_by_name.insert(name, index);
        identifier
    }

    /// Marks a label as defined (a `name:` site, not a bare `goto`
    /// reference). Returns `false` if the label was already defined, the
    /// `DuplicateLabel` condition.
    pub fn define_label(&mut self, name: impl Into<String>, identifier: u32) -> bool {
        let name = name.into();
        if let Some(&idx) = self.labels_by_name.get(&name) {
            if self.labels[idx].defined {
                return false;
            }
            self.labels[idx].defined = true;
            return true;
        }
        let label = Label { identifier: Some(identifier), address: None, alias: name.clone(), defined: true };
        let index = self.add_label(label, Some(identifier), None);
        self.labels_by_name.insert(name, index);
        true
    }

    /// Names of all labels referenced but never defined in this function,
    /// the `DanglingLabel` condition checked at `CloseFunction` time.
    pub fn dangling_labels(&self) -> Vec<&str> {
        self.labels.iter().filter(|l| !l.defined).map(|l| l.alias.as_str()).collect()
    }

    pub fn add_local_array(&mut self, array: Array) -> usize {
        let index = self.local_arrays.len();
        self.local_arrays_by_id.insert(array.identifier, index);
        self.local_arrays_by_address.insert(array.address, index);
        self.local_arrays_by_name.insert(array.name.clone(), index);
        self.local_arrays.push(array);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_is_idempotent() {
        let mut f = Function::new("f", 0x30000001, true);
        let a = f.accumulator_id();
        let b = f.accumulator_id();
        assert_eq!(a, b);
        assert_eq!(f.declared_locals.len(), 1);
    }

    #[test]
    fn temp_slots_allocate_lowest_clear_bit() {
        let mut f = Function::new("f", 0x30000001, true);
        let t0 = f.allocate_temp(KsmVersion::V1_3_0);
        let t1 = f.allocate_temp(KsmVersion::V1_3_0);
        assert_eq!(t0 & 0xFF, 0);
        assert_eq!(t1 & 0xFF, 1);
    }
}
