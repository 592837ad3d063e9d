//! Per-translation symbol table arena.
//!
//! All tables live for the duration of one translation and are dropped
//! together with the owning `Tables` value; cross-references between
//! entities are plain `u32` identifiers resolved back through this arena,
//! never borrows or reference-counted pointers (see DESIGN.md / SPEC_FULL
//! §9 "cross-table cyclic references").

use std::collections::HashMap;

use anyhow::{Context, Result};

use super::array::{Array, ArrayDataType, ArrayValue};
use super::function::Function;
use super::import::{Import, ImportDataType};
use super::variable::{ConstValue, DataType, Scope, Variable};
use crate::ident;
use crate::version::KsmVersion;

#[derive(Debug, Default)]
pub struct Tables {
    pub version: Option<KsmVersion>,
    pub slot_offset: u32,

    pub functions: Vec<Function>,
    pub functions_by_id: HashMap<u32, usize>,
    pub functions_by_name: HashMap<String, usize>,

    pub imports: Vec<Import>,
    pub imports_by_id: HashMap<u32, usize>,
    pub imports_by_name: HashMap<String, usize>,

    pub global_arrays: Vec<Array>,
    pub global_arrays_by_id: HashMap<u32, usize>,
    pub global_arrays_by_address: HashMap<u32, usize>,
    pub global_arrays_by_name: HashMap<String, usize>,

    pub global_vars: Vec<Variable>,
    pub global_vars_by_id: HashMap<u32, usize>,
    pub global_vars_by_name: HashMap<String, usize>,

    const_index: HashMap<String, u32>,

    next_used_identifier_slot: u32,

    /// Stack of active function indices; scoped lookups consult the top
    /// entry's local tables before falling back to the globals above.
    pub function_stack: Vec<usize>,
}

impl Tables {
    pub fn new(version: KsmVersion, slot_offset: u32) -> Self {
        Tables {
            version: Some(version),
            slot_offset,
            next_used_identifier_slot: 1,
            ..Default::default()
        }
    }

    fn version(&self) -> KsmVersion {
        self.version.unwrap_or(KsmVersion::V1_3_0)
    }

    pub fn current_function(&self) -> Option<&Function> {
        self.function_stack.last().map(|&i| &self.functions[i])
    }

    pub fn current_function_mut(&mut self) -> Option<&mut Function> {
        match self.function_stack.last() {
            Some(&i) => Some(&mut self.functions[i]),
            None => None,
        }
    }

    pub fn push_function(&mut self, index: usize) {
        self.function_stack.push(index);
    }

    pub fn pop_function(&mut self) -> Option<usize> {
        self.function_stack.pop()
    }

    /// `DanglingLabel`: every label referenced by a `goto` in the active
    /// function must have a matching `name:` definition by the time its
    /// enclosing function closes.
    pub fn check_no_dangling_labels(&self) -> Result<()> {
        let idx = *self.function_stack.last().ok_or_else(|| anyhow::anyhow!("no active function"))?;
        let func = &self.functions[idx];
        let dangling = func.dangling_labels();
        if !dangling.is_empty() {
            anyhow::bail!("dangling label(s) in function {:?}: referenced by goto but never defined: {}", func.name, dangling.join(", "));
        }
        Ok(())
    }

    /// Draws the next slot shared by functions, labels, and static
    /// variables (`usedIdentifierSlots`).
    pub fn next_identifier_slot(&mut self) -> u32 {
        let slot = self.next_used_identifier_slot;
        self.next_used_identifier_slot += 1;
        slot
    }

    pub fn declare_function(&mut self, name: impl Into<String>, is_public: bool) -> Result<u32> {
        let name = name.into();
        if let Some(&idx) = self.functions_by_name.get(&name) {
            return Ok(self.functions[idx].identifier);
        }
        let slot = self.next_identifier_slot();
        let id = ident::static_id(slot, self.slot_offset);
        let func = Function::new(name.clone(), id, is_public);
        let index = self.functions.len();
        self.functions_by_id.insert(id, index);
        self.functions_by_name.insert(name, index);
        self.functions.push(func);
        Ok(id)
    }

    pub fn lookup_function(&self, name: &str) -> Option<&Function> {
        self.functions_by_name.get(name).map(|&i| &self.functions[i])
    }

    pub fn function_by_id(&self, id: u32) -> Option<&Function> {
        self.functions_by_id.get(&id).map(|&i| &self.functions[i])
    }

    /// Pre-declares an import named by a header `#import` directive,
    /// without counting as a use — `timesUsed` only grows as the body
    /// actually references it (see `use_import`).
    pub fn declare_import(&mut self, name: impl Into<String>, data_type: ImportDataType) -> u32 {
        let name = name.into();
        if let Some(&idx) = self.imports_by_name.get(&name) {
            return self.imports[idx].identifier.unwrap();
        }
        let id = ident::FIRST_IMPORT_ID + self.imports.len() as u32;
        let mut import = Import::new(name.clone(), data_type);
        import.identifier = Some(id);
        if self.version().imports_have_file_id() {
            import.file_id = Some(0);
        }
        let index = self.imports.len();
        self.imports_by_id.insert(id, index);
        self.imports_by_name.insert(name, index);
        self.imports.push(import);
        id
    }

    /// Allocates a new import entry on first use, bumping `times_used`
    /// thereafter.
    pub fn use_import(&mut self, name: impl Into<String>, data_type: ImportDataType) -> u32 {
        let name = name.into();
        if let Some(&idx) = self.imports_by_name.get(&name) {
            self.imports[idx].times_used += 1;
            return self.imports[idx].identifier.unwrap();
        }
        let id = ident::FIRST_IMPORT_ID + self.imports.len() as u32;
        let mut import = Import::new(name.clone(), data_type);
        import.identifier = Some(id);
        import.times_used = 1;
        if self.version().imports_have_file_id() {
            import.file_id = Some(0);
        }
        let index = self.imports.len();
        self.imports_by_id.insert(id, index);
        self.imports_by_name.insert(name, index);
        self.imports.push(import);
        id
    }

    /// Allocates a new static variable, or returns an existing one of the
    /// same name.
    pub fn declare_static(&mut self, name: impl Into<String>, data_type: DataType) -> u32 {
        let name = name.into();
        if let Some(&idx) = self.global_vars_by_name.get(&name) {
            return self.global_vars[idx].identifier.unwrap();
        }
        let slot = self.next_identifier_slot();
        let id = ident::static_id(slot, self.slot_offset);
        let var = Variable::named(name.clone(), Scope::Static, data_type, id);
        let index = self.global_vars.len();
        self.global_vars_by_id.insert(id, index);
        self.global_vars_by_name.insert(name, index);
        self.global_vars.push(var);
        id
    }

    pub fn declare_global(&mut self, name: impl Into<String>, data_type: DataType) -> u32 {
        let name = name.into();
        if let Some(&idx) = self.global_vars_by_name.get(&name) {
            return self.global_vars[idx].identifier.unwrap();
        }
        let id = 0x5000_0000 | (self.global_vars.len() as u32);
        let var = Variable::named(name.clone(), Scope::Global, data_type, id);
        let index = self.global_vars.len();
        self.global_vars_by_id.insert(id, index);
        self.global_vars_by_name.insert(name, index);
        self.global_vars.push(var);
        id
    }

    /// Const coalescing: requesting a constant with equal `(dataType,
    /// value)` returns the already-allocated variable.
    pub fn declare_const(&mut self, data_type: DataType, value: ConstValue) -> u32 {
        let key = format!("{data_type:?}_{value:?}");
        if let Some(&id) = self.const_index.get(&key) {
            return id;
        }
        let slot = self.global_vars.len() as u32;
        let id = ident::const_id(slot, self.slot_offset);
        let mut var = Variable::new(Scope::Const, data_type, id);
        var.value = Some(value);
        let index = self.global_vars.len();
        self.global_vars_by_id.insert(id, index);
        self.global_vars.push(var);
        self.const_index.insert(key, id);
        id
    }

    /// Scoped array lookup by name: local tables of the active function
    /// are consulted before the global table, never the reverse.
    pub fn lookup_array_by_name(&self, name: &str) -> Option<&Array> {
        if let Some(f) = self.current_function() {
            if let Some(&idx) = f.local_arrays_by_name.get(name) {
                return Some(&f.local_arrays[idx]);
            }
        }
        self.global_arrays_by_name.get(name).map(|&i| &self.global_arrays[i])
    }

    pub fn lookup_array_by_id(&self, id: u32) -> Option<&Array> {
        if let Some(f) = self.current_function() {
            if let Some(&idx) = f.local_arrays_by_id.get(&id) {
                return Some(&f.local_arrays[idx]);
            }
        }
        self.global_arrays_by_id.get(&id).map(|&i| &self.global_arrays[i])
    }

    pub fn lookup_array_by_address(&self, address: u32) -> Option<&Array> {
        if let Some(f) = self.current_function() {
            if let Some(&idx) = f.local_arrays_by_address.get(&address) {
                return Some(&f.local_arrays[idx]);
            }
        }
        self.global_arrays_by_address.get(&address).map(|&i| &self.global_arrays[i])
    }

    /// Scoped variable lookup by name: checks the active function's
    /// declared locals first, then globals/statics/consts/imports.
    pub fn lookup_variable_by_name(&self, name: &str) -> Option<u32> {
        if let Some(f) = self.current_function() {
            if let Some(v) = f.local_by_name(name) {
                return v.identifier;
            }
        }
        self.global_vars_by_name.get(&name.to_string()).map(|&i| self.global_vars[i].identifier.unwrap())
    }

    /// Declares (or returns the identifier of) a label by name in the
    /// active function, drawing from the same identifier counter as
    /// functions and static variables.
    pub fn declare_label(&mut self, name: impl Into<String>) -> Result<u32> {
        let name = name.into();
        let slot_offset = self.slot_offset;
        let idx = *self.function_stack.last().ok_or_else(|| anyhow::anyhow!("label declared outside a function"))?;
        if let Some(id) = self.functions[idx].label_by_name(&name).and_then(|l| l.identifier) {
            return Ok(id);
        }
        let slot = self.next_identifier_slot();
        let id = ident::static_id(slot, slot_offset);
        Ok(self.functions[idx].declare_label(name, id))
    }

    /// Marks a `name:` label definition in the active function, allocating
    /// an identifier on first sight. Returns `Err` (`DuplicateLabel`) if the
    /// same name was already defined earlier in this function.
    pub fn define_label(&mut self, name: impl Into<String>) -> Result<u32> {
        let name = name.into();
        let slot_offset = self.slot_offset;
        let idx = *self.function_stack.last().ok_or_else(|| anyhow::anyhow!("label declared outside a function"))?;
        if let Some(id) = self.functions[idx].label_by_name(&name).and_then(|l| l.identifier) {
            if !self.functions[idx].define_label(&name, id) {
                anyhow::bail!("duplicate label {name:?} in function {}", self.functions[idx].name);
            }
            return Ok(id);
        }
        let slot = self.next_identifier_slot();
        let id = ident::static_id(slot, slot_offset);
        self.functions[idx].define_label(&name, id);
        Ok(id)
    }

    /// Inserts a function definition read directly off disk, identifier and
    /// all, bypassing allocation. Used by `disasm` while pre-populating the
    /// tables from the binary's function-defs section.
    pub fn insert_function(&mut self, func: Function) -> usize {
        let id = func.identifier;
        let name = func.name.clone();
        let index = self.functions.len();
        self.functions_by_id.insert(id, index);
        self.functions_by_name.insert(name, index);
        self.functions.push(func);
        index
    }

    /// Inserts a variable read directly off disk into the global table,
    /// whatever its scope (static/const/global). Used by `disasm`.
    pub fn insert_variable(&mut self, var: Variable) {
        let id = var.identifier.unwrap();
        let name = var.name.clone();
        let index = self.global_vars.len();
        self.global_vars_by_id.insert(id, index);
        if let Some(name) = name {
            self.global_vars_by_name.insert(name, index);
        }
        self.global_vars.push(var);
    }

    /// Inserts an import read directly off disk. Used by `disasm`.
    pub fn insert_import(&mut self, import: Import) {
        let id = import.identifier.unwrap();
        let name = import.name.clone();
        let index = self.imports.len();
        self.imports_by_id.insert(id, index);
        self.imports_by_name.insert(name, index);
        self.imports.push(import);
    }

    /// Declares an array by name, scoped to the active function if one is
    /// open, otherwise global; used by the assembler when it parses an
    /// array declaration statement. Returns the identifier of an
    /// already-declared array of the same name unchanged.
    pub fn declare_array(&mut self, name: impl Into<String>, data_type: ArrayDataType, length: u32, values: Vec<ArrayValue>) -> u32 {
        let name = name.into();
        if let Some(existing) = self.lookup_array_by_name(&name) {
            return existing.identifier;
        }
        let slot = self.next_identifier_slot();
        let id = ident::static_id(slot, self.slot_offset);
        let array = Array { name: name.clone(), length, identifier: id, address: id, values, data_type };
        match self.function_stack.last() {
            Some(&idx) => {
                self.functions[idx].add_local_array(array);
            }
            None => self.add_global_array(array),
        }
        id
    }

    pub fn add_global_array(&mut self, array: Array) {
        let id = array.identifier;
        let addr = array.address;
        let name = array.name.clone();
        let index = self.global_arrays.len();
        self.global_arrays_by_id.insert(id, index);
        self.global_arrays_by_address.insert(addr, index);
        self.global_arrays_by_name.insert(name, index);
        self.global_arrays.push(array);
    }

    /// Validates the identifier-uniqueness invariant: no two symbols
    /// across variables/functions/arrays/labels share the low 24 bits of
    /// their identifier.
    pub fn check_identifier_uniqueness(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        let mut check = |id: u32| -> Result<()> {
            let key = id & 0x00FF_FFFF;
            anyhow::ensure!(seen.insert(key), "duplicate identifier low-24-bits {key:#x}");
            Ok(())
        };
        for f in &self.functions {
            check(f.identifier).with_context(|| format!("function {}", f.name))?;
            for l in &f.labels {
                if let Some(id) = l.identifier {
                    check(id).with_context(|| format!("label {}", l.alias))?;
                }
            }
        }
        for v in &self.global_vars {
            if let Some(id) = v.identifier {
                check(id).with_context(|| format!("variable {}", v.alias))?;
            }
        }
        for a in &self.global_arrays {
            check(a.identifier).with_context(|| format!("array {}", a.name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_coalescing_returns_same_id() {
        let mut t = Tables::new(KsmVersion::V1_3_0, ident::DEFAULT_SLOT_OFFSET);
        let a = t.declare_const(DataType::Int, ConstValue::Int(5));
        let b = t.declare_const(DataType::Int, ConstValue::Int(5));
        assert_eq!(a, b);
        let c = t.declare_const(DataType::Int, ConstValue::Int(6));
        assert_ne!(a, c);
    }

    #[test]
    fn import_use_count_increments() {
        let mut t = Tables::new(KsmVersion::V1_3_0, ident::DEFAULT_SLOT_OFFSET);
        t.use_import("imp", ImportDataType::Function);
        t.use_import("imp", ImportDataType::Function);
        let id = t.use_import("imp", ImportDataType::Function);
        assert_eq!(id, ident::FIRST_IMPORT_ID);
        assert_eq!(t.imports[0].times_used, 3);
    }

    #[test]
    fn declare_array_is_idempotent_by_name() {
        let mut t = Tables::new(KsmVersion::V1_3_0, ident::DEFAULT_SLOT_OFFSET);
        let a = t.declare_array("nums", super::super::array::ArrayDataType::Int, 1, vec![super::super::array::ArrayValue::Int(1)]);
        let b = t.declare_array("nums", super::super::array::ArrayDataType::Int, 0, vec![]);
        assert_eq!(a, b);
        assert_eq!(t.global_arrays.len(), 1);
    }

    #[test]
    fn scoped_lookup_prefers_local() {
        let mut t = Tables::new(KsmVersion::V1_3_0, ident::DEFAULT_SLOT_OFFSET);
        t.declare_global("x", DataType::Int);
        let fid = t.declare_function("f", true).unwrap();
        let idx = t.functions_by_id[&fid];
        t.functions[idx].declare_local("x", DataType::Int);
        t.push_function(idx);
        let local_id = t.lookup_variable_by_name("x").unwrap();
        assert_eq!(ident::Identifier::classify(local_id, KsmVersion::V1_3_0).scope, ident::Scope::Local);
    }
}
