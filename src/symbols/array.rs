use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum ArrayDataType {
    Variable = 0,
    Int = 1,
    Float = 2,
    Bool = 3,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ArrayValue {
    Int(i32),
    Float(f32),
    Bool(bool),
    /// A variable-array entry, holding an expression encoded as a raw
    /// instruction word stream (opaque at this layer; decoded by `instr`).
    Expr(Vec<u32>),
}

#[derive(Debug, Clone, Serialize)]
pub struct Array {
    pub name: String,
    pub length: u32,
    pub identifier: u32,
    pub address: u32,
    pub values: Vec<ArrayValue>,
    pub data_type: ArrayDataType,
}
