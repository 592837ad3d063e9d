use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Scope {
    Temp,
    Local,
    Static,
    Const,
    Global,
    TempStatic,
}

/// On-disk tag order is fixed by this discriminant list; see
/// `symbols::variable`'s entry in DESIGN.md for why `num_enum` owns the
/// byte <-> variant conversion here instead of a hand-rolled match, the
/// same role it plays for flag/tag bytes in the teacher crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum DataType {
    Float = 0,
    Int = 1,
    Hex = 2,
    String = 3,
    Alloc = 4,
    Ref = 5,
    Ptr = 6,
    Bool = 7,
    Func = 8,
    Antistring = 9,
    Me = 10,
    Table = 11,
    None = 12,
    Noinit = 13,
    User = 14,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConstValue {
    Int(i32),
    Float(f32),
    Str(String),
    Bool(bool),
}

#[derive(Debug, Clone, Serialize)]
pub struct Variable {
    pub name: Option<String>,
    pub identifier: Option<u32>,
    pub alias: String,
    pub value: Option<ConstValue>,
    pub scope: Scope,
    pub data_type: DataType,
}

impl Variable {
    pub fn new(scope: Scope, data_type: DataType, identifier: u32) -> Self {
        Variable {
            name: None,
            identifier: Some(identifier),
            alias: crate::ident::Identifier::classify(identifier, crate::version::KsmVersion::V1_3_0).alias(),
            value: None,
            scope,
            data_type,
        }
    }

    pub fn named(name: impl Into<String>, scope: Scope, data_type: DataType, identifier: u32) -> Self {
        let mut v = Self::new(scope, data_type, identifier);
        v.name = Some(name.into());
        v
    }
}
