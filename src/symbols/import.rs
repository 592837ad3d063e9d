use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum ImportDataType {
    Int = 0,
    Function = 1,
    Thread = 2,
}

#[derive(Debug, Clone, Serialize)]
pub struct Import {
    pub name: String,
    pub identifier: Option<u32>,
    pub times_used: u32,
    /// Present only in v1.3.0; dropped in v1.3.2.
    pub file_id: Option<u32>,
    pub data_type: ImportDataType,
    /// Opaque per spec open-question: bit layout preserved, no meaning
    /// invented. Present only in v1.3.0.
    pub unknown0: Option<u32>,
}

impl Import {
    pub fn new(name: impl Into<String>, data_type: ImportDataType) -> Self {
        Import {
            name: name.into(),
            identifier: None,
            times_used: 0,
            file_id: None,
            data_type,
            unknown0: None,
        }
    }
}
