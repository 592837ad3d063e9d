pub mod array;
pub mod function;
pub mod import;
pub mod label;
pub mod tables;
pub mod variable;

pub use array::{Array, ArrayDataType, ArrayValue};
pub use function::Function;
pub use import::{Import, ImportDataType};
pub use label::Label;
pub use tables::Tables;
pub use variable::{ConstValue, DataType, Scope, Variable};
