// Core modules implementing the data model, storage, and error modeling.
pub mod error;
pub mod key;
pub mod query;
pub mod store;
pub mod table;
pub mod value;
