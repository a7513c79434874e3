// Core modules implementing the typed table pipeline and error modeling.
pub mod error;
pub mod normalize;
pub mod page;
pub mod query;
pub mod record;
pub mod schema;
pub mod stats;
pub mod table;
