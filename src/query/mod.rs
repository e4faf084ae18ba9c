pub use filter_expression::{BinaryOperator, Comparator, FieldCriterion, FilterExpression};
pub use find_specification::{FindSpecification, PaginationConfig, SortDirection};
pub use index_specification::IndexSpecification;
pub use pipeline::{Accumulator, Pipeline, PipelineStage, ProjectionExpression, GROUP_KEY_FIELD};
pub use update_specification::UpdateSpecification;

pub mod filter_expression;
pub mod find_specification;
pub mod index_specification;
pub mod pipeline;
pub mod update_specification;
