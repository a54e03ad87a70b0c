pub mod config;
pub mod crossover;
pub mod genome;
pub mod mutation;

pub use config::{ConfigError, MutationConfig, OperatorGating};
pub use crossover::{crossover, CrossoverError};
pub use genome::{BodyError, BodyPart, Genome, PartKind, ORIENTATIONS};
pub use mutation::{mutate_body, mutate_brain, offspring, BodyOperator};
