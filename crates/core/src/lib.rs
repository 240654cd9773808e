pub mod builder;
pub mod index;
pub mod lang;
pub mod model;

pub use builder::{GraphOptions, build_graph};
pub use index::{Aggregation, IndexError, MemoryIndex, Query, TagIndex, group_by};
pub use lang::eval::{EvalError, Evaluated, Evaluator, extract_spans};
pub use lang::expr::OutputKind;
pub use lang::parser::{ParseError, Token, parse_program};
pub use model::context::{DataError, EvalContext};
pub use model::series::{Tags, TimeSeries};
