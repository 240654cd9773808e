//! The one-call entry point: program text + context + options + index in,
//! PNG bytes + GraphDef out. No hidden side effects.

use thiserror::Error;

use strata_chart::{CodecError, GraphDef, GraphDefError};
use strata_core::builder::{GraphOptions, build_graph};
use strata_core::index::TagIndex;
use strata_core::lang::eval::{EvalError, Evaluator};
use strata_core::lang::parser::{ParseError, parse_program};
use strata_core::model::context::{DataError, EvalContext};

use crate::engine::{self, RenderError};

/// Everything one graph request produces.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub png_bytes: Vec<u8>,
    pub graph_def: GraphDef,
}

/// Sum of every failure kind a request can surface. Index errors pass
/// through inside [`EvalError`] untranslated.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("parse: {0}")]
    Parse(#[from] ParseError),
    #[error("eval: {0}")]
    Eval(#[from] EvalError),
    #[error("data: {0}")]
    Data(#[from] DataError),
    #[error("graph: {0}")]
    Graph(#[from] GraphDefError),
    #[error("render: {0}")]
    Render(#[from] RenderError),
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
}

impl GraphError {
    /// Stable kind tag for one-line CLI reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            GraphError::Parse(_) => "parse",
            GraphError::Eval(EvalError::Index(_)) => "index",
            GraphError::Eval(_) => "eval",
            GraphError::Data(_) => "data",
            GraphError::Graph(_) => "graph",
            GraphError::Render(_) => "render",
            GraphError::Codec(_) => "codec",
        }
    }
}

/// Evaluate `program` against `index` and rasterise the result.
pub fn render_request(
    program: &str,
    ctx: &EvalContext,
    options: &GraphOptions,
    index: &dyn TagIndex,
) -> Result<Rendered, GraphError> {
    let tokens = parse_program(program)?;
    let items = Evaluator::new(ctx, index).eval(&tokens)?;
    let graph_def = build_graph(ctx, options, &items)?;
    let png_bytes = engine::render(&graph_def)?;
    Ok(Rendered {
        png_bytes,
        graph_def,
    })
}
