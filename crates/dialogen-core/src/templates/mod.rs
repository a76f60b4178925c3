//! Template location and evaluation

pub mod evaluator;
pub mod locator;

pub use evaluator::{Evaluator, HandlebarsEvaluator};
pub use locator::{find_template, StructuredTemplate, Template, TextOrList, STRUCTURED_EXT};
